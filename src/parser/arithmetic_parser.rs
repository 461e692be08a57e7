//! Arithmetic Expression Parser
//!
//! Parses bash arithmetic expressions like:
//! - $((1 + 2))
//! - $((x++))
//! - $((a ? b : c))
//! - $((2#1010))
//!
//! The expression text is parsed with its own cursor (`arith_src` /
//! `arith_pos`) so that nested expansions can re-enter the parser. Binary
//! levels are table driven from lowest to highest precedence; assignment,
//! ternary and exponentiation are right-associative and handled separately.

use crate::ast::types::{Node, AST};
use crate::parser::parser::Parser;
use crate::parser::types::{ParseError, ParseResult};
use crate::parser::word_parser::is_whitespace;

/// Assignment operators, longest first so `<<=` wins over `<`.
pub const ARITH_ASSIGN_OPS: &[&str] = &["<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "^=", "|=", "="];

/// One left-associative binary operator: its text and the characters that
/// must not follow it (`|` is not `||` or `|=`).
struct BinaryOp {
    op: &'static str,
    not_followed_by: &'static str,
}

const fn bin(op: &'static str, not_followed_by: &'static str) -> BinaryOp {
    BinaryOp { op, not_followed_by }
}

/// Left-associative levels, lowest precedence first.
const BINARY_LEVELS: &[&[BinaryOp]] = &[
    &[bin("||", "")],
    &[bin("&&", "")],
    &[bin("|", "|=")],
    &[bin("^", "=")],
    &[bin("&", "&=")],
    &[bin("==", ""), bin("!=", "")],
    &[bin("<=", ""), bin(">=", ""), bin("<", "<="), bin(">", ">=")],
    &[bin("<<", "="), bin(">>", "=")],
    &[bin("+", "+="), bin("-", "-=")],
    &[bin("*", "*="), bin("/", "="), bin("%", "=")],
];

impl Parser {
    // =========================================================================
    // $(( ... ))
    // =========================================================================

    /// Parse `$((expr))`. Returns `None` with the cursor restored when the
    /// text is not an arithmetic expansion, so the caller can retry it as a
    /// command substitution. EOF before `))` is an error.
    pub(crate) fn parse_arithmetic_expansion(&mut self) -> ParseResult<Option<(Node, String)>> {
        if !self.starts_with("$((") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 3;
        let content_start = self.pos;
        let mut depth = 1usize;
        loop {
            let Some(c) = self.peek() else {
                return Err(self.matched_pair_error("unexpected EOF looking for `))'", start));
            };
            match c {
                '\'' => {
                    self.advance();
                    while self.peek().map_or(false, |c| c != '\'') {
                        self.advance();
                    }
                    self.advance();
                }
                '"' => {
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c == '\\' && self.peek_at(1).is_some() {
                            self.pos += 2;
                        } else {
                            self.advance();
                            if c == '"' {
                                break;
                            }
                        }
                    }
                }
                '\\' if self.peek_at(1).is_some() => self.pos += 2,
                '(' => {
                    depth += 1;
                    self.advance();
                }
                ')' => {
                    if depth == 1 && self.peek_at(1) == Some(')') {
                        break;
                    }
                    depth -= 1;
                    // `$( (...) )`: the closers are not adjacent, so this is a
                    // subshell inside a command substitution
                    if depth == 0 {
                        self.pos = start;
                        return Ok(None);
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
        let content = self.slice(content_start, self.pos);
        self.pos += 2;
        let text = self.slice(start, self.pos);
        match self.parse_arith_expr(&content) {
            Ok(expr) => Ok(Some((
                Node::ArithmeticExpansion {
                    expression: expr.map(Box::new),
                },
                text,
            ))),
            Err(e) => {
                log::debug!("arithmetic at {} rejected ({}), trying command substitution", start, e);
                self.pos = start;
                Ok(None)
            }
        }
    }

    /// Parse an arithmetic expression held in `content`. Empty content (only
    /// blanks) yields `None`. Text after a complete expression is ignored.
    pub(crate) fn parse_arith_expr(&mut self, content: &str) -> ParseResult<Option<Node>> {
        let saved_src = std::mem::replace(&mut self.arith_src, content.chars().collect());
        let saved_pos = std::mem::replace(&mut self.arith_pos, 0);
        let saved_state = self.state;
        self.state.arith = true;

        self.arith_skip_ws();
        let result = if self.arith_at_end() {
            Ok(None)
        } else {
            self.arith_parse_comma().map(Some)
        };

        self.state = saved_state;
        self.arith_src = saved_src;
        self.arith_pos = saved_pos;
        result
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    pub(crate) fn arith_at_end(&self) -> bool {
        self.arith_pos >= self.arith_src.len()
    }

    pub(crate) fn arith_peek(&self, offset: usize) -> Option<char> {
        self.arith_src.get(self.arith_pos + offset).copied()
    }

    pub(crate) fn arith_advance(&mut self) -> Option<char> {
        let c = self.arith_peek(0)?;
        self.arith_pos += 1;
        Some(c)
    }

    /// Skip whitespace and `\<newline>`.
    pub(crate) fn arith_skip_ws(&mut self) {
        while let Some(c) = self.arith_peek(0) {
            if is_whitespace(c) {
                self.arith_pos += 1;
            } else if c == '\\' && self.arith_peek(1) == Some('\n') {
                self.arith_pos += 2;
            } else {
                break;
            }
        }
    }

    pub(crate) fn arith_match(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.arith_peek(i) == Some(c))
    }

    pub(crate) fn arith_consume(&mut self, s: &str) -> bool {
        if self.arith_match(s) {
            self.arith_pos += s.chars().count();
            return true;
        }
        false
    }

    pub(crate) fn arith_error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, Some(self.arith_pos), None)
    }

    // =========================================================================
    // PRECEDENCE CHAIN
    // =========================================================================

    pub(crate) fn arith_parse_comma(&mut self) -> ParseResult<Node> {
        let mut left = self.arith_parse_assign()?;
        loop {
            self.arith_skip_ws();
            if !self.arith_consume(",") {
                return Ok(left);
            }
            self.arith_skip_ws();
            let right = self.arith_parse_assign()?;
            left = Node::ArithComma {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn arith_parse_assign(&mut self) -> ParseResult<Node> {
        let left = self.arith_parse_ternary()?;
        self.arith_skip_ws();
        for op in ARITH_ASSIGN_OPS {
            if !self.arith_match(op) {
                continue;
            }
            // `==` is equality, handled below the ternary
            if *op == "=" && self.arith_peek(1) == Some('=') {
                break;
            }
            self.arith_consume(op);
            self.arith_skip_ws();
            let right = self.arith_parse_assign()?;
            return Ok(Node::ArithAssign {
                op: op.to_string(),
                target: Box::new(left),
                value: Box::new(right),
            });
        }
        Ok(left)
    }

    fn arith_parse_ternary(&mut self) -> ParseResult<Node> {
        let condition = self.arith_parse_binary(0)?;
        self.arith_skip_ws();
        if !self.arith_consume("?") {
            return Ok(condition);
        }
        self.arith_skip_ws();
        let if_true = if self.arith_match(":") {
            None
        } else {
            Some(Box::new(self.arith_parse_assign()?))
        };
        self.arith_skip_ws();
        let mut if_false = None;
        if self.arith_consume(":") {
            self.arith_skip_ws();
            if !self.arith_at_end() && self.arith_peek(0) != Some(')') {
                if_false = Some(Box::new(self.arith_parse_ternary()?));
            }
        }
        Ok(Node::ArithTernary {
            condition: Box::new(condition),
            if_true,
            if_false,
        })
    }

    fn arith_binary_op_at(&self, level: &[BinaryOp]) -> Option<&'static str> {
        level.iter().find_map(|candidate| {
            if !self.arith_match(candidate.op) {
                return None;
            }
            let len = candidate.op.chars().count();
            match self.arith_peek(len) {
                Some(next) if candidate.not_followed_by.contains(next) => None,
                _ => Some(candidate.op),
            }
        })
    }

    fn arith_parse_binary(&mut self, level: usize) -> ParseResult<Node> {
        let Some(ops) = BINARY_LEVELS.get(level) else {
            return self.arith_parse_exponentiation();
        };
        let mut left = self.arith_parse_binary(level + 1)?;
        loop {
            self.arith_skip_ws();
            let Some(op) = self.arith_binary_op_at(ops) else {
                return Ok(left);
            };
            self.arith_consume(op);
            self.arith_skip_ws();
            let right = self.arith_parse_binary(level + 1)?;
            left = AST::arith_binary(op, left, right);
        }
    }

    fn arith_parse_exponentiation(&mut self) -> ParseResult<Node> {
        let left = self.arith_parse_unary()?;
        self.arith_skip_ws();
        if self.arith_consume("**") {
            self.arith_skip_ws();
            let right = self.arith_parse_exponentiation()?;
            return Ok(AST::arith_binary("**", left, right));
        }
        Ok(left)
    }

    fn arith_parse_unary(&mut self) -> ParseResult<Node> {
        self.arith_skip_ws();
        if self.arith_consume("++") {
            self.arith_skip_ws();
            let operand = Box::new(self.arith_parse_unary()?);
            return Ok(Node::ArithPreIncr { operand });
        }
        if self.arith_consume("--") {
            self.arith_skip_ws();
            let operand = Box::new(self.arith_parse_unary()?);
            return Ok(Node::ArithPreDecr { operand });
        }
        let op = match (self.arith_peek(0), self.arith_peek(1)) {
            (Some(c @ ('!' | '~')), _) => Some(c),
            (Some('+'), next) if next != Some('+') => Some('+'),
            (Some('-'), next) if next != Some('-') => Some('-'),
            _ => None,
        };
        if let Some(op) = op {
            self.arith_advance();
            self.arith_skip_ws();
            let operand = self.arith_parse_unary()?;
            return Ok(AST::arith_unary(op.to_string(), operand));
        }
        self.arith_parse_postfix()
    }

    fn arith_parse_postfix(&mut self) -> ParseResult<Node> {
        let mut left = self.arith_parse_primary()?;
        loop {
            self.arith_skip_ws();
            if self.arith_consume("++") {
                left = Node::ArithPostIncr { operand: Box::new(left) };
            } else if self.arith_consume("--") {
                left = Node::ArithPostDecr { operand: Box::new(left) };
            } else if self.arith_peek(0) == Some('[') {
                let Node::ArithVar { name } = &left else {
                    return Ok(left);
                };
                let array = name.clone();
                self.arith_advance();
                self.arith_skip_ws();
                let index = self.arith_parse_comma()?;
                self.arith_skip_ws();
                if !self.arith_consume("]") {
                    return Err(self.arith_error("Expected ']' in array subscript"));
                }
                left = Node::ArithSubscript {
                    array,
                    index: Box::new(index),
                };
            } else {
                return Ok(left);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn arith(input: &str) -> Node {
        let mut parser = Parser::new("", ParserOptions::default());
        parser.parse_arith_expr(input).unwrap().unwrap()
    }

    fn num(v: &str) -> Node {
        AST::arith_number(v)
    }

    fn var(v: &str) -> Node {
        AST::arith_var(v)
    }

    #[test]
    fn test_simple_number() {
        assert_eq!(arith("42"), num("42"));
        assert_eq!(arith("  16#ff "), num("16#ff"));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            arith("1 + 2 * 3"),
            AST::arith_binary("+", num("1"), AST::arith_binary("*", num("2"), num("3")))
        );
        assert_eq!(
            arith("a || b && c"),
            AST::arith_binary("||", var("a"), AST::arith_binary("&&", var("b"), var("c")))
        );
        assert_eq!(
            arith("1 - 2 - 3"),
            AST::arith_binary("-", AST::arith_binary("-", num("1"), num("2")), num("3"))
        );
    }

    #[test]
    fn test_right_associative() {
        assert_eq!(
            arith("2**3**2"),
            AST::arith_binary("**", num("2"), AST::arith_binary("**", num("3"), num("2")))
        );
        let Node::ArithAssign { op, target, value } = arith("a=b=3") else {
            panic!("Expected assignment");
        };
        assert_eq!(op, "=");
        assert_eq!(*target, var("a"));
        assert!(matches!(*value, Node::ArithAssign { .. }));
    }

    #[test]
    fn test_compound_assignment_is_not_comparison() {
        let Node::ArithAssign { op, .. } = arith("x <<= 2") else {
            panic!("Expected assignment");
        };
        assert_eq!(op, "<<=");
        assert_eq!(arith("x == 2"), AST::arith_binary("==", var("x"), num("2")));
        assert_eq!(arith("x | y"), AST::arith_binary("|", var("x"), var("y")));
    }

    #[test]
    fn test_ternary() {
        let Node::ArithTernary { condition, if_true, if_false } = arith("a ? 1 : 2") else {
            panic!("Expected ternary");
        };
        assert_eq!(*condition, var("a"));
        assert_eq!(if_true.map(|n| *n), Some(num("1")));
        assert_eq!(if_false.map(|n| *n), Some(num("2")));
    }

    #[test]
    fn test_increment() {
        assert_eq!(arith("x++"), Node::ArithPostIncr { operand: Box::new(var("x")) });
        assert_eq!(arith("--x"), Node::ArithPreDecr { operand: Box::new(var("x")) });
        assert_eq!(arith("-x"), AST::arith_unary("-", var("x")));
    }

    #[test]
    fn test_subscript_and_comma() {
        assert_eq!(
            arith("a[i+1], 3"),
            Node::ArithComma {
                left: Box::new(Node::ArithSubscript {
                    array: "a".into(),
                    index: Box::new(AST::arith_binary("+", var("i"), num("1"))),
                }),
                right: Box::new(num("3")),
            }
        );
    }

    #[test]
    fn test_empty_expression() {
        let mut parser = Parser::new("", ParserOptions::default());
        assert_eq!(parser.parse_arith_expr("   ").unwrap(), None);
    }

    #[test]
    fn test_expansion_and_fallback() {
        let mut parser = Parser::new("$((1+2)) tail", ParserOptions::default());
        let (node, text) = parser.parse_arithmetic_expansion().unwrap().unwrap();
        assert_eq!(text, "$((1+2))");
        assert_eq!(
            node,
            Node::ArithmeticExpansion {
                expression: Some(Box::new(AST::arith_binary("+", num("1"), num("2")))),
            }
        );
        assert_eq!(parser.pos, 8);

        let mut parser = Parser::new("$(( @x ))", ParserOptions::default());
        assert!(parser.parse_arithmetic_expansion().unwrap().is_none());
        assert_eq!(parser.pos, 0);

        let mut parser = Parser::new("$((echo a) )", ParserOptions::default());
        assert!(parser.parse_arithmetic_expansion().unwrap().is_none());
        assert_eq!(parser.pos, 0);

        let mut parser = Parser::new("$((a*(b+1)))", ParserOptions::default());
        let (_, text) = parser.parse_arithmetic_expansion().unwrap().unwrap();
        assert_eq!(text, "$((a*(b+1)))");

        let mut parser = Parser::new("$((1+2", ParserOptions::default());
        assert!(parser.parse_arithmetic_expansion().unwrap_err().is_matched_pair());
    }

    #[test]
    fn test_state_restored_after_error() {
        let mut parser = Parser::new("", ParserOptions::default());
        assert!(parser.parse_arith_expr("(1").is_err());
        assert!(!parser.state.arith);
        assert!(parser.arith_src.is_empty());
    }
}
