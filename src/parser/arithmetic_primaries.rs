//! Arithmetic Primaries
//!
//! Leaf productions of the arithmetic parser: parenthesized groups,
//! `$`-expansions, quoted literals, backtick commands, escapes, numbers
//! (including `base#digits`) and variable names.

use crate::ast::types::{Node, AST};
use crate::parser::parser::Parser;
use crate::parser::types::ParseResult;
use crate::parser::word_parser::{is_param_expansion_op, is_special_param_or_digit};

/// Characters that end an operand; a primary starting with one is empty.
const ARITH_OPERAND_TERMINATORS: &str = ")]:,;?|&<>=!+-*/%^~#{}";

/// Operators recognized after a name inside `${...}` in arithmetic context,
/// longest first.
const BRACED_PARAM_OPS: &[&str] = &[":-", ":=", ":+", ":?", ":", "##", "#", "%%", "%", "//", "/"];

fn is_arith_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Parser {
    pub(crate) fn arith_parse_primary(&mut self) -> ParseResult<Node> {
        self.arith_skip_ws();
        let Some(c) = self.arith_peek(0) else {
            return Ok(Node::ArithEmpty);
        };
        match c {
            '(' => {
                self.arith_advance();
                self.arith_skip_ws();
                let expr = self.arith_parse_comma()?;
                self.arith_skip_ws();
                if !self.arith_consume(")") {
                    return Err(self.arith_error("Expected ')' in arithmetic expression"));
                }
                Ok(expr)
            }
            '#' if self.arith_peek(1) == Some('$') => {
                self.arith_advance();
                self.arith_parse_expansion()
            }
            '$' => self.arith_parse_expansion(),
            '\'' => self.arith_parse_single_quote(),
            '"' => self.arith_parse_double_quote(),
            '`' => self.arith_parse_backtick(),
            '\\' => {
                self.arith_advance();
                match self.arith_advance() {
                    Some(escaped) => Ok(Node::ArithEscape { ch: escaped.to_string() }),
                    None => Err(self.arith_error("Unexpected end after backslash in arithmetic")),
                }
            }
            c if ARITH_OPERAND_TERMINATORS.contains(c) => Ok(Node::ArithEmpty),
            _ => self.arith_parse_number_or_var(),
        }
    }

    // =========================================================================
    // EXPANSIONS
    // =========================================================================

    fn arith_parse_expansion(&mut self) -> ParseResult<Node> {
        if !self.arith_consume("$") {
            return Err(self.arith_error("Expected '$'"));
        }
        match self.arith_peek(0) {
            Some('(') => return self.arith_parse_cmdsub(),
            Some('{') => return Ok(self.arith_parse_braced_param()),
            _ => {}
        }
        let mut name = String::new();
        while let Some(c) = self.arith_peek(0) {
            if is_arith_name_char(c) {
                name.push(c);
                self.arith_advance();
            } else if name.is_empty() && (is_special_param_or_digit(c) || c == '#') {
                name.push(c);
                self.arith_advance();
                break;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.arith_error("Expected variable name after $"));
        }
        Ok(AST::param(name, None, None))
    }

    // Cursor on the `(` after `$`.
    fn arith_parse_cmdsub(&mut self) -> ParseResult<Node> {
        self.arith_advance();
        if self.arith_peek(0) == Some('(') {
            self.arith_advance();
            let content_start = self.arith_pos;
            let mut depth = 1usize;
            while let Some(c) = self.arith_peek(0) {
                if c == '(' {
                    depth += 1;
                } else if c == ')' {
                    if depth == 1 && self.arith_peek(1) == Some(')') {
                        break;
                    }
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                self.arith_advance();
            }
            let content: String = self.arith_slice(content_start, self.arith_pos);
            self.arith_advance();
            self.arith_advance();
            let inner = self.parse_arith_expr(&content)?;
            return Ok(Node::ArithmeticExpansion {
                expression: inner.map(Box::new),
            });
        }

        let content_start = self.arith_pos;
        let mut depth = 1usize;
        while let Some(c) = self.arith_peek(0) {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            self.arith_advance();
        }
        let content = self.arith_slice(content_start, self.arith_pos);
        self.arith_advance();
        let cmd = self.parse_nested(&content)?.unwrap_or(Node::Empty);
        Ok(AST::command_substitution(cmd, false))
    }

    // Cursor on the `{` after `$`. Operator arguments are kept as raw text.
    fn arith_parse_braced_param(&mut self) -> Node {
        self.arith_advance();
        if let Some(prefix @ ('!' | '#')) = self.arith_peek(0) {
            self.arith_advance();
            let mut name = String::new();
            while let Some(c) = self.arith_peek(0).filter(|&c| c != '}') {
                name.push(c);
                self.arith_advance();
            }
            self.arith_consume("}");
            return if prefix == '!' {
                Node::ParamIndirect {
                    param: name,
                    op: None,
                    arg: None,
                }
            } else {
                Node::ParamLength { param: name }
            };
        }

        let mut name = String::new();
        while let Some(c) = self.arith_peek(0) {
            if c == '}' {
                self.arith_advance();
                return AST::param(name, None, None);
            }
            if is_param_expansion_op(c) {
                break;
            }
            name.push(c);
            self.arith_advance();
        }

        let mut rest = String::new();
        let mut depth = 1usize;
        while let Some(c) = self.arith_peek(0) {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            rest.push(c);
            self.arith_advance();
        }
        self.arith_consume("}");
        match BRACED_PARAM_OPS.iter().find(|op| rest.starts_with(*op)) {
            Some(op) => {
                let arg = rest[op.len()..].to_string();
                AST::param(name, Some(op.to_string()), Some(arg))
            }
            None => AST::param(name, Some(String::new()), Some(rest)),
        }
    }

    // =========================================================================
    // QUOTES AND COMMANDS
    // =========================================================================

    fn arith_parse_single_quote(&mut self) -> ParseResult<Node> {
        self.arith_advance();
        let content_start = self.arith_pos;
        while self.arith_peek(0).map_or(false, |c| c != '\'') {
            self.arith_advance();
        }
        let content = self.arith_slice(content_start, self.arith_pos);
        if !self.arith_consume("'") {
            return Err(self.arith_error("Unterminated single quote in arithmetic"));
        }
        Ok(AST::arith_number(content))
    }

    fn arith_scan_escaped_until(&mut self, close: char) -> String {
        self.arith_advance();
        let content_start = self.arith_pos;
        while let Some(c) = self.arith_peek(0) {
            if c == close {
                break;
            }
            if c == '\\' {
                self.arith_advance();
            }
            self.arith_advance();
        }
        self.arith_slice(content_start, self.arith_pos)
    }

    fn arith_parse_double_quote(&mut self) -> ParseResult<Node> {
        let content = self.arith_scan_escaped_until('"');
        if !self.arith_consume("\"") {
            return Err(self.arith_error("Unterminated double quote in arithmetic"));
        }
        Ok(AST::arith_number(content))
    }

    fn arith_parse_backtick(&mut self) -> ParseResult<Node> {
        let content = self.arith_scan_escaped_until('`');
        if !self.arith_consume("`") {
            return Err(self.arith_error("Unterminated backtick in arithmetic"));
        }
        let cmd = self.parse_nested(&content)?.unwrap_or(Node::Empty);
        Ok(AST::command_substitution(cmd, false))
    }

    // =========================================================================
    // NUMBERS AND NAMES
    // =========================================================================

    fn arith_parse_number_or_var(&mut self) -> ParseResult<Node> {
        self.arith_skip_ws();
        let Some(c) = self.arith_peek(0) else {
            return Err(self.arith_error("Unexpected end of arithmetic expression"));
        };
        if c.is_ascii_digit() {
            let start = self.arith_pos;
            while self
                .arith_peek(0)
                .map_or(false, |c| is_arith_name_char(c) || c == '#')
            {
                self.arith_advance();
            }
            let number = AST::arith_number(self.arith_slice(start, self.arith_pos));
            if self.arith_peek(0) == Some('$') {
                // `2#$x`: base prefix glued to an expansion
                let expansion = self.arith_parse_expansion()?;
                return Ok(Node::ArithConcat {
                    parts: vec![number, expansion],
                });
            }
            return Ok(number);
        }
        if c.is_alphabetic() || c == '_' {
            let start = self.arith_pos;
            while self.arith_peek(0).map_or(false, is_arith_name_char) {
                self.arith_advance();
            }
            return Ok(AST::arith_var(self.arith_slice(start, self.arith_pos)));
        }
        Err(self.arith_error(format!("Unexpected character '{}' in arithmetic expression", c)))
    }

    fn arith_slice(&self, start: usize, end: usize) -> String {
        self.arith_src[start..end].iter().collect()
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

    #[test]
    fn test_parse_base_notation() {
        assert_eq!(arith("2#1010"), AST::arith_number("2#1010"));
        assert_eq!(arith("0x1F"), AST::arith_number("0x1F"));
        assert_eq!(
            arith("16#$n"),
            Node::ArithConcat {
                parts: vec![AST::arith_number("16#"), AST::param("n", None, None)],
            }
        );
    }

    #[test]
    fn test_dollar_forms() {
        assert_eq!(arith("$x + 1"), AST::arith_binary("+", AST::param("x", None, None), AST::arith_number("1")));
        assert_eq!(arith("$#"), AST::param("#", None, None));
        assert_eq!(arith("${#arr}"), Node::ParamLength { param: "arr".into() });
        assert_eq!(
            arith("${x:-3}"),
            AST::param("x", Some(":-".into()), Some("3".into()))
        );
        assert_eq!(arith("${y}"), AST::param("y", None, None));
    }

    #[test]
    fn test_nested_arithmetic() {
        assert_eq!(
            arith("$((1))"),
            Node::ArithmeticExpansion {
                expression: Some(Box::new(AST::arith_number("1"))),
            }
        );
    }

    #[test]
    fn test_command_substitution_in_arithmetic() {
        let Node::CommandSubstitution { command, brace } = arith("$(echo 1)") else {
            panic!("Expected command substitution");
        };
        assert!(!brace);
        assert_eq!(command.kind(), "command");
    }

    #[test]
    fn test_quotes_and_escape() {
        assert_eq!(arith("'12'"), AST::arith_number("12"));
        assert_eq!(arith("\"3\""), AST::arith_number("3"));
        assert_eq!(arith("\\x"), Node::ArithEscape { ch: "x".into() });
    }

    #[test]
    fn test_empty_operand() {
        assert_eq!(arith("1+"), AST::arith_binary("+", AST::arith_number("1"), Node::ArithEmpty));
    }

    #[test]
    fn test_unexpected_character() {
        let mut parser = Parser::new("", ParserOptions::default());
        let err = parser.parse_arith_expr("@").unwrap_err();
        assert!(err.message().contains("Unexpected character '@'"));
    }
}
