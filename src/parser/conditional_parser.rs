//! Conditional Expression Parser
//!
//! Handles parsing of `[[ ... ]]` conditional commands. Operands are read
//! as words in the conditional word context, so `<`, `>` and parentheses
//! end a word instead of starting a redirection or subshell.

use crate::ast::types::{Node, Word};
use crate::parser::parser::Parser;
use crate::parser::types::{ParseResult, WordContext, COND_BINARY_OPS, COND_UNARY_OPS};
use crate::parser::word_parser::{is_redirect_char, is_whitespace};

impl Parser {
    /// Parse `[[ expr ]]` at the cursor. Returns `None` when the cursor is
    /// not on a conditional command.
    pub(crate) fn parse_conditional_expr(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.starts_with("[[") {
            return Ok(None);
        }
        let opens = match self.peek_at(2) {
            None => true,
            Some('\\') => self.peek_at(3) == Some('\n'),
            Some(c) => is_whitespace(c),
        };
        if !opens {
            return Ok(None);
        }
        self.pos += 2;
        self.state.cond_expr = true;
        self.word_context = WordContext::Cond;
        let body = self.cond_parse_or();
        self.state.cond_expr = false;
        self.word_context = WordContext::Normal;
        let body = body?;

        self.cond_skip_whitespace();
        if !self.starts_with("]]") {
            return Err(self.error("Expected ]] to close conditional expression", self.pos));
        }
        self.pos += 2;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::ConditionalExpr {
            body: Box::new(body),
            redirects,
        }))
    }

    // Newlines are plain whitespace between `[[` and `]]`.
    fn cond_skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(c) if is_whitespace(c) => self.pos += 1,
                Some('\\') if self.peek_at(1) == Some('\n') => self.pos += 2,
                _ => return,
            }
        }
    }

    fn cond_at_end(&self) -> bool {
        self.at_end() || self.starts_with("]]")
    }

    fn cond_parse_or(&mut self) -> ParseResult<Node> {
        self.cond_skip_whitespace();
        let left = self.cond_parse_and()?;
        self.cond_skip_whitespace();
        if self.starts_with("||") {
            self.pos += 2;
            let right = self.cond_parse_or()?;
            return Ok(Node::CondOr {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn cond_parse_and(&mut self) -> ParseResult<Node> {
        self.cond_skip_whitespace();
        let left = self.cond_parse_term()?;
        self.cond_skip_whitespace();
        if self.starts_with("&&") {
            self.pos += 2;
            let right = self.cond_parse_and()?;
            return Ok(Node::CondAnd {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn cond_parse_term(&mut self) -> ParseResult<Node> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Err(self.error("Unexpected end of conditional expression", self.pos));
        }

        if self.peek() == Some('!') && self.peek_at(1).map_or(true, is_whitespace) {
            self.advance();
            let operand = self.cond_parse_term()?;
            return Ok(Node::CondNot {
                operand: Box::new(operand),
            });
        }

        if self.peek() == Some('(') {
            self.advance();
            let inner = self.cond_parse_or()?;
            self.cond_skip_whitespace();
            if self.peek() != Some(')') {
                return Err(self.error("Expected ) in conditional expression", self.pos));
            }
            self.advance();
            return Ok(Node::CondParen {
                inner: Box::new(inner),
            });
        }

        let Some(word1) = self.cond_parse_word()? else {
            return Err(self.error("Expected word in conditional expression", self.pos));
        };
        self.cond_skip_whitespace();

        if COND_UNARY_OPS.contains(word1.value.as_str()) {
            let Some(operand) = self.cond_parse_word()? else {
                return Err(self.error(format!("Expected operand after {}", word1.value), self.pos));
            };
            return Ok(Node::UnaryTest {
                op: word1.value,
                operand,
            });
        }

        let continues = !self.cond_at_end() && !matches!(self.peek(), Some('&' | '|' | ')'));
        if continues {
            if let Some(op) = self.peek().filter(|&c| is_redirect_char(c) && self.peek_at(1) != Some('(')) {
                self.advance();
                self.cond_skip_whitespace();
                let Some(word2) = self.cond_parse_word()? else {
                    return Err(self.error(format!("Expected operand after {}", op), self.pos));
                };
                return Ok(Node::BinaryTest {
                    op: op.to_string(),
                    left: word1,
                    right: word2,
                });
            }

            let saved = self.pos;
            if let Some(op_word) = self.cond_parse_word()? {
                if COND_BINARY_OPS.contains(op_word.value.as_str()) {
                    self.cond_skip_whitespace();
                    let word2 = if op_word.value == "=~" {
                        self.cond_parse_regex_word()?
                    } else {
                        self.cond_parse_word()?
                    };
                    let Some(word2) = word2 else {
                        return Err(self.error(format!("Expected operand after {}", op_word.value), self.pos));
                    };
                    return Ok(Node::BinaryTest {
                        op: op_word.value,
                        left: word1,
                        right: word2,
                    });
                }
            }
            self.pos = saved;
        }

        Ok(Node::UnaryTest {
            op: "-n".to_string(),
            operand: word1,
        })
    }

    fn cond_parse_word(&mut self) -> ParseResult<Option<Word>> {
        self.cond_skip_whitespace();
        if self.cond_at_end() || matches!(self.peek(), Some('(' | ')')) {
            return Ok(None);
        }
        if self.starts_with("&&") || self.starts_with("||") {
            return Ok(None);
        }
        self.parse_word_in_context(WordContext::Cond)
    }

    // Right-hand side of `=~`: parentheses and `|` belong to the pattern.
    fn cond_parse_regex_word(&mut self) -> ParseResult<Option<Word>> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Ok(None);
        }
        self.state.regexp = true;
        let result = self.parse_word_in_context(WordContext::Regex);
        self.state.regexp = false;
        self.word_context = WordContext::Cond;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn cond(input: &str) -> Node {
        let mut parser = Parser::new(input, ParserOptions::default());
        match parser.parse_conditional_expr().unwrap() {
            Some(Node::ConditionalExpr { body, .. }) => *body,
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    fn words_of(node: &Node) -> (String, Vec<String>) {
        match node {
            Node::UnaryTest { op, operand } => (op.clone(), vec![operand.value.clone()]),
            Node::BinaryTest { op, left, right } => (op.clone(), vec![left.value.clone(), right.value.clone()]),
            other => panic!("Expected test, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_and_implicit_n() {
        assert_eq!(words_of(&cond("[[ -f /etc/passwd ]]")), ("-f".into(), vec!["/etc/passwd".into()]));
        assert_eq!(words_of(&cond("[[ $x ]]")), ("-n".into(), vec!["$x".into()]));
    }

    #[test]
    fn test_binary_operators() {
        assert_eq!(words_of(&cond("[[ a == b ]]")), ("==".into(), vec!["a".into(), "b".into()]));
        assert_eq!(words_of(&cond("[[ 1 -lt 2 ]]")), ("-lt".into(), vec!["1".into(), "2".into()]));
        assert_eq!(words_of(&cond("[[ a < b ]]")), ("<".into(), vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_regex_keeps_parens() {
        assert_eq!(
            words_of(&cond("[[ $x =~ ^(a|b)$ ]]")),
            ("=~".into(), vec!["$x".into(), "^(a|b)$".into()])
        );
    }

    #[test]
    fn test_extglob_pattern_without_option() {
        assert_eq!(
            words_of(&cond("[[ x == @(a|b) ]]")),
            ("==".into(), vec!["x".into(), "@(a|b)".into()])
        );
        assert_eq!(
            words_of(&cond("[[ $f != *.@(c|h) ]]")),
            ("!=".into(), vec!["$f".into(), "*.@(c|h)".into()])
        );
    }

    #[test]
    fn test_logical_structure() {
        let node = cond("[[ ! -z $a && ( $b || $c ) ]]");
        let Node::CondAnd { left, right } = node else {
            panic!("Expected and");
        };
        assert_eq!(left.kind(), "cond-not");
        let Node::CondParen { inner } = *right else {
            panic!("Expected paren");
        };
        assert_eq!(inner.kind(), "cond-or");
    }

    #[test]
    fn test_newlines_inside() {
        let node = cond("[[ a &&\n b ]]");
        assert_eq!(node.kind(), "cond-and");
    }

    #[test]
    fn test_not_a_conditional() {
        let mut parser = Parser::new("[[x", ParserOptions::default());
        assert!(parser.parse_conditional_expr().unwrap().is_none());
        assert_eq!(parser.pos, 0);
    }

    #[test]
    fn test_errors() {
        let mut parser = Parser::new("[[ a == b", ParserOptions::default());
        let err = parser.parse_conditional_expr().unwrap_err();
        assert!(err.message().contains("Expected ]] to close conditional expression"));

        let mut parser = Parser::new("[[ ]]", ParserOptions::default());
        let err = parser.parse_conditional_expr().unwrap_err();
        assert!(err.message().contains("Unexpected end of conditional expression"));

        let mut parser = Parser::new("[[ -f ]]", ParserOptions::default());
        let err = parser.parse_conditional_expr().unwrap_err();
        assert!(err.message().contains("Expected operand after -f"));
    }
}
