//! Expansion Parsing
//!
//! Handles the `$` family inside words: parameter expansion in all its
//! braced and unbraced forms, dispatch to arithmetic and command
//! substitution, `$[...]`, ANSI-C `$'...'` and locale `$"..."` strings, and
//! double-quoted spans outside command words.

use crate::ast::types::{Node, AST};
use crate::parser::parser::Parser;
use crate::parser::quote_state::QuoteState;
use crate::parser::types::{DolbraceState, MatchedPairFlags, ParseResult};
use crate::parser::word_parser::{
    count_consecutive_dollars_before, is_escape_in_backtick, is_expansion_start,
    is_funsub_char, is_simple_param_op, is_special_param, is_special_param_unbraced,
};

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Parser {
    /// Parse whatever `$` starts at the cursor, appending its source text to
    /// `chars` and its node to `parts`. Returns false, consuming nothing,
    /// when the `$` is literal.
    pub(crate) fn parse_dollar_expansion(&mut self, chars: &mut String, parts: &mut Vec<Node>) -> ParseResult<bool> {
        let in_dquote = self.ctx.current().quote.double;
        let found = match (self.peek_at(1), self.peek_at(2)) {
            (Some('('), Some('(')) => match self.parse_arithmetic_expansion()? {
                Some(found) => Some(found),
                None => self.parse_command_substitution()?,
            },
            (Some('['), _) => self.parse_deprecated_arithmetic()?,
            (Some('('), _) => self.parse_command_substitution()?,
            _ => self.read_param_expansion(in_dquote)?,
        };
        match found {
            Some((node, text)) => {
                parts.push(node);
                chars.push_str(&text);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Scan the rest of a double-quoted string (opening quote consumed),
    /// expanding `$` forms. With `handle_line_continuation`, `\<newline>`
    /// is removed.
    pub(crate) fn scan_double_quote(
        &mut self,
        chars: &mut String,
        parts: &mut Vec<Node>,
        start: usize,
        handle_line_continuation: bool,
    ) -> ParseResult<()> {
        chars.push('"');
        self.in_double_quotes(|p| {
            while let Some(c) = p.peek() {
                if c == '"' {
                    break;
                }
                if c == '\\' && p.peek_at(1).is_some() {
                    if handle_line_continuation && p.peek_at(1) == Some('\n') {
                        p.pos += 2;
                    } else {
                        p.consume_into(chars);
                        p.consume_into(chars);
                    }
                } else if c == '$' {
                    if !p.parse_dollar_expansion(chars, parts)? {
                        p.consume_into(chars);
                    }
                } else {
                    p.consume_into(chars);
                }
            }
            Ok(())
        })?;
        if self.at_end() {
            return Err(self.error("Unterminated double quote", start));
        }
        self.consume_into(chars);
        Ok(())
    }

    /// Run `scan` with the current context marked double-quoted; the outer
    /// quote state comes back afterwards whatever `scan` returns.
    pub(crate) fn in_double_quotes<T>(
        &mut self,
        scan: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let quote = &mut self.ctx.current_mut().quote;
        quote.push();
        quote.double = true;
        let result = scan(self);
        self.ctx.current_mut().quote.pop();
        result
    }

    /// `$[expr]`, the obsolete arithmetic form. The body is kept as text.
    pub(crate) fn parse_deprecated_arithmetic(&mut self) -> ParseResult<Option<(Node, String)>> {
        if !self.starts_with("$[") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let content = self.parse_matched_pair(start, '[', ']', MatchedPairFlags::ARITH, false)?;
        let text = self.slice(start, self.pos);
        Ok(Some((Node::ArithDeprecated { expression: content }, text)))
    }

    // =========================================================================
    // PARAMETER EXPANSION
    // =========================================================================

    /// `$name`, `$1`, `$?` or `${...}` at the cursor.
    pub(crate) fn read_param_expansion(&mut self, in_dquote: bool) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('$') {
            return Ok(None);
        }
        let start = self.pos;
        self.advance();
        let Some(ch) = self.peek() else {
            self.pos = start;
            return Ok(None);
        };
        if ch == '{' {
            self.advance();
            return self.read_braced_param(start, in_dquote).map(Some);
        }
        if is_special_param_unbraced(ch) || ch.is_ascii_digit() || ch == '#' {
            self.advance();
            let text = self.slice(start, self.pos);
            return Ok(Some((AST::param(ch.to_string(), None, None), text)));
        }
        if is_name_start(ch) {
            let name_start = self.pos;
            while self.peek().map_or(false, is_name_char) {
                self.advance();
            }
            let name = self.slice(name_start, self.pos);
            let text = self.slice(start, self.pos);
            return Ok(Some((AST::param(name, None, None), text)));
        }
        self.pos = start;
        Ok(None)
    }

    // The cursor is just past `${`; `start` is the offset of the `$`.
    fn read_braced_param(&mut self, start: usize, in_dquote: bool) -> ParseResult<(Node, String)> {
        let Some(ch) = self.peek() else {
            return Err(self.matched_pair_error("unexpected EOF looking for `}'", start));
        };
        if is_funsub_char(ch) {
            return self.parse_funsub(start);
        }
        let saved_dolbrace = self.dolbrace;
        self.dolbrace = DolbraceState::Param;
        let result = self.read_braced_param_body(start, in_dquote, ch);
        self.dolbrace = saved_dolbrace;
        result
    }

    fn read_braced_param_body(&mut self, start: usize, in_dquote: bool, ch: char) -> ParseResult<(Node, String)> {
        // ${#name}
        if ch == '#' {
            self.advance();
            let param = self.consume_param_name()?;
            if !param.is_empty() && self.peek() == Some('}') {
                self.advance();
                let text = self.slice(start, self.pos);
                return Ok((Node::ParamLength { param }, text));
            }
            self.pos = start + 2;
        }

        // ${!name}, ${!prefix*}, ${!name op arg}
        if ch == '!' {
            self.advance();
            self.skip_blanks();
            let param = self.consume_param_name()?;
            if !param.is_empty() {
                self.skip_blanks();
                match self.peek() {
                    Some('}') => {
                        self.advance();
                        let text = self.slice(start, self.pos);
                        return Ok((indirect(param, None, None), text));
                    }
                    Some(suffix @ ('@' | '*')) => {
                        self.advance();
                        let trailing = self.parse_matched_pair(start, '{', '}', MatchedPairFlags::DOLBRACE, false)?;
                        let text = self.slice(start, self.pos);
                        return Ok((indirect(format!("{}{}{}", param, suffix, trailing), None, None), text));
                    }
                    _ => {}
                }
                let mut op = self.consume_param_operator();
                if op.is_empty() {
                    if let Some(c) = self.peek().filter(|c| !"}\"'`".contains(*c)) {
                        self.advance();
                        op.push(c);
                    }
                }
                if !op.is_empty() && !"\"'`".contains(op.as_str()) {
                    let arg = self.parse_matched_pair(start, '{', '}', MatchedPairFlags::DOLBRACE, false)?;
                    let text = self.slice(start, self.pos);
                    return Ok((indirect(param, Some(op), Some(arg)), text));
                }
                if self.at_end() {
                    return Err(self.matched_pair_error("unexpected EOF looking for `}'", start));
                }
            }
            self.pos = start + 2;
        }

        let param = self.consume_param_name()?;
        if param.is_empty() {
            let op_follows = match (self.peek(), self.peek_at(1)) {
                (Some('-' | '=' | '+' | '?'), _) => true,
                (Some(':'), Some(next)) => is_simple_param_op(next),
                _ => false,
            };
            if !op_follows {
                let content = self.parse_matched_pair(start, '{', '}', MatchedPairFlags::DOLBRACE, false)?;
                let text = format!("${{{}}}", content);
                return Ok((AST::param(content, None, None), text));
            }
        }
        match self.peek() {
            None => return Err(self.matched_pair_error("unexpected EOF looking for `}'", start)),
            Some('}') => {
                self.advance();
                let text = self.slice(start, self.pos);
                return Ok((AST::param(param, None, None), text));
            }
            Some(_) => {}
        }

        let mut op = self.consume_param_operator();
        if op.is_empty() {
            op = self.read_fallback_param_operator()?;
        }
        self.update_dolbrace_for_op(&op, !param.is_empty());

        let flags = if in_dquote { MatchedPairFlags::DQUOTE } else { MatchedPairFlags::NONE };
        let arg = self.parse_matched_pair(start, '{', '}', flags | MatchedPairFlags::DOLBRACE, param.ends_with('$'))?;
        let text = format!("${{{}{}{}}}", param, op, arg);
        Ok((AST::param(param, Some(op), Some(arg)), text))
    }

    // Operator position holds something other than a known operator.
    fn read_fallback_param_operator(&mut self) -> ParseResult<String> {
        let Some(c) = self.peek() else {
            return Ok(String::new());
        };
        let next = self.peek_at(1);
        if c == '$' && matches!(next, Some('"' | '\'')) {
            let dollars = 1 + count_consecutive_dollars_before(&self.src, self.pos);
            if dollars % 2 == 1 {
                return Ok(String::new());
            }
            self.advance();
            return Ok(c.to_string());
        }
        if c == '`' {
            let backtick_pos = self.pos;
            self.advance();
            while let Some(bc) = self.peek() {
                if bc == '`' {
                    break;
                }
                if bc == '\\' && self.peek_at(1).map_or(false, is_escape_in_backtick) {
                    self.advance();
                }
                self.advance();
            }
            if self.at_end() {
                return Err(self.error("Unterminated backtick", backtick_pos));
            }
            self.advance();
            return Ok("`".to_string());
        }
        if (c == '$' && next == Some('{')) || c == '\'' || c == '"' {
            return Ok(String::new());
        }
        let mut op = String::new();
        if let Some(first) = self.advance() {
            op.push(first);
        }
        if c == '\\' {
            if let Some(escaped) = self.advance() {
                op.push(escaped);
            }
        }
        Ok(op)
    }

    fn update_dolbrace_for_op(&mut self, op: &str, has_param: bool) {
        if self.dolbrace == DolbraceState::None {
            return;
        }
        let Some(first) = op.chars().next() else {
            return;
        };
        if self.dolbrace == DolbraceState::Param && has_param {
            if "%#^,".contains(first) {
                self.dolbrace = DolbraceState::Quote;
                return;
            }
            if first == '/' {
                self.dolbrace = DolbraceState::Quote2;
                return;
            }
        }
        if self.dolbrace == DolbraceState::Param && "#%^,~:-=?+/".contains(first) {
            self.dolbrace = DolbraceState::Op;
        }
    }

    /// Longest parameter operator at the cursor, or "" if none.
    fn consume_param_operator(&mut self) -> String {
        let Some(ch) = self.peek() else {
            return String::new();
        };
        let doubled = |c: char| -> &'static [char] {
            match c {
                '#' => &['#'],
                '%' => &['%'],
                '^' => &['^'],
                ',' => &[','],
                '/' => &['/', '#', '%'],
                _ => &[],
            }
        };
        if ch == ':' {
            self.advance();
            return match self.peek() {
                Some(next) if is_simple_param_op(next) => {
                    self.advance();
                    format!(":{}", next)
                }
                _ => ":".to_string(),
            };
        }
        if is_simple_param_op(ch) || ch == '@' {
            self.advance();
            return ch.to_string();
        }
        let followers = doubled(ch);
        if followers.is_empty() {
            return String::new();
        }
        self.advance();
        let mut op = ch.to_string();
        if let Some(next) = self.peek().filter(|c| followers.contains(c)) {
            self.advance();
            op.push(next);
        }
        op
    }

    // A `[` in a parameter name has its `]` before the closing `}`.
    fn param_subscript_has_close(&self, start: usize) -> bool {
        let src = &self.src;
        let mut depth = 1usize;
        let mut i = start + 1;
        let mut quote = QuoteState::new();
        while i < src.len() {
            let c = src[i];
            if quote.single {
                if c == '\'' {
                    quote.single = false;
                }
                i += 1;
                continue;
            }
            if quote.double {
                if c == '\\' && i + 1 < src.len() {
                    i += 2;
                    continue;
                }
                if c == '"' {
                    quote.double = false;
                }
                i += 1;
                continue;
            }
            match c {
                '\'' => quote.single = true,
                '"' => quote.double = true,
                '\\' => {
                    i += 2;
                    continue;
                }
                '}' => return false,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn consume_param_name(&mut self) -> ParseResult<String> {
        let Some(ch) = self.peek() else {
            return Ok(String::new());
        };
        if is_special_param(ch) {
            if ch == '$' && matches!(self.peek_at(1), Some('{' | '\'' | '"')) {
                return Ok(String::new());
            }
            self.advance();
            return Ok(ch.to_string());
        }
        if ch.is_ascii_digit() {
            let start = self.pos;
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
            return Ok(self.slice(start, self.pos));
        }
        if !is_name_start(ch) {
            return Ok(String::new());
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                self.consume_into(&mut name);
            } else if c == '[' {
                if !self.param_subscript_has_close(self.pos) {
                    break;
                }
                let open_pos = self.pos;
                self.consume_into(&mut name);
                let content = self.parse_matched_pair(open_pos, '[', ']', MatchedPairFlags::ARRAYSUB, false)?;
                name.push_str(&content);
                name.push(']');
                break;
            } else {
                break;
            }
        }
        Ok(name)
    }

    // =========================================================================
    // QUOTED STRINGS
    // =========================================================================

    /// `$'...'` with backslash escapes kept verbatim in the content.
    pub(crate) fn read_ansi_c_quote(&mut self) -> ParseResult<Option<(Node, String)>> {
        if !self.starts_with("$'") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let mut content = String::new();
        let mut closed = false;
        while let Some(ch) = self.peek() {
            if ch == '\'' {
                self.advance();
                closed = true;
                break;
            }
            self.consume_into(&mut content);
            if ch == '\\' && !self.at_end() {
                self.consume_into(&mut content);
            }
        }
        if !closed {
            return Err(self.matched_pair_error("unexpected EOF while looking for matching `''", start));
        }
        let text = self.slice(start, self.pos);
        Ok(Some((Node::AnsiCQuote { content }, text)))
    }

    /// `$"..."`. Returns the node, its text, and the expansions found inside.
    /// An unterminated string leaves the cursor unchanged.
    pub(crate) fn read_locale_string(&mut self) -> ParseResult<Option<(Node, String, Vec<Node>)>> {
        if !self.starts_with("$\"") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let mut content = String::new();
        let mut inner = Vec::new();
        let mut closed = false;
        while let Some(ch) = self.peek() {
            if ch == '"' {
                self.advance();
                closed = true;
                break;
            }
            if ch == '\\' && self.peek_at(1).is_some() {
                if self.peek_at(1) == Some('\n') {
                    self.pos += 2;
                } else {
                    self.consume_into(&mut content);
                    self.consume_into(&mut content);
                }
                continue;
            }
            let found = if ch == '$' && self.peek_at(1) == Some('(') && self.peek_at(2) == Some('(') {
                match self.parse_arithmetic_expansion()? {
                    Some(found) => Some(found),
                    None => self.parse_command_substitution()?,
                }
            } else if is_expansion_start(&self.src, self.pos, "$(") {
                self.parse_command_substitution()?
            } else if ch == '$' {
                self.read_param_expansion(false)?
            } else if ch == '`' {
                self.parse_backtick_substitution()?
            } else {
                self.consume_into(&mut content);
                continue;
            };
            match found {
                Some((node, text)) => {
                    inner.push(node);
                    content.push_str(&text);
                }
                None => self.consume_into(&mut content),
            }
        }
        if !closed {
            self.pos = start;
            return Ok(None);
        }
        let text = format!("$\"{}\"", content);
        Ok(Some((Node::LocaleString { content }, text, inner)))
    }
}

fn indirect(param: String, op: Option<String>, arg: Option<String>) -> Node {
    Node::ParamIndirect { param, op, arg }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn read_param(input: &str) -> (Node, String, usize) {
        let mut parser = Parser::new(input, ParserOptions::default());
        let (node, text) = parser.read_param_expansion(false).unwrap().unwrap();
        (node, text, parser.pos)
    }

    #[test]
    fn test_simple_params() {
        let (node, text, pos) = read_param("$HOME/bin");
        assert_eq!(node, AST::param("HOME", None, None));
        assert_eq!(text, "$HOME");
        assert_eq!(pos, 5);
        let (node, text, _) = read_param("$10");
        assert_eq!(node, AST::param("1", None, None));
        assert_eq!(text, "$1");
        let (node, _, _) = read_param("$?");
        assert_eq!(node, AST::param("?", None, None));
    }

    #[test]
    fn test_braced_with_operator() {
        let (node, text, _) = read_param("${x:-default value}");
        assert_eq!(node, AST::param("x", Some(":-".into()), Some("default value".into())));
        assert_eq!(text, "${x:-default value}");
        let (node, _, _) = read_param("${path##*/}");
        assert_eq!(node, AST::param("path", Some("##".into()), Some("*/".into())));
        let (node, _, _) = read_param("${s//a/b}");
        assert_eq!(node, AST::param("s", Some("//".into()), Some("a/b".into())));
    }

    #[test]
    fn test_length_and_indirect() {
        let (node, _, _) = read_param("${#arr[@]}");
        assert_eq!(node, Node::ParamLength { param: "arr[@]".into() });
        let (node, _, _) = read_param("${!ref}");
        assert_eq!(node, indirect("ref".into(), None, None));
        let (node, _, _) = read_param("${!prefix*}");
        assert_eq!(node, indirect("prefix*".into(), None, None));
    }

    #[test]
    fn test_nested_braces_in_argument() {
        let (node, text, _) = read_param("${a:-${b:-c}}");
        assert_eq!(node, AST::param("a", Some(":-".into()), Some("${b:-c}".into())));
        assert_eq!(text, "${a:-${b:-c}}");
    }

    #[test]
    fn test_unterminated_brace() {
        let mut parser = Parser::new("${x:-abc", ParserOptions::default());
        let err = parser.read_param_expansion(false).unwrap_err();
        assert!(err.is_matched_pair());
    }

    #[test]
    fn test_literal_dollar() {
        let mut parser = Parser::new("$ x", ParserOptions::default());
        assert!(parser.read_param_expansion(false).unwrap().is_none());
        assert_eq!(parser.pos, 0);
    }

    #[test]
    fn test_ansi_c_and_locale() {
        let mut parser = Parser::new("$'a\\'b' rest", ParserOptions::default());
        let (node, text) = parser.read_ansi_c_quote().unwrap().unwrap();
        assert_eq!(node, Node::AnsiCQuote { content: "a\\'b".into() });
        assert_eq!(text, "$'a\\'b'");

        let mut parser = Parser::new("$\"hi $USER\"", ParserOptions::default());
        let (node, text, inner) = parser.read_locale_string().unwrap().unwrap();
        assert_eq!(node, Node::LocaleString { content: "hi $USER".into() });
        assert_eq!(text, "$\"hi $USER\"");
        assert_eq!(inner, vec![AST::param("USER", None, None)]);
    }

    #[test]
    fn test_deprecated_arithmetic() {
        let mut parser = Parser::new("$[1+2]", ParserOptions::default());
        let (node, text) = parser.parse_deprecated_arithmetic().unwrap().unwrap();
        assert_eq!(node, Node::ArithDeprecated { expression: "1+2".into() });
        assert_eq!(text, "$[1+2]");
    }
}
