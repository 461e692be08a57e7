//! Command Parser
//!
//! Simple commands, redirections and here-documents, plus the keyword
//! helpers the compound parsers use to look at the next token.
//!
//! Here-document bodies are not part of the redirect that opens them: the
//! redirect registers a pending entry and the body is read once the line
//! ends, then attached to the `HereDoc` node when parsing finishes.

use log::trace;

use crate::ast::types::{Node, Word, AST};
use crate::parser::lexer::TokenType;
use crate::parser::parser::{Parser, PendingHeredoc};
use crate::parser::types::{ParseResult, WordContext, ANSI_C_ESCAPES, ASSIGNMENT_BUILTINS, RESERVED_WORDS};
use crate::parser::word_parser::{
    assignment, count_trailing_backslashes, is_expansion_start, is_metachar, is_quote,
    is_redirect_char, normalize_heredoc_delimiter,
};

/// Words `peek_reserved_word` reports besides the reserved words proper.
const RESERVED_PUNCTUATION: [&str; 6] = ["{", "}", "[[", "]]", "!", "time"];

fn strip_line_continuation(word: &str) -> &str {
    word.strip_suffix("\\\n").unwrap_or(word)
}

/// `{name}` or `{name[sub]}` before a redirection operator.
fn is_valid_varfd(name: &str) -> bool {
    let is_ident = |s: &str| {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
            _ => false,
        }
    };
    if !name.contains('[') && !name.contains(']') {
        return is_ident(name);
    }
    let (Some(left), Some(right)) = (name.find('['), name.rfind(']')) else {
        return false;
    };
    right == name.len() - 1 && right > left + 1 && is_ident(&name[..left])
}

impl Parser {
    // =========================================================================
    // TOKEN HELPERS
    // =========================================================================

    /// The next token is a reserved word (or `{`, `}`, `[[`, `]]`, `!`,
    /// `time`).
    pub(crate) fn peek_reserved_word(&mut self) -> ParseResult<Option<String>> {
        let tok = self.peek_token()?;
        if tok.token_type != TokenType::Word {
            return Ok(None);
        }
        let word = strip_line_continuation(&tok.value);
        if RESERVED_WORDS.contains(word) || RESERVED_PUNCTUATION.contains(&word) {
            return Ok(Some(word.to_string()));
        }
        Ok(None)
    }

    pub(crate) fn is_at_reserved_word(&mut self, word: &str) -> ParseResult<bool> {
        Ok(self.peek_reserved_word()?.as_deref() == Some(word))
    }

    /// Consume the next token if it is the word `expected`.
    pub(crate) fn consume_keyword(&mut self, expected: &str) -> ParseResult<bool> {
        let tok = self.peek_token()?;
        if tok.token_type != TokenType::Word || strip_line_continuation(&tok.value) != expected {
            return Ok(false);
        }
        self.next_token()?;
        Ok(true)
    }

    pub(crate) fn peek_case_terminator(&mut self) -> ParseResult<Option<&'static str>> {
        let terminator = match self.peek_token()?.token_type {
            TokenType::DSemi => Some(";;"),
            TokenType::SemiAnd => Some(";&"),
            TokenType::SemiSemiAnd => Some(";;&"),
            _ => None,
        };
        Ok(terminator)
    }

    pub(crate) fn peek_operator(&mut self) -> ParseResult<Option<TokenType>> {
        let tok = self.peek_token()?;
        Ok(Some(tok.token_type).filter(|t| t.is_operator()))
    }

    fn is_command_terminator(&mut self) -> ParseResult<bool> {
        Ok(matches!(
            self.peek_token()?.token_type,
            TokenType::Eof
                | TokenType::Newline
                | TokenType::Pipe
                | TokenType::Semicolon
                | TokenType::LParen
                | TokenType::RParen
                | TokenType::Amp
        ))
    }

    // =========================================================================
    // WORDS
    // =========================================================================

    /// Read one word token. The flags describe where the word sits and are
    /// part of the lookahead cache key.
    pub(crate) fn parse_word(
        &mut self,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> ParseResult<Option<Word>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        self.at_command_start = at_command_start;
        self.in_array_literal = in_array_literal;
        self.in_assign_builtin = in_assign_builtin;
        let result = self.peek_token().and_then(|tok| {
            if tok.token_type == TokenType::Word {
                self.next_token().map(|tok| tok.word)
            } else {
                Ok(None)
            }
        });
        self.at_command_start = false;
        self.in_array_literal = false;
        self.in_assign_builtin = false;
        result
    }

    pub(crate) fn parse_word_in_context(&mut self, ctx: WordContext) -> ParseResult<Option<Word>> {
        self.word_context = ctx;
        self.parse_word(false, false, false)
    }

    /// Raw text of the next word, stopping at quotes, without consuming it.
    pub(crate) fn peek_raw_word(&mut self) -> String {
        let saved = self.pos;
        self.skip_whitespace();
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_metachar(c) || is_quote(c) {
                break;
            }
            if c == '\\' {
                match self.peek_at(1) {
                    Some('\n') => break,
                    Some(_) => {
                        self.consume_into(&mut word);
                        self.consume_into(&mut word);
                        continue;
                    }
                    None => {}
                }
            }
            self.consume_into(&mut word);
        }
        self.pos = saved;
        word
    }

    /// Consume the raw word `expected` if it is next. Inside a process
    /// substitution a `}` glued to the front of a keyword is skipped too.
    pub(crate) fn consume_raw_word(&mut self, expected: &str) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        let word = self.peek_raw_word();
        let (keyword, leading_brace) = match word.strip_prefix('}') {
            Some(rest) if self.in_process_sub && !rest.is_empty() => (rest, true),
            _ => (word.as_str(), false),
        };
        if keyword != expected {
            self.pos = saved;
            return false;
        }
        if leading_brace {
            self.advance();
        }
        self.pos += expected.chars().count();
        while self.peek() == Some('\\') && self.peek_at(1) == Some('\n') {
            self.pos += 2;
        }
        true
    }

    fn is_assignment_word(word: &Word) -> bool {
        let chars: Vec<char> = word.value.chars().collect();
        assignment(&chars, false).is_some()
    }

    // =========================================================================
    // SIMPLE COMMANDS
    // =========================================================================

    /// Parse words and redirections up to a command terminator. Returns
    /// `None` if neither was found.
    pub(crate) fn parse_command(&mut self) -> ParseResult<Option<Node>> {
        let mut words: Vec<Word> = Vec::new();
        let mut redirects: Vec<Node> = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_command_terminator()? {
                break;
            }
            if words.is_empty() {
                if let Some(reserved) = self.peek_reserved_word()? {
                    if reserved == "}" || reserved == "]]" {
                        break;
                    }
                }
            }
            if let Some(redirect) = self.parse_redirect()? {
                redirects.push(redirect);
                continue;
            }
            let all_assignments = words.iter().all(Self::is_assignment_word);
            let in_assign_builtin = words
                .first()
                .map_or(false, |w| ASSIGNMENT_BUILTINS.contains(w.value.as_str()));
            let at_command_start = words.is_empty() || (all_assignments && redirects.is_empty());
            match self.parse_word(at_command_start, false, in_assign_builtin)? {
                Some(word) => words.push(word),
                None => break,
            }
        }
        if words.is_empty() && redirects.is_empty() {
            return Ok(None);
        }
        Ok(Some(AST::command(words, redirects)))
    }

    /// Redirections trailing a compound command.
    pub(crate) fn collect_redirects(&mut self) -> ParseResult<Vec<Node>> {
        let mut redirects = Vec::new();
        loop {
            self.skip_whitespace();
            match self.parse_redirect()? {
                Some(redirect) => redirects.push(redirect),
                None => return Ok(redirects),
            }
        }
    }

    // =========================================================================
    // REDIRECTIONS
    // =========================================================================

    // `{name}` before an operator; the cursor is left alone unless it matches.
    fn parse_varfd(&mut self) -> Option<String> {
        let saved = self.pos;
        self.advance();
        let mut name = String::new();
        let mut in_bracket = false;
        while let Some(c) = self.peek() {
            if is_redirect_char(c) || (c == '}' && !in_bracket) {
                break;
            }
            let keep = match c {
                '[' => {
                    in_bracket = true;
                    true
                }
                ']' => {
                    in_bracket = false;
                    true
                }
                c if c.is_alphanumeric() || c == '_' => true,
                c => in_bracket && !is_metachar(c),
            };
            if !keep {
                break;
            }
            self.consume_into(&mut name);
        }
        if self.peek() == Some('}') && is_valid_varfd(&name) {
            self.advance();
            return Some(name);
        }
        self.pos = saved;
        None
    }

    /// Parse one redirection (or here-document) at the cursor. Returns
    /// `None` with the cursor unchanged when there is none.
    pub(crate) fn parse_redirect(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let start = self.pos;
        let varfd = if self.peek() == Some('{') { self.parse_varfd() } else { None };
        let mut fd: Option<String> = None;
        if varfd.is_none() && self.peek().map_or(false, |c| c.is_ascii_digit()) {
            let mut digits = String::new();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.consume_into(&mut digits);
            }
            fd = Some(digits);
        }
        let has_fd = fd.is_some() || varfd.is_some();

        if self.peek() == Some('&') && self.peek_at(1) == Some('>') {
            if has_fd {
                self.pos = start;
                return Ok(None);
            }
            self.pos += 2;
            let op = if self.peek() == Some('>') {
                self.advance();
                "&>>"
            } else {
                "&>"
            };
            self.skip_whitespace();
            return match self.parse_word(false, false, false)? {
                Some(target) => Ok(Some(AST::redirect(op, target))),
                None => Err(self.error(format!("Expected target for redirect {}", op), self.pos)),
            };
        }

        let Some(first) = self.peek().filter(|&c| is_redirect_char(c)) else {
            self.pos = start;
            return Ok(None);
        };
        if fd.is_none() && self.peek_at(1) == Some('(') {
            // `<(` / `>(` is a process substitution word
            self.pos = start;
            return Ok(None);
        }
        self.advance();
        let mut op = first.to_string();
        let mut strip_tabs = false;
        let dup_allowed = |next: Option<char>| !matches!(next, Some(c) if c.is_ascii_digit() || c == '-');
        match (first, self.peek()) {
            ('>', Some('>')) => {
                self.advance();
                op = ">>".into();
            }
            ('<', Some('<')) => {
                self.advance();
                match self.peek() {
                    Some('<') => {
                        self.advance();
                        op = "<<<".into();
                    }
                    Some('-') => {
                        self.advance();
                        op = "<<".into();
                        strip_tabs = true;
                    }
                    _ => op = "<<".into(),
                }
            }
            ('<', Some('>')) => {
                self.advance();
                op = "<>".into();
            }
            ('>', Some('|')) => {
                self.advance();
                op = ">|".into();
            }
            (_, Some('&')) if !has_fd && dup_allowed(self.peek_at(1)) => {
                self.advance();
                op.push('&');
            }
            _ => {}
        }

        if op == "<<" {
            let fd_num = fd.as_deref().and_then(|d| d.parse().ok());
            return self.parse_heredoc(fd_num, strip_tabs).map(Some);
        }
        if let Some(name) = &varfd {
            op = format!("{{{}}}{}", name, op);
        } else if let Some(digits) = &fd {
            op = format!("{}{}", digits, op);
        }

        let target = if self.peek() == Some('&') {
            self.advance();
            self.skip_whitespace();
            self.parse_dup_target(&op)?
        } else {
            self.skip_whitespace();
            let closes_fd = (op == ">&" || op == "<&")
                && self.peek() == Some('-')
                && self.peek_at(1).map_or(false, |c| !is_metachar(c));
            if closes_fd {
                self.advance();
                Some(Word::new("&-", vec![]))
            } else {
                self.parse_word(false, false, false)?
            }
        };
        match target {
            Some(target) => Ok(Some(AST::redirect(op, target))),
            None => Err(self.error(format!("Expected target for redirect {}", op), self.pos)),
        }
    }

    // Target after `N>&` / `N<&`: a descriptor, `-`, or a word.
    fn parse_dup_target(&mut self, op: &str) -> ParseResult<Option<Word>> {
        if self.peek() == Some('-') && self.peek_at(1).map_or(false, |c| !is_metachar(c)) {
            self.advance();
            return Ok(Some(Word::new("&-", vec![])));
        }
        if self.peek().map_or(false, |c| c.is_ascii_digit() || c == '-') {
            let word_start = self.pos;
            let mut fd_target = String::new();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.consume_into(&mut fd_target);
            }
            if self.peek() == Some('-') {
                self.consume_into(&mut fd_target);
            }
            if fd_target == "-" || self.peek().map_or(true, is_metachar) {
                return Ok(Some(Word::new(format!("&{}", fd_target), vec![])));
            }
            self.pos = word_start;
        }
        match self.parse_word(false, false, false)? {
            Some(inner) => Ok(Some(Word::new(format!("&{}", inner.value), inner.parts))),
            None => Err(self.error(format!("Expected target for redirect {}", op), self.pos)),
        }
    }

    // =========================================================================
    // HERE-DOCUMENTS
    // =========================================================================

    fn parse_heredoc(&mut self, fd: Option<u32>, strip_tabs: bool) -> ParseResult<Node> {
        let start_pos = self.pos;
        self.state.heredoc = true;
        let (delimiter, quoted) = self.parse_heredoc_delimiter();
        self.state.heredoc = false;

        // A retried parse meets the same redirect again
        if let Some(existing) = self
            .pending_heredocs
            .iter()
            .find(|h| h.start_pos == start_pos && h.delimiter == delimiter)
        {
            return Ok(Node::HereDoc(AST::heredoc(
                existing.delimiter.clone(),
                existing.strip_tabs,
                existing.quoted,
                fd,
                start_pos,
                existing.id,
            )));
        }
        let id = self.next_heredoc_id;
        self.next_heredoc_id += 1;
        trace!("heredoc #{} delimiter {:?} quoted={}", id, delimiter, quoted);
        self.pending_heredocs.push(PendingHeredoc {
            id,
            delimiter: delimiter.clone(),
            strip_tabs,
            quoted,
            start_pos,
        });
        Ok(Node::HereDoc(AST::heredoc(delimiter, strip_tabs, quoted, fd, start_pos, id)))
    }

    /// Read a here-document delimiter word, removing quoting. Returns the
    /// delimiter and whether any part of it was quoted.
    fn parse_heredoc_delimiter(&mut self) -> (String, bool) {
        self.skip_whitespace();
        let mut quoted = false;
        let mut delimiter = String::new();
        loop {
            while let Some(ch) = self.peek().filter(|&c| !is_metachar(c)) {
                match ch {
                    '"' => {
                        quoted = true;
                        self.advance();
                        while self.peek().map_or(false, |c| c != '"') {
                            self.consume_into(&mut delimiter);
                        }
                        self.advance();
                    }
                    '\'' => {
                        quoted = true;
                        self.advance();
                        while let Some(c) = self.peek().filter(|&c| c != '\'') {
                            if c == '\n' {
                                self.saw_newline_in_single_quote = true;
                            }
                            self.consume_into(&mut delimiter);
                        }
                        self.advance();
                    }
                    '\\' => {
                        self.advance();
                        match self.peek() {
                            Some('\n') => {
                                self.advance();
                            }
                            Some(_) => {
                                quoted = true;
                                self.consume_into(&mut delimiter);
                            }
                            None => {}
                        }
                    }
                    '$' if self.peek_at(1) == Some('\'') => {
                        quoted = true;
                        self.pos += 2;
                        self.read_ansi_c_delimiter(&mut delimiter);
                    }
                    _ if is_expansion_start(&self.src, self.pos, "$(") => {
                        self.consume_into(&mut delimiter);
                        self.consume_into(&mut delimiter);
                        self.copy_balanced(&mut delimiter, '(', ')', 1);
                    }
                    '$' if matches!(self.peek_at(1), Some('{' | '[')) => {
                        if self.dollar_is_escaped() {
                            self.consume_into(&mut delimiter);
                        } else if self.peek_at(1) == Some('{') {
                            self.consume_into(&mut delimiter);
                            self.consume_into(&mut delimiter);
                            self.copy_braced_delimiter(&mut delimiter);
                        } else {
                            self.consume_into(&mut delimiter);
                            self.consume_into(&mut delimiter);
                            self.copy_balanced(&mut delimiter, '[', ']', 1);
                        }
                    }
                    '`' => self.copy_backtick_delimiter(&mut delimiter),
                    _ => self.consume_into(&mut delimiter),
                }
            }
            let procsub_follows = matches!(self.peek(), Some('<' | '>')) && self.peek_at(1) == Some('(');
            if !procsub_follows {
                break;
            }
            self.consume_into(&mut delimiter);
            self.consume_into(&mut delimiter);
            self.copy_balanced(&mut delimiter, '(', ')', 1);
        }
        (delimiter, quoted)
    }

    fn read_ansi_c_delimiter(&mut self, delimiter: &mut String) {
        while let Some(c) = self.peek().filter(|&c| c != '\'') {
            if c == '\\' && self.peek_at(1).is_some() {
                self.advance();
                let escaped = self.peek();
                match escaped.and_then(|e| ANSI_C_ESCAPES.get(&e)) {
                    Some(&byte) => {
                        delimiter.push(byte as char);
                        self.advance();
                    }
                    None => self.consume_into(delimiter),
                }
            } else {
                self.consume_into(delimiter);
            }
        }
        self.advance();
    }

    // Odd number of `$` before the cursor (one escaped by a backslash
    // doesn't count) means this `$` is literal.
    fn dollar_is_escaped(&self) -> bool {
        let mut count: isize = 0;
        let mut j = self.pos;
        while j > 0 && self.src[j - 1] == '$' {
            count += 1;
            j -= 1;
        }
        if j > 0 && self.src[j - 1] == '\\' {
            count -= 1;
        }
        count.rem_euclid(2) == 1
    }

    fn copy_balanced(&mut self, out: &mut String, open: char, close: char, mut depth: usize) {
        while let Some(c) = self.peek() {
            if depth == 0 {
                break;
            }
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
            }
            self.consume_into(out);
        }
    }

    fn copy_braced_delimiter(&mut self, out: &mut String) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                self.consume_into(out);
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 && self.peek().map_or(false, is_metachar) {
                    break;
                }
                continue;
            }
            self.consume_into(out);
        }
    }

    fn copy_backtick_delimiter(&mut self, out: &mut String) {
        self.consume_into(out);
        while let Some(c) = self.peek().filter(|&c| c != '`') {
            match c {
                '\'' => {
                    self.consume_into(out);
                    while self.peek().map_or(false, |c| c != '\'' && c != '`') {
                        self.consume_into(out);
                    }
                    if self.peek() == Some('\'') {
                        self.consume_into(out);
                    }
                }
                '"' => {
                    self.consume_into(out);
                    while self.peek().map_or(false, |c| c != '"' && c != '`') {
                        if self.peek() == Some('\\') && self.peek_at(1).is_some() {
                            self.consume_into(out);
                        }
                        self.consume_into(out);
                    }
                    if self.peek() == Some('"') {
                        self.consume_into(out);
                    }
                }
                '\\' if self.peek_at(1).is_some() => {
                    self.consume_into(out);
                    self.consume_into(out);
                }
                _ => self.consume_into(out),
            }
        }
        if !self.at_end() {
            self.consume_into(out);
        }
    }

    /// One body line starting at the cursor. Unquoted bodies join lines
    /// ending in an odd number of backslashes. Returns the line and the
    /// offset of its terminating newline (or end of input).
    fn read_heredoc_line(&self, quoted: bool) -> (String, usize) {
        let line_end_from = |mut i: usize| {
            while i < self.src.len() && self.src[i] != '\n' {
                i += 1;
            }
            i
        };
        let mut line_end = line_end_from(self.pos);
        let mut line = self.slice(self.pos, line_end);
        if !quoted {
            while line_end < self.src.len() && count_trailing_backslashes(&line) % 2 == 1 {
                line.pop();
                let next_start = line_end + 1;
                line_end = line_end_from(next_start);
                line.push_str(&self.slice(next_start, line_end));
            }
        }
        (line, line_end)
    }

    /// Read the bodies of all pending here-documents, in order, starting at
    /// the cursor (just past the newline that ended the redirecting line).
    pub(crate) fn gather_heredoc_bodies(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let delimiter = normalize_heredoc_delimiter(&heredoc.delimiter);
            let delimiter_len = heredoc.delimiter.chars().count();
            let mut content = String::new();
            while self.pos < self.src.len() {
                let line_start = self.pos;
                let (line, line_end) = self.read_heredoc_line(heredoc.quoted);
                let check_line = if heredoc.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                let normalized = normalize_heredoc_delimiter(check_line);
                if normalized == delimiter {
                    self.pos = if line_end < self.src.len() { line_end + 1 } else { line_end };
                    break;
                }
                // `$(cat <<EOF\n...\nEOF)`: the delimiter runs into the closer
                let at_closer = normalized.starts_with(&delimiter)
                    && (self.eof_token == Some(')') || (line_end >= self.src.len() && self.in_process_sub));
                if at_closer {
                    let tabs = line.chars().count() - check_line.chars().count();
                    self.pos = line_start + tabs + delimiter_len;
                    break;
                }
                content.push_str(check_line);
                if line_end < self.src.len() {
                    content.push('\n');
                    self.pos = line_end + 1;
                } else {
                    if heredoc.quoted || count_trailing_backslashes(&line) % 2 == 0 {
                        content.push('\n');
                    }
                    self.pos = self.src.len();
                }
            }
            trace!("heredoc #{} body {} chars", heredoc.id, content.chars().count());
            self.heredoc_bodies.insert(heredoc.id, content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn redirect(input: &str) -> Node {
        let mut parser = Parser::new(input, ParserOptions::default());
        parser.parse_redirect().unwrap().unwrap()
    }

    fn op_and_target(node: &Node) -> (String, String) {
        match node {
            Node::Redirect { op, target } => (op.clone(), target.value.clone()),
            other => panic!("Expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_redirect_operators() {
        assert_eq!(op_and_target(&redirect("> out")), (">".into(), "out".into()));
        assert_eq!(op_and_target(&redirect(">>log")), (">>".into(), "log".into()));
        assert_eq!(op_and_target(&redirect("2>/dev/null")), ("2>".into(), "/dev/null".into()));
        assert_eq!(op_and_target(&redirect("&> all")), ("&>".into(), "all".into()));
        assert_eq!(op_and_target(&redirect("<<< word")), ("<<<".into(), "word".into()));
        assert_eq!(op_and_target(&redirect(">| f")), (">|".into(), "f".into()));
    }

    #[test]
    fn test_fd_duplication() {
        assert_eq!(op_and_target(&redirect("2>&1")), ("2>".into(), "&1".into()));
        assert_eq!(op_and_target(&redirect(">&2")), (">".into(), "&2".into()));
        assert_eq!(op_and_target(&redirect("3<&-")), ("3<".into(), "&-".into()));
        assert_eq!(op_and_target(&redirect(">&file")), (">&".into(), "file".into()));
    }

    #[test]
    fn test_varfd() {
        assert_eq!(op_and_target(&redirect("{fd}>out")), ("{fd}>".into(), "out".into()));
        let mut parser = Parser::new("{1x}>out", ParserOptions::default());
        assert!(parser.parse_redirect().unwrap().is_none());
        assert_eq!(parser.pos, 0);
    }

    #[test]
    fn test_not_a_redirect() {
        let mut parser = Parser::new("<(cmd)", ParserOptions::default());
        assert!(parser.parse_redirect().unwrap().is_none());
        let mut parser = Parser::new("word", ParserOptions::default());
        assert!(parser.parse_redirect().unwrap().is_none());
        assert_eq!(parser.pos, 0);
    }

    #[test]
    fn test_missing_target() {
        let mut parser = Parser::new(">", ParserOptions::default());
        let err = parser.parse_redirect().unwrap_err();
        assert!(err.message().contains("Expected target for redirect >"));
    }

    #[test]
    fn test_heredoc_delimiter_quoting() {
        let mut parser = Parser::new("'EOF'", ParserOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("EOF".into(), true));
        let mut parser = Parser::new("E\"O\"F rest", ParserOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("EOF".into(), true));
        let mut parser = Parser::new("END;", ParserOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("END".into(), false));
        assert_eq!(parser.pos, 3);
    }

    #[test]
    fn test_gather_heredoc_body() {
        let mut parser = Parser::new("<<-EOF\n\tline one\n\tEOF\nnext", ParserOptions::default());
        let Node::HereDoc(doc) = parser.parse_redirect().unwrap().unwrap() else {
            panic!("Expected heredoc");
        };
        assert!(doc.strip_tabs);
        parser.pos += 1;
        parser.gather_heredoc_bodies();
        assert_eq!(parser.heredoc_bodies.get(&doc.id).map(String::as_str), Some("line one\n"));
        assert_eq!(parser.slice(parser.pos, parser.src.len()), "next");
        assert!(parser.pending_heredocs.is_empty());
    }

    #[test]
    fn test_heredoc_line_continuation() {
        let mut parser = Parser::new("<<EOF\na\\\nb\nEOF\n", ParserOptions::default());
        let Node::HereDoc(doc) = parser.parse_redirect().unwrap().unwrap() else {
            panic!("Expected heredoc");
        };
        parser.pos += 1;
        parser.gather_heredoc_bodies();
        assert_eq!(parser.heredoc_bodies[&doc.id], "ab\n");
    }

    #[test]
    fn test_parse_command_words_and_redirects() {
        let mut parser = Parser::new("FOO=1 echo hi >out; next", ParserOptions::default());
        let Some(Node::Command { words, redirects }) = parser.parse_command().unwrap() else {
            panic!("Expected command");
        };
        let values: Vec<&str> = words.iter().map(|w| w.value.as_str()).collect();
        assert_eq!(values, vec!["FOO=1", "echo", "hi"]);
        assert_eq!(redirects.len(), 1);
        assert_eq!(parser.peek(), Some(';'));
    }

    #[test]
    fn test_peek_and_consume_raw_word() {
        let mut parser = Parser::new("  name rest", ParserOptions::default());
        assert_eq!(parser.peek_raw_word(), "name");
        assert_eq!(parser.pos, 0);
        assert!(!parser.consume_raw_word("nam"));
        assert!(parser.consume_raw_word("name"));
        assert_eq!(parser.pos, 6);
    }
}
