//! Recursive Descent Parser for Bash Scripts
//!
//! The parser reads characters directly and pulls tokens from the lexer on
//! demand, so the same cursor serves both the token grammar and the
//! character-level scanners for quotes, expansions and here-documents.
//!
//! Grammar (simplified):
//!   script       ::= list (newline list)*
//!   list         ::= pipeline ((&& | '||' | ; | & | newline) pipeline)*
//!   pipeline     ::= [time [-p]] [!] command ((| | |&) command)*
//!   command      ::= simple_command | compound_command | function_def
//!   simple_cmd   ::= (word | redirection)+
//!   compound_cmd ::= if | for | select | while | until | case | coproc
//!                  | ( list ) | { list; } | (( expr )) | [[ expr ]]
//!
//! The operator-specific grammars live in sibling modules as further
//! `impl Parser` blocks.

use std::collections::HashMap;

use log::{debug, trace};

use crate::ast::types::{Node, Word, AST};
use crate::parser::lexer::{TokenCache, TokenType};
use crate::parser::quote_state::{ContextStack, SavedParserState};
use crate::parser::types::{
    line_of, DolbraceState, ParseError, ParseResult, ParserOptions, ParserState, WordContext,
};
use crate::parser::word_parser::{is_metachar, is_negation_boundary, is_whitespace, is_word_end_context};

/// Inputs longer than this (in characters) are rejected up front.
pub const MAX_INPUT_SIZE: usize = 10_000_000;

/// A here-document whose body has not been read yet
#[derive(Debug, Clone)]
pub(crate) struct PendingHeredoc {
    pub id: usize,
    pub delimiter: String,
    pub strip_tabs: bool,
    pub quoted: bool,
    pub start_pos: usize,
}

/// Main parser struct
pub struct Parser {
    pub(crate) src: Vec<char>,
    pub(crate) pos: usize,
    pub(crate) options: ParserOptions,

    // here-documents
    pub(crate) pending_heredocs: Vec<PendingHeredoc>,
    pub(crate) heredoc_bodies: HashMap<usize, String>,
    pub(crate) next_heredoc_id: usize,
    /// End of heredoc bodies already consumed by a backtick substitution
    pub(crate) cmdsub_heredoc_end: Option<usize>,

    pub(crate) saw_newline_in_single_quote: bool,
    pub(crate) in_process_sub: bool,

    // scanning state
    pub(crate) ctx: ContextStack,
    pub(crate) state: ParserState,
    pub(crate) dolbrace: DolbraceState,
    pub(crate) eof_token: Option<char>,

    // word reading context, part of the token cache key
    pub(crate) word_context: WordContext,
    pub(crate) at_command_start: bool,
    pub(crate) in_array_literal: bool,
    pub(crate) in_assign_builtin: bool,
    pub(crate) token_cache: Option<TokenCache>,

    // arithmetic sub-parser cursor
    pub(crate) arith_src: Vec<char>,
    pub(crate) arith_pos: usize,
}

impl Parser {
    pub fn new(source: &str, options: ParserOptions) -> Self {
        Self {
            src: source.chars().collect(),
            pos: 0,
            options,
            pending_heredocs: Vec::new(),
            heredoc_bodies: HashMap::new(),
            next_heredoc_id: 0,
            cmdsub_heredoc_end: None,
            saw_newline_in_single_quote: false,
            in_process_sub: false,
            ctx: ContextStack::new(),
            state: ParserState::default(),
            dolbrace: DolbraceState::None,
            eof_token: None,
            word_context: WordContext::Normal,
            at_command_start: false,
            in_array_literal: false,
            in_assign_builtin: false,
            token_cache: None,
            arith_src: Vec::new(),
            arith_pos: 0,
        }
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    pub(crate) fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    pub(crate) fn char_at(&self, index: usize) -> Option<char> {
        self.src.get(index).copied()
    }

    pub(crate) fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Text between two character offsets (clamped to the input).
    pub(crate) fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.src.len());
        if start >= end {
            return String::new();
        }
        self.src[start..end].iter().collect()
    }

    pub(crate) fn starts_with(&self, prefix: &str) -> bool {
        let mut i = self.pos;
        for c in prefix.chars() {
            if self.src.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Move the current character onto `out`.
    pub(crate) fn consume_into(&mut self, out: &mut String) {
        if let Some(c) = self.advance() {
            out.push(c);
        }
    }

    // =========================================================================
    // STATE AND ERRORS
    // =========================================================================

    pub(crate) fn save_state(&self) -> SavedParserState {
        SavedParserState {
            parser_state: self.state,
            dolbrace_state: self.dolbrace,
            pending_heredocs: self.pending_heredocs.clone(),
            ctx_stack: self.ctx.copy_stack(),
            eof_token: self.eof_token,
        }
    }

    /// Undo everything since `save_state`, including heredocs registered in
    /// between. The cursor is left to the caller.
    pub(crate) fn restore_state(&mut self, saved: SavedParserState) {
        self.pending_heredocs = saved.pending_heredocs;
        self.state = saved.parser_state;
        self.dolbrace = saved.dolbrace_state;
        self.ctx.restore_from(&saved.ctx_stack);
        self.eof_token = saved.eof_token;
    }

    pub(crate) fn error(&self, message: impl Into<String>, pos: usize) -> ParseError {
        ParseError::new(message, Some(pos), Some(line_of(&self.src, pos)))
    }

    pub(crate) fn matched_pair_error(&self, message: impl Into<String>, pos: usize) -> ParseError {
        ParseError::matched_pair(message, Some(pos), Some(line_of(&self.src, pos)))
    }

    /// Error positioned at the next token.
    pub(crate) fn token_error(&mut self, message: impl Into<String>) -> ParseError {
        match self.peek_token() {
            Ok(tok) => self.error(message, tok.pos),
            Err(err) => err,
        }
    }

    /// Parse `source` as a standalone command list with the same options.
    /// Used for text that is re-parsed on its own, such as backtick bodies.
    pub(crate) fn parse_nested(&self, source: &str) -> ParseResult<Option<Node>> {
        let mut nested = Parser::new(source, self.options);
        let mut result = nested.parse_list(true)?;
        if let Some(node) = result.as_mut() {
            nested.attach_heredoc_bodies(node);
        }
        Ok(result)
    }

    fn attach_heredoc_bodies(&self, node: &mut Node) {
        let bodies = &self.heredoc_bodies;
        node.for_each_heredoc_mut(&mut |doc| {
            if let Some(body) = bodies.get(&doc.id) {
                doc.content = body.clone();
                doc.complete = true;
            }
        });
    }

    // =========================================================================
    // WHITESPACE
    // =========================================================================

    /// Skip blanks, comments and line continuations, but not newlines.
    pub(crate) fn skip_whitespace(&mut self) {
        loop {
            self.skip_blanks();
            match self.peek() {
                Some('#') => {
                    if !self.skip_comment() {
                        return;
                    }
                }
                Some('\\') if self.peek_at(1) == Some('\n') => self.pos += 2,
                _ => return,
            }
        }
    }

    /// Skip whitespace including newlines. Each newline is a point where
    /// pending here-document bodies start.
    pub(crate) fn skip_whitespace_and_newlines(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.advance();
                if c == '\n' {
                    self.after_newline();
                }
            } else if c == '#' {
                while self.peek().map_or(false, |c| c != '\n') {
                    self.advance();
                }
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    // Cursor just past a newline: read heredoc bodies, and skip any that a
    // backtick substitution on the previous line already consumed.
    fn after_newline(&mut self) {
        self.gather_heredoc_bodies();
        if let Some(end) = self.cmdsub_heredoc_end.take() {
            if end > self.pos {
                self.pos = end;
            } else {
                self.cmdsub_heredoc_end = Some(end);
            }
        }
    }

    // =========================================================================
    // LISTS
    // =========================================================================

    fn parse_list_operator(&mut self) -> ParseResult<Option<&'static str>> {
        self.skip_whitespace();
        let op = match self.peek_operator()? {
            Some(TokenType::AndAnd) => "&&",
            Some(TokenType::OrOr) => "||",
            Some(TokenType::Semicolon) => ";",
            Some(TokenType::Amp) => "&",
            _ => return Ok(None),
        };
        self.next_token()?;
        Ok(Some(op))
    }

    fn peek_list_operator(&mut self) -> ParseResult<Option<&'static str>> {
        let saved = self.pos;
        let op = self.parse_list_operator();
        self.pos = saved;
        op
    }

    fn at_list_until_terminator(&mut self, stop: &[&str]) -> ParseResult<bool> {
        match self.peek() {
            None | Some(')') => return Ok(true),
            Some('}') if self.peek_at(1).map_or(true, is_word_end_context) => return Ok(true),
            _ => {}
        }
        if let Some(word) = self.peek_reserved_word()? {
            if stop.contains(&word.as_str()) {
                return Ok(true);
            }
        }
        Ok(self.peek_case_terminator()?.is_some())
    }

    /// Parse a command list up to one of the reserved words in `stop` (or a
    /// closing bracket or case terminator). Returns `None` if the list is
    /// empty.
    pub(crate) fn parse_list_until(&mut self, stop: &[&str]) -> ParseResult<Option<Node>> {
        self.skip_whitespace_and_newlines();
        if let Some(word) = self.peek_reserved_word()? {
            if stop.contains(&word.as_str()) {
                return Ok(None);
            }
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        loop {
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None if self.peek() == Some('\n') => {
                    self.advance();
                    self.after_newline();
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop)? {
                        break;
                    }
                    if matches!(self.peek_list_operator()?, Some("&" | ";")) {
                        break;
                    }
                    "\n"
                }
                None => break,
            };
            match op {
                ";" => {
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop)? {
                        break;
                    }
                    parts.push(AST::operator(op));
                }
                "&" => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop)? {
                        break;
                    }
                }
                "&&" | "||" => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                }
                _ => parts.push(AST::operator(op)),
            }
            if self.at_list_until_terminator(stop)? {
                break;
            }
            match self.parse_pipeline()? {
                Some(pipeline) => parts.push(pipeline),
                None => return Err(self.error(format!("Expected command after {}", op), self.pos)),
            }
        }
        Ok(Some(into_list(parts)))
    }

    fn at_list_terminating_bracket(&self) -> bool {
        match self.peek() {
            None => false,
            Some(c) if Some(c) == self.eof_token => true,
            Some(')') => true,
            Some('}') => self.peek_at(1).map_or(true, is_word_end_context),
            _ => false,
        }
    }

    fn at_eof_token(&mut self) -> ParseResult<bool> {
        let Some(eof) = self.eof_token else {
            return Ok(false);
        };
        let tok = self.peek_token()?;
        Ok(match eof {
            ')' => tok.token_type == TokenType::RParen,
            '}' => tok.is_word("}"),
            _ => false,
        })
    }

    /// Parse pipelines joined by list operators. Newlines separate commands
    /// only when `newline_as_separator` is set; otherwise a newline ends the
    /// list.
    pub(crate) fn parse_list(&mut self, newline_as_separator: bool) -> ParseResult<Option<Node>> {
        if newline_as_separator {
            self.skip_whitespace_and_newlines();
        } else {
            self.skip_whitespace();
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        if self.state.eof_token && self.at_eof_token()? {
            return Ok(Some(into_list(parts)));
        }
        loop {
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None if self.peek() == Some('\n') && newline_as_separator => {
                    self.advance();
                    self.after_newline();
                    self.skip_whitespace_and_newlines();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if matches!(self.peek_list_operator()?, Some("&" | ";")) {
                        break;
                    }
                    "\n"
                }
                None => break,
            };
            parts.push(AST::operator(op));
            match op {
                "&&" | "||" => self.skip_whitespace_and_newlines(),
                "&" | ";" => {
                    self.skip_whitespace();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if self.peek() == Some('\n') {
                        if !newline_as_separator {
                            break;
                        }
                        self.skip_whitespace_and_newlines();
                        if self.at_end() || self.at_list_terminating_bracket() {
                            break;
                        }
                    }
                }
                _ => {}
            }
            match self.parse_pipeline()? {
                Some(pipeline) => parts.push(pipeline),
                None => return Err(self.error(format!("Expected command after {}", op), self.pos)),
            }
            if self.state.eof_token && self.at_eof_token()? {
                break;
            }
        }
        Ok(Some(into_list(parts)))
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    // `-p` after `time`, only as a whole word.
    fn consume_time_posix_flag(&mut self) -> bool {
        if self.peek() != Some('-') || self.peek_at(1) != Some('p') {
            return false;
        }
        if self.peek_at(2).map_or(true, is_metachar) {
            self.pos += 2;
            return true;
        }
        false
    }

    fn at_negation(&self) -> bool {
        if self.peek() != Some('!') {
            return false;
        }
        let followed_by_procsub =
            matches!(self.peek_at(1), Some('<' | '>')) && self.peek_at(2) == Some('(');
        self.peek_at(1).map_or(true, is_negation_boundary) && !followed_by_procsub
    }

    /// Parse a pipeline with its optional `time` and `!` prefixes.
    pub(crate) fn parse_pipeline(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        let mut timed = false;
        let mut posix = false;
        let mut negated = false;

        if self.is_at_reserved_word("time")? {
            self.consume_keyword("time")?;
            timed = true;
            self.skip_whitespace();
            posix |= self.consume_time_posix_flag();
            self.skip_whitespace();
            if self.starts_with("--") && self.peek_at(2).map_or(true, is_whitespace) {
                self.pos += 2;
                posix = true;
                self.skip_whitespace();
            }
            while self.is_at_reserved_word("time")? {
                self.consume_keyword("time")?;
                self.skip_whitespace();
                posix |= self.consume_time_posix_flag();
            }
            self.skip_whitespace();
            if self.at_negation() {
                self.advance();
                negated = true;
                self.skip_whitespace();
            }
        } else if self.at_negation() {
            self.advance();
            self.skip_whitespace();
            // `! ! cmd` cancels out
            return Ok(Some(match self.parse_pipeline()? {
                Some(Node::Negation { pipeline }) => {
                    pipeline.map_or_else(|| AST::command(vec![], vec![]), |p| *p)
                }
                inner => Node::Negation {
                    pipeline: inner.map(Box::new),
                },
            }));
        }

        let result = self.parse_simple_pipeline()?;
        if !timed {
            return Ok(result);
        }
        trace!("time pipeline posix={} negated={}", posix, negated);
        let time = Node::Time {
            pipeline: result.map(Box::new),
            posix,
        };
        if negated {
            return Ok(Some(Node::Negation {
                pipeline: Some(Box::new(time)),
            }));
        }
        Ok(Some(time))
    }

    fn parse_simple_pipeline(&mut self) -> ParseResult<Option<Node>> {
        let Some(first) = self.parse_compound_command()? else {
            return Ok(None);
        };
        let mut commands = vec![first];
        loop {
            self.skip_whitespace();
            let pipe_both = match self.peek_operator()? {
                Some(TokenType::Pipe) => false,
                Some(TokenType::PipeAmp) => true,
                _ => break,
            };
            self.next_token()?;
            self.skip_whitespace_and_newlines();
            if pipe_both {
                commands.push(Node::PipeBoth);
            }
            match self.parse_compound_command()? {
                Some(cmd) => commands.push(cmd),
                None => return Err(self.error("Expected command after |", self.pos)),
            }
        }
        if commands.len() == 1 {
            return Ok(commands.pop());
        }
        Ok(Some(AST::pipeline(commands)))
    }

    // =========================================================================
    // ENTRY POINT
    // =========================================================================

    /// Parse the whole input into its top-level command lists.
    pub fn parse(&mut self) -> ParseResult<Vec<Node>> {
        if self.src.len() > MAX_INPUT_SIZE {
            return Err(ParseError::new(
                format!("Input too large: {} characters (max {})", self.src.len(), MAX_INPUT_SIZE),
                None,
                None,
            ));
        }
        if self.src.iter().all(|c| c.is_whitespace()) {
            return Ok(vec![Node::Empty]);
        }

        // Leading blank lines and comments
        loop {
            self.skip_whitespace();
            while self.peek() == Some('\n') {
                self.advance();
            }
            if self.peek() != Some('#') {
                break;
            }
            while self.peek().map_or(false, |c| c != '\n') {
                self.advance();
            }
        }

        let mut results = Vec::new();
        while !self.at_end() {
            if let Some(list) = self.parse_list(false)? {
                results.push(list);
            }
            self.skip_whitespace();
            let mut found_newline = false;
            while self.peek() == Some('\n') {
                found_newline = true;
                self.advance();
                self.after_newline();
                self.skip_whitespace();
            }
            if !found_newline && !self.at_end() {
                return Err(self.error("Syntax error", self.pos));
            }
        }
        if results.is_empty() {
            return Ok(vec![Node::Empty]);
        }

        if self.needs_trailing_backslash_fix() && results.len() < 2 {
            strip_trailing_backslash(&mut results);
        }
        for node in results.iter_mut() {
            self.attach_heredoc_bodies(node);
        }
        debug!("parsed {} top-level node(s)", results.len());
        Ok(results)
    }

    // A final lone `\` gets doubled by the word scanner after a single-quoted
    // string spanned lines.
    fn needs_trailing_backslash_fix(&self) -> bool {
        let n = self.src.len();
        let ends_with_continuation = n >= 3 && self.src[n - 3] == '\\' && self.src[n - 2] == '\n';
        self.saw_newline_in_single_quote && self.src.last() == Some(&'\\') && !ends_with_continuation
    }
}

/// Parse `source` into its top-level nodes.
pub fn parse(source: &str, extglob: bool) -> ParseResult<Vec<Node>> {
    Parser::new(source, ParserOptions { extglob }).parse()
}

fn into_list(mut parts: Vec<Node>) -> Node {
    if parts.len() == 1 {
        if let Some(only) = parts.pop() {
            return only;
        }
    }
    AST::list(parts)
}

fn strip_trailing_backslash(results: &mut [Node]) {
    let Some(last) = results.last_mut() else {
        return;
    };
    let Some(word) = find_last_word(last) else {
        return;
    };
    if word.value.pop().is_none() || !word.value.is_empty() {
        return;
    }
    if let Node::Command { words, .. } = last {
        if words.last().map_or(false, |w| w.value.is_empty()) {
            words.pop();
        }
    }
}

fn find_last_word(node: &mut Node) -> Option<&mut Word> {
    match node {
        Node::Word(word) => Some(word),
        Node::Command { words, redirects } => {
            if words.last().map_or(false, |w| w.value.ends_with('\\')) {
                return words.last_mut();
            }
            if let Some(Node::Redirect { target, .. }) = redirects.last_mut() {
                return target.value.ends_with('\\').then_some(target);
            }
            words.last_mut().filter(|w| w.value.ends_with('\\'))
        }
        Node::Pipeline { commands } => commands.last_mut().and_then(find_last_word),
        Node::List { parts } => parts.last_mut().and_then(find_last_word),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sexp(input: &str) -> String {
        let nodes = parse(input, false).unwrap();
        nodes.iter().map(Node::to_sexp).collect::<Vec<_>>().join("\n")
    }

    fn parse_err(input: &str) -> ParseError {
        parse(input, false).unwrap_err()
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse("", false).unwrap(), vec![Node::Empty]);
        assert_eq!(parse("  \n\t", false).unwrap(), vec![Node::Empty]);
        assert_eq!(parse("# only a comment\n", false).unwrap(), vec![Node::Empty]);
    }

    #[test]
    fn test_parse_simple_command() {
        assert_eq!(sexp("echo hello world"), "(command (word \"echo\") (word \"hello\") (word \"world\"))");
    }

    #[test]
    fn test_parse_pipeline() {
        assert_eq!(
            sexp("ls | grep foo"),
            "(pipe (command (word \"ls\")) (command (word \"grep\") (word \"foo\")))"
        );
        assert_eq!(
            sexp("a |& b"),
            "(pipe (command (word \"a\") (redirect \">&\" 1)) (command (word \"b\")))"
        );
    }

    #[test]
    fn test_parse_lists() {
        assert_eq!(
            sexp("a && b || c"),
            "(or (and (command (word \"a\")) (command (word \"b\"))) (command (word \"c\")))"
        );
        assert_eq!(sexp("a; b"), "(semi (command (word \"a\")) (command (word \"b\")))");
        assert_eq!(sexp("a &"), "(background (command (word \"a\")))");
        assert_eq!(sexp("a;"), "(command (word \"a\"))");
    }

    #[test]
    fn test_top_level_lines_are_separate_nodes() {
        let nodes = parse("a\nb\n", false).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_negation_and_time() {
        assert_eq!(sexp("! true"), "(negation (command (word \"true\")))");
        assert_eq!(sexp("! ! true"), "(command (word \"true\"))");
        assert_eq!(sexp("time -p sleep 1"), "(time -p (command (word \"sleep\") (word \"1\")))");
        assert_eq!(sexp("time ! x"), "(negation (time (command (word \"x\"))))");
    }

    #[test]
    fn test_compound_in_list() {
        assert_eq!(
            sexp("if true; then echo y; fi"),
            "(if (command (word \"true\")) (command (word \"echo\") (word \"y\")))"
        );
        assert_eq!(
            sexp("while read l; do echo $l; done < f"),
            "(while (command (word \"read\") (word \"l\")) (command (word \"echo\") (word \"$l\"))) (redirect \"<\" \"f\")"
        );
    }

    #[test]
    fn test_heredoc_body_attached() {
        let nodes = parse("cat <<EOF\nhello\nEOF\necho done\n", false).unwrap();
        assert_eq!(nodes.len(), 2);
        let Node::Command { redirects, .. } = &nodes[0] else {
            panic!("Expected command");
        };
        let Node::HereDoc(doc) = &redirects[0] else {
            panic!("Expected heredoc");
        };
        assert_eq!(doc.content, "hello\n");
        assert!(doc.complete);
        assert_eq!(nodes[0].to_sexp(), "(command (word \"cat\") (redirect \"<<\" \"hello\n\"))");
    }

    #[test]
    fn test_two_heredocs_on_one_line() {
        let nodes = parse("cat <<A <<-B\na\nA\n\tb\n\tB\n", false).unwrap();
        let Node::Command { redirects, .. } = &nodes[0] else {
            panic!("Expected command");
        };
        let bodies: Vec<&str> = redirects
            .iter()
            .filter_map(|r| match r {
                Node::HereDoc(doc) => Some(doc.content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec!["a\n", "b\n"]);
    }

    fn heredoc_bodies(node: &mut Node) -> Vec<(String, String)> {
        let mut bodies = Vec::new();
        node.for_each_heredoc_mut(&mut |doc| bodies.push((doc.delimiter.clone(), doc.content.clone())));
        bodies
    }

    #[test]
    fn test_heredoc_pending_across_command_substitution() {
        let mut nodes = parse("cat <<A; echo \"$(cat <<B\nb\nB\n)\"\na\nA\n", false).unwrap();
        assert_eq!(nodes.len(), 1);
        let bodies = heredoc_bodies(&mut nodes[0]);
        assert!(bodies.contains(&("A".to_string(), "a\n".to_string())));
        assert!(bodies.contains(&("B".to_string(), "b\n".to_string())));

        let mut nodes = parse("cat <<EOF; echo $(echo a\necho b)\nbody\nEOF\n", false).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(heredoc_bodies(&mut nodes[0]), vec![("EOF".to_string(), "body\n".to_string())]);
    }

    #[test]
    fn test_case_with_esac_pattern() {
        let nodes = parse("case $x in esac) ;; esac", false).unwrap();
        assert_eq!(nodes.len(), 1);
        let Node::Case { patterns, .. } = &nodes[0] else {
            panic!("Expected case");
        };
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, "esac");
        assert!(patterns[0].body.is_none());
        assert_eq!(patterns[0].terminator, ";;");
    }

    #[test]
    fn test_process_substitution_fallbacks() {
        let err = parse_err("echo <(ls");
        assert!(err.is_matched_pair());
        assert_eq!(err.pos(), Some(5));

        let nodes = parse("echo a<(;;)b", false).unwrap();
        let Node::Command { words, .. } = &nodes[0] else {
            panic!("Expected command");
        };
        assert_eq!(words[1].value, "a<(;;)b");
        assert!(words[1].parts.iter().all(|p| p.kind() != "procsub"));
    }

    #[test]
    fn test_arithmetic_lookalike_is_command_substitution() {
        let nodes = parse("echo $((echo a) )", false).unwrap();
        let Node::Command { words, .. } = &nodes[0] else {
            panic!("Expected command");
        };
        assert_eq!(words[1].value, "$((echo a) )");
        let Node::CommandSubstitution { command, .. } = &words[1].parts[0] else {
            panic!("Expected command substitution");
        };
        assert_eq!(command.kind(), "subshell");
    }

    #[test]
    fn test_command_substitution_in_word() {
        assert_eq!(
            sexp("echo $(date)"),
            "(command (word \"echo\") (word \"$(date)\"))"
        );
        let nodes = parse("echo $(date)", false).unwrap();
        let Node::Command { words, .. } = &nodes[0] else {
            panic!("Expected command");
        };
        assert_eq!(words[1].parts[0].kind(), "cmdsub");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_err("echo )").message().contains("Syntax error"));
        assert!(parse_err("a &&").message().contains("Expected command after &&"));
        assert!(parse_err("a |").message().contains("Expected command after |"));
        let err = parse_err("echo 'open");
        assert!(err.message().contains("Unterminated single quote"));
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_error_line_numbers() {
        let err = parse_err("true\nfi\n");
        assert!(err.message().contains("Unexpected reserved word 'fi'"));
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_skip_whitespace_stops_at_newline() {
        let mut parser = Parser::new("  # note\nx", ParserOptions::default());
        parser.skip_whitespace();
        assert_eq!(parser.peek(), Some('\n'));
        parser.skip_whitespace_and_newlines();
        assert_eq!(parser.peek(), Some('x'));
    }

    #[test]
    fn test_find_last_word() {
        let mut node = AST::list(vec![
            AST::command(vec![AST::word("a", vec![])], vec![]),
            AST::operator(";"),
            AST::command(vec![AST::word("b\\", vec![])], vec![]),
        ]);
        let word = find_last_word(&mut node).unwrap();
        assert_eq!(word.value, "b\\");
    }
}
