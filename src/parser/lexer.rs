//! Lexer for Bash Scripts
//!
//! The lexer is not a separate pass: it reads tokens straight off the
//! parser's cursor so that word reading can recurse into the parser for
//! `$(...)`, backticks and process substitutions. It handles:
//! - Operators (maximal munch)
//! - Words, with quoting rules that depend on the word context
//! - Comments
//! - Balanced-delimiter scanning for `${...}`, extglob groups and subscripts
//!
//! A single token of lookahead is cached together with the state it was
//! read under; a cached token is reused only when that state still holds.

use log::trace;

use crate::ast::types::{Node, Word};
use crate::parser::parser::Parser;
use crate::parser::types::{
    DolbraceState, MatchedPairFlags, ParseResult, ParserState, WordContext,
};
use crate::parser::word_parser::{
    is_array_assignment_prefix, is_blank, is_extglob_prefix, is_funsub_char, is_metachar,
    is_redirect_char, is_whitespace,
};

/// Token types for bash lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,

    Word,

    // Newlines and separators
    Newline,
    Semicolon,
    Amp, // &

    // Operators
    Pipe,    // |
    PipeAmp, // |&
    AndAnd,  // &&
    OrOr,    // ||

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<
    AndGreat,  // &>
    AndDGreat, // &>>

    // Grouping
    LParen, // (
    RParen, // )

    // Case terminators
    DSemi,       // ;;
    SemiAnd,     // ;&
    SemiSemiAnd, // ;;&
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Word => "WORD",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::PipeAmp => "|&",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::DSemi => ";;",
            Self::SemiAnd => ";&",
            Self::SemiSemiAnd => ";;&",
        }
    }

    pub fn is_operator(&self) -> bool {
        !matches!(self, Self::Eof | Self::Word | Self::Newline)
    }
}

const THREE_CHAR_OPS: [(&str, TokenType); 4] = [
    (";;&", TokenType::SemiSemiAnd),
    ("<<-", TokenType::DLessDash),
    ("<<<", TokenType::TLess),
    ("&>>", TokenType::AndDGreat),
];

const TWO_CHAR_OPS: [(&str, TokenType); 12] = [
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (";;", TokenType::DSemi),
    (";&", TokenType::SemiAnd),
    ("<<", TokenType::DLess),
    (">>", TokenType::DGreat),
    ("<&", TokenType::LessAnd),
    (">&", TokenType::GreatAnd),
    ("<>", TokenType::LessGreat),
    (">|", TokenType::Clobber),
    ("&>", TokenType::AndGreat),
    ("|&", TokenType::PipeAmp),
];

/// Safety limit for [`Parser::tokenize`]
pub const MAX_TOKENS: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Character offset of the first character
    pub pos: usize,
    /// For WORD tokens: the parsed word with its expansion parts
    pub word: Option<Word>,
}

impl Token {
    pub fn new(token_type: TokenType, value: impl Into<String>, pos: usize) -> Self {
        Self {
            token_type,
            value: value.into(),
            pos,
            word: None,
        }
    }

    pub fn eof(pos: usize) -> Self {
        Self::new(TokenType::Eof, "", pos)
    }

    pub fn word(word: Word, pos: usize) -> Self {
        Self {
            token_type: TokenType::Word,
            value: word.value.clone(),
            pos,
            word: Some(word),
        }
    }

    pub fn is_word(&self, value: &str) -> bool {
        self.token_type == TokenType::Word && self.value == value
    }
}

/// Everything that can change how the characters at `pos` tokenize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pos: usize,
    word_context: WordContext,
    at_command_start: bool,
    in_array_literal: bool,
    in_assign_builtin: bool,
    state: ParserState,
    eof_token: Option<char>,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenCache {
    key: CacheKey,
    token: Token,
    end_pos: usize,
}

impl Parser {
    fn cache_key(&self, pos: usize) -> CacheKey {
        CacheKey {
            pos,
            word_context: self.word_context,
            at_command_start: self.at_command_start,
            in_array_literal: self.in_array_literal,
            in_assign_builtin: self.in_assign_builtin,
            state: self.state,
            eof_token: self.eof_token,
        }
    }

    /// Read the next token without consuming it.
    pub(crate) fn peek_token(&mut self) -> ParseResult<Token> {
        if let Some(cache) = &self.token_cache {
            if cache.key == self.cache_key(self.pos) {
                return Ok(cache.token.clone());
            }
        }
        let start = self.pos;
        let result = self.read_token();
        let end_pos = self.pos;
        self.pos = start;
        let token = result?;
        self.token_cache = Some(TokenCache {
            key: self.cache_key(start),
            token: token.clone(),
            end_pos,
        });
        Ok(token)
    }

    /// Consume and return the next token.
    pub(crate) fn next_token(&mut self) -> ParseResult<Token> {
        let key = self.cache_key(self.pos);
        let token = match self.token_cache.take() {
            Some(cache) if cache.key == key => {
                self.pos = cache.end_pos;
                cache.token
            }
            _ => self.read_token()?,
        };
        trace!("token {} {:?} at {}", token.token_type.as_str(), token.value, token.pos);
        Ok(token)
    }

    /// Tokenize the remaining input under the current state. Mostly useful
    /// for inspecting how a line splits; the parser itself pulls tokens on
    /// demand.
    pub fn tokenize(&mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.token_type == TokenType::Eof;
            tokens.push(token);
            if done {
                break;
            }
            if tokens.len() > MAX_TOKENS {
                return Err(self.error("Too many tokens", self.pos));
            }
        }
        Ok(tokens)
    }

    // The active eof token ends input for the lexer unless the parser is
    // itself watching for it (or reading case patterns).
    fn at_lexer_eof_token(&self) -> bool {
        self.eof_token.is_some()
            && self.peek() == self.eof_token
            && !self.state.case_pattern
            && !self.state.eof_token
    }

    fn read_token(&mut self) -> ParseResult<Token> {
        self.skip_blanks();
        if self.at_end() || self.at_lexer_eof_token() {
            return Ok(Token::eof(self.pos));
        }
        while self.skip_comment() {
            self.skip_blanks();
            if self.at_end() || self.at_lexer_eof_token() {
                return Ok(Token::eof(self.pos));
            }
        }
        if let Some(token) = self.read_operator() {
            return Ok(token);
        }
        if let Some(token) = self.read_word()? {
            return Ok(token);
        }
        Ok(Token::eof(self.pos))
    }

    fn read_operator(&mut self) -> Option<Token> {
        let start = self.pos;
        let c = self.peek()?;
        for (op, token_type) in THREE_CHAR_OPS.iter().chain(TWO_CHAR_OPS.iter()) {
            if self.starts_with(op) {
                self.pos += op.chars().count();
                return Some(Token::new(*token_type, *op, start));
            }
        }
        let token_type = match c {
            ';' => TokenType::Semicolon,
            '|' => TokenType::Pipe,
            '&' => TokenType::Amp,
            '(' | ')' if self.word_context == WordContext::Regex => return None,
            '(' => TokenType::LParen,
            ')' => TokenType::RParen,
            '<' | '>' if self.peek_at(1) == Some('(') => return None,
            '<' => TokenType::Less,
            '>' => TokenType::Great,
            '\n' => TokenType::Newline,
            _ => return None,
        };
        self.pos += 1;
        Some(Token::new(token_type, c.to_string(), start))
    }

    pub(crate) fn skip_blanks(&mut self) {
        while self.peek().map_or(false, is_blank) {
            self.pos += 1;
        }
    }

    /// Skip a `#` comment to the end of the line. A `#` only starts a
    /// comment at the start of input or after whitespace or an operator.
    pub(crate) fn skip_comment(&mut self) -> bool {
        if self.peek() != Some('#') || self.ctx.current().quote.in_quotes() {
            return false;
        }
        if self.pos > 0 && !" \t\n;|&(){}".contains(self.src[self.pos - 1]) {
            return false;
        }
        while self.peek().map_or(false, |c| c != '\n') {
            self.pos += 1;
        }
        true
    }

    /// Read the rest of a single-quoted string; the opening quote is already
    /// consumed. Returns the text with both quotes and whether it spanned a
    /// newline.
    fn read_single_quote(&mut self, start: usize) -> ParseResult<(String, bool)> {
        let mut text = String::from('\'');
        let mut saw_newline = false;
        while let Some(c) = self.advance() {
            if c == '\n' {
                saw_newline = true;
            }
            text.push(c);
            if c == '\'' {
                return Ok((text, saw_newline));
            }
        }
        Err(self.error("Unterminated single quote", start))
    }

    fn is_word_terminator(&self, ctx: WordContext, ch: char, bracket_depth: usize, paren_depth: usize) -> bool {
        let next = self.peek_at(1);
        match ctx {
            WordContext::Regex => {
                if (ch == ']' && next == Some(']')) || (ch == '&' && next == Some('&')) {
                    return true;
                }
                if ch == ')' && paren_depth == 0 {
                    return true;
                }
                is_whitespace(ch) && paren_depth == 0
            }
            WordContext::Cond => {
                if ch == ']' && next == Some(']') {
                    return true;
                }
                if matches!(ch, ')' | '&' | '|' | ';') {
                    return true;
                }
                if is_redirect_char(ch) && next != Some('(') {
                    return true;
                }
                is_whitespace(ch)
            }
            WordContext::Normal => {
                if self.state.eof_token && self.eof_token == Some(ch) && bracket_depth == 0 {
                    return true;
                }
                if is_redirect_char(ch) && next == Some('(') {
                    return false;
                }
                is_metachar(ch) && bracket_depth == 0
            }
        }
    }

    /// Read a `[...]` bracket expression inside `[[ ]]`. Returns false
    /// (consuming nothing) when the `[` does not open one.
    fn read_bracket_expression(
        &mut self,
        chars: &mut String,
        parts: &mut Vec<Node>,
        for_regex: bool,
        paren_depth: usize,
    ) -> ParseResult<bool> {
        if for_regex {
            if !self.regex_bracket_closes(paren_depth) {
                return Ok(false);
            }
        } else {
            match self.peek_at(1) {
                None => return Ok(false),
                Some(c) if is_blank(c) || c == '&' || c == '|' => return Ok(false),
                Some(_) => {}
            }
        }

        self.consume_into(chars);
        if self.peek() == Some('^') {
            self.consume_into(chars);
        }
        if self.peek() == Some(']') {
            self.consume_into(chars);
        }
        while let Some(c) = self.peek() {
            if c == ']' {
                self.consume_into(chars);
                break;
            }
            let class_end = match (c, self.peek_at(1)) {
                ('[', Some(':')) => Some(':'),
                ('[', Some('=')) if !for_regex => Some('='),
                ('[', Some('.')) if !for_regex => Some('.'),
                _ => None,
            };
            if let Some(end) = class_end {
                self.consume_into(chars);
                self.consume_into(chars);
                while self.peek().is_some() && !(self.peek() == Some(end) && self.peek_at(1) == Some(']')) {
                    self.consume_into(chars);
                }
                if !self.at_end() {
                    self.consume_into(chars);
                    self.consume_into(chars);
                }
            } else if for_regex && c == '$' {
                if !self.parse_dollar_expansion(chars, parts)? {
                    self.consume_into(chars);
                }
            } else {
                self.consume_into(chars);
            }
        }
        Ok(true)
    }

    fn regex_bracket_closes(&self, paren_depth: usize) -> bool {
        let src = &self.src;
        let n = src.len();
        let mut scan = self.pos + 1;
        if scan < n && src[scan] == '^' {
            scan += 1;
        }
        if scan < n && src[scan] == ']' {
            scan += 1;
        }
        while scan < n {
            let sc = src[scan];
            let next = src.get(scan + 1).copied();
            if sc == ']' && next == Some(']') {
                return false;
            }
            if sc == ')' && paren_depth > 0 {
                return false;
            }
            if sc == '&' && next == Some('&') {
                return false;
            }
            if sc == ']' {
                return true;
            }
            if sc == '[' && next == Some(':') {
                scan += 2;
                while scan < n && !(src[scan] == ':' && src.get(scan + 1) == Some(&']')) {
                    scan += 1;
                }
                if scan < n {
                    scan += 2;
                }
                continue;
            }
            scan += 1;
        }
        false
    }

    /// Scan up to the `close` that balances an already-consumed `open`,
    /// returning the text in between. Nested quotes and `$` expansions are
    /// consumed whole so their delimiters do not count. An unterminated
    /// pair is reported at `open_pos`, where the construct starts.
    pub(crate) fn parse_matched_pair(
        &mut self,
        open_pos: usize,
        open: char,
        close: char,
        flags: MatchedPairFlags,
        initial_was_dollar: bool,
    ) -> ParseResult<String> {
        let mut count = 1usize;
        let mut chars = String::new();
        let mut pass_next = false;
        let mut was_dollar = initial_was_dollar;
        while count > 0 {
            let Some(ch) = self.advance() else {
                return Err(self.matched_pair_error(
                    format!("unexpected EOF while looking for matching `{}'", close),
                    open_pos,
                ));
            };
            if flags.dolbrace && self.dolbrace == DolbraceState::Op && !"#%^,~:-=?+/".contains(ch) {
                self.dolbrace = DolbraceState::Word;
            }
            if pass_next {
                pass_next = false;
                chars.push(ch);
                was_dollar = ch == '$';
                continue;
            }
            if open == '\'' {
                if ch == close {
                    count -= 1;
                    if count == 0 {
                        break;
                    }
                }
                if ch == '\\' && flags.allow_esc {
                    pass_next = true;
                }
                chars.push(ch);
                was_dollar = false;
                continue;
            }
            if ch == '\\' {
                if self.peek() == Some('\n') {
                    self.advance();
                } else {
                    pass_next = true;
                    chars.push(ch);
                }
                was_dollar = false;
                continue;
            }
            if ch == close {
                count -= 1;
                if count == 0 {
                    break;
                }
                chars.push(ch);
                was_dollar = false;
                continue;
            }
            if ch == open && open != close {
                if !(flags.dolbrace && open == '{') {
                    count += 1;
                }
                chars.push(ch);
                was_dollar = false;
                continue;
            }
            if open != close && matches!(ch, '\'' | '"' | '`') {
                let nested_flags = match ch {
                    '\'' if was_dollar => flags | MatchedPairFlags::ALLOWESC,
                    '"' => flags | MatchedPairFlags::DQUOTE,
                    _ => flags,
                };
                chars.push(ch);
                let quote_pos = self.pos - 1;
                let nested = self.parse_matched_pair(quote_pos, ch, ch, nested_flags, false)?;
                chars.push_str(&nested);
                chars.push(ch);
                was_dollar = false;
                continue;
            }
            if ch == '$' && !self.at_end() && !flags.extglob {
                if was_dollar {
                    chars.push(ch);
                    was_dollar = false;
                    continue;
                }
                match self.peek() {
                    Some('{') => {
                        if flags.arith && !self.char_at(self.pos + 1).map_or(false, is_funsub_char) {
                            chars.push(ch);
                            was_dollar = true;
                            continue;
                        }
                        self.pos -= 1;
                        match self.read_param_expansion(flags.dquote)? {
                            Some((_, text)) => {
                                chars.push_str(&text);
                                was_dollar = false;
                            }
                            None => {
                                self.consume_into(&mut chars);
                                was_dollar = true;
                            }
                        }
                        continue;
                    }
                    Some('(') => {
                        self.pos -= 1;
                        let mut found = None;
                        if self.char_at(self.pos + 2) == Some('(') {
                            found = self.parse_arithmetic_expansion()?;
                        }
                        if found.is_none() {
                            found = self.parse_command_substitution()?;
                        }
                        match found {
                            Some((_, text)) => chars.push_str(&text),
                            None => {
                                self.consume_into(&mut chars);
                                self.consume_into(&mut chars);
                            }
                        }
                        was_dollar = false;
                        continue;
                    }
                    Some('[') => {
                        self.pos -= 1;
                        match self.parse_deprecated_arithmetic()? {
                            Some((_, text)) => {
                                chars.push_str(&text);
                                was_dollar = false;
                            }
                            None => {
                                self.consume_into(&mut chars);
                                was_dollar = true;
                            }
                        }
                        continue;
                    }
                    _ => {}
                }
            }
            chars.push(ch);
            was_dollar = ch == '$';
        }
        Ok(chars)
    }

    /// Read one word under `ctx`. Returns `None` when no characters belong
    /// to a word at the cursor.
    pub(crate) fn read_word_internal(
        &mut self,
        ctx: WordContext,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> ParseResult<Option<Word>> {
        let start = self.pos;
        let mut chars = String::new();
        let mut parts: Vec<Node> = Vec::new();
        let mut bracket_depth = 0usize;
        let mut bracket_start: Option<usize> = None;
        let mut seen_equals = false;
        let mut paren_depth = 0usize;

        while let Some(ch) = self.peek() {
            let next = self.peek_at(1);
            if ctx == WordContext::Regex && ch == '\\' && next == Some('\n') {
                self.pos += 2;
                continue;
            }
            if ctx != WordContext::Normal && self.is_word_terminator(ctx, ch, bracket_depth, paren_depth) {
                break;
            }

            // Array subscripts: `a[i]=v` at command start, `[k]=v` in a literal
            if ctx == WordContext::Normal && ch == '[' {
                if bracket_depth > 0 {
                    bracket_depth += 1;
                    self.consume_into(&mut chars);
                    continue;
                }
                if !chars.is_empty() && at_command_start && !seen_equals {
                    let so_far: Vec<char> = chars.chars().collect();
                    let prev = so_far[so_far.len() - 1];
                    if is_array_assignment_prefix(&so_far) && (prev.is_alphanumeric() || prev == '_') {
                        bracket_start = Some(self.pos);
                        bracket_depth += 1;
                        self.consume_into(&mut chars);
                        continue;
                    }
                }
                if chars.is_empty() && !seen_equals && in_array_literal {
                    bracket_start = Some(self.pos);
                    bracket_depth += 1;
                    self.consume_into(&mut chars);
                    continue;
                }
            }
            if ctx == WordContext::Normal && ch == ']' && bracket_depth > 0 {
                bracket_depth -= 1;
                self.consume_into(&mut chars);
                continue;
            }
            if ctx == WordContext::Normal && ch == '=' && bracket_depth == 0 {
                seen_equals = true;
            }

            if ctx == WordContext::Regex && ch == '(' {
                paren_depth += 1;
                self.consume_into(&mut chars);
                continue;
            }
            if ctx == WordContext::Regex && ch == ')' {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
                self.consume_into(&mut chars);
                continue;
            }
            if ctx != WordContext::Normal && ch == '[' {
                let for_regex = ctx == WordContext::Regex;
                if !self.read_bracket_expression(&mut chars, &mut parts, for_regex, paren_depth)? {
                    self.consume_into(&mut chars);
                }
                continue;
            }
            if ctx == WordContext::Cond && ch == '(' {
                // Patterns inside `[[ ]]` take extglob groups whatever the option says
                if chars.chars().last().map_or(false, is_extglob_prefix) {
                    self.consume_into(&mut chars);
                    self.read_extglob_body(&mut chars)?;
                    continue;
                }
                break;
            }
            if ctx == WordContext::Regex && is_whitespace(ch) && paren_depth > 0 {
                self.consume_into(&mut chars);
                continue;
            }

            // Quoting
            if ch == '\'' {
                self.advance();
                let (text, saw_newline) = self.read_single_quote(start)?;
                chars.push_str(&text);
                if ctx == WordContext::Normal && saw_newline {
                    self.saw_newline_in_single_quote = true;
                }
                continue;
            }
            if ch == '"' {
                self.advance();
                if ctx == WordContext::Normal {
                    self.read_double_quoted_word_part(&mut chars, &mut parts, start)?;
                } else {
                    self.scan_double_quote(&mut chars, &mut parts, start, ctx == WordContext::Cond)?;
                }
                continue;
            }
            if ch == '\\' && next.is_some() {
                if ctx != WordContext::Regex && next == Some('\n') {
                    self.pos += 2;
                } else {
                    self.consume_into(&mut chars);
                    self.consume_into(&mut chars);
                }
                continue;
            }

            // Expansions
            if ctx != WordContext::Regex && ch == '$' && next == Some('\'') {
                match self.read_ansi_c_quote()? {
                    Some((node, text)) => {
                        parts.push(node);
                        chars.push_str(&text);
                    }
                    None => self.consume_into(&mut chars),
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '$' && next == Some('"') {
                match self.read_locale_string()? {
                    Some((node, text, inner)) => {
                        parts.push(node);
                        parts.extend(inner);
                        chars.push_str(&text);
                    }
                    None => self.consume_into(&mut chars),
                }
                continue;
            }
            if ch == '$' {
                let before = chars.len();
                if !self.parse_dollar_expansion(&mut chars, &mut parts)? {
                    self.consume_into(&mut chars);
                } else if self.options.extglob
                    && ctx == WordContext::Normal
                    && self.peek() == Some('(')
                    && is_special_extglob_param(&chars[before..])
                {
                    // `$?(...)`, `$*(...)` and `$@(...)`: the group belongs to the word
                    self.consume_into(&mut chars);
                    self.read_extglob_body(&mut chars)?;
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '`' {
                match self.parse_backtick_substitution()? {
                    Some((node, text)) => {
                        parts.push(node);
                        chars.push_str(&text);
                    }
                    None => self.consume_into(&mut chars),
                }
                continue;
            }
            if ctx != WordContext::Regex && is_redirect_char(ch) && next == Some('(') {
                match self.parse_process_substitution()? {
                    Some((Some(node), text)) => {
                        parts.push(node);
                        chars.push_str(&text);
                    }
                    Some((None, text)) if !text.is_empty() => chars.push_str(&text),
                    _ => {
                        self.consume_into(&mut chars);
                        if ctx == WordContext::Normal {
                            self.consume_into(&mut chars);
                        }
                    }
                }
                continue;
            }

            // Array literal after `name=` / `name+=`
            if ctx == WordContext::Normal && ch == '(' && !chars.is_empty() && bracket_depth == 0 {
                let so_far: Vec<char> = chars.chars().collect();
                let n = so_far.len();
                let is_array_assign = if n >= 3 && so_far[n - 2] == '+' && so_far[n - 1] == '=' {
                    is_array_assignment_prefix(&so_far[..n - 2])
                } else if n >= 2 && so_far[n - 1] == '=' {
                    is_array_assignment_prefix(&so_far[..n - 1])
                } else {
                    false
                };
                if is_array_assign && (at_command_start || in_assign_builtin) {
                    match self.parse_array_literal()? {
                        Some((node, text)) => {
                            parts.push(node);
                            chars.push_str(&text);
                        }
                        None => break,
                    }
                    continue;
                }
            }

            if self.options.extglob && ctx == WordContext::Normal && is_extglob_prefix(ch) && next == Some('(') {
                self.consume_into(&mut chars);
                self.consume_into(&mut chars);
                self.read_extglob_body(&mut chars)?;
                continue;
            }
            if ctx == WordContext::Normal && self.state.eof_token && self.eof_token == Some(ch) && bracket_depth == 0 {
                if chars.is_empty() {
                    self.consume_into(&mut chars);
                }
                break;
            }
            if ctx == WordContext::Normal && is_metachar(ch) && bracket_depth == 0 {
                break;
            }
            self.consume_into(&mut chars);
        }

        if let Some(bracket_pos) = bracket_start {
            if bracket_depth > 0 && self.at_end() {
                return Err(self.matched_pair_error("unexpected EOF looking for `]'", bracket_pos));
            }
        }
        if chars.is_empty() {
            return Ok(None);
        }
        Ok(Some(Word::new(chars, parts)))
    }

    // The `(` of an extglob group is already consumed.
    fn read_extglob_body(&mut self, chars: &mut String) -> ParseResult<()> {
        let content = self.parse_matched_pair(self.pos.saturating_sub(2), '(', ')', MatchedPairFlags::EXTGLOB, false)?;
        chars.push_str(&content);
        chars.push(')');
        Ok(())
    }

    // Double-quoted span of a command word; the opening quote is consumed.
    fn read_double_quoted_word_part(&mut self, chars: &mut String, parts: &mut Vec<Node>, start: usize) -> ParseResult<()> {
        chars.push('"');
        self.in_double_quotes(|p| {
            while let Some(c) = p.peek() {
                if c == '"' {
                    break;
                }
                if c == '\\' && p.peek_at(1).is_some() {
                    if p.peek_at(1) == Some('\n') {
                        p.pos += 2;
                    } else {
                        p.consume_into(chars);
                        p.consume_into(chars);
                    }
                } else if c == '$' {
                    if !p.parse_dollar_expansion(chars, parts)? {
                        p.consume_into(chars);
                    }
                } else if c == '`' {
                    match p.parse_backtick_substitution()? {
                        Some((node, text)) => {
                            parts.push(node);
                            chars.push_str(&text);
                        }
                        None => p.consume_into(chars),
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

    fn read_word(&mut self) -> ParseResult<Option<Token>> {
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let is_procsub = is_redirect_char(c) && self.peek_at(1) == Some('(');
        let is_regex_paren = self.word_context == WordContext::Regex && (c == '(' || c == ')');
        if is_metachar(c) && !is_procsub && !is_regex_paren {
            return Ok(None);
        }
        let flags = (self.word_context, self.at_command_start, self.in_array_literal, self.in_assign_builtin);
        let word = self.read_word_internal(flags.0, flags.1, flags.2, flags.3);
        // A substitution inside the word runs a nested parse that resets these
        (self.word_context, self.at_command_start, self.in_array_literal, self.in_assign_builtin) = flags;
        Ok(word?.map(|w| Token::word(w, start)))
    }
}

fn is_special_extglob_param(text: &str) -> bool {
    let mut it = text.chars();
    matches!((it.next(), it.next(), it.next()), (Some('$'), Some('?' | '*' | '@'), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn tokens(input: &str) -> Vec<Token> {
        Parser::new(input, ParserOptions::default()).tokenize().unwrap()
    }

    #[test]
    fn test_simple_command() {
        let tokens = tokens("echo hello");
        assert_eq!(tokens.len(), 3); // echo, hello, EOF
        assert_eq!(tokens[0].token_type, TokenType::Word);
        assert_eq!(tokens[0].value, "echo");
        assert_eq!(tokens[1].value, "hello");
        assert_eq!(tokens[1].pos, 5);
        assert_eq!(tokens[2].token_type, TokenType::Eof);
    }

    #[test]
    fn test_operators_maximal_munch() {
        let types: Vec<TokenType> = tokens("a &>> b;;& c |& d <<- e")
            .iter()
            .map(|t| t.token_type)
            .collect();
        assert_eq!(
            types,
            vec![
                TokenType::Word,
                TokenType::AndDGreat,
                TokenType::Word,
                TokenType::SemiSemiAnd,
                TokenType::Word,
                TokenType::PipeAmp,
                TokenType::Word,
                TokenType::DLessDash,
                TokenType::Word,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_quotes_stay_in_word() {
        let tokens = tokens("echo \"hello world\" 'a b'");
        assert_eq!(tokens[1].value, "\"hello world\"");
        assert_eq!(tokens[2].value, "'a b'");
    }

    #[test]
    fn test_comment_skipped() {
        let tokens = tokens("echo hi # note\nls");
        assert_eq!(tokens[2].token_type, TokenType::Newline);
        assert_eq!(tokens[3].value, "ls");
    }

    #[test]
    fn test_hash_inside_word() {
        let tokens = tokens("echo a#b");
        assert_eq!(tokens[1].value, "a#b");
    }

    #[test]
    fn test_process_substitution_is_word() {
        let tokens = tokens("diff <(ls) >(cat)");
        assert_eq!(tokens[1].token_type, TokenType::Word);
        assert_eq!(tokens[1].value, "<(ls)");
        let word = tokens[1].word.as_ref().unwrap();
        assert_eq!(word.parts[0].kind(), "procsub");
    }

    #[test]
    fn test_word_parts_for_expansions() {
        let tokens = tokens("echo $x${y}$(z)");
        let word = tokens[1].word.as_ref().unwrap();
        assert_eq!(word.value, "$x${y}$(z)");
        let kinds: Vec<&str> = word.parts.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec!["param", "param", "cmdsub"]);
    }

    #[test]
    fn test_unterminated_single_quote() {
        let err = Parser::new("echo 'abc", ParserOptions::default()).tokenize().unwrap_err();
        assert_eq!(err.message(), "Unterminated single quote");
        assert_eq!(err.pos(), Some(5));
    }

    #[test]
    fn test_matched_pair_skips_nested_quotes() {
        let mut parser = Parser::new("a ')' \"}\" b) rest", ParserOptions::default());
        let text = parser.parse_matched_pair(0, '(', ')', MatchedPairFlags::NONE, false).unwrap();
        assert_eq!(text, "a ')' \"}\" b");
        assert_eq!(parser.pos, 12);
    }

    #[test]
    fn test_matched_pair_eof() {
        let mut parser = Parser::new("x{abc", ParserOptions::default());
        parser.pos = 2;
        let err = parser.parse_matched_pair(1, '{', '}', MatchedPairFlags::NONE, false).unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos(), Some(1));
        assert_eq!(err.message(), "unexpected EOF while looking for matching `}'");
    }

    #[test]
    fn test_peek_then_next_reuses_token() {
        let mut parser = Parser::new("foo bar", ParserOptions::default());
        let peeked = parser.peek_token().unwrap();
        assert_eq!(parser.pos, 0);
        let next = parser.next_token().unwrap();
        assert_eq!(peeked, next);
        assert_eq!(parser.pos, 3);
    }

    #[test]
    fn test_extglob_word() {
        let options = ParserOptions { extglob: true };
        let tokens = Parser::new("ls @(a|b) !(c)", options).tokenize().unwrap();
        assert_eq!(tokens[1].value, "@(a|b)");
        assert_eq!(tokens[2].value, "!(c)");
    }
}
