//! Command and Process Substitution Parsing
//!
//! Pure scanners that find where a quoted string, `$(...)`, `${...}` or an
//! embedded here-document ends without building nodes, plus the parser
//! entry points for `$(...)`, `${ ...; }`, backticks, `<(...)`/`>(...)` and
//! array literals.

use log::{debug, trace};

use crate::ast::types::{Node, Word, AST};
use crate::parser::parser::Parser;
use crate::parser::quote_state::{QuoteState, SavedParserState};
use crate::parser::types::{DolbraceState, MatchedPairFlags, ParseResult};
use crate::parser::word_parser::{
    count_trailing_backslashes, is_blank, is_escape_in_backtick, is_expansion_start, is_metachar,
    is_quote, is_whitespace, is_word_boundary, skip_subscript, starts_with_at,
    strip_line_continuations_comment_aware,
};

// =============================================================================
// PURE SCANNERS
// =============================================================================

/// `start` is just past the opening `'`. Returns the offset after the closing quote.
pub fn skip_single_quoted(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i] != '\'' {
        i += 1;
    }
    if i < chars.len() {
        i + 1
    } else {
        i
    }
}

/// `start` is just past the opening `"`. Nested `$(..)`, `${..}` and
/// backticks are skipped whole.
pub fn skip_double_quoted(chars: &[char], start: usize) -> usize {
    let n = chars.len();
    let mut i = start;
    let mut pass_next = false;
    let mut backq = false;
    while i < n {
        let c = chars[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if c == '`' {
            backq = true;
            i += 1;
            continue;
        }
        if c == '$' && i + 1 < n {
            if chars[i + 1] == '(' {
                i = find_cmdsub_end(chars, i + 2);
                continue;
            }
            if chars[i + 1] == '{' {
                i = find_braced_param_end(chars, i + 2);
                continue;
            }
        }
        if c == '"' {
            return i + 1;
        }
        i += 1;
    }
    i
}

/// `start` is on the opening backtick.
pub fn skip_backtick(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() && chars[i] != '`' {
        if chars[i] == '\\' && i + 1 < chars.len() {
            i += 2;
        } else {
            i += 1;
        }
    }
    if i < chars.len() {
        i += 1;
    }
    i
}

/// `$((` at `start` closes with `))` rather than `) )`, so it is arithmetic.
pub fn is_valid_arithmetic_start(chars: &[char], start: usize) -> bool {
    let mut depth = 0usize;
    let mut i = start + 3;
    while i < chars.len() {
        if is_expansion_start(chars, i, "$(") {
            i = find_cmdsub_end(chars, i + 2);
            continue;
        }
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                if depth > 0 {
                    depth -= 1;
                } else {
                    return chars.get(i + 1) == Some(&')');
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Find the end of a `$(...)` body that starts at `start` (just past the
/// `(`). Returns the offset after the closing `)`, or the input length.
///
/// Case patterns, comments, here-strings, here-documents and nested
/// arithmetic are skipped so their parentheses do not count.
pub fn find_cmdsub_end(chars: &[char], start: usize) -> usize {
    let n = chars.len();
    let mut depth = 1usize;
    let mut i = start;
    let mut case_depth = 0usize;
    let mut in_case_patterns = false;
    let mut arith_depth = 0usize;
    let mut arith_paren_depth = 0usize;
    while i < n && depth > 0 {
        let c = chars[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' {
            i = skip_single_quoted(chars, i + 1);
            continue;
        }
        if c == '"' {
            i = skip_double_quoted(chars, i + 1);
            continue;
        }
        if c == '#'
            && arith_depth == 0
            && (i == start || matches!(chars[i - 1], ' ' | '\t' | '\n' | ';' | '|' | '&' | '(' | ')'))
        {
            while i < n && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if starts_with_at(chars, i, "<<<") {
            i = skip_herestring_word(chars, i + 3);
            continue;
        }
        if is_expansion_start(chars, i, "$((") {
            if is_valid_arithmetic_start(chars, i) {
                arith_depth += 1;
                i += 3;
            } else {
                i = find_cmdsub_end(chars, i + 2);
            }
            continue;
        }
        if arith_depth > 0 && arith_paren_depth == 0 && starts_with_at(chars, i, "))") {
            arith_depth -= 1;
            i += 2;
            continue;
        }
        if c == '`' {
            i = skip_backtick(chars, i);
            continue;
        }
        if arith_depth == 0 && starts_with_at(chars, i, "<<") {
            i = skip_heredoc(chars, i);
            continue;
        }
        if starts_with_at(chars, i, "case") && is_word_boundary(chars, i, 4) {
            case_depth += 1;
            in_case_patterns = false;
            i += 4;
            continue;
        }
        if case_depth > 0 && starts_with_at(chars, i, "in") && is_word_boundary(chars, i, 2) {
            in_case_patterns = true;
            i += 2;
            continue;
        }
        if starts_with_at(chars, i, "esac") && is_word_boundary(chars, i, 4) {
            if case_depth > 0 {
                case_depth -= 1;
                in_case_patterns = false;
            }
            i += 4;
            continue;
        }
        if starts_with_at(chars, i, ";;") {
            i += 2;
            continue;
        }
        let in_patterns = in_case_patterns && case_depth > 0;
        if c == '(' {
            if !in_patterns {
                if arith_depth > 0 {
                    arith_paren_depth += 1;
                } else {
                    depth += 1;
                }
            }
        } else if c == ')' {
            if in_patterns {
                if !lookahead_for_esac(chars, i + 1, case_depth) {
                    depth -= 1;
                }
            } else if arith_depth > 0 {
                arith_paren_depth = arith_paren_depth.saturating_sub(1);
            } else {
                depth -= 1;
            }
        }
        i += 1;
    }
    i
}

// The word following `<<<`: blanks, then a quoted string or a bare word.
fn skip_herestring_word(chars: &[char], start: usize) -> usize {
    let n = chars.len();
    let mut i = start;
    while i < n && is_blank(chars[i]) {
        i += 1;
    }
    if i < n && chars[i] == '"' {
        i += 1;
        while i < n && chars[i] != '"' {
            i += if chars[i] == '\\' && i + 1 < n { 2 } else { 1 };
        }
        if i < n {
            i += 1;
        }
    } else if i < n && chars[i] == '\'' {
        i += 1;
        while i < n && chars[i] != '\'' {
            i += 1;
        }
        if i < n {
            i += 1;
        }
    } else {
        while i < n && !matches!(chars[i], ' ' | '\t' | '\n' | ';' | '|' | '&' | '<' | '>' | '(' | ')') {
            i += 1;
        }
    }
    i
}

/// Find the end of a `${...}` body that starts at `start` (just past the `{`).
pub fn find_braced_param_end(chars: &[char], start: usize) -> usize {
    let n = chars.len();
    let mut depth = 1usize;
    let mut i = start;
    let mut in_double = false;
    let mut state = DolbraceState::Param;
    while i < n && depth > 0 {
        let c = chars[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' && state == DolbraceState::Quote && !in_double {
            i = skip_single_quoted(chars, i + 1);
            continue;
        }
        if c == '"' {
            in_double = !in_double;
            i += 1;
            continue;
        }
        if in_double {
            i += 1;
            continue;
        }
        if state == DolbraceState::Param {
            if matches!(c, '%' | '#' | '^' | ',') {
                state = DolbraceState::Quote;
            } else if matches!(c, ':' | '-' | '=' | '?' | '+' | '/') {
                state = DolbraceState::Word;
            }
        }
        if c == '[' && state == DolbraceState::Param {
            if let Some(end) = skip_subscript(chars, i, false) {
                i = end;
                continue;
            }
        }
        if (c == '<' || c == '>') && chars.get(i + 1) == Some(&'(') {
            i = find_cmdsub_end(chars, i + 2);
            continue;
        }
        if c == '{' {
            depth += 1;
        } else if c == '}' {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        if is_expansion_start(chars, i, "$(") {
            i = find_cmdsub_end(chars, i + 2);
            continue;
        }
        if is_expansion_start(chars, i, "${") {
            i = find_braced_param_end(chars, i + 2);
            continue;
        }
        i += 1;
    }
    i
}

// Read one logical line starting at `start`, joining lines that end in an
// odd number of backslashes. Returns (line, end offset of the last physical line).
fn read_logical_line(chars: &[char], start: usize) -> (String, usize) {
    let n = chars.len();
    let mut line_end = start;
    while line_end < n && chars[line_end] != '\n' {
        line_end += 1;
    }
    let mut line: String = chars[start..line_end].iter().collect();
    while line_end < n {
        if count_trailing_backslashes(&line) % 2 == 0 {
            break;
        }
        line.pop();
        line_end += 1;
        let next_start = line_end;
        while line_end < n && chars[line_end] != '\n' {
            line_end += 1;
        }
        line.extend(chars[next_start..line_end].iter());
    }
    (line, line_end)
}

// Outcome of matching one body line against a heredoc delimiter.
enum DelimiterMatch {
    Exact,
    /// The line starts with the delimiter followed by more text (`EOF)`).
    /// Holds the number of characters up to and including the delimiter.
    Prefix(usize),
    None,
}

fn match_delimiter_line(line: &str, delimiter: &str, strip_tabs: bool) -> DelimiterMatch {
    let stripped = if strip_tabs { line.trim_start_matches('\t') } else { line };
    if stripped == delimiter {
        return DelimiterMatch::Exact;
    }
    if stripped.starts_with(delimiter) && stripped.chars().count() > delimiter.chars().count() {
        let tabs = line.chars().count() - stripped.chars().count();
        return DelimiterMatch::Prefix(tabs + delimiter.chars().count());
    }
    DelimiterMatch::None
}

/// Skip a `<<DELIM` redirect and its body inside a command substitution.
/// `start` is on the first `<`.
pub fn skip_heredoc(chars: &[char], start: usize) -> usize {
    let n = chars.len();
    let mut i = start + 2;
    let strip_tabs = chars.get(i) == Some(&'-');
    if strip_tabs {
        i += 1;
    }
    while i < n && is_blank(chars[i]) {
        i += 1;
    }

    let delimiter: String;
    if i < n && (chars[i] == '"' || chars[i] == '\'') {
        let quote_char = chars[i];
        i += 1;
        let delim_start = i;
        while i < n && chars[i] != quote_char {
            i += 1;
        }
        delimiter = chars[delim_start..i].iter().collect();
        if i < n {
            i += 1;
        }
    } else if i < n && chars[i] == '\\' {
        i += 1;
        let delim_start = i;
        if i < n {
            i += 1;
        }
        while i < n && !is_metachar(chars[i]) {
            i += 1;
        }
        delimiter = chars[delim_start..i].iter().collect();
    } else {
        let delim_start = i;
        while i < n && !is_metachar(chars[i]) {
            i += 1;
        }
        delimiter = chars[delim_start..i].iter().collect();
    }

    // Rest of the redirecting line. A `)` at depth 0 closes the substitution
    // before any body starts.
    let mut paren_depth = 0usize;
    let mut quote = QuoteState::new();
    let mut in_backtick = false;
    while i < n && chars[i] != '\n' {
        let c = chars[i];
        if c == '\\' && i + 1 < n && (quote.double || in_backtick) {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double && !in_backtick {
            quote.single = !quote.single;
            i += 1;
            continue;
        }
        if c == '"' && !quote.single && !in_backtick {
            quote.double = !quote.double;
            i += 1;
            continue;
        }
        if c == '`' && !quote.single {
            in_backtick = !in_backtick;
            i += 1;
            continue;
        }
        if quote.in_quotes() || in_backtick {
            i += 1;
            continue;
        }
        if c == '(' {
            paren_depth += 1;
        } else if c == ')' {
            if paren_depth == 0 {
                break;
            }
            paren_depth -= 1;
        }
        i += 1;
    }
    if i < n && chars[i] == ')' {
        return i;
    }
    if i < n && chars[i] == '\n' {
        i += 1;
    }

    while i < n {
        let line_start = i;
        let (line, line_end) = read_logical_line(chars, line_start);
        match match_delimiter_line(&line, &delimiter, strip_tabs) {
            DelimiterMatch::Exact => return if line_end < n { line_end + 1 } else { line_end },
            DelimiterMatch::Prefix(len) => return line_start + len,
            DelimiterMatch::None => {}
        }
        i = if line_end < n { line_end + 1 } else { line_end };
    }
    i
}

/// Locate the bodies of heredocs whose redirects appeared inside a backtick
/// substitution. The bodies start on the line after `start`. Returns
/// `(content_start, content_end)`; both equal `start` when nothing is found.
pub fn find_heredoc_content_end(chars: &[char], start: usize, delimiters: &[(String, bool)]) -> (usize, usize) {
    let n = chars.len();
    if delimiters.is_empty() {
        return (start, start);
    }
    let mut pos = start;
    while pos < n && chars[pos] != '\n' {
        pos += 1;
    }
    if pos >= n {
        return (start, start);
    }
    let content_start = pos;
    pos += 1;
    for (delimiter, strip_tabs) in delimiters {
        while pos < n {
            let line_start = pos;
            let (line, line_end) = read_logical_line(chars, line_start);
            match match_delimiter_line(&line, delimiter, *strip_tabs) {
                DelimiterMatch::Exact => {
                    pos = if line_end < n { line_end + 1 } else { line_end };
                    break;
                }
                DelimiterMatch::Prefix(len) => {
                    pos = line_start + len;
                    break;
                }
                DelimiterMatch::None => {
                    pos = if line_end < n { line_end + 1 } else { line_end };
                }
            }
        }
    }
    (content_start, pos)
}

/// Inside case patterns, decide whether the `esac` closing `case_depth`
/// open case statements appears before an unmatched `)`.
pub fn lookahead_for_esac(chars: &[char], start: usize, case_depth: usize) -> bool {
    let mut i = start;
    let mut depth = case_depth;
    let mut quote = QuoteState::new();
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() && quote.double {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double {
            quote.single = !quote.single;
            i += 1;
            continue;
        }
        if c == '"' && !quote.single {
            quote.double = !quote.double;
            i += 1;
            continue;
        }
        if quote.in_quotes() {
            i += 1;
            continue;
        }
        if starts_with_at(chars, i, "case") && is_word_boundary(chars, i, 4) {
            depth += 1;
            i += 4;
        } else if starts_with_at(chars, i, "esac") && is_word_boundary(chars, i, 4) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return true;
            }
            i += 4;
        } else if c == ')' {
            if depth == 0 {
                break;
            }
            i += 1;
        } else {
            i += 1;
        }
    }
    false
}

// =============================================================================
// SUBSTITUTION PARSERS
// =============================================================================

// Raw text and unescaped content of a backtick substitution, built together.
struct BacktickBuffers {
    content: String,
    text: String,
}

impl BacktickBuffers {
    fn push(&mut self, c: char) {
        self.content.push(c);
        self.text.push(c);
    }

    fn push_str(&mut self, s: &str) {
        self.content.push_str(s);
        self.text.push_str(s);
    }
}

impl Parser {
    /// Parse `$(...)` at the cursor. Returns `None` (cursor unchanged) when
    /// the body does not end at a `)`.
    pub(crate) fn parse_command_substitution(&mut self) -> ParseResult<Option<(Node, String)>> {
        if !self.starts_with("$(") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;

        let saved = self.enter_nested_list(')');
        self.state.cmd_subst = true;
        match self.parse_nested_list_body(')') {
            Ok(Some(cmd)) => {
                let text = self.slice(start, self.pos);
                self.leave_nested_list(saved);
                Ok(Some((AST::command_substitution(cmd, false), text)))
            }
            Ok(None) => {
                debug!("command substitution at {} does not close, backtracking", start);
                self.restore_state(saved);
                self.pos = start;
                Ok(None)
            }
            Err(err) => {
                self.restore_state(saved);
                Err(err)
            }
        }
    }

    /// Parse the body of a funsub `${ cmd; }` or `${| cmd; }`. The cursor is
    /// just past `${`; `start` is the offset of the `$`.
    pub(crate) fn parse_funsub(&mut self, start: usize) -> ParseResult<(Node, String)> {
        if self.peek() == Some('|') {
            self.advance();
        }
        let saved = self.enter_nested_list('}');
        self.state.cmd_subst = true;
        match self.parse_nested_list_body('}') {
            Ok(Some(cmd)) => {
                let text = self.slice(start, self.pos);
                self.leave_nested_list(saved);
                Ok((AST::command_substitution(cmd, true), text))
            }
            Ok(None) => {
                self.restore_state(saved);
                Err(self.matched_pair_error("unexpected EOF looking for `}'", start))
            }
            Err(err) => {
                self.restore_state(saved);
                Err(err)
            }
        }
    }

    /// Parse a backtick substitution. Escaped `$`, `` ` `` and `\` are
    /// unescaped in the content handed to the sub-parser; here-documents
    /// opened inside are carried along, including bodies that only start
    /// after the closing backtick.
    pub(crate) fn parse_backtick_substitution(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('`') {
            return Ok(None);
        }
        let start = self.pos;
        self.advance();

        let mut buf = BacktickBuffers {
            content: String::new(),
            text: String::from('`'),
        };
        let mut pending: Vec<(String, bool)> = Vec::new();
        let mut current: Option<(String, bool)> = None;

        while !self.at_end() && (current.is_some() || self.peek() != Some('`')) {
            if let Some((delimiter, strip_tabs)) = current.clone() {
                let line_start = self.pos;
                let mut line_end = line_start;
                while line_end < self.src.len() && self.src[line_end] != '\n' {
                    line_end += 1;
                }
                let line = self.slice(line_start, line_end);
                match match_delimiter_line(&line, &delimiter, strip_tabs) {
                    DelimiterMatch::Prefix(len) => {
                        let head: String = line.chars().take(len).collect();
                        buf.push_str(&head);
                        self.pos = line_start + len;
                        current = None;
                    }
                    found => {
                        buf.push_str(&line);
                        self.pos = line_end;
                        if self.peek() == Some('\n') {
                            buf.push('\n');
                            self.advance();
                        }
                        if matches!(found, DelimiterMatch::Exact) {
                            current = None;
                        }
                    }
                }
                if current.is_none() && !pending.is_empty() {
                    current = Some(pending.remove(0));
                }
                continue;
            }

            let Some(c) = self.peek() else { break };

            if c == '\\' && self.pos + 1 < self.src.len() {
                let next = self.src[self.pos + 1];
                if next == '\n' {
                    self.pos += 2;
                } else if is_escape_in_backtick(next) {
                    self.pos += 2;
                    buf.content.push(next);
                    buf.text.push('\\');
                    buf.text.push(next);
                } else {
                    self.advance();
                    buf.push(c);
                }
                continue;
            }

            if self.starts_with("<<<") {
                self.pos += 3;
                buf.push_str("<<<");
                self.copy_blanks(&mut buf);
                while let Some(ch) = self.peek() {
                    if is_whitespace(ch) || ch == '(' || ch == ')' {
                        break;
                    }
                    if ch == '\\' && self.pos + 1 < self.src.len() {
                        self.copy_chars(&mut buf, 2);
                    } else if ch == '"' || ch == '\'' {
                        self.copy_quoted(&mut buf, ch, None);
                    } else {
                        self.copy_chars(&mut buf, 1);
                    }
                }
                continue;
            }

            if self.starts_with("<<") {
                self.pos += 2;
                buf.push_str("<<");
                let strip_tabs = self.peek() == Some('-');
                if strip_tabs {
                    self.copy_chars(&mut buf, 1);
                }
                self.copy_blanks(&mut buf);
                let mut delimiter = String::new();
                match self.peek() {
                    Some(q) if is_quote(q) => self.copy_quoted(&mut buf, q, Some(&mut delimiter)),
                    Some('\\') => {
                        self.copy_chars(&mut buf, 1);
                        while let Some(dch) = self.peek() {
                            if !delimiter.is_empty() && is_metachar(dch) {
                                break;
                            }
                            delimiter.push(dch);
                            self.copy_chars(&mut buf, 1);
                        }
                    }
                    Some(_) => {
                        while let Some(ch) = self.peek() {
                            if is_metachar(ch) || ch == '`' {
                                break;
                            }
                            if is_quote(ch) {
                                self.copy_quoted(&mut buf, ch, Some(&mut delimiter));
                            } else if ch == '\\' {
                                self.copy_chars(&mut buf, 1);
                                if let Some(dch) = self.peek() {
                                    delimiter.push(dch);
                                    self.copy_chars(&mut buf, 1);
                                }
                            } else {
                                delimiter.push(ch);
                                self.copy_chars(&mut buf, 1);
                            }
                        }
                    }
                    None => {}
                }
                if !delimiter.is_empty() {
                    pending.push((delimiter, strip_tabs));
                }
                continue;
            }

            if c == '\n' {
                self.advance();
                buf.push('\n');
                if !pending.is_empty() {
                    current = Some(pending.remove(0));
                }
                continue;
            }

            self.advance();
            buf.push(c);
        }

        if self.at_end() {
            return Err(self.error("Unterminated backtick", start));
        }
        self.advance();
        buf.text.push('`');

        if !pending.is_empty() {
            let (body_start, body_end) = find_heredoc_content_end(&self.src, self.pos, &pending);
            if body_end > body_start {
                let body = self.slice(body_start, body_end);
                buf.content.push_str(&body);
                self.cmdsub_heredoc_end = Some(self.cmdsub_heredoc_end.map_or(body_end, |end| end.max(body_end)));
            }
        }

        let cmd = self.parse_nested(&buf.content)?.unwrap_or(Node::Empty);
        Ok(Some((AST::command_substitution(cmd, false), buf.text)))
    }

    fn copy_chars(&mut self, buf: &mut BacktickBuffers, count: usize) {
        for _ in 0..count {
            if let Some(c) = self.advance() {
                buf.push(c);
            }
        }
    }

    fn copy_blanks(&mut self, buf: &mut BacktickBuffers) {
        while self.peek().map_or(false, is_blank) {
            self.copy_chars(buf, 1);
        }
    }

    // Copy a quoted run; the characters between the quotes also go to `inner`.
    fn copy_quoted(&mut self, buf: &mut BacktickBuffers, quote: char, mut inner: Option<&mut String>) {
        self.copy_chars(buf, 1);
        while let Some(ch) = self.peek() {
            if ch == quote {
                break;
            }
            if inner.is_none() && quote == '"' && ch == '\\' {
                self.copy_chars(buf, 1);
                if self.at_end() {
                    break;
                }
            }
            if let (Some(inner), Some(ch)) = (inner.as_deref_mut(), self.peek()) {
                inner.push(ch);
            }
            self.copy_chars(buf, 1);
        }
        if !self.at_end() {
            self.copy_chars(buf, 1);
        }
    }

    /// Parse `<(...)` or `>(...)`. When the body does not parse as a command
    /// list the raw text is still consumed and returned with no node.
    pub(crate) fn parse_process_substitution(&mut self) -> ParseResult<Option<(Option<Node>, String)>> {
        let Some(direction) = self.peek().filter(|&c| c == '<' || c == '>') else {
            return Ok(None);
        };
        if self.peek_at(1) != Some('(') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;

        let old_in_process_sub = self.in_process_sub;
        self.in_process_sub = true;
        let saved = self.enter_nested_list(')');
        let attempt = self.parse_nested_list_body(')');
        self.in_process_sub = old_in_process_sub;

        if let Ok(Some(cmd)) = attempt {
            self.leave_nested_list(saved);
            let text = strip_line_continuations_comment_aware(&self.slice(start, self.pos));
            let node = Node::ProcessSubstitution {
                direction: direction.to_string(),
                command: Box::new(cmd),
            };
            return Ok(Some((Some(node), text)));
        }

        self.restore_state(saved);
        debug!("process substitution at {} is not a command list, scanning raw text", start);
        if matches!(self.char_at(start + 2), Some(' ' | '\t' | '\n')) {
            return Err(self.error("Invalid process substitution", start));
        }
        self.pos = start + 2;
        self.parse_matched_pair(start, '(', ')', MatchedPairFlags::NONE, false)?;
        let text = strip_line_continuations_comment_aware(&self.slice(start, self.pos));
        Ok(Some((None, text)))
    }

    // Save state and start a command list bounded by `closer`, with an
    // empty heredoc queue of its own.
    fn enter_nested_list(&mut self, closer: char) -> SavedParserState {
        let saved = self.save_state();
        self.pending_heredocs.clear();
        self.ctx.push();
        self.state.eof_token = true;
        self.eof_token = Some(closer);
        trace!("nested list up to {:?} at {}, context depth {}", closer, self.pos, self.ctx.depth());
        saved
    }

    // Heredocs the nested list left unread are read after the enclosing
    // line's own.
    fn leave_nested_list(&mut self, saved: SavedParserState) {
        let unread = std::mem::take(&mut self.pending_heredocs);
        self.restore_state(saved);
        self.pending_heredocs.extend(unread);
    }

    fn parse_nested_list_body(&mut self, closer: char) -> ParseResult<Option<Node>> {
        let cmd = self.parse_list(true)?.unwrap_or(Node::Empty);
        self.skip_whitespace_and_newlines();
        if self.peek() != Some(closer) {
            return Ok(None);
        }
        self.advance();
        Ok(Some(cmd))
    }

    /// Parse `(elem ...)` after `name=` or `name+=`.
    pub(crate) fn parse_array_literal(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('(') {
            return Ok(None);
        }
        let start = self.pos;
        self.advance();
        self.state.comp_assign = true;
        let result = self.parse_array_elements(start);
        self.state.comp_assign = false;
        let elements = result?;
        let text = self.slice(start, self.pos);
        Ok(Some((Node::Array { elements }, text)))
    }

    fn parse_array_elements(&mut self, start: usize) -> ParseResult<Vec<Word>> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace_and_newlines();
            if self.at_end() {
                return Err(self.error("Unterminated array literal", start));
            }
            if self.peek() == Some(')') {
                break;
            }
            match self.parse_word(false, true, false)? {
                Some(word) => elements.push(word),
                None if self.peek() == Some(')') => break,
                None => return Err(self.error("Expected word in array literal", self.pos)),
            }
        }
        if self.peek() != Some(')') {
            return Err(self.error("Expected ) to close array literal", self.pos));
        }
        self.advance();
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_skip_quoted() {
        let s = chars("'abc' rest");
        assert_eq!(skip_single_quoted(&s, 1), 5);
        let s = chars("\"a\\\"b $(echo \")\") c\" tail");
        assert_eq!(skip_double_quoted(&s, 1), 20);
        let s = chars("'open");
        assert_eq!(skip_single_quoted(&s, 1), 5);
    }

    #[test]
    fn test_skip_backtick() {
        let s = chars("`echo \\` x` y");
        assert_eq!(skip_backtick(&s, 0), 11);
    }

    #[test]
    fn test_find_cmdsub_end_nested() {
        let s = chars("$(echo $(date) ')') after");
        assert_eq!(find_cmdsub_end(&s, 2), 19);
    }

    #[test]
    fn test_find_cmdsub_end_case_patterns() {
        let s = chars("$(case x in a) echo;; esac) z");
        assert_eq!(find_cmdsub_end(&s, 2), 27);
    }

    #[test]
    fn test_find_cmdsub_end_comment_and_arith() {
        let s = chars("$(echo # )\n$((1+2)) )");
        assert_eq!(find_cmdsub_end(&s, 2), s.len());
    }

    #[test]
    fn test_find_cmdsub_end_heredoc() {
        let s = chars("$(cat <<EOF\n)\nEOF\n)");
        assert_eq!(find_cmdsub_end(&s, 2), s.len());
    }

    #[test]
    fn test_is_valid_arithmetic_start() {
        assert!(is_valid_arithmetic_start(&chars("$((1+(2)))"), 0));
        assert!(!is_valid_arithmetic_start(&chars("$((cd a) && (cd b))"), 0));
    }

    #[test]
    fn test_find_braced_param_end() {
        let s = chars("${a:-${b}} x");
        assert_eq!(find_braced_param_end(&s, 2), 10);
        let s = chars("${a[}]} x");
        assert_eq!(find_braced_param_end(&s, 2), 7);
    }

    #[test]
    fn test_skip_heredoc_body() {
        let s = chars("<<-EOF\n\tbody\n\tEOF\nnext");
        assert_eq!(skip_heredoc(&s, 0), 18);
        let s = chars("<<EOF)");
        assert_eq!(skip_heredoc(&s, 0), 5);
    }

    #[test]
    fn test_find_heredoc_content_end() {
        let s = chars("` x\nbody\nEOF\nrest");
        let (start, end) = find_heredoc_content_end(&s, 1, &[("EOF".to_string(), false)]);
        assert_eq!(start, 3);
        assert_eq!(end, 13);
        assert_eq!(find_heredoc_content_end(&s, 1, &[]), (1, 1));
    }

    #[test]
    fn test_lookahead_for_esac() {
        let s = chars(" echo;; esac)");
        assert!(lookahead_for_esac(&s, 0, 1));
        let s = chars(" echo )");
        assert!(!lookahead_for_esac(&s, 0, 0));
    }
}
