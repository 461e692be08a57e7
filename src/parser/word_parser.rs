//! Word Parsing Utilities
//!
//! Character classes and pure scanning helpers shared by the lexer, the
//! parser and the S-expression projection. All scanners work on a `&[char]`
//! view of the source so positions are Unicode scalar offsets.

use crate::parser::parser_substitution::{find_braced_param_end, find_cmdsub_end, skip_double_quoted, skip_single_quoted};

// =============================================================================
// CHARACTER CLASSES
// =============================================================================

pub fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>')
}

/// Characters that may follow `${` to open a funsub.
pub fn is_funsub_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|')
}

pub fn is_extglob_prefix(c: char) -> bool {
    matches!(c, '@' | '?' | '*' | '+' | '!')
}

pub fn is_redirect_char(c: char) -> bool {
    c == '<' || c == '>'
}

pub fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-' | '&')
}

pub fn is_special_param_unbraced(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-')
}

pub fn is_special_param_or_digit(c: char) -> bool {
    is_special_param(c) || c.is_ascii_digit()
}

/// Characters that may start an operator inside `${param...}`.
pub fn is_param_expansion_op(c: char) -> bool {
    matches!(
        c,
        ':' | '-' | '=' | '+' | '?' | '#' | '%' | '/' | '^' | ',' | '@' | '*' | '['
    )
}

pub fn is_simple_param_op(c: char) -> bool {
    matches!(c, '-' | '=' | '?' | '+')
}

/// Characters a backslash escapes inside backticks.
pub fn is_escape_in_backtick(c: char) -> bool {
    matches!(c, '$' | '`' | '\\')
}

/// Characters after `!` that make it a pipeline negation rather than a word.
pub fn is_negation_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '|' | ')' | '&' | '>' | '<')
}

pub fn is_word_end_context(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '|' | '&' | '<' | '>' | '(' | ')')
}

pub fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

pub fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// =============================================================================
// SCANNING
// =============================================================================

/// True if `chars[pos..]` starts with `prefix`.
pub fn starts_with_at(chars: &[char], pos: usize, prefix: &str) -> bool {
    let mut i = pos;
    for p in prefix.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

/// Number of unescaped `$` immediately before `pos`.
pub fn count_consecutive_dollars_before(chars: &[char], pos: usize) -> usize {
    let mut count = 0;
    let mut k = pos;
    while k > 0 && chars[k - 1] == '$' {
        let mut backslashes = 0;
        let mut j = k - 1;
        while j > 0 && chars[j - 1] == '\\' {
            backslashes += 1;
            j -= 1;
        }
        if backslashes % 2 == 1 {
            break;
        }
        count += 1;
        k -= 1;
    }
    count
}

/// True if `delim` starts at `pos` and is not swallowed by a preceding `$`
/// (as in `$$(`, where `$$` is the pid).
pub fn is_expansion_start(chars: &[char], pos: usize, delim: &str) -> bool {
    starts_with_at(chars, pos, delim) && count_consecutive_dollars_before(chars, pos) % 2 == 0
}

/// `word_len` characters at `pos` form a whole keyword, not part of a name.
pub fn is_word_boundary(chars: &[char], pos: usize, word_len: usize) -> bool {
    if pos > 0 {
        let prev = chars[pos - 1];
        if is_name_char(prev) || matches!(prev, '{' | '}' | '!') {
            return false;
        }
    }
    match chars.get(pos + word_len) {
        Some(&c) => !is_name_char(c),
        None => true,
    }
}

/// Skip a balanced `open`/`close` region starting at `start`, which must hold
/// `open`. With `literal`, quotes and expansions are not special. Returns the
/// offset just past the closing delimiter.
pub fn skip_matched_pair(
    chars: &[char],
    start: usize,
    open: char,
    close: char,
    literal: bool,
) -> Option<usize> {
    let n = chars.len();
    if start >= n || chars[start] != open {
        return None;
    }
    let mut i = start + 1;
    let mut depth = 1;
    let mut pass_next = false;
    let mut backq = false;
    while i < n && depth > 0 {
        let c = chars[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if !literal && c == '\\' {
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
        if !literal {
            if c == '`' {
                backq = true;
                i += 1;
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
            if is_expansion_start(chars, i, "$(") {
                i = find_cmdsub_end(chars, i + 2);
                continue;
            }
            if is_expansion_start(chars, i, "${") {
                i = find_braced_param_end(chars, i + 2);
                continue;
            }
        }
        if !literal && c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
        }
        i += 1;
    }
    if depth == 0 {
        Some(i)
    } else {
        None
    }
}

pub fn skip_subscript(chars: &[char], start: usize, literal: bool) -> Option<usize> {
    skip_matched_pair(chars, start, '[', ']', literal)
}

/// Offset of the `=` in an assignment word such as `a=1`, `a[i]+=x` or
/// `name+=v`.
pub fn assignment(chars: &[char], literal_subscript: bool) -> Option<usize> {
    if chars.is_empty() || !is_name_start(chars[0]) {
        return None;
    }
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '=' {
            return Some(i);
        }
        if c == '[' {
            i = skip_subscript(chars, i, literal_subscript)?;
            if chars.get(i) == Some(&'+') {
                i += 1;
            }
            return if chars.get(i) == Some(&'=') { Some(i) } else { None };
        }
        if c == '+' {
            return if chars.get(i + 1) == Some(&'=') { Some(i + 1) } else { None };
        }
        if !is_name_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

pub fn looks_like_assignment(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    assignment(&chars, false).is_some()
}

/// Text read so far is `name` or `name[sub]...`, so a following `=(` or
/// `+=(` opens an array literal.
pub fn is_array_assignment_prefix(chars: &[char]) -> bool {
    if chars.is_empty() || !is_name_start(chars[0]) {
        return false;
    }
    let mut i = 1;
    while i < chars.len() && is_name_char(chars[i]) {
        i += 1;
    }
    while i < chars.len() {
        if chars[i] != '[' {
            return false;
        }
        match skip_subscript(chars, i, true) {
            Some(end) => i = end,
            None => return false,
        }
    }
    true
}

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        _ => false,
    }
}

// =============================================================================
// TEXT NORMALIZATION
// =============================================================================

/// Remove `\<newline>` pairs outside comments. A continuation that ends a
/// comment keeps the newline so the comment still terminates.
pub fn strip_line_continuations_comment_aware(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_comment = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && chars.get(i + 1) == Some(&'\n') {
            let preceding = chars[..i].iter().rev().take_while(|&&b| b == '\\').count();
            if preceding % 2 == 0 {
                if in_comment {
                    out.push('\n');
                }
                i += 2;
                in_comment = false;
                continue;
            }
        }
        if c == '\n' {
            in_comment = false;
        } else if c == '\'' && !in_double && !in_comment {
            in_single = !in_single;
        } else if c == '"' && !in_single && !in_comment {
            in_double = !in_double;
        } else if c == '#' && !in_single && !in_comment {
            in_comment = true;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Collapse runs of blanks to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_ws = false;
    for c in s.chars() {
        if is_blank(c) {
            if !prev_ws {
                out.push(' ');
            }
            prev_ws = true;
        } else {
            out.push(c);
            prev_ws = false;
        }
    }
    out.trim().to_string()
}

pub fn count_trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '\\').count()
}

/// Canonical form of a heredoc delimiter for matching against body lines:
/// whitespace inside `$(..)`, `${..}`, `<(..)` and `>(..)` is collapsed.
pub fn normalize_heredoc_delimiter(delimiter: &str) -> String {
    let chars: Vec<char> = delimiter.chars().collect();
    let mut out = String::with_capacity(delimiter.len());
    let mut i = 0;
    while i < chars.len() {
        let group = match (chars[i], chars.get(i + 1)) {
            ('$', Some('(')) | ('<', Some('(')) | ('>', Some('(')) => Some(('(', ')')),
            ('$', Some('{')) => Some(('{', '}')),
            _ => None,
        };
        let Some((open, close)) = group else {
            out.push(chars[i]);
            i += 1;
            continue;
        };
        out.push(chars[i]);
        out.push(open);
        i += 2;
        let mut depth = 1;
        let mut inner = String::new();
        while i < chars.len() && depth > 0 {
            let c = chars[i];
            if c == open {
                depth += 1;
                inner.push(c);
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    out.push_str(&collapse_whitespace(&inner));
                    out.push(close);
                } else {
                    inner.push(c);
                }
            } else {
                inner.push(c);
            }
            i += 1;
        }
    }
    out
}

// =============================================================================
// PATTERN CONSUMERS
// =============================================================================

/// Consume `'...'` starting at `start`; returns (next offset, text).
pub fn consume_single_quote(chars: &[char], start: usize) -> (usize, String) {
    let mut text = String::from('\'');
    let mut i = start + 1;
    while i < chars.len() && chars[i] != '\'' {
        text.push(chars[i]);
        i += 1;
    }
    if i < chars.len() {
        text.push(chars[i]);
        i += 1;
    }
    (i, text)
}

/// Consume `"..."` starting at `start`, keeping escapes; returns (next offset, text).
pub fn consume_double_quote(chars: &[char], start: usize) -> (usize, String) {
    let mut text = String::from('"');
    let mut i = start + 1;
    while i < chars.len() && chars[i] != '"' {
        if chars[i] == '\\' && i + 1 < chars.len() {
            text.push(chars[i]);
            i += 1;
        }
        text.push(chars[i]);
        i += 1;
    }
    if i < chars.len() {
        text.push(chars[i]);
        i += 1;
    }
    (i, text)
}

/// A `]` appears before the pattern alternative (or extglob group) ends.
pub fn has_bracket_close(chars: &[char], start: usize, depth: usize) -> bool {
    for &c in chars.iter().skip(start) {
        if c == ']' {
            return true;
        }
        if (c == '|' || c == ')') && depth == 0 {
            return false;
        }
    }
    false
}

/// Consume a glob bracket class `[...]` at `start`. When no closing bracket
/// belongs to it, only the `[` is consumed. Returns (next offset, text,
/// whether a class was found).
pub fn consume_bracket_class(chars: &[char], start: usize, depth: usize) -> (usize, String, bool) {
    let n = chars.len();
    let mut scan = start + 1;
    if scan < n && (chars[scan] == '!' || chars[scan] == '^') {
        scan += 1;
    }
    if scan < n && chars[scan] == ']' && has_bracket_close(chars, scan + 1, depth) {
        scan += 1;
    }
    let mut is_bracket = false;
    while scan < n {
        let c = chars[scan];
        if c == ']' {
            is_bracket = true;
            break;
        }
        if (c == ')' || c == '|') && depth == 0 {
            break;
        }
        scan += 1;
    }
    if !is_bracket {
        return (start + 1, "[".to_string(), false);
    }
    let mut text = String::from('[');
    let mut i = start + 1;
    if i < n && (chars[i] == '!' || chars[i] == '^') {
        text.push(chars[i]);
        i += 1;
    }
    if i < n && chars[i] == ']' && has_bracket_close(chars, i + 1, depth) {
        text.push(chars[i]);
        i += 1;
    }
    while i < n && chars[i] != ']' {
        text.push(chars[i]);
        i += 1;
    }
    if i < n {
        text.push(chars[i]);
        i += 1;
    }
    (i, text, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_expansion_start_respects_pid() {
        let c = chars("$$(x)");
        assert!(!is_expansion_start(&c, 1, "$("));
        let c = chars("a$(x)");
        assert!(is_expansion_start(&c, 1, "$("));
        let c = chars("\\$$(x)");
        assert!(is_expansion_start(&c, 2, "$("));
    }

    #[test]
    fn test_word_boundary() {
        let c = chars("x esac)");
        assert!(is_word_boundary(&c, 2, 4));
        let c = chars("xesac");
        assert!(!is_word_boundary(&c, 1, 4));
        let c = chars("esacs");
        assert!(!is_word_boundary(&c, 0, 4));
    }

    #[test]
    fn test_assignment_offsets() {
        assert_eq!(assignment(&chars("a=1"), false), Some(1));
        assert_eq!(assignment(&chars("ab+=1"), false), Some(3));
        assert_eq!(assignment(&chars("a[i+1]=x"), false), Some(6));
        assert_eq!(assignment(&chars("a[0]+=x"), false), Some(5));
        assert_eq!(assignment(&chars("1a=x"), false), None);
        assert_eq!(assignment(&chars("a-b=x"), false), None);
        assert!(looks_like_assignment("PATH=/bin"));
        assert!(!looks_like_assignment("echo"));
    }

    #[test]
    fn test_array_assignment_prefix() {
        assert!(is_array_assignment_prefix(&chars("arr")));
        assert!(is_array_assignment_prefix(&chars("arr[1]")));
        assert!(!is_array_assignment_prefix(&chars("arr[1")));
        assert!(!is_array_assignment_prefix(&chars("9arr")));
    }

    #[test]
    fn test_skip_matched_pair_nested() {
        let c = chars("[a[\"]\"]b]x");
        assert_eq!(skip_matched_pair(&c, 0, '[', ']', false), Some(9));
        assert_eq!(skip_matched_pair(&c, 1, '[', ']', false), None);
    }

    #[test]
    fn test_strip_line_continuations() {
        assert_eq!(strip_line_continuations_comment_aware("a\\\nb"), "ab");
        assert_eq!(strip_line_continuations_comment_aware("a\\\\\nb"), "a\\\\\nb");
        assert_eq!(strip_line_continuations_comment_aware("# c\\\nx"), "# c\nx");
    }

    #[test]
    fn test_normalize_heredoc_delimiter() {
        assert_eq!(normalize_heredoc_delimiter("$(  a   b )"), "$(a b)");
        assert_eq!(normalize_heredoc_delimiter("${ x }y"), "${x}y");
        assert_eq!(normalize_heredoc_delimiter("EOF"), "EOF");
        assert_eq!(collapse_whitespace("  a \t b "), "a b");
        assert_eq!(count_trailing_backslashes("ab\\\\"), 2);
    }

    #[test]
    fn test_bracket_class() {
        let c = chars("[]a]x");
        assert_eq!(consume_bracket_class(&c, 0, 0), (4, "[]a]".to_string(), true));
        let c = chars("[ab|c");
        assert_eq!(consume_bracket_class(&c, 0, 0), (1, "[".to_string(), false));
    }

    #[test]
    fn test_quote_consumers() {
        let c = chars("'a\"b'c");
        assert_eq!(consume_single_quote(&c, 0), (5, "'a\"b'".to_string()));
        let c = chars("\"a\\\"b\"c");
        assert_eq!(consume_double_quote(&c, 0), (6, "\"a\\\"b\"".to_string()));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier("1x"));
        assert!(!is_valid_identifier(""));
        assert!(is_metachar('|'));
        assert!(!is_metachar('a'));
    }
}
