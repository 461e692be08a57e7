//! Parser Types and Constants
//!
//! Shared types, state flags, and keyword tables used across parser modules.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

lazy_static::lazy_static! {
    /// Reserved words in bash
    pub static ref RESERVED_WORDS: HashSet<&'static str> = [
        "case", "coproc", "do", "done", "elif", "else", "esac", "fi", "for",
        "function", "if", "in", "select", "then", "until", "while",
    ]
    .into_iter()
    .collect();

    /// Unary test operators accepted inside `[[ ]]`
    pub static ref COND_UNARY_OPS: HashSet<&'static str> = [
        "-a", "-b", "-c", "-d", "-e", "-f", "-g", "-h", "-k", "-n", "-o", "-p", "-r",
        "-s", "-t", "-u", "-v", "-w", "-x", "-z", "-G", "-L", "-N", "-O", "-R", "-S",
    ]
    .into_iter()
    .collect();

    /// Binary test operators accepted inside `[[ ]]`
    pub static ref COND_BINARY_OPS: HashSet<&'static str> = [
        "!=", "-ef", "-eq", "-ge", "-gt", "-le", "-lt", "-ne", "-nt", "-ot", "<", "=",
        "==", "=~", ">",
    ]
    .into_iter()
    .collect();

    /// Keywords that open a compound command (a coproc name may precede these)
    pub static ref COMPOUND_KEYWORDS: HashSet<&'static str> =
        ["case", "for", "if", "select", "until", "while"].into_iter().collect();

    /// Builtins whose arguments may contain array assignments: `declare a=(1 2)`
    pub static ref ASSIGNMENT_BUILTINS: HashSet<&'static str> = [
        "alias", "declare", "eval", "export", "let", "local", "readonly", "typeset",
    ]
    .into_iter()
    .collect();

    /// Simple ANSI-C escapes (`\n`, `\t`, ...) and their byte values
    pub static ref ANSI_C_ESCAPES: HashMap<char, u8> = {
        let mut m = HashMap::new();
        m.insert('a', 0x07);
        m.insert('b', 0x08);
        m.insert('e', 0x1B);
        m.insert('E', 0x1B);
        m.insert('f', 0x0C);
        m.insert('n', 0x0A);
        m.insert('r', 0x0D);
        m.insert('t', 0x09);
        m.insert('v', 0x0B);
        m.insert('\\', 0x5C);
        m.insert('"', 0x22);
        m.insert('?', 0x3F);
        m
    };
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error raised when parsing fails.
///
/// `MatchedPair` marks an EOF reached before a closing delimiter. Callers
/// performing speculative sub-parses use it to tell "input ended" apart from
/// "this is not the construct I was looking for".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    Syntax {
        message: String,
        pos: Option<usize>,
        line: Option<usize>,
    },
    MatchedPair {
        message: String,
        pos: Option<usize>,
        line: Option<usize>,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line(), self.pos()) {
            (Some(line), Some(pos)) => write!(
                f,
                "Parse error at line {}, position {}: {}",
                line,
                pos,
                self.message()
            ),
            (None, Some(pos)) => write!(f, "Parse error at position {}: {}", pos, self.message()),
            _ => write!(f, "Parse error: {}", self.message()),
        }
    }
}

/// Result alias used throughout the parser.
pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Option<usize>, line: Option<usize>) -> Self {
        Self::Syntax {
            message: message.into(),
            pos,
            line,
        }
    }

    pub fn matched_pair(message: impl Into<String>, pos: Option<usize>, line: Option<usize>) -> Self {
        Self::MatchedPair {
            message: message.into(),
            pos,
            line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Syntax { message, .. } | Self::MatchedPair { message, .. } => message,
        }
    }

    pub fn pos(&self) -> Option<usize> {
        match self {
            Self::Syntax { pos, .. } | Self::MatchedPair { pos, .. } => *pos,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } | Self::MatchedPair { line, .. } => *line,
        }
    }

    pub fn is_matched_pair(&self) -> bool {
        matches!(self, Self::MatchedPair { .. })
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Parser configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Recognize `@(...)`, `?(...)`, `*(...)`, `+(...)` and `!(...)` in words
    pub extglob: bool,
}

// =============================================================================
// STATE
// =============================================================================

/// Word-reading context: plain command words, `[[ ]]` operands, or the
/// right-hand side of `=~`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WordContext {
    #[default]
    Normal,
    Cond,
    Regex,
}

/// Orthogonal parser state flags, saved and restored as one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ParserState {
    pub case_pattern: bool,
    pub cmd_subst: bool,
    pub case_stmt: bool,
    pub cond_expr: bool,
    pub comp_assign: bool,
    pub arith: bool,
    pub heredoc: bool,
    pub regexp: bool,
    pub ext_pat: bool,
    pub subshell: bool,
    pub eof_token: bool,
}

/// Where the scanner sits inside a `${...}` expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DolbraceState {
    #[default]
    None,
    Param,
    Op,
    Word,
    Quote,
    Quote2,
}

/// Options for the balanced-delimiter scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchedPairFlags {
    pub dquote: bool,
    pub dolbrace: bool,
    pub command: bool,
    pub arith: bool,
    pub allow_esc: bool,
    pub extglob: bool,
    pub first_close: bool,
    pub array_sub: bool,
    pub backquote: bool,
}

impl MatchedPairFlags {
    pub const NONE: Self = Self {
        dquote: false,
        dolbrace: false,
        command: false,
        arith: false,
        allow_esc: false,
        extglob: false,
        first_close: false,
        array_sub: false,
        backquote: false,
    };
    pub const DQUOTE: Self = Self { dquote: true, ..Self::NONE };
    pub const DOLBRACE: Self = Self { dolbrace: true, ..Self::NONE };
    pub const COMMAND: Self = Self { command: true, ..Self::NONE };
    pub const ARITH: Self = Self { arith: true, ..Self::NONE };
    pub const ALLOWESC: Self = Self { allow_esc: true, ..Self::NONE };
    pub const EXTGLOB: Self = Self { extglob: true, ..Self::NONE };
    pub const FIRSTCLOSE: Self = Self { first_close: true, ..Self::NONE };
    pub const ARRAYSUB: Self = Self { array_sub: true, ..Self::NONE };
    pub const BACKQUOTE: Self = Self { backquote: true, ..Self::NONE };
}

impl BitOr for MatchedPairFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            dquote: self.dquote || rhs.dquote,
            dolbrace: self.dolbrace || rhs.dolbrace,
            command: self.command || rhs.command,
            arith: self.arith || rhs.arith,
            allow_esc: self.allow_esc || rhs.allow_esc,
            extglob: self.extglob || rhs.extglob,
            first_close: self.first_close || rhs.first_close,
            array_sub: self.array_sub || rhs.array_sub,
            backquote: self.backquote || rhs.backquote,
        }
    }
}

/// 1-based line number of a character offset.
pub fn line_of(source: &[char], pos: usize) -> usize {
    source.iter().take(pos).filter(|&&c| c == '\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::new("Unexpected token", Some(4), Some(2));
        assert_eq!(err.to_string(), "Parse error at line 2, position 4: Unexpected token");
        let err = ParseError::matched_pair("unexpected EOF", Some(3), None);
        assert_eq!(err.to_string(), "Parse error at position 3: unexpected EOF");
        assert!(err.is_matched_pair());
        let err = ParseError::new("Syntax error", None, None);
        assert_eq!(err.to_string(), "Parse error: Syntax error");
    }

    #[test]
    fn test_matched_pair_flags_combine() {
        let flags = MatchedPairFlags::DOLBRACE | MatchedPairFlags::DQUOTE;
        assert!(flags.dolbrace && flags.dquote);
        assert!(!flags.arith);
    }

    #[test]
    fn test_keyword_tables() {
        assert!(RESERVED_WORDS.contains("esac"));
        assert!(!RESERVED_WORDS.contains("time"));
        assert!(COND_BINARY_OPS.contains("=~"));
        assert!(COND_UNARY_OPS.contains("-v"));
        assert_eq!(ANSI_C_ESCAPES.get(&'n'), Some(&0x0A));
    }

    #[test]
    fn test_line_of() {
        let src: Vec<char> = "a\nb\nc".chars().collect();
        assert_eq!(line_of(&src, 0), 1);
        assert_eq!(line_of(&src, 4), 3);
    }
}
