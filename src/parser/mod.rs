//! Parser module for bash scripts
//!
//! The lexer, the recursive descent grammar and the sub-parsers for
//! expansions, arithmetic and `[[ ]]` all extend one `Parser` type.

pub mod types;
pub mod quote_state;
pub mod lexer;
pub mod arithmetic_primaries;
pub mod arithmetic_parser;
pub mod word_parser;
pub mod expansion_parser;
pub mod parser_substitution;
pub mod conditional_parser;
pub mod compound_parser;
pub mod command_parser;
pub mod parser;

// Re-exports
pub use types::{ParseError, ParseResult, ParserOptions};
pub use lexer::{Token, TokenType};
pub use parser::{parse, Parser, MAX_INPUT_SIZE};
