//! parable - a bash parser
//!
//! Parses bash source into a typed AST. Every node renders to a canonical
//! S-expression, which is the form the test corpus compares against.
//!
//! ```
//! let nodes = parable::parse("echo hi | wc -l", false).unwrap();
//! assert_eq!(
//!     nodes[0].to_sexp(),
//!     "(pipe (command (word \"echo\") (word \"hi\")) (command (word \"wc\") (word \"-l\")))"
//! );
//! ```

pub mod ast;
pub mod parser;

pub use ast::types::*;
pub use parser::{parse, ParseError, ParseResult, Parser, ParserOptions};
