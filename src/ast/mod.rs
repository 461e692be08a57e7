//! Abstract Syntax Tree (AST) Types for Bash
//!
//! `types` holds the node definitions and builders; `sexp` renders any node
//! as the S-expression used for comparisons and the CLI output.

pub mod types;
pub mod sexp;
