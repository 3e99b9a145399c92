//! Syntax tree provider
//!
//! Lexer, parser and comment table for Lua sources. The semantic core only
//! depends on the tree types re-exported here.

pub mod ast;
pub mod comments;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use comments::{CommentBlock, CommentTable};
pub use parser::{FileMetadata, ParseError, ParseResult, ParsedFile, parse};
