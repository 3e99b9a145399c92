//! Semantic analysis core of the Luma Lua language server
//!
//! Files are registered with a [`Project`], which runs the analysis passes
//! and exposes their diagnostics, reference search and symbol coloring.

pub mod annotation;
pub mod config;
pub mod diagnostic;
pub mod disable_comments;
pub mod project;
pub mod semantic;
pub mod syntax;

pub use config::Config;
pub use diagnostic::{Diagnostic, ErrorKind, RelatedInfo, Severity};
pub use project::{AnalysisError, FileId, GlobalSymbol, Project, SymbolLocation};
pub use semantic::{AnalysisOptions, ColorSpan, SymbolClass};
pub use syntax::{Position, TextRange};
