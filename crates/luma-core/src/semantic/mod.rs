//! Semantic analysis: symbols, scopes, narrowing and the multi-pass walker

pub mod builtins;
pub mod checks;
pub mod narrowing;
pub mod pass;
pub mod scope;
pub mod symbols;
pub mod walker;

pub use narrowing::{NameSet, falsy_when, truthy_when};
pub use pass::{
    CHECK_TABLE, CheckPolicy, ClassifiedName, ColorSpan, ColoringPass, DeclKey, FileLocalPass,
    NameOccurrence, NameRole, Pass, PassPhase, PassSet, PassStrategy, PhaseTracker, ProjectPass,
    ReferenceSearchPass, ScatteredPass, SymbolClass, check_policy,
};
pub use scope::{Scope, ScopeId, ScopeKind};
pub use symbols::{
    Binding, Function, FunctionId, FunctionSpec, LoadKind, Reference, ReferenceId, ReturnSite,
    SymbolStore, ValueKind, Variable, VariableFlags, VariableId,
};
pub use walker::{WalkOutput, Walker};

use crate::annotation::TypeOracle;
use crate::config::Config;
use crate::diagnostic::Suppression;
use crate::project::{FileIndex, FirstPassResults};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Editor-latency mode: skips the kinds marked non-realtime.
    pub realtime: bool,
}

/// Everything a walk reads but never mutates.
pub struct AnalysisEnv<'a> {
    pub config: &'a Config,
    pub options: AnalysisOptions,
    pub files: &'a FileIndex,
    pub first_pass: &'a FirstPassResults,
    pub oracle: &'a dyn TypeOracle,
    pub suppression: &'a Suppression,
}
