//! Per-file and per-project analysis containers

use indexmap::IndexMap;

use super::files::FileId;
use crate::diagnostic::Diagnostic;
use crate::semantic::{FunctionId, ReferenceId, SymbolStore, VariableId};
use crate::syntax::TextRange;

/// What one walk of one file produced. Ids point into the store of the pass
/// that produced it.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub file: FileId,
    pub path: String,
    /// Globals this file defines.
    pub globals: IndexMap<String, VariableId>,
    /// Globals this file defines through `_G.name`.
    pub root_globals: IndexMap<String, VariableId>,
    /// Names read without any visible definition, with every use site.
    pub undefined: IndexMap<String, Vec<TextRange>>,
    pub diagnostics: Vec<Diagnostic>,
    pub references: Vec<ReferenceId>,
    pub main_function: Option<FunctionId>,
    /// Last non-nil top-level return value.
    pub return_value: Option<VariableId>,
}

impl FileResult {
    pub fn new(file: FileId, path: &str) -> Self {
        Self {
            file,
            path: path.to_string(),
            globals: IndexMap::new(),
            root_globals: IndexMap::new(),
            undefined: IndexMap::new(),
            diagnostics: Vec::new(),
            references: Vec::new(),
            main_function: None,
            return_value: None,
        }
    }
}

/// A first-pass result together with the store its ids refer to.
#[derive(Debug)]
pub struct FileAnalysis {
    pub store: SymbolStore,
    pub result: FileResult,
}

impl FileAnalysis {
    pub fn global(&self, name: &str) -> Option<VariableId> {
        self.result.globals.get(name).copied()
    }
}

/// First-pass analyses of every project file, in file order.
#[derive(Debug, Default)]
pub struct FirstPassResults {
    analyses: IndexMap<FileId, FileAnalysis>,
}

impl FirstPassResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, analysis: FileAnalysis) {
        self.analyses.insert(analysis.result.file, analysis);
    }

    pub fn get(&self, file: FileId) -> Option<&FileAnalysis> {
        self.analyses.get(&file)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileAnalysis> {
        self.analyses.values()
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    /// The project-wide `_G.name` table: first defining file wins.
    pub fn root_global(&self, name: &str) -> Option<(&FileAnalysis, VariableId)> {
        self.analyses.values().find_map(|analysis| {
            analysis
                .result
                .root_globals
                .get(name)
                .map(|&var| (analysis, var))
        })
    }

    /// First file other than `exclude` defining the global `name`.
    pub fn find_global(
        &self,
        name: &str,
        exclude: Option<FileId>,
    ) -> Option<(&FileAnalysis, VariableId)> {
        self.analyses
            .values()
            .filter(|analysis| Some(analysis.result.file) != exclude)
            .find_map(|analysis| analysis.global(name).map(|var| (analysis, var)))
    }
}

/// Output of a project (entry-file) walk. Every file reached shares `store`.
#[derive(Debug)]
pub struct ProjectResult {
    pub store: SymbolStore,
    pub entries: Vec<FileId>,
    /// Globals merged from every walked file.
    pub globals: IndexMap<String, VariableId>,
    pub root_globals: IndexMap<String, VariableId>,
    pub files: IndexMap<FileId, FileResult>,
}

impl ProjectResult {
    pub fn file(&self, file: FileId) -> Option<&FileResult> {
        self.files.get(&file)
    }

    pub fn global(&self, name: &str) -> Option<VariableId> {
        self.root_globals
            .get(name)
            .or_else(|| self.globals.get(name))
            .copied()
    }
}
