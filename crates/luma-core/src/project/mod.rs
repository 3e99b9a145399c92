//! Project-level analysis
//!
//! A [`Project`] owns the registered files and runs the passes over them:
//! the per-file first pass, the project walk from entry files, per-file
//! scattered checks, reference search and coloring.

mod files;
pub mod resolver;
mod results;

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use files::{FileId, FileIndex, SourceFile, normalize_path};
pub use resolver::{ModuleMemo, ProjectState, is_external_module, load_kind_for, resolve_module};
pub use results::{FileAnalysis, FileResult, FirstPassResults, ProjectResult};

use crate::annotation::CommentAnnotations;
use crate::config::Config;
use crate::diagnostic::{Diagnostic, Suppression};
use crate::semantic::{
    AnalysisEnv, AnalysisOptions, ColorSpan, ColoringPass, FileLocalPass, ProjectPass,
    ReferenceSearchPass, ScatteredPass, ValueKind, Walker,
};
use crate::syntax::{Position, TextRange};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unknown file '{0}'")]
    UnknownFile(String),

    #[error("The first pass has not produced a result for '{0}'")]
    MissingFirstPass(String),

    #[error("Result for '{found}' was filed under '{expected}'")]
    PathMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolLocation {
    pub path: String,
    pub range: TextRange,
}

/// A global definition found by the first pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalSymbol {
    pub name: String,
    pub path: String,
    pub range: TextRange,
    pub is_function: bool,
}

pub struct Project {
    config: Config,
    options: AnalysisOptions,
    files: FileIndex,
    suppression: Suppression,
    config_warnings: Vec<String>,
    annotations: CommentAnnotations,
    first_pass: Option<FirstPassResults>,
    project_result: Option<ProjectResult>,
    scattered: HashMap<FileId, FileResult>,
}

impl Project {
    pub fn new(config: Config) -> Self {
        let (suppression, config_warnings) = Suppression::from_config(&config.diagnostics);
        for warning in &config_warnings {
            warn!("{}", warning);
        }
        Self {
            config,
            options: AnalysisOptions::default(),
            files: FileIndex::new(),
            suppression,
            config_warnings,
            annotations: CommentAnnotations::new(),
            first_pass: None,
            project_result: None,
            scattered: HashMap::new(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self.invalidate();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn options(&self) -> AnalysisOptions {
        self.options
    }

    /// Problems found while compiling the suppression settings.
    pub fn config_warnings(&self) -> &[String] {
        &self.config_warnings
    }

    pub fn files(&self) -> &FileIndex {
        &self.files
    }

    /// Registers or replaces a file. Every cached result is dropped.
    pub fn add_file(&mut self, path: &str, source: &str) -> FileId {
        let id = self.files.insert(path, source);
        if let Some(file) = self.files.get(id) {
            self.annotations.insert_file(&file.path, file.parsed.comments());
        }
        self.invalidate();
        id
    }

    fn invalidate(&mut self) {
        self.first_pass = None;
        self.project_result = None;
        self.scattered.clear();
    }

    pub fn file_id(&self, path: &str) -> Result<FileId, AnalysisError> {
        self.files
            .id_of(path)
            .ok_or_else(|| AnalysisError::UnknownFile(path.to_string()))
    }

    fn env<'a>(&'a self, first_pass: &'a FirstPassResults) -> AnalysisEnv<'a> {
        AnalysisEnv {
            config: &self.config,
            options: self.options,
            files: &self.files,
            first_pass,
            oracle: &self.annotations,
            suppression: &self.suppression,
        }
    }

    /// Walks every file on its own. Each walk sees no other file, so the
    /// result only depends on the file's own text.
    pub fn run_first_pass(&mut self) -> &FirstPassResults {
        let empty = FirstPassResults::new();
        let mut results = FirstPassResults::new();
        {
            let env = self.env(&empty);
            for id in self.files.ids() {
                let mut walker = Walker::new(&env, FileLocalPass);
                match walker.walk_file(id) {
                    Ok(result) => results.insert(FileAnalysis {
                        store: walker.finish().store,
                        result,
                    }),
                    Err(err) => warn!(%err, "first pass skipped a file"),
                }
            }
        }
        info!(files = results.len(), "first pass complete");
        self.first_pass.insert(results)
    }

    fn ensure_first_pass(&mut self) {
        if self.first_pass.is_none() {
            self.run_first_pass();
        }
    }

    pub fn first_pass_result(&mut self, path: &str) -> Result<&FileResult, AnalysisError> {
        let id = self.file_id(path)?;
        self.ensure_first_pass();
        self.first_pass
            .as_ref()
            .and_then(|results| results.get(id))
            .map(|analysis| &analysis.result)
            .ok_or_else(|| AnalysisError::MissingFirstPass(path.to_string()))
    }

    fn first_pass_or_err(&self) -> Result<&FirstPassResults, AnalysisError> {
        self.first_pass
            .as_ref()
            .ok_or_else(|| AnalysisError::MissingFirstPass("<project>".to_string()))
    }

    /// Walks from `entries` (every file when empty), following loads into
    /// the files they reach. Files reached by no entry are not walked.
    pub fn check_project(&mut self, entries: &[&str]) -> Result<&ProjectResult, AnalysisError> {
        let entry_ids: Vec<FileId> = if entries.is_empty() {
            self.files.ids().collect()
        } else {
            entries
                .iter()
                .map(|path| self.file_id(path))
                .collect::<Result<_, _>>()?
        };
        self.ensure_first_pass();

        let result = {
            let first_pass = self.first_pass_or_err()?;
            let env = self.env(first_pass);
            let mut walker = Walker::new(&env, ProjectPass);
            for &entry in &entry_ids {
                walker.walk_entry(entry)?;
            }
            let output = walker.finish();
            let state = output.project.unwrap_or_default();
            ProjectResult {
                store: output.store,
                entries: entry_ids,
                globals: state.globals,
                root_globals: state.root_globals,
                files: state.files,
            }
        };

        info!(
            entries = result.entries.len(),
            reached = result.files.len(),
            "project walk complete"
        );
        Ok(self.project_result.insert(result))
    }

    pub fn project_result(&self) -> Option<&ProjectResult> {
        self.project_result.as_ref()
    }

    /// Re-checks one file against the first-pass results of all others.
    pub fn check_scattered(&mut self, path: &str) -> Result<&FileResult, AnalysisError> {
        let id = self.file_id(path)?;
        self.ensure_first_pass();

        let result = {
            let first_pass = self.first_pass_or_err()?;
            let env = self.env(first_pass);
            let mut walker = Walker::new(&env, ScatteredPass);
            walker.walk_file(id)?
        };

        self.scattered.insert(id, result);
        self.scattered
            .get(&id)
            .ok_or_else(|| AnalysisError::UnknownFile(path.to_string()))
    }

    /// Every occurrence of the symbol at `position`: its declaration first,
    /// then uses in file order and source order.
    pub fn find_references(
        &mut self,
        path: &str,
        position: Position,
    ) -> Result<Vec<SymbolLocation>, AnalysisError> {
        let id = self.file_id(path)?;
        self.ensure_first_pass();

        let first_pass = self.first_pass_or_err()?;
        let env = self.env(first_pass);

        let names = {
            let mut walker = Walker::new(&env, ColoringPass::new());
            walker.walk_file(id)?;
            walker.finish().strategy.into_names()
        };
        let Some((declaration, class)) = names
            .iter()
            .find(|name| name.range.contains(position))
            .and_then(|name| name.declaration.map(|decl| (decl, name.class)))
        else {
            debug!(path, ?position, "no symbol at position");
            return Ok(Vec::new());
        };

        let search: Vec<FileId> = if class.is_local() {
            vec![id]
        } else {
            self.files.ids().collect()
        };
        let mut walker = Walker::new(&env, ReferenceSearchPass::new(declaration));
        for file in search {
            walker.walk_file(file)?;
        }
        let mut matches = walker.finish().strategy.into_matches();
        matches.retain(|&(file, range)| !(file == declaration.file && range == declaration.range));
        matches.sort_by_key(|&(file, range)| (file, range.start));
        matches.dedup();

        let mut locations = vec![SymbolLocation {
            path: self.files.path(declaration.file).to_string(),
            range: declaration.range,
        }];
        locations.extend(matches.into_iter().map(|(file, range)| SymbolLocation {
            path: self.files.path(file).to_string(),
            range,
        }));
        debug!(path, found = locations.len(), "reference search complete");
        Ok(locations)
    }

    /// Symbol classes of every identifier in the file, in source order.
    pub fn classify(&mut self, path: &str) -> Result<Vec<ColorSpan>, AnalysisError> {
        let id = self.file_id(path)?;
        self.ensure_first_pass();

        let first_pass = self.first_pass_or_err()?;
        let env = self.env(first_pass);
        let mut walker = Walker::new(&env, ColoringPass::new());
        walker.walk_file(id)?;
        Ok(walker
            .finish()
            .strategy
            .into_names()
            .into_iter()
            .map(|name| ColorSpan {
                range: name.range,
                class: name.class,
            })
            .collect())
    }

    fn check_path(&self, id: FileId, result: &FileResult) -> Result<(), AnalysisError> {
        let expected = self.files.path(id);
        if result.path != expected {
            return Err(AnalysisError::PathMismatch {
                expected: expected.to_string(),
                found: result.path.clone(),
            });
        }
        Ok(())
    }

    /// Diagnostics of one file: the first pass merged with the project walk
    /// when it reached the file, otherwise with the scattered check.
    pub fn diagnostics(&self, path: &str) -> Result<Vec<Diagnostic>, AnalysisError> {
        let id = self.file_id(path)?;
        let mut merged = Vec::new();

        if let Some(analysis) = self.first_pass.as_ref().and_then(|results| results.get(id)) {
            self.check_path(id, &analysis.result)?;
            merged.extend(analysis.result.diagnostics.iter().cloned());
        }
        let later = self
            .project_result
            .as_ref()
            .and_then(|project| project.file(id))
            .or_else(|| self.scattered.get(&id));
        if let Some(result) = later {
            self.check_path(id, result)?;
            merged.extend(result.diagnostics.iter().cloned());
        }

        Ok(merge_diagnostics(merged))
    }

    pub fn all_diagnostics(&self) -> Result<Vec<Diagnostic>, AnalysisError> {
        let mut all = Vec::new();
        for file in self.files.iter() {
            all.extend(self.diagnostics(&file.path)?);
        }
        Ok(all)
    }

    /// Global definitions of the first pass, in file order.
    pub fn global_symbols(&self) -> Vec<GlobalSymbol> {
        let Some(first_pass) = self.first_pass.as_ref() else {
            return Vec::new();
        };
        first_pass
            .iter()
            .flat_map(|analysis| {
                analysis.result.globals.iter().map(|(name, &var)| {
                    let var = analysis.store.variable(var);
                    GlobalSymbol {
                        name: name.clone(),
                        path: analysis.result.path.clone(),
                        range: var.range,
                        is_function: var.function.is_some() || var.kind == ValueKind::Function,
                    }
                })
            })
            .collect()
    }
}

/// Drops repeats of the same finding reported by more than one pass.
fn merge_diagnostics(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.sort_by(|a, b| a.range.cmp(&b.range).then_with(|| a.kind.cmp(&b.kind)));
    let mut seen = HashSet::new();
    diagnostics.retain(|d| seen.insert((d.kind, d.range, d.message.clone())));
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::ErrorKind;

    fn project(files: &[(&str, &str)]) -> Project {
        let mut project = Project::new(Config::default());
        for (path, source) in files {
            project.add_file(path, source);
        }
        project
    }

    #[test]
    fn unknown_paths_are_errors() {
        let mut project = project(&[("a.lua", "")]);

        assert!(matches!(
            project.check_scattered("b.lua"),
            Err(AnalysisError::UnknownFile(_))
        ));
    }

    #[test]
    fn merged_diagnostics_are_deduplicated() {
        let mut project = project(&[("main.lua", "print(true + 1)\n")]);
        project.check_project(&[]).unwrap();

        let diagnostics = project.diagnostics("main.lua").unwrap();
        let operand_errors = diagnostics
            .iter()
            .filter(|d| d.kind == ErrorKind::BinaryOperandType)
            .count();
        assert_eq!(operand_errors, 1);
    }

    #[test]
    fn adding_a_file_invalidates_results() {
        let mut project = project(&[("a.lua", "x = 1\n")]);
        project.check_project(&[]).unwrap();
        assert!(project.project_result().is_some());

        project.add_file("b.lua", "y = 2\n");
        assert!(project.project_result().is_none());
    }

    #[test]
    fn global_symbols_list_definitions() {
        let mut project = project(&[("a.lua", "function greet() end\ncount = 0\n")]);
        project.run_first_pass();

        let symbols = project.global_symbols();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "greet");
        assert!(symbols[0].is_function);
        assert!(!symbols[1].is_function);
    }
}
