//! Cross-file resolution
//!
//! Maps load-call arguments to project files and turns a target file's
//! analysis into the value a load call evaluates to.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use super::files::{FileId, FileIndex, normalize_path};
use super::results::{FileAnalysis, FileResult};
use crate::config::{ImportMode, ImportsConfig};
use crate::semantic::builtins::is_builtin_module;
use crate::semantic::{LoadKind, SymbolStore, ValueKind, Variable, VariableFlags, VariableId};
use crate::syntax::TextRange;

/// The load primitive named `name`, if any. Configured primitives take
/// precedence over the built-in ones.
pub fn load_kind_for(name: &str, imports: &ImportsConfig) -> Option<LoadKind> {
    if let Some(function) = imports.function(name) {
        return Some(LoadKind::Import(function.mode));
    }
    match name {
        "require" => Some(LoadKind::Require),
        "dofile" => Some(LoadKind::Dofile),
        "loadfile" => Some(LoadKind::Loadfile),
        _ => None,
    }
}

/// Candidate relative paths for a load argument, most specific first.
pub fn module_candidates(module: &str, load: LoadKind, imports: &ImportsConfig) -> Vec<String> {
    if !load.takes_module_name() {
        return vec![normalize_path(module)];
    }

    let base = if imports.separator.is_empty() {
        module.to_string()
    } else {
        module.replace(imports.separator.as_str(), "/")
    };
    let base = normalize_path(&base);

    if !imports.extension.is_empty() && base.ends_with(imports.extension.as_str()) {
        return vec![base];
    }
    vec![
        format!("{}{}", base, imports.extension),
        format!("{}/init{}", base, imports.extension),
    ]
}

pub fn resolve_module(
    files: &FileIndex,
    imports: &ImportsConfig,
    module: &str,
    load: LoadKind,
) -> Option<FileId> {
    let found = module_candidates(module, load, imports)
        .iter()
        .find_map(|candidate| files.find_by_suffix(candidate));
    trace!(module, ?found, "resolved load target");
    found
}

/// Modules that legitimately have no project file.
pub fn is_external_module(module: &str, imports: &ImportsConfig) -> bool {
    is_builtin_module(module) || imports.is_module_ignored(module)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleShape {
    Returned(VariableId),
    Globals,
    Function,
}

fn module_shape(load: LoadKind, result: &FileResult, store: &SymbolStore) -> Option<ModuleShape> {
    let returned = result
        .return_value
        .filter(|&var| store.variable(var).kind != ValueKind::Nil);
    match load {
        LoadKind::Loadfile => Some(ModuleShape::Function),
        LoadKind::Require | LoadKind::Dofile | LoadKind::Import(ImportMode::Require) => {
            returned.map(ModuleShape::Returned)
        }
        LoadKind::Import(ImportMode::Import) => Some(ModuleShape::Globals),
        LoadKind::Import(ImportMode::Auto) => {
            Some(returned.map_or(ModuleShape::Globals, ModuleShape::Returned))
        }
    }
}

fn module_variable(result: &FileResult, kind: ValueKind) -> Variable {
    let range = TextRange::default();
    Variable::new(&result.path, result.file, range)
        .with_kind(kind)
        .with_flags(VariableFlags::MODULE)
}

/// The value of loading `result`'s file, when `result` lives in `store`.
pub fn bind_module(
    store: &mut SymbolStore,
    load: LoadKind,
    result: &FileResult,
) -> Option<VariableId> {
    match module_shape(load, result, store)? {
        ModuleShape::Returned(var) => Some(var),
        ModuleShape::Function => {
            Some(store.alloc_variable(module_variable(result, ValueKind::Function)))
        }
        ModuleShape::Globals => {
            let mut value = module_variable(result, ValueKind::Table);
            value.members = result.globals.clone();
            Some(store.alloc_variable(value))
        }
    }
}

/// Like [`bind_module`], copying from another file's first-pass store.
pub fn import_module(
    store: &mut SymbolStore,
    load: LoadKind,
    analysis: &FileAnalysis,
) -> Option<VariableId> {
    let result = &analysis.result;
    match module_shape(load, result, &analysis.store)? {
        ModuleShape::Returned(var) => {
            Some(store.import_variable(&analysis.store, result.file, var))
        }
        ModuleShape::Function => {
            Some(store.alloc_variable(module_variable(result, ValueKind::Function)))
        }
        ModuleShape::Globals => {
            let members: IndexMap<String, VariableId> = result
                .globals
                .iter()
                .map(|(name, &var)| {
                    (name.clone(), store.import_variable(&analysis.store, result.file, var))
                })
                .collect();
            let mut value = module_variable(result, ValueKind::Table);
            value.members = members;
            Some(store.alloc_variable(value))
        }
    }
}

/// Live tables of a project walk.
#[derive(Debug, Default)]
pub struct ProjectState {
    pub globals: IndexMap<String, VariableId>,
    pub root_globals: IndexMap<String, VariableId>,
    pub files: IndexMap<FileId, FileResult>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self, name: &str) -> Option<VariableId> {
        self.globals.get(name).copied()
    }

    /// First definition wins; later files update the shared variable.
    pub fn define_global(&mut self, name: &str, var: VariableId) {
        self.globals.entry(name.to_string()).or_insert(var);
    }

    pub fn define_root_global(&mut self, name: &str, var: VariableId) {
        self.root_globals.entry(name.to_string()).or_insert(var);
        self.define_global(name, var);
    }
}

/// Memo of resolved load edges, keyed by target and load kind.
#[derive(Debug, Default)]
pub struct ModuleMemo {
    values: HashMap<(FileId, LoadKind), Option<VariableId>>,
}

impl ModuleMemo {
    pub fn get(&self, target: FileId, load: LoadKind) -> Option<Option<VariableId>> {
        self.values.get(&(target, load)).copied()
    }

    pub fn insert(&mut self, target: FileId, load: LoadKind, value: Option<VariableId>) {
        self.values.insert((target, load), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportFunction;

    fn index(paths: &[&str]) -> FileIndex {
        let mut index = FileIndex::new();
        for path in paths {
            index.insert(path, "");
        }
        index
    }

    #[test]
    fn dotted_module_maps_to_path() {
        let files = index(&["src/a/b.lua", "src/c/init.lua"]);
        let imports = ImportsConfig::default();

        assert_eq!(
            resolve_module(&files, &imports, "a.b", LoadKind::Require),
            files.id_of("src/a/b.lua")
        );
        assert_eq!(
            resolve_module(&files, &imports, "c", LoadKind::Require),
            files.id_of("src/c/init.lua")
        );
        assert_eq!(resolve_module(&files, &imports, "d", LoadKind::Require), None);
    }

    #[test]
    fn dofile_takes_a_path() {
        let files = index(&["scripts/setup.lua"]);
        let imports = ImportsConfig::default();

        assert_eq!(
            resolve_module(&files, &imports, "./scripts/setup.lua", LoadKind::Dofile),
            files.id_of("scripts/setup.lua")
        );
        assert_eq!(
            module_candidates("a.b", LoadKind::Dofile, &imports),
            vec!["a.b".to_string()]
        );
    }

    #[test]
    fn custom_separator_and_extension() {
        let imports = ImportsConfig {
            separator: "/".into(),
            extension: ".luau".into(),
            ..ImportsConfig::default()
        };

        assert_eq!(
            module_candidates("ui/button", LoadKind::Require, &imports),
            vec!["ui/button.luau".to_string(), "ui/button/init.luau".to_string()]
        );
    }

    #[test]
    fn configured_primitives_are_recognized() {
        let imports = ImportsConfig {
            functions: vec![ImportFunction {
                name: "import".into(),
                mode: ImportMode::Auto,
            }],
            ..ImportsConfig::default()
        };

        assert_eq!(load_kind_for("import", &imports), Some(LoadKind::Import(ImportMode::Auto)));
        assert_eq!(load_kind_for("require", &imports), Some(LoadKind::Require));
        assert_eq!(load_kind_for("include", &imports), None);
    }

    #[test]
    fn external_modules() {
        let imports = ImportsConfig {
            ignore_modules: vec!["socket*".into()],
            ..ImportsConfig::default()
        };

        assert!(is_external_module("string", &imports));
        assert!(is_external_module("socket.http", &imports));
        assert!(!is_external_module("app.main", &imports));
    }

    #[test]
    fn bind_module_shapes() {
        let file = FileId::new(0);
        let mut store = SymbolStore::new();
        let exported = store.alloc_variable(
            Variable::new("M", file, TextRange::default()).with_kind(ValueKind::Table),
        );
        let global = store.alloc_variable(Variable::new("G", file, TextRange::default()));
        let mut result = FileResult::new(file, "m.lua");
        result.return_value = Some(exported);
        result.globals.insert("G".into(), global);

        assert_eq!(bind_module(&mut store, LoadKind::Require, &result), Some(exported));
        assert_eq!(
            bind_module(&mut store, LoadKind::Import(ImportMode::Auto), &result),
            Some(exported)
        );

        let imported =
            bind_module(&mut store, LoadKind::Import(ImportMode::Import), &result).unwrap();
        assert_eq!(store.member(imported, "G"), Some(global));

        let loaded = bind_module(&mut store, LoadKind::Loadfile, &result).unwrap();
        assert_eq!(store.variable(loaded).kind, ValueKind::Function);
    }

    #[test]
    fn auto_falls_back_to_globals_without_return() {
        let file = FileId::new(0);
        let mut store = SymbolStore::new();
        let result = FileResult::new(file, "m.lua");

        assert_eq!(bind_module(&mut store, LoadKind::Require, &result), None);
        let value = bind_module(&mut store, LoadKind::Import(ImportMode::Auto), &result).unwrap();
        assert_eq!(store.variable(value).kind, ValueKind::Table);
    }
}
