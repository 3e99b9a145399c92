//! Symbol records and their per-pass arena store
//!
//! A [`SymbolStore`] owns every scope, variable, function and reference
//! created by one pass. Symbols from a different store (another file's
//! first-pass analysis) are deep-copied in with [`SymbolStore::import_variable`]
//! so ids never cross stores.

use std::collections::HashMap;

use bitflags::bitflags;
use id_arena::{Arena, Id};
use indexmap::IndexMap;
use serde::Serialize;

use super::scope::{Scope, ScopeId, ScopeKind};
use crate::config::ImportMode;
use crate::project::FileId;
use crate::syntax::TextRange;

pub type VariableId = Id<Variable>;
pub type FunctionId = Id<Function>;
pub type ReferenceId = Id<Reference>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    /// A value the walker cannot see into (userdata, results of unknown calls).
    Opaque,
    Unknown,
}

impl ValueKind {
    /// Annotation type name, when the kind is precise enough to check.
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            ValueKind::Nil => Some("nil"),
            ValueKind::Boolean => Some("boolean"),
            ValueKind::Number => Some("number"),
            ValueKind::String => Some("string"),
            ValueKind::Table => Some("table"),
            ValueKind::Function => Some("function"),
            ValueKind::Opaque | ValueKind::Unknown => None,
        }
    }

    pub fn from_type_name(name: &str) -> ValueKind {
        match name.trim_end_matches('?') {
            "nil" => ValueKind::Nil,
            "boolean" => ValueKind::Boolean,
            "number" | "integer" => ValueKind::Number,
            "string" => ValueKind::String,
            "function" => ValueKind::Function,
            "any" | "unknown" => ValueKind::Unknown,
            "userdata" | "thread" => ValueKind::Opaque,
            ty if ty.contains('|') => ValueKind::Unknown,
            _ => ValueKind::Table,
        }
    }

    /// Nil and unknown kinds are replaced by the next assignment.
    pub fn is_replaceable(self) -> bool {
        matches!(self, ValueKind::Nil | ValueKind::Unknown)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VariableFlags: u16 {
        const PARAMETER = 1 << 0;
        const LOOP_VARIABLE = 1 << 1;
        const USED = 1 << 2;
        const DECLARED_EMPTY = 1 << 3;
        const TO_BE_CLOSED = 1 << 4;
        const CONSTANT = 1 << 5;
        /// Bound to the value of a resolved module load.
        const MODULE = 1 << 6;
        /// Defined through `_G.name`.
        const ROOT_NAMESPACE = 1 << 7;
    }
}

/// One declaration site.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub file: FileId,
    pub kind: ValueKind,
    pub range: TextRange,
    /// Owning scope for locals; `None` for globals and members.
    pub scope: Option<ScopeId>,
    /// Function whose scope declares this local.
    pub owner: Option<FunctionId>,
    pub function: Option<FunctionId>,
    pub reference: Option<ReferenceId>,
    pub members: IndexMap<String, VariableId>,
    pub flags: VariableFlags,
    /// Assignments seen while the variable was still unread.
    pub assign_sites: Vec<TextRange>,
    /// `local print = print` records `print`.
    pub alias_of: Option<String>,
    pub declared_type: Option<String>,
}

impl Variable {
    pub fn new(name: &str, file: FileId, range: TextRange) -> Self {
        Self {
            name: name.to_string(),
            file,
            kind: ValueKind::Unknown,
            range,
            scope: None,
            owner: None,
            function: None,
            reference: None,
            members: IndexMap::new(),
            flags: VariableFlags::empty(),
            assign_sites: Vec::new(),
            alias_of: None,
            declared_type: None,
        }
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_flags(mut self, flags: VariableFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_local(&self) -> bool {
        self.scope.is_some()
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(VariableFlags::USED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    Require,
    Dofile,
    Loadfile,
    Import(ImportMode),
}

impl LoadKind {
    /// Whether the argument is a module name (`a.b`) rather than a file path.
    pub fn takes_module_name(self) -> bool {
        matches!(self, LoadKind::Require | LoadKind::Import(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    Local,
    Global,
    #[default]
    Unbound,
}

/// A load edge: `require "a.b"`, `dofile "x.lua"`, or a configured primitive.
#[derive(Debug, Clone)]
pub struct Reference {
    pub path: String,
    pub load: LoadKind,
    pub target: Option<FileId>,
    pub binding: Binding,
    pub range: TextRange,
    /// The target was still being walked when this edge was met.
    pub in_progress: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ReturnSite {
    pub range: TextRange,
    pub kind: ValueKind,
    pub value: Option<VariableId>,
}

#[derive(Debug, Clone, Copy)]
pub struct Label {
    pub scope: ScopeId,
    pub range: TextRange,
}

#[derive(Debug, Clone)]
pub struct PendingGoto {
    pub label: String,
    pub scope: ScopeId,
    pub range: TextRange,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub file: FileId,
    pub name: Option<String>,
    pub parent: Option<FunctionId>,
    pub main_scope: ScopeId,
    pub depth: u32,
    pub scope_depth: u32,
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub param_types: HashMap<String, String>,
    pub return_types: Vec<String>,
    pub has_colon: bool,
    /// The table a `:`-function was declared on.
    pub colon_variable: Option<VariableId>,
    pub returns: Vec<ReturnSite>,
    pub labels: HashMap<String, Vec<Label>>,
    pub pending_gotos: Vec<PendingGoto>,
    pub range: TextRange,
}

impl Function {
    /// Last return whose value is known not to be nil.
    pub fn last_value_return(&self) -> Option<&ReturnSite> {
        self.returns
            .iter()
            .rev()
            .find(|site| site.kind != ValueKind::Nil)
    }
}

/// Construction parameters for [`SymbolStore::create_function`].
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub file: FileId,
    pub name: Option<String>,
    pub parent: Option<FunctionId>,
    pub parent_scope: Option<ScopeId>,
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub has_colon: bool,
    pub range: TextRange,
}

impl FunctionSpec {
    /// The implicit vararg function wrapping a whole chunk.
    pub fn main(file: FileId, range: TextRange) -> Self {
        Self {
            file,
            name: None,
            parent: None,
            parent_scope: None,
            params: Vec::new(),
            is_vararg: true,
            has_colon: false,
            range,
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolStore {
    pub(crate) scopes: Arena<Scope>,
    pub(crate) variables: Arena<Variable>,
    pub(crate) functions: Arena<Function>,
    pub(crate) references: Arena<Reference>,
    imported_variables: HashMap<(FileId, VariableId), VariableId>,
    imported_functions: HashMap<(FileId, FunctionId), FunctionId>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the function and its main scope.
    pub fn create_function(&mut self, spec: FunctionSpec) -> FunctionId {
        let depth = spec.parent.map_or(0, |p| self.functions[p].depth + 1);
        let main_scope = self.scopes.next_id();
        let id = self.functions.alloc_with_id(|id| Function {
            id,
            file: spec.file,
            name: spec.name,
            parent: spec.parent,
            main_scope,
            depth,
            scope_depth: 0,
            params: spec.params,
            is_vararg: spec.is_vararg,
            param_types: HashMap::new(),
            return_types: Vec::new(),
            has_colon: spec.has_colon,
            colon_variable: None,
            returns: Vec::new(),
            labels: HashMap::new(),
            pending_gotos: Vec::new(),
            range: spec.range,
        });
        self.create_scope(ScopeKind::Function, spec.parent_scope, id, spec.range);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id]
    }

    pub fn alloc_variable(&mut self, variable: Variable) -> VariableId {
        self.variables.alloc(variable)
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id]
    }

    pub fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id]
    }

    pub fn member(&self, id: VariableId, name: &str) -> Option<VariableId> {
        self.variables[id].members.get(name).copied()
    }

    pub fn alloc_reference(&mut self, reference: Reference) -> ReferenceId {
        self.references.alloc(reference)
    }

    pub fn reference(&self, id: ReferenceId) -> &Reference {
        &self.references[id]
    }

    pub fn reference_mut(&mut self, id: ReferenceId) -> &mut Reference {
        &mut self.references[id]
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables.iter()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Deep-copies a variable (members, function and reference links) from
    /// `other`, the store of `origin`'s first-pass analysis. Repeated imports
    /// of the same variable return the same local id.
    pub fn import_variable(
        &mut self,
        other: &SymbolStore,
        origin: FileId,
        id: VariableId,
    ) -> VariableId {
        if let Some(&local) = self.imported_variables.get(&(origin, id)) {
            return local;
        }

        let source = &other.variables[id];
        let local = self.variables.alloc(Variable {
            name: source.name.clone(),
            file: source.file,
            kind: source.kind,
            range: source.range,
            scope: None,
            owner: None,
            function: None,
            reference: None,
            members: IndexMap::new(),
            flags: source.flags - VariableFlags::USED,
            assign_sites: Vec::new(),
            alias_of: source.alias_of.clone(),
            declared_type: source.declared_type.clone(),
        });
        // Registered before recursing so self-referencing tables terminate.
        self.imported_variables.insert((origin, id), local);

        if let Some(function) = source.function {
            let copied = self.import_function(other, origin, function);
            self.variables[local].function = Some(copied);
        }
        if let Some(reference) = source.reference {
            let copied = self.references.alloc(other.references[reference].clone());
            self.variables[local].reference = Some(copied);
        }
        for (name, &member) in &source.members {
            let copied = self.import_variable(other, origin, member);
            self.variables[local].members.insert(name.clone(), copied);
        }

        local
    }

    fn import_function(
        &mut self,
        other: &SymbolStore,
        origin: FileId,
        id: FunctionId,
    ) -> FunctionId {
        if let Some(&local) = self.imported_functions.get(&(origin, id)) {
            return local;
        }

        let source = &other.functions[id];
        let local = self.create_function(FunctionSpec {
            file: source.file,
            name: source.name.clone(),
            parent: None,
            parent_scope: None,
            params: source.params.clone(),
            is_vararg: source.is_vararg,
            has_colon: source.has_colon,
            range: source.range,
        });
        let copied = &mut self.functions[local];
        copied.param_types = source.param_types.clone();
        copied.return_types = source.return_types.clone();
        self.imported_functions.insert((origin, id), local);
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_at(line: u32) -> TextRange {
        TextRange::from_coords(line, 0, line, 5)
    }

    #[test]
    fn create_function_allocates_main_scope() {
        let mut store = SymbolStore::new();
        let main = store.create_function(FunctionSpec::main(FileId::new(0), range_at(0)));
        let scope = store.function(main).main_scope;

        assert_eq!(store.scope(scope).function, main);
        assert_eq!(store.scope(scope).kind, ScopeKind::Function);
        assert_eq!(store.function(main).depth, 0);
    }

    #[test]
    fn nested_function_depth_follows_parent() {
        let mut store = SymbolStore::new();
        let file = FileId::new(0);
        let main = store.create_function(FunctionSpec::main(file, range_at(0)));
        let inner = store.create_function(FunctionSpec {
            parent: Some(main),
            parent_scope: Some(store.function(main).main_scope),
            ..FunctionSpec::main(file, range_at(1))
        });

        assert_eq!(store.function(inner).depth, 1);
        let inner_scope = store.function(inner).main_scope;
        assert_eq!(store.scope(inner_scope).parent, Some(store.function(main).main_scope));
    }

    #[test]
    fn import_copies_members_once() {
        let file = FileId::new(3);
        let mut origin = SymbolStore::new();
        let member = origin.alloc_variable(
            Variable::new("f", file, range_at(1)).with_kind(ValueKind::Number),
        );
        let table = origin.alloc_variable(
            Variable::new("M", file, range_at(0)).with_kind(ValueKind::Table),
        );
        origin.variable_mut(table).members.insert("f".into(), member);

        let mut target = SymbolStore::new();
        let first = target.import_variable(&origin, file, table);
        let second = target.import_variable(&origin, file, table);

        assert_eq!(first, second);
        let copied = target.variable(first);
        assert_eq!(copied.kind, ValueKind::Table);
        assert_eq!(copied.file, file);
        let f = target.member(first, "f").unwrap();
        assert_eq!(target.variable(f).kind, ValueKind::Number);
    }

    #[test]
    fn import_handles_self_referencing_tables() {
        let file = FileId::new(0);
        let mut origin = SymbolStore::new();
        let table = origin.alloc_variable(
            Variable::new("t", file, range_at(0)).with_kind(ValueKind::Table),
        );
        origin.variable_mut(table).members.insert("me".into(), table);

        let mut target = SymbolStore::new();
        let copied = target.import_variable(&origin, file, table);

        assert_eq!(target.member(copied, "me"), Some(copied));
    }

    #[test]
    fn kind_from_annotation_type_names() {
        assert_eq!(ValueKind::from_type_name("integer"), ValueKind::Number);
        assert_eq!(ValueKind::from_type_name("string?"), ValueKind::String);
        assert_eq!(ValueKind::from_type_name("Player"), ValueKind::Table);
        assert_eq!(ValueKind::from_type_name("string|nil"), ValueKind::Unknown);
    }
}
