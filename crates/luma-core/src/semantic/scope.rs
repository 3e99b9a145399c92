//! Scope analysis for variable bindings
//!
//! Scopes live in the [`SymbolStore`] arena. Each one records its locals in
//! declaration order; a shadowing declaration appends to the name's list so
//! every declaration stays reachable for the unused-local scan.

use std::collections::HashMap;

use id_arena::Id;
use indexmap::IndexMap;

use super::symbols::{FunctionId, SymbolStore, VariableId};
use crate::syntax::TextRange;

pub type ScopeId = Id<Scope>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Function,
    Block,
    Loop,
    Branch,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub function: FunctionId,
    pub locals: IndexMap<String, Vec<VariableId>>,
    /// Names proven nil/false for the whole scope by its guard.
    pub narrowed: HashMap<String, VariableId>,
    /// Names proven falsy by earlier conditions of an `if`/`elseif` chain
    /// currently being walked in this scope.
    pub mid_narrow: HashMap<String, VariableId>,
    pub range: TextRange,
}

impl SymbolStore {
    pub fn create_scope(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        function: FunctionId,
        range: TextRange,
    ) -> ScopeId {
        let id = self.scopes.alloc_with_id(|id| Scope {
            id,
            kind,
            parent,
            children: Vec::new(),
            function,
            locals: IndexMap::new(),
            narrowed: HashMap::new(),
            mid_narrow: HashMap::new(),
            range,
        });

        if let Some(parent_id) = parent {
            self.scopes[parent_id].children.push(id);
        }

        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub fn parent_scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes[id].parent.map(|p| &self.scopes[p])
    }

    pub fn child_scopes(&self, id: ScopeId) -> impl Iterator<Item = &Scope> {
        self.scopes[id].children.iter().map(|&c| &self.scopes[c])
    }

    pub fn ancestors(&self, id: ScopeId) -> AncestorIter<'_> {
        AncestorIter {
            store: self,
            current: Some(id),
        }
    }

    pub fn is_descendant_of(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        self.ancestors(scope).any(|s| s.id == ancestor)
    }

    pub fn declare_local(&mut self, scope: ScopeId, name: &str, variable: VariableId) {
        self.variables[variable].scope = Some(scope);
        self.scopes[scope]
            .locals
            .entry(name.to_string())
            .or_default()
            .push(variable);
    }

    /// Innermost visible declaration of `name`, crossing function
    /// boundaries (upvalues).
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<VariableId> {
        self.ancestors(scope)
            .find_map(|s| s.locals.get(name).and_then(|vars| vars.last().copied()))
    }

    /// Every local declared directly in `scope`, shadowed ones included.
    pub fn scope_locals(&self, scope: ScopeId) -> impl Iterator<Item = VariableId> + '_ {
        self.scopes[scope].locals.values().flatten().copied()
    }
}

pub struct AncestorIter<'a> {
    store: &'a SymbolStore,
    current: Option<ScopeId>,
}

impl<'a> Iterator for AncestorIter<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<Self::Item> {
        let current_id = self.current?;
        let scope = &self.store.scopes[current_id];
        self.current = scope.parent;
        Some(scope)
    }
}
