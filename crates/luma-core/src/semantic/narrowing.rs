//! Flow-sensitive nil narrowing
//!
//! One-step approximation: a guard such as `if not x then` proves `x` falsy
//! for the guarded block only. Names are collected syntactically here; the
//! walker records a name only when it resolves to the same declaration that
//! ordinary lookup would find.

use std::collections::BTreeSet;

use super::scope::ScopeId;
use super::symbols::{SymbolStore, VariableId};
use crate::syntax::{BinOp, Exp, ExpKind, UnOp};

pub type NameSet = BTreeSet<String>;

/// Names proven nil or false whenever `exp` evaluates to `outcome`.
pub fn falsy_when(exp: &Exp, outcome: bool) -> NameSet {
    let exp = exp.unparen();
    match &exp.kind {
        ExpKind::Name(name) if !outcome => NameSet::from([name.clone()]),
        ExpKind::Unary {
            op: UnOp::Not,
            operand,
        } => falsy_when(operand, !outcome),
        ExpKind::Binary { op, lhs, rhs } => match (op, outcome) {
            (BinOp::Eq, true) | (BinOp::Ne, false) => nil_compared(lhs, rhs),
            (BinOp::And, true) | (BinOp::Or, false) => {
                let mut names = falsy_when(lhs, outcome);
                names.extend(falsy_when(rhs, outcome));
                names
            }
            (BinOp::Or, true) | (BinOp::And, false) => {
                intersect(falsy_when(lhs, outcome), falsy_when(rhs, outcome))
            }
            _ => NameSet::new(),
        },
        _ => NameSet::new(),
    }
}

/// Names proven non-nil whenever `exp` evaluates to `outcome`.
pub fn truthy_when(exp: &Exp, outcome: bool) -> NameSet {
    let exp = exp.unparen();
    match &exp.kind {
        ExpKind::Name(name) if outcome => NameSet::from([name.clone()]),
        ExpKind::Unary {
            op: UnOp::Not,
            operand,
        } => truthy_when(operand, !outcome),
        ExpKind::Binary { op, lhs, rhs } => match (op, outcome) {
            (BinOp::Ne, true) | (BinOp::Eq, false) => nil_compared(lhs, rhs),
            (BinOp::And, true) | (BinOp::Or, false) => {
                let mut names = truthy_when(lhs, outcome);
                names.extend(truthy_when(rhs, outcome));
                names
            }
            (BinOp::Or, true) | (BinOp::And, false) => {
                intersect(truthy_when(lhs, outcome), truthy_when(rhs, outcome))
            }
            _ => NameSet::new(),
        },
        _ => NameSet::new(),
    }
}

/// `x == nil` / `nil == x` yields `{x}`.
fn nil_compared(lhs: &Exp, rhs: &Exp) -> NameSet {
    let name = if rhs.is_nil() {
        lhs.unparen().as_name()
    } else if lhs.is_nil() {
        rhs.unparen().as_name()
    } else {
        None
    };
    name.map(|n| NameSet::from([n.to_string()])).unwrap_or_default()
}

fn intersect(a: NameSet, b: NameSet) -> NameSet {
    a.intersection(&b).cloned().collect()
}

impl SymbolStore {
    pub fn narrow(&mut self, scope: ScopeId, name: &str, variable: VariableId) {
        self.scope_mut(scope)
            .narrowed
            .insert(name.to_string(), variable);
    }

    /// The guarding declaration for `name`, searching outward while the
    /// scopes still belong to the same function as `scope`.
    pub fn narrowed(&self, scope: ScopeId, name: &str) -> Option<VariableId> {
        let function = self.scope(scope).function;
        self.ancestors(scope)
            .take_while(|s| s.function == function)
            .find_map(|s| s.narrowed.get(name).copied())
    }

    /// Drops the narrowing of `name` in every enclosing scope of the same
    /// function; called when the name is assigned.
    pub fn clear_narrowing(&mut self, scope: ScopeId, name: &str) {
        let function = self.scope(scope).function;
        let chain: Vec<ScopeId> = self
            .ancestors(scope)
            .take_while(|s| s.function == function)
            .map(|s| s.id)
            .collect();
        for id in chain {
            self.scope_mut(id).narrowed.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{StatKind, parse};

    fn cond(src: &str) -> Exp {
        let chunk = parse(&format!("if {} then end", src)).chunk.unwrap();
        match &chunk.block.stats[0].kind {
            StatKind::If(stat) => stat.clauses[0].cond.clone(),
            other => panic!("unexpected {:?}", other),
        }
    }

    fn names(set: NameSet) -> Vec<String> {
        set.into_iter().collect()
    }

    #[test]
    fn not_name_is_falsy_when_true() {
        assert_eq!(names(falsy_when(&cond("not x"), true)), vec!["x"]);
        assert!(falsy_when(&cond("not x"), false).is_empty());
    }

    #[test]
    fn nil_comparisons() {
        assert_eq!(names(falsy_when(&cond("x == nil"), true)), vec!["x"]);
        assert_eq!(names(falsy_when(&cond("nil ~= x"), false)), vec!["x"]);
        assert_eq!(names(truthy_when(&cond("x ~= nil"), true)), vec!["x"]);
    }

    #[test]
    fn and_true_unions_or_true_intersects() {
        assert_eq!(names(falsy_when(&cond("not a and not b"), true)), vec!["a", "b"]);
        assert_eq!(names(falsy_when(&cond("not a or not b"), true)), Vec::<String>::new());
        assert_eq!(names(falsy_when(&cond("not a or a == nil"), true)), vec!["a"]);
    }

    #[test]
    fn plain_name_is_falsy_when_false() {
        assert_eq!(names(falsy_when(&cond("(x)"), false)), vec!["x"]);
        assert_eq!(names(falsy_when(&cond("x or y"), false)), vec!["x", "y"]);
    }

    #[test]
    fn short_circuit_guards() {
        // `x and x.f`: the right side runs only when `x` is truthy.
        assert_eq!(names(truthy_when(&cond("x"), true)), vec!["x"]);
        // `not x or x.f`: the right side runs only when `not x` is false.
        assert_eq!(names(truthy_when(&cond("not x"), false)), vec!["x"]);
        assert_eq!(names(truthy_when(&cond("x == nil"), false)), vec!["x"]);
    }
}
