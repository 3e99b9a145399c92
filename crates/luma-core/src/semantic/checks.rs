//! Intra-file checks that only need the syntax tree
//!
//! Each check returns [`Finding`]s; the walker decides whether the kind
//! applies to the running pass and attaches the file path.

use std::collections::HashMap;
use std::fmt;

use crate::diagnostic::ErrorKind;
use crate::syntax::{BinOp, Exp, ExpKind, Field, IfClause, Name, TableConstructor, TextRange};

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub kind: ErrorKind,
    pub message: String,
    pub range: TextRange,
    /// Same-file related locations.
    pub related: Vec<(String, TextRange)>,
}

impl Finding {
    fn new(kind: ErrorKind, message: String, range: TextRange) -> Self {
        Self {
            kind,
            message,
            range,
            related: Vec::new(),
        }
    }

    fn related(mut self, message: &str, range: TextRange) -> Self {
        self.related.push((message.to_string(), range));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Literal {
    Str(String),
    Num(u64),
    Bool(bool),
}

impl Literal {
    fn of(exp: &Exp) -> Option<Literal> {
        match &exp.unparen().kind {
            ExpKind::String(s) => Some(Literal::Str(s.clone())),
            // -0.0 and 0.0 are the same key
            ExpKind::Number { value, .. } => Some(Literal::Num((value + 0.0).to_bits())),
            ExpKind::True => Some(Literal::Bool(true)),
            ExpKind::False => Some(Literal::Bool(false)),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{}", s),
            Literal::Num(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// `{x = 1, x = 2}` and `{["x"] = 1, x = 2}`; reported on the later key.
pub fn duplicate_keys(table: &TableConstructor) -> Vec<Finding> {
    let mut seen: HashMap<Literal, TextRange> = HashMap::new();
    let mut findings = Vec::new();

    for field in &table.fields {
        let (key, range) = match field {
            Field::Named { key, .. } => (Literal::Str(key.name.clone()), key.range),
            Field::Keyed { key, .. } => match Literal::of(key) {
                Some(literal) => (literal, key.range),
                None => continue,
            },
            Field::Positional(_) => continue,
        };
        match seen.get(&key) {
            Some(&first) => findings.push(
                Finding::new(
                    ErrorKind::DuplicateKey,
                    format!("duplicate key '{}' in table", key),
                    range,
                )
                .related("first defined here", first),
            ),
            None => {
                seen.insert(key, range);
            }
        }
    }

    findings
}

/// Two keys of an `---@enum` table sharing one literal value.
pub fn duplicate_enum_values(table: &TableConstructor) -> Vec<Finding> {
    let mut seen: HashMap<Literal, TextRange> = HashMap::new();
    let mut findings = Vec::new();

    for field in &table.fields {
        let value = match field {
            Field::Named { value, .. } | Field::Keyed { value, .. } => value,
            Field::Positional(_) => continue,
        };
        let Some(literal) = Literal::of(value) else {
            continue;
        };
        match seen.get(&literal) {
            Some(&first) => findings.push(
                Finding::new(
                    ErrorKind::DuplicateEnumValue,
                    format!("duplicate enum value '{}'", literal),
                    value.range,
                )
                .related("first used here", first),
            ),
            None => {
                seen.insert(literal, value.range);
            }
        }
    }

    findings
}

/// An `elseif` condition identical to an earlier one in the same chain.
pub fn duplicate_conditions(clauses: &[IfClause]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, clause) in clauses.iter().enumerate() {
        if clause.cond.has_call() {
            continue;
        }
        if let Some(first) = clauses[..idx].iter().find(|c| c.cond.same_as(&clause.cond)) {
            findings.push(
                Finding::new(
                    ErrorKind::DuplicateIf,
                    "duplicate condition in if chain".to_string(),
                    clause.cond.range,
                )
                .related("same condition here", first.cond.range),
            );
        }
    }
    findings
}

fn is_literal(exp: &Exp, kind: &ExpKind) -> bool {
    std::mem::discriminant(&exp.unparen().kind) == std::mem::discriminant(kind)
}

fn is_float_literal(exp: &Exp) -> bool {
    match &exp.unparen().kind {
        ExpKind::Number { is_float, .. } => *is_float,
        ExpKind::Unary { operand, .. } => is_float_literal(operand),
        _ => false,
    }
}

/// Redundant or suspicious binary expressions: identical operands,
/// `or true`, `and false`, float equality.
pub fn redundant_binary(op: BinOp, lhs: &Exp, rhs: &Exp, range: TextRange) -> Vec<Finding> {
    let mut findings = Vec::new();

    // `x ~= x` is the NaN test idiom.
    let self_comparable = !matches!(
        op,
        BinOp::Ne | BinOp::Add | BinOp::Mul | BinOp::Concat | BinOp::Pow
    );
    let literal = matches!(
        lhs.unparen().kind,
        ExpKind::Number { .. } | ExpKind::String(_)
    );
    if self_comparable && !lhs.has_call() && lhs.same_as(rhs) && !literal {
        findings.push(Finding::new(
            ErrorKind::DuplicateExp,
            format!("identical expressions on both sides of '{}'", op.as_str()),
            range,
        ));
    }

    match op {
        BinOp::Or if is_literal(rhs, &ExpKind::True) || is_literal(lhs, &ExpKind::True) => {
            findings.push(Finding::new(
                ErrorKind::OrAlwaysTrue,
                "'or true' makes the expression always true".to_string(),
                range,
            ));
        }
        BinOp::And if is_literal(rhs, &ExpKind::False) || is_literal(lhs, &ExpKind::False) => {
            findings.push(Finding::new(
                ErrorKind::AndAlwaysFalse,
                "'and false' makes the expression always false".to_string(),
                range,
            ));
        }
        BinOp::Eq | BinOp::Ne if is_float_literal(lhs) || is_float_literal(rhs) => {
            findings.push(Finding::new(
                ErrorKind::FloatEquality,
                format!("comparing floating point values with '{}' is unreliable", op.as_str()),
                range,
            ));
        }
        _ => {}
    }

    findings
}

/// `x = x` and `t.a, t.b = t.a, t.b` (pairwise by position).
pub fn self_assignments(targets: &[Exp], exprs: &[Exp]) -> Vec<Finding> {
    targets
        .iter()
        .zip(exprs)
        .filter(|(target, value)| !value.has_call() && target.same_as(value.unparen()))
        .map(|(target, _)| {
            Finding::new(
                ErrorKind::SelfAssign,
                "variable is assigned to itself".to_string(),
                target.range,
            )
        })
        .collect()
}

/// More values than targets, or fewer when the last value cannot expand.
pub fn value_count_mismatch(targets: usize, exprs: &[Exp], range: TextRange) -> Option<Finding> {
    let last_expands = exprs.last().is_some_and(Exp::is_multi_value);
    let values = exprs.len();
    if values == 0 || values == targets || (values < targets && last_expands) {
        return None;
    }
    Some(Finding::new(
        ErrorKind::AssignCount,
        format!("{} variable(s) but {} value(s)", targets, values),
        range,
    ))
}

pub fn duplicate_params(params: &[Name]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, param) in params.iter().enumerate() {
        if let Some(first) = params[..idx].iter().find(|p| p.name == param.name) {
            findings.push(
                Finding::new(
                    ErrorKind::DuplicateParam,
                    format!("duplicate parameter '{}'", param.name),
                    param.range,
                )
                .related("first declared here", first.range),
            );
        }
    }
    findings
}

/// `x = x or default` and `x = (x == nil) and value`, on one line.
pub fn is_self_reference_idiom(name: &str, value: &Exp) -> bool {
    let ExpKind::Binary { op, lhs, rhs } = &value.unparen().kind else {
        return false;
    };
    if lhs.range.start.line != rhs.range.end.line {
        return false;
    }
    let lhs = lhs.unparen();
    match op {
        BinOp::Or => lhs.as_name() == Some(name),
        BinOp::And => match &lhs.kind {
            ExpKind::Binary {
                op: BinOp::Eq,
                lhs: compared,
                rhs: nil,
            } => compared.unparen().as_name() == Some(name) && nil.is_nil(),
            _ => false,
        },
        _ => false,
    }
}

/// `a`, `a.b`, `a["b"].c` flattened into segments; `None` for computed keys.
pub fn member_chain(exp: &Exp) -> Option<Vec<(String, TextRange)>> {
    match &exp.kind {
        ExpKind::Name(name) => Some(vec![(name.clone(), exp.range)]),
        ExpKind::Index { obj, key, .. } => {
            let key_name = key.as_string()?;
            let mut chain = member_chain(obj)?;
            chain.push((key_name.to_string(), key.range));
            Some(chain)
        }
        _ => None,
    }
}
