//! Ranged syntax tree for Lua chunks
//!
//! Every node carries a `TextRange` with zero-based line/column positions.
//! The analysis core only reads this tree; it never mutates it.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub const fn from_coords(line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start: Position::new(line, column),
            end: Position::new(end_line, end_column),
        }
    }

    /// Smallest range covering both `self` and `other`.
    pub fn cover(self, other: TextRange) -> TextRange {
        TextRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn contains_range(&self, other: &TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub name: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub block: Block,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stats: Vec<Stat>,
    pub ret: Option<ReturnStat>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStat {
    pub exprs: Vec<Exp>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub kind: StatKind,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatKind {
    Empty,
    Local(LocalStat),
    LocalFunction {
        name: Name,
        body: FunctionBody,
    },
    Function {
        name: FuncName,
        body: FunctionBody,
    },
    Assign {
        targets: Vec<Exp>,
        exprs: Vec<Exp>,
    },
    Call(Exp),
    Do(Block),
    While {
        cond: Exp,
        block: Block,
    },
    Repeat {
        block: Block,
        cond: Exp,
    },
    If(IfStat),
    NumericFor {
        var: Name,
        start: Exp,
        limit: Exp,
        step: Option<Exp>,
        block: Block,
    },
    GenericFor {
        names: Vec<Name>,
        exprs: Vec<Exp>,
        block: Block,
    },
    Goto(Name),
    Label(Name),
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalStat {
    pub names: Vec<LocalName>,
    pub exprs: Vec<Exp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalName {
    pub name: Name,
    pub attrib: Option<Attrib>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attrib {
    Const,
    Close,
}

/// `function a.b.c:m()` is `path = [a, b, c]`, `method = Some(m)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncName {
    pub path: Vec<Name>,
    pub method: Option<Name>,
}

impl FuncName {
    pub fn range(&self) -> TextRange {
        let first = self.path[0].range;
        let last = self
            .method
            .as_ref()
            .map(|m| m.range)
            .or_else(|| self.path.last().map(|n| n.range))
            .unwrap_or(first);
        first.cover(last)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStat {
    pub clauses: Vec<IfClause>,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub cond: Exp,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    pub params: Vec<Name>,
    pub is_vararg: bool,
    pub block: Block,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exp {
    pub kind: ExpKind,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    Nil,
    True,
    False,
    Vararg,
    Number { value: f64, is_float: bool },
    String(String),
    Function(Box<FunctionBody>),
    Table(TableConstructor),
    Name(String),
    /// `obj.key` (`dotted`) or `obj[key]`; a dotted key is a `String` expression.
    Index {
        obj: Box<Exp>,
        key: Box<Exp>,
        dotted: bool,
    },
    Call {
        func: Box<Exp>,
        args: Vec<Exp>,
    },
    MethodCall {
        obj: Box<Exp>,
        method: Name,
        args: Vec<Exp>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Exp>,
        rhs: Box<Exp>,
    },
    Unary {
        op: UnOp,
        operand: Box<Exp>,
    },
    Paren(Box<Exp>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableConstructor {
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Named { key: Name, value: Exp },
    Keyed { key: Exp, value: Exp },
    Positional(Exp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::IDiv
                | BinOp::Mod
                | BinOp::Pow
                | BinOp::BAnd
                | BinOp::BOr
                | BinOp::BXor
                | BinOp::Shl
                | BinOp::Shr
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::Concat => "..",
            BinOp::Eq => "==",
            BinOp::Ne => "~=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::BAnd => "&",
            BinOp::BOr => "|",
            BinOp::BXor => "~",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BNot,
}

impl Exp {
    pub fn new(kind: ExpKind, range: TextRange) -> Self {
        Self { kind, range }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExpKind::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match &self.kind {
            ExpKind::String(value) => Some(value),
            _ => None,
        }
    }

    /// Strips any number of enclosing parentheses.
    pub fn unparen(&self) -> &Exp {
        let mut exp = self;
        while let ExpKind::Paren(inner) = &exp.kind {
            exp = inner;
        }
        exp
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.unparen().kind, ExpKind::Nil)
    }

    /// Calls and `...` may expand to any number of values.
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self.kind,
            ExpKind::Call { .. } | ExpKind::MethodCall { .. } | ExpKind::Vararg
        )
    }

    /// Structural equality ignoring source ranges.
    pub fn same_as(&self, other: &Exp) -> bool {
        match (&self.kind, &other.kind) {
            (ExpKind::Nil, ExpKind::Nil)
            | (ExpKind::True, ExpKind::True)
            | (ExpKind::False, ExpKind::False)
            | (ExpKind::Vararg, ExpKind::Vararg) => true,
            (ExpKind::Number { value: a, .. }, ExpKind::Number { value: b, .. }) => a == b,
            (ExpKind::String(a), ExpKind::String(b)) => a == b,
            (ExpKind::Name(a), ExpKind::Name(b)) => a == b,
            (
                ExpKind::Index { obj: o1, key: k1, .. },
                ExpKind::Index { obj: o2, key: k2, .. },
            ) => o1.same_as(o2) && k1.same_as(k2),
            (ExpKind::Call { func: f1, args: a1 }, ExpKind::Call { func: f2, args: a2 }) => {
                f1.same_as(f2) && same_list(a1, a2)
            }
            (
                ExpKind::MethodCall {
                    obj: o1,
                    method: m1,
                    args: a1,
                },
                ExpKind::MethodCall {
                    obj: o2,
                    method: m2,
                    args: a2,
                },
            ) => o1.same_as(o2) && m1.name == m2.name && same_list(a1, a2),
            (
                ExpKind::Binary {
                    op: op1,
                    lhs: l1,
                    rhs: r1,
                },
                ExpKind::Binary {
                    op: op2,
                    lhs: l2,
                    rhs: r2,
                },
            ) => op1 == op2 && l1.same_as(l2) && r1.same_as(r2),
            (
                ExpKind::Unary {
                    op: op1,
                    operand: e1,
                },
                ExpKind::Unary {
                    op: op2,
                    operand: e2,
                },
            ) => op1 == op2 && e1.same_as(e2),
            (ExpKind::Paren(a), ExpKind::Paren(b)) => a.same_as(b),
            _ => false,
        }
    }

    /// Whether evaluating the expression can have side effects worth keeping
    /// a duplicate around for (calls do, plain reads do not).
    pub fn has_call(&self) -> bool {
        match &self.kind {
            ExpKind::Call { .. } | ExpKind::MethodCall { .. } => true,
            ExpKind::Index { obj, key, .. } => obj.has_call() || key.has_call(),
            ExpKind::Binary { lhs, rhs, .. } => lhs.has_call() || rhs.has_call(),
            ExpKind::Unary { operand, .. } => operand.has_call(),
            ExpKind::Paren(inner) => inner.has_call(),
            _ => false,
        }
    }
}

fn same_list(a: &[Exp], b: &[Exp]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str, col: u32) -> Exp {
        Exp::new(
            ExpKind::Name(n.to_string()),
            TextRange::from_coords(0, col, 0, col + n.len() as u32),
        )
    }

    #[test]
    fn cover_spans_both_ranges() {
        let a = TextRange::from_coords(0, 4, 0, 8);
        let b = TextRange::from_coords(2, 0, 2, 3);
        assert_eq!(a.cover(b), TextRange::from_coords(0, 4, 2, 3));
    }

    #[test]
    fn contains_range_is_inclusive() {
        let outer = TextRange::from_coords(0, 0, 10, 0);
        assert!(outer.contains_range(&TextRange::from_coords(0, 0, 10, 0)));
        assert!(!outer.contains_range(&TextRange::from_coords(0, 0, 10, 1)));
    }

    #[test]
    fn same_as_ignores_ranges() {
        assert!(name("a", 0).same_as(&name("a", 20)));
        assert!(!name("a", 0).same_as(&name("b", 0)));
    }

    #[test]
    fn unparen_strips_nested_parentheses() {
        let inner = name("x", 2);
        let wrapped = Exp::new(
            ExpKind::Paren(Box::new(Exp::new(
                ExpKind::Paren(Box::new(inner.clone())),
                TextRange::default(),
            ))),
            TextRange::default(),
        );
        assert_eq!(wrapped.unparen(), &inner);
    }
}
