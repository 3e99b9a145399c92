//! Pass coordination
//!
//! Five passes share one walker. Each pass is a [`PassStrategy`]; which
//! diagnostic kinds a pass may emit, and whether a kind survives real-time
//! mode, is the declarative [`CHECK_TABLE`].

use bitflags::bitflags;
use serde::Serialize;
use tracing::trace;

use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::project::FileId;
use crate::syntax::TextRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pass {
    FileLocal,
    Project,
    Scattered,
    ReferenceSearch,
    Coloring,
}

impl Pass {
    pub fn number(self) -> u8 {
        match self {
            Pass::FileLocal => 1,
            Pass::Project => 2,
            Pass::Scattered => 3,
            Pass::ReferenceSearch => 4,
            Pass::Coloring => 5,
        }
    }

    pub fn as_set(self) -> PassSet {
        match self {
            Pass::FileLocal => PassSet::FILE_LOCAL,
            Pass::Project => PassSet::PROJECT,
            Pass::Scattered => PassSet::SCATTERED,
            Pass::ReferenceSearch => PassSet::REFERENCE_SEARCH,
            Pass::Coloring => PassSet::COLORING,
        }
    }
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pass {}", self.number())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassSet: u8 {
        const FILE_LOCAL = 1 << 0;
        const PROJECT = 1 << 1;
        const SCATTERED = 1 << 2;
        const REFERENCE_SEARCH = 1 << 3;
        const COLORING = 1 << 4;
        const CHECKING = Self::FILE_LOCAL.bits() | Self::PROJECT.bits() | Self::SCATTERED.bits();
        const INTRA_FILE = Self::FILE_LOCAL.bits() | Self::PROJECT.bits();
        const RESOLVING = Self::PROJECT.bits() | Self::SCATTERED.bits();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CheckPolicy {
    pub kind: ErrorKind,
    pub passes: PassSet,
    /// Still evaluated when the host asks for the real-time fast path.
    pub realtime: bool,
}

impl CheckPolicy {
    const fn new(kind: ErrorKind, passes: PassSet, realtime: bool) -> Self {
        Self {
            kind,
            passes,
            realtime,
        }
    }

    pub fn applies(&self, pass: Pass, realtime: bool) -> bool {
        self.passes.contains(pass.as_set()) && (self.realtime || !realtime)
    }
}

pub const CHECK_TABLE: &[CheckPolicy] = &[
    CheckPolicy::new(ErrorKind::UndefinedGlobal, PassSet::RESOLVING, true),
    CheckPolicy::new(ErrorKind::UndefinedMember, PassSet::RESOLVING, true),
    CheckPolicy::new(ErrorKind::LoadOrder, PassSet::PROJECT, true),
    CheckPolicy::new(ErrorKind::ImportNotFound, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::Syntax, PassSet::CHECKING, true),
    CheckPolicy::new(ErrorKind::DuplicateKey, PassSet::FILE_LOCAL, false),
    CheckPolicy::new(ErrorKind::DuplicateEnumValue, PassSet::FILE_LOCAL, false),
    CheckPolicy::new(ErrorKind::CallArity, PassSet::CHECKING, true),
    CheckPolicy::new(ErrorKind::AssignCount, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::DuplicateParam, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::ArgumentType, PassSet::CHECKING, true),
    CheckPolicy::new(ErrorKind::ReturnType, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::AssignmentType, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::BinaryOperandType, PassSet::CHECKING, true),
    CheckPolicy::new(ErrorKind::DuplicateIf, PassSet::INTRA_FILE, false),
    CheckPolicy::new(ErrorKind::SelfAssign, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::OrAlwaysTrue, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::AndAlwaysFalse, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::DuplicateExp, PassSet::INTRA_FILE, false),
    CheckPolicy::new(ErrorKind::FloatEquality, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::UnusedLocal, PassSet::FILE_LOCAL, false),
    CheckPolicy::new(ErrorKind::UnusedLocalFunction, PassSet::FILE_LOCAL, false),
    CheckPolicy::new(ErrorKind::ConstAssign, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::UnknownGotoLabel, PassSet::INTRA_FILE, true),
    CheckPolicy::new(ErrorKind::MaybeNil, PassSet::CHECKING, true),
];

pub fn check_policy(kind: ErrorKind) -> Option<&'static CheckPolicy> {
    CHECK_TABLE.iter().find(|policy| policy.kind == kind)
}

/// Classification of one identifier occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolClass {
    Local,
    Parameter,
    LoopVariable,
    Upvalue,
    Global,
    GlobalFunction,
    LocalFunction,
    Builtin,
    Unresolved,
}

impl SymbolClass {
    pub fn is_local(self) -> bool {
        matches!(
            self,
            SymbolClass::Local
                | SymbolClass::Parameter
                | SymbolClass::LoopVariable
                | SymbolClass::Upvalue
                | SymbolClass::LocalFunction
        )
    }
}

/// Identity of a declaration across stores: declaring file plus range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclKey {
    pub file: FileId,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRole {
    Declaration,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
pub struct NameOccurrence<'a> {
    pub name: &'a str,
    pub file: FileId,
    pub range: TextRange,
    pub role: NameRole,
    pub declaration: Option<DeclKey>,
    pub class: SymbolClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorSpan {
    pub range: TextRange,
    pub class: SymbolClass,
}

/// Pass-specific behavior plugged into the shared walker.
pub trait PassStrategy {
    fn pass(&self) -> Pass;

    fn should_check(&self, kind: ErrorKind, realtime: bool) -> bool {
        check_policy(kind).is_some_and(|policy| policy.applies(self.pass(), realtime))
    }

    /// Only the project pass walks into import targets.
    fn recurses_into_imports(&self) -> bool {
        self.pass() == Pass::Project
    }

    fn on_resolved_name(&mut self, _occurrence: &NameOccurrence<'_>) {}

    fn on_unresolved_name(&mut self, _occurrence: &NameOccurrence<'_>) {}

    /// Returns whether the diagnostic should be recorded.
    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct FileLocalPass;

impl PassStrategy for FileLocalPass {
    fn pass(&self) -> Pass {
        Pass::FileLocal
    }
}

#[derive(Debug, Default)]
pub struct ProjectPass;

impl PassStrategy for ProjectPass {
    fn pass(&self) -> Pass {
        Pass::Project
    }
}

#[derive(Debug, Default)]
pub struct ScatteredPass;

impl PassStrategy for ScatteredPass {
    fn pass(&self) -> Pass {
        Pass::Scattered
    }
}

/// Collects every occurrence bound to one declaration.
#[derive(Debug)]
pub struct ReferenceSearchPass {
    target: DeclKey,
    matches: Vec<(FileId, TextRange)>,
}

impl ReferenceSearchPass {
    pub fn new(target: DeclKey) -> Self {
        Self {
            target,
            matches: Vec::new(),
        }
    }

    pub fn into_matches(self) -> Vec<(FileId, TextRange)> {
        self.matches
    }
}

impl PassStrategy for ReferenceSearchPass {
    fn pass(&self) -> Pass {
        Pass::ReferenceSearch
    }

    fn on_resolved_name(&mut self, occurrence: &NameOccurrence<'_>) {
        if occurrence.declaration == Some(self.target) {
            self.matches.push((occurrence.file, occurrence.range));
        }
    }

    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedName {
    pub range: TextRange,
    pub class: SymbolClass,
    pub declaration: Option<DeclKey>,
}

/// Classifies every identifier occurrence of a file.
#[derive(Debug, Default)]
pub struct ColoringPass {
    names: Vec<ClassifiedName>,
}

impl ColoringPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, occurrence: &NameOccurrence<'_>) {
        self.names.push(ClassifiedName {
            range: occurrence.range,
            class: occurrence.class,
            declaration: occurrence.declaration,
        });
    }

    pub fn into_names(mut self) -> Vec<ClassifiedName> {
        self.names.sort_by_key(|n| n.range.start);
        self.names
    }
}

impl PassStrategy for ColoringPass {
    fn pass(&self) -> Pass {
        Pass::Coloring
    }

    fn on_resolved_name(&mut self, occurrence: &NameOccurrence<'_>) {
        self.record(occurrence);
    }

    fn on_unresolved_name(&mut self, occurrence: &NameOccurrence<'_>) {
        self.record(occurrence);
    }

    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Walking { pass: Pass, file: FileId },
    /// `suspended` waits on an import while `target` is walked.
    Nested {
        pass: Pass,
        suspended: FileId,
        target: FileId,
    },
    Done,
}

/// Walk-stack bookkeeping for one pass run.
///
/// Idle → Walking → (Nested → Walking)* → Done. The stack doubles as the
/// import stack used for cycle detection.
#[derive(Debug)]
pub struct PhaseTracker {
    pass: Pass,
    stack: Vec<FileId>,
    done: bool,
}

impl PhaseTracker {
    pub fn new(pass: Pass) -> Self {
        Self {
            pass,
            stack: Vec::new(),
            done: false,
        }
    }

    pub fn enter(&mut self, file: FileId) {
        self.done = false;
        self.stack.push(file);
        trace!(pass = %self.pass, ?file, depth = self.stack.len(), "entering file");
    }

    pub fn leave(&mut self) -> Option<FileId> {
        let file = self.stack.pop();
        trace!(pass = %self.pass, ?file, depth = self.stack.len(), "leaving file");
        file
    }

    pub fn finish(&mut self) {
        self.stack.clear();
        self.done = true;
    }

    pub fn is_active(&self, file: FileId) -> bool {
        self.stack.contains(&file)
    }

    pub fn stack(&self) -> &[FileId] {
        &self.stack
    }

    pub fn phase(&self) -> PassPhase {
        if self.done {
            return PassPhase::Done;
        }
        match self.stack.as_slice() {
            [] => PassPhase::Idle,
            [file] => PassPhase::Walking {
                pass: self.pass,
                file: *file,
            },
            [.., suspended, target] => PassPhase::Nested {
                pass: self.pass,
                suspended: *suspended,
                target: *target,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_policy() {
        for kind in ErrorKind::ALL {
            assert!(check_policy(kind).is_some(), "{} has no policy", kind);
        }
    }

    #[test]
    fn unused_local_is_first_pass_only_and_not_realtime() {
        let strategy = FileLocalPass;
        assert!(strategy.should_check(ErrorKind::UnusedLocal, false));
        assert!(!strategy.should_check(ErrorKind::UnusedLocal, true));
        assert!(!ProjectPass.should_check(ErrorKind::UnusedLocal, false));
    }

    #[test]
    fn resolution_kinds_need_cross_file_data() {
        assert!(!FileLocalPass.should_check(ErrorKind::UndefinedGlobal, false));
        assert!(ProjectPass.should_check(ErrorKind::UndefinedGlobal, false));
        assert!(ScatteredPass.should_check(ErrorKind::UndefinedGlobal, true));
        assert!(ProjectPass.should_check(ErrorKind::LoadOrder, false));
        assert!(!ScatteredPass.should_check(ErrorKind::LoadOrder, false));
    }

    #[test]
    fn search_and_coloring_passes_never_check() {
        let search = ReferenceSearchPass::new(DeclKey {
            file: FileId::new(0),
            range: TextRange::default(),
        });
        for kind in ErrorKind::ALL {
            assert!(!search.should_check(kind, false));
            assert!(!ColoringPass::new().should_check(kind, false));
        }
    }

    #[test]
    fn only_project_pass_recurses() {
        assert!(ProjectPass.recurses_into_imports());
        assert!(!FileLocalPass.recurses_into_imports());
        assert!(!ScatteredPass.recurses_into_imports());
    }

    #[test]
    fn reference_search_keeps_matching_declarations() {
        let target = DeclKey {
            file: FileId::new(1),
            range: TextRange::from_coords(0, 6, 0, 7),
        };
        let mut search = ReferenceSearchPass::new(target);
        let hit = NameOccurrence {
            name: "x",
            file: FileId::new(1),
            range: TextRange::from_coords(2, 0, 2, 1),
            role: NameRole::Read,
            declaration: Some(target),
            class: SymbolClass::Local,
        };
        let miss = NameOccurrence {
            declaration: None,
            ..hit
        };
        search.on_resolved_name(&hit);
        search.on_resolved_name(&miss);

        assert_eq!(search.into_matches(), vec![(FileId::new(1), hit.range)]);
    }

    #[test]
    fn phase_tracker_transitions() {
        let (a, b) = (FileId::new(0), FileId::new(1));
        let mut tracker = PhaseTracker::new(Pass::Project);
        assert_eq!(tracker.phase(), PassPhase::Idle);

        tracker.enter(a);
        assert_eq!(tracker.phase(), PassPhase::Walking { pass: Pass::Project, file: a });

        tracker.enter(b);
        assert_eq!(
            tracker.phase(),
            PassPhase::Nested {
                pass: Pass::Project,
                suspended: a,
                target: b
            }
        );
        assert!(tracker.is_active(a));

        assert_eq!(tracker.leave(), Some(b));
        assert_eq!(tracker.phase(), PassPhase::Walking { pass: Pass::Project, file: a });

        tracker.leave();
        tracker.finish();
        assert_eq!(tracker.phase(), PassPhase::Done);
    }

    #[test]
    fn color_spans_serialize_with_kebab_case_classes() {
        let span = ColorSpan {
            range: TextRange::from_coords(0, 6, 0, 7),
            class: SymbolClass::LoopVariable,
        };
        let json = serde_json::to_value(&span).unwrap();

        assert_eq!(json["class"], "loop-variable");
        assert_eq!(json["range"]["start"]["column"], 6);
    }
}
