//! Diagnostic reporting for analysis results
//!
//! Provides the diagnostic taxonomy, the diagnostic record handed to the
//! LSP-facing layer, and the sink that applies the suppression layers.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use crate::config::DiagnosticsConfig;
use crate::disable_comments::DisableDirectives;
use crate::syntax::TextRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    // resolution
    UndefinedGlobal,
    UndefinedMember,
    LoadOrder,
    ImportNotFound,
    Syntax,
    // shape
    DuplicateKey,
    DuplicateEnumValue,
    CallArity,
    AssignCount,
    DuplicateParam,
    // annotation types
    ArgumentType,
    ReturnType,
    AssignmentType,
    BinaryOperandType,
    // redundancy
    DuplicateIf,
    SelfAssign,
    OrAlwaysTrue,
    AndAlwaysFalse,
    DuplicateExp,
    FloatEquality,
    // lifecycle and flow
    UnusedLocal,
    UnusedLocalFunction,
    ConstAssign,
    UnknownGotoLabel,
    MaybeNil,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 25] = [
        ErrorKind::UndefinedGlobal,
        ErrorKind::UndefinedMember,
        ErrorKind::LoadOrder,
        ErrorKind::ImportNotFound,
        ErrorKind::Syntax,
        ErrorKind::DuplicateKey,
        ErrorKind::DuplicateEnumValue,
        ErrorKind::CallArity,
        ErrorKind::AssignCount,
        ErrorKind::DuplicateParam,
        ErrorKind::ArgumentType,
        ErrorKind::ReturnType,
        ErrorKind::AssignmentType,
        ErrorKind::BinaryOperandType,
        ErrorKind::DuplicateIf,
        ErrorKind::SelfAssign,
        ErrorKind::OrAlwaysTrue,
        ErrorKind::AndAlwaysFalse,
        ErrorKind::DuplicateExp,
        ErrorKind::FloatEquality,
        ErrorKind::UnusedLocal,
        ErrorKind::UnusedLocalFunction,
        ErrorKind::ConstAssign,
        ErrorKind::UnknownGotoLabel,
        ErrorKind::MaybeNil,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UndefinedGlobal => "R001",
            ErrorKind::UndefinedMember => "R002",
            ErrorKind::LoadOrder => "R003",
            ErrorKind::ImportNotFound => "R004",
            ErrorKind::Syntax => "R005",
            ErrorKind::DuplicateKey => "S001",
            ErrorKind::DuplicateEnumValue => "S002",
            ErrorKind::CallArity => "S003",
            ErrorKind::AssignCount => "S004",
            ErrorKind::DuplicateParam => "S005",
            ErrorKind::ArgumentType => "T001",
            ErrorKind::ReturnType => "T002",
            ErrorKind::AssignmentType => "T003",
            ErrorKind::BinaryOperandType => "T004",
            ErrorKind::DuplicateIf => "D001",
            ErrorKind::SelfAssign => "D002",
            ErrorKind::OrAlwaysTrue => "D003",
            ErrorKind::AndAlwaysFalse => "D004",
            ErrorKind::DuplicateExp => "D005",
            ErrorKind::FloatEquality => "D006",
            ErrorKind::UnusedLocal => "L001",
            ErrorKind::UnusedLocalFunction => "L002",
            ErrorKind::ConstAssign => "L003",
            ErrorKind::UnknownGotoLabel => "L004",
            ErrorKind::MaybeNil => "L005",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UndefinedGlobal => "undefined-global",
            ErrorKind::UndefinedMember => "undefined-member",
            ErrorKind::LoadOrder => "load-order",
            ErrorKind::ImportNotFound => "import-not-found",
            ErrorKind::Syntax => "syntax",
            ErrorKind::DuplicateKey => "duplicate-key",
            ErrorKind::DuplicateEnumValue => "duplicate-enum-value",
            ErrorKind::CallArity => "call-arity",
            ErrorKind::AssignCount => "assign-count",
            ErrorKind::DuplicateParam => "duplicate-param",
            ErrorKind::ArgumentType => "argument-type",
            ErrorKind::ReturnType => "return-type",
            ErrorKind::AssignmentType => "assignment-type",
            ErrorKind::BinaryOperandType => "binary-operand-type",
            ErrorKind::DuplicateIf => "duplicate-if",
            ErrorKind::SelfAssign => "self-assign",
            ErrorKind::OrAlwaysTrue => "or-always-true",
            ErrorKind::AndAlwaysFalse => "and-always-false",
            ErrorKind::DuplicateExp => "duplicate-exp",
            ErrorKind::FloatEquality => "float-equality",
            ErrorKind::UnusedLocal => "unused-local",
            ErrorKind::UnusedLocalFunction => "unused-local-function",
            ErrorKind::ConstAssign => "const-assign",
            ErrorKind::UnknownGotoLabel => "unknown-goto-label",
            ErrorKind::MaybeNil => "maybe-nil",
        }
    }

    /// Accepts either the kebab-case name or the code.
    pub fn from_name(value: &str) -> Option<ErrorKind> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == value || kind.code().eq_ignore_ascii_case(value))
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::Syntax | ErrorKind::ImportNotFound => Severity::Error,
            ErrorKind::UnusedLocal | ErrorKind::UnusedLocalFunction => Severity::Hint,
            ErrorKind::FloatEquality | ErrorKind::DuplicateExp => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedInfo {
    pub file: String,
    pub message: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub range: TextRange,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>, file: &str, range: TextRange) -> Self {
        Self {
            kind,
            code: kind.code(),
            severity: kind.default_severity(),
            message: message.into(),
            file: file.to_string(),
            range,
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, related: Vec<RelatedInfo>) -> Self {
        self.related = related;
        self
    }

    /// One-based line, for display.
    pub fn line(&self) -> usize {
        self.range.start.line as usize + 1
    }

    /// One-based column, for display.
    pub fn column(&self) -> usize {
        self.range.start.column as usize + 1
    }
}

#[derive(Debug, Clone)]
enum FilePattern {
    Substring(String),
    Regex(Regex),
}

impl FilePattern {
    fn parse(pattern: &str) -> Result<Self, regex::Error> {
        match pattern.strip_prefix("re:") {
            Some(re) => Ok(FilePattern::Regex(Regex::new(re)?)),
            None => Ok(FilePattern::Substring(pattern.replace('\\', "/"))),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            FilePattern::Substring(s) => path.contains(s.as_str()),
            FilePattern::Regex(re) => re.is_match(path),
        }
    }
}

/// The configured suppression layers, compiled once per project.
#[derive(Debug, Clone, Default)]
pub struct Suppression {
    disabled_kinds: HashSet<ErrorKind>,
    ignored_files: Vec<FilePattern>,
    file_kinds: Vec<(FilePattern, HashSet<ErrorKind>)>,
}

impl Suppression {
    /// Builds the layers from configuration; unknown kinds and invalid
    /// patterns are returned as warnings and otherwise skipped.
    pub fn from_config(config: &DiagnosticsConfig) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut suppression = Suppression::default();

        for name in &config.disabled {
            match ErrorKind::from_name(name) {
                Some(kind) => {
                    suppression.disabled_kinds.insert(kind);
                }
                None => warnings.push(format!("Unknown diagnostic kind: '{}'", name)),
            }
        }

        for pattern in &config.ignore_files {
            match FilePattern::parse(pattern) {
                Ok(p) => suppression.ignored_files.push(p),
                Err(e) => warnings.push(format!("Invalid file pattern '{}': {}", pattern, e)),
            }
        }

        for (pattern, names) in &config.ignore_file_kinds {
            let kinds: HashSet<ErrorKind> = names
                .iter()
                .filter_map(|name| {
                    let kind = ErrorKind::from_name(name);
                    if kind.is_none() {
                        warnings.push(format!("Unknown diagnostic kind: '{}'", name));
                    }
                    kind
                })
                .collect();
            match FilePattern::parse(pattern) {
                Ok(p) => suppression.file_kinds.push((p, kinds)),
                Err(e) => warnings.push(format!("Invalid file pattern '{}': {}", pattern, e)),
            }
        }

        (suppression, warnings)
    }

    pub fn disable_kind(&mut self, kind: ErrorKind) {
        self.disabled_kinds.insert(kind);
    }

    pub fn is_suppressed(&self, path: &str, kind: ErrorKind) -> bool {
        if self.disabled_kinds.contains(&kind) {
            return true;
        }
        if self.ignored_files.iter().any(|p| p.matches(path)) {
            return true;
        }
        self.file_kinds
            .iter()
            .any(|(p, kinds)| kinds.contains(&kind) && p.matches(path))
    }
}

/// Per-file accumulator; filtering happens on the way in.
#[derive(Debug)]
pub struct DiagnosticSink<'a> {
    path: String,
    suppression: &'a Suppression,
    directives: Option<&'a DisableDirectives>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DiagnosticSink<'a> {
    pub fn new(
        path: &str,
        suppression: &'a Suppression,
        directives: Option<&'a DisableDirectives>,
    ) -> Self {
        Self {
            path: path.to_string(),
            suppression,
            directives,
            diagnostics: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cheap pre-check so callers can skip building a message.
    pub fn accepts(&self, kind: ErrorKind) -> bool {
        !self.suppression.is_suppressed(&self.path, kind)
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        if !self.accepts(diagnostic.kind) {
            return;
        }
        let kind = diagnostic.kind;
        if self.directives.is_some_and(|d| {
            d.is_disabled(diagnostic.range.start.line, kind.name(), kind.code())
        }) {
            return;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn range() -> TextRange {
        TextRange::from_coords(0, 0, 0, 1)
    }

    fn config(
        disabled: &[&str],
        ignore_files: &[&str],
        per_file: &[(&str, &[&str])],
    ) -> DiagnosticsConfig {
        DiagnosticsConfig {
            disabled: disabled.iter().map(|s| s.to_string()).collect(),
            ignore_files: ignore_files.iter().map(|s| s.to_string()).collect(),
            ignore_file_kinds: per_file
                .iter()
                .map(|(p, kinds)| (p.to_string(), kinds.iter().map(|s| s.to_string()).collect()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn kind_names_and_codes_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
            assert_eq!(ErrorKind::from_name(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_name("no-such-kind"), None);
    }

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<_> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn globally_disabled_kind_is_suppressed() {
        let (suppression, warnings) =
            Suppression::from_config(&config(&["unused-local"], &[], &[]));
        assert!(warnings.is_empty());
        assert!(suppression.is_suppressed("a.lua", ErrorKind::UnusedLocal));
        assert!(!suppression.is_suppressed("a.lua", ErrorKind::DuplicateKey));
    }

    #[test]
    fn file_patterns_support_substring_and_regex() {
        let (suppression, _) =
            Suppression::from_config(&config(&[], &["vendor/", r"re:^gen_.*\.lua$"], &[]));
        assert!(suppression.is_suppressed("lib/vendor/x.lua", ErrorKind::UndefinedGlobal));
        assert!(suppression.is_suppressed("gen_proto.lua", ErrorKind::UndefinedGlobal));
        assert!(!suppression.is_suppressed("src/main.lua", ErrorKind::UndefinedGlobal));
    }

    #[test]
    fn per_file_per_kind_suppression() {
        let (suppression, _) =
            Suppression::from_config(&config(&[], &[], &[("test/", &["undefined-global"])]));
        assert!(suppression.is_suppressed("test/a.lua", ErrorKind::UndefinedGlobal));
        assert!(!suppression.is_suppressed("test/a.lua", ErrorKind::UnusedLocal));
        assert!(!suppression.is_suppressed("src/a.lua", ErrorKind::UndefinedGlobal));
    }

    #[test]
    fn unknown_kinds_and_bad_regex_become_warnings() {
        let (_, warnings) =
            Suppression::from_config(&config(&["bogus"], &["re:("], &[("x", &["nope"])]));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn sink_applies_inline_directives() {
        let suppression = Suppression::default();
        let directives =
            DisableDirectives::from_source("-- luma-disable-next-line unused-local\nlocal x = 1");
        let mut sink = DiagnosticSink::new("a.lua", &suppression, Some(&directives));

        sink.report(Diagnostic::new(
            ErrorKind::UnusedLocal,
            "unused",
            "a.lua",
            TextRange::from_coords(1, 6, 1, 7),
        ));
        sink.report(Diagnostic::new(
            ErrorKind::DuplicateKey,
            "dup",
            "a.lua",
            TextRange::from_coords(1, 0, 1, 1),
        ));

        let kinds: Vec<_> = sink.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::DuplicateKey]);
    }

    #[test]
    fn sink_drops_suppressed_kinds() {
        let mut suppression = Suppression::default();
        suppression.disable_kind(ErrorKind::SelfAssign);
        let mut sink = DiagnosticSink::new("a.lua", &suppression, None);

        sink.report(Diagnostic::new(ErrorKind::SelfAssign, "x", "a.lua", range()));

        assert!(sink.is_empty());
    }

    #[test]
    fn diagnostic_display_positions_are_one_based() {
        let diag = Diagnostic::new(
            ErrorKind::UnusedLocal,
            "x",
            "a.lua",
            TextRange::from_coords(2, 4, 2, 5),
        );
        assert_eq!(diag.line(), 3);
        assert_eq!(diag.column(), 5);
        assert_eq!(diag.code, "L001");
    }
}
