//! JSON output formatter for programmatic integration

use std::collections::HashSet;

use luma_core::{Diagnostic, Severity};
use serde::Serialize;

#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub version: &'static str,
    pub metadata: JsonMetadata,
    pub summary: JsonSummary,
    pub diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
pub struct JsonMetadata {
    pub luma_version: &'static str,
    pub analyzed_path: String,
}

#[derive(Serialize, Default)]
pub struct JsonSummary {
    pub total_files: usize,
    pub files_with_issues: usize,
    pub total_diagnostics: usize,
    pub by_severity: SeverityCounts,
}

#[derive(Serialize, Default)]
pub struct SeverityCounts {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
    pub hint: usize,
}

#[derive(Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(
        &self,
        diagnostics: &[Diagnostic],
        total_files: usize,
        analyzed_path: &str,
    ) -> String {
        let output = JsonOutput {
            version: "1.0",
            metadata: JsonMetadata {
                luma_version: env!("CARGO_PKG_VERSION"),
                analyzed_path: analyzed_path.to_string(),
            },
            summary: self.build_summary(diagnostics, total_files),
            diagnostics,
        };
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }

    fn build_summary(&self, diagnostics: &[Diagnostic], total_files: usize) -> JsonSummary {
        let mut by_severity = SeverityCounts::default();
        let mut files_with_issues = HashSet::new();

        for diag in diagnostics {
            match diag.severity {
                Severity::Error => by_severity.error += 1,
                Severity::Warning => by_severity.warning += 1,
                Severity::Info => by_severity.info += 1,
                Severity::Hint => by_severity.hint += 1,
            }
            files_with_issues.insert(diag.file.as_str());
        }

        JsonSummary {
            total_files,
            files_with_issues: files_with_issues.len(),
            total_diagnostics: diagnostics.len(),
            by_severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luma_core::{ErrorKind, TextRange};
    use serde_json::Value;

    fn diagnostic(kind: ErrorKind, file: &str) -> Diagnostic {
        Diagnostic::new(kind, "message", file, TextRange::from_coords(2, 4, 2, 9))
    }

    #[test]
    fn output_is_valid_json_with_summary() {
        let diags = vec![
            diagnostic(ErrorKind::ImportNotFound, "a.lua"),
            diagnostic(ErrorKind::UnusedLocal, "a.lua"),
            diagnostic(ErrorKind::UndefinedGlobal, "b.lua"),
        ];
        let output = JsonFormatter::new().format(&diags, 5, "game");
        let json: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["metadata"]["analyzed_path"], "game");
        assert_eq!(json["summary"]["total_files"], 5);
        assert_eq!(json["summary"]["files_with_issues"], 2);
        assert_eq!(json["summary"]["by_severity"]["error"], 1);
        assert_eq!(json["summary"]["by_severity"]["hint"], 1);
    }

    #[test]
    fn diagnostics_keep_zero_based_ranges() {
        let diags = vec![diagnostic(ErrorKind::UndefinedGlobal, "main.lua")];
        let output = JsonFormatter::new().format(&diags, 1, ".");
        let json: Value = serde_json::from_str(&output).unwrap();

        let first = &json["diagnostics"][0];
        assert_eq!(first["kind"], "undefined-global");
        assert_eq!(first["severity"], "warning");
        assert_eq!(first["range"]["start"]["line"], 2);
        assert_eq!(first["range"]["end"]["column"], 9);
        assert!(first.get("related").is_none());
    }
}
