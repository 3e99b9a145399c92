//! Pretty formatter for human-readable terminal output
//!
//! Displays diagnostics with colors, source code context, and summary.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use colored::{ColoredString, Colorize};
use luma_core::{Diagnostic, Severity};

pub struct PrettyFormatter {
    root: PathBuf,
    sources: HashMap<String, String>,
}

impl PrettyFormatter {
    /// Reads sources lazily, resolving diagnostic paths against `root`.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            sources: HashMap::new(),
        }
    }

    pub fn with_sources(sources: HashMap<String, String>) -> Self {
        Self {
            root: PathBuf::from("."),
            sources,
        }
    }

    pub fn format(&self, diagnostics: &[Diagnostic]) -> String {
        let mut output = String::new();

        for diag in diagnostics {
            output.push_str(&self.format_diagnostic(diag));
            output.push('\n');
        }

        if !diagnostics.is_empty() {
            output.push_str(&self.format_summary(diagnostics));
        }

        output
    }

    fn format_diagnostic(&self, diag: &Diagnostic) -> String {
        let mut lines = Vec::new();

        let severity_str = self.colorize_severity(&diag.severity);
        lines.push(format!(
            "{}[{}]: {}",
            severity_str,
            diag.kind.name().dimmed(),
            diag.message
        ));
        lines.push(format!(
            "  {} {}:{}:{}",
            "-->".blue(),
            diag.file,
            diag.line(),
            diag.column()
        ));

        let line_num_width = diag.line().to_string().len();
        let padding = " ".repeat(line_num_width);

        if let Some(source_line) = self.get_source_line(&diag.file, diag.line()) {
            lines.push(format!("{} {}", padding, "|".blue()));
            lines.push(format!(
                "{} {} {}",
                diag.line().to_string().blue(),
                "|".blue(),
                source_line
            ));

            let range = diag.range;
            let caret_padding = " ".repeat(range.start.column as usize);
            let caret_len = if range.end.line == range.start.line
                && range.end.column > range.start.column
            {
                (range.end.column - range.start.column) as usize
            } else {
                1
            };
            lines.push(format!(
                "{} {} {}{}",
                padding,
                "|".blue(),
                caret_padding,
                "^".repeat(caret_len).red()
            ));
        }

        for related in &diag.related {
            lines.push(format!(
                "{} {} {} {}:{}:{}: {}",
                padding,
                "=".blue(),
                "note:".green(),
                related.file,
                related.range.start.line + 1,
                related.range.start.column + 1,
                related.message
            ));
        }

        lines.join("\n")
    }

    fn colorize_severity(&self, severity: &Severity) -> ColoredString {
        match severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".blue().bold(),
            Severity::Hint => "hint".cyan().bold(),
        }
    }

    fn get_source_line(&self, file: &str, line: usize) -> Option<String> {
        if let Some(source) = self.sources.get(file) {
            return source.lines().nth(line - 1).map(|s| s.to_string());
        }

        if let Ok(content) = fs::read_to_string(self.root.join(file)) {
            return content.lines().nth(line - 1).map(|s| s.to_string());
        }

        None
    }

    fn format_summary(&self, diagnostics: &[Diagnostic]) -> String {
        let error_count = diagnostics
            .iter()
            .filter(|d| matches!(d.severity, Severity::Error))
            .count();
        let warning_count = diagnostics
            .iter()
            .filter(|d| matches!(d.severity, Severity::Warning))
            .count();

        let total = diagnostics.len();

        let errors_str = if error_count == 1 {
            format!("{} error", error_count)
        } else {
            format!("{} errors", error_count)
        };

        let warnings_str = if warning_count == 1 {
            format!("{} warning", warning_count)
        } else {
            format!("{} warnings", warning_count)
        };

        let problems_str = if total == 1 { "problem" } else { "problems" };

        format!(
            "\nFound {} {} ({}, {})\n",
            total.to_string().bold(),
            problems_str,
            errors_str.red(),
            warnings_str.yellow()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luma_core::{ErrorKind, RelatedInfo, TextRange};

    fn diagnostic(kind: ErrorKind, line: u32, column: u32, len: u32) -> Diagnostic {
        Diagnostic::new(
            kind,
            "unused local 'x'",
            "main.lua",
            TextRange::from_coords(line, column, line, column + len),
        )
    }

    fn sources(text: &str) -> HashMap<String, String> {
        HashMap::from([("main.lua".to_string(), text.to_string())])
    }

    #[test]
    fn shows_location_and_source_line() {
        let diag = diagnostic(ErrorKind::UnusedLocal, 1, 6, 1);
        let formatter = PrettyFormatter::with_sources(sources("print(1)\nlocal x = 1\n"));
        let output = formatter.format(&[diag]);

        assert!(output.contains("hint"));
        assert!(output.contains("unused-local"));
        assert!(output.contains("main.lua:2:7"));
        assert!(output.contains("local x = 1"));
    }

    #[test]
    fn caret_covers_the_range() {
        let diag = diagnostic(ErrorKind::UndefinedGlobal, 0, 6, 7);
        let formatter = PrettyFormatter::with_sources(sources("print(missing)\n"));
        let output = formatter.format(&[diag]);

        assert!(output.contains("^^^^^^^"));
        assert!(!output.contains("^^^^^^^^"));
    }

    #[test]
    fn related_locations_are_notes() {
        let diag = diagnostic(ErrorKind::DuplicateKey, 0, 15, 1).with_related(vec![RelatedInfo {
            file: "main.lua".into(),
            message: "first defined here".into(),
            range: TextRange::from_coords(0, 8, 0, 9),
        }]);
        let formatter = PrettyFormatter::with_sources(sources("return {x = 1, x = 2}\n"));
        let output = formatter.format(&[diag]);

        assert!(output.contains("note:"));
        assert!(output.contains("main.lua:1:9: first defined here"));
    }

    #[test]
    fn shows_summary() {
        let diags = vec![
            diagnostic(ErrorKind::ImportNotFound, 0, 0, 1),
            diagnostic(ErrorKind::Syntax, 1, 0, 1),
            diagnostic(ErrorKind::UndefinedGlobal, 2, 0, 1),
        ];
        let formatter = PrettyFormatter::with_sources(HashMap::new());
        let output = formatter.format(&diags);

        assert!(output.contains("problems"));
        assert!(output.contains("2 errors"));
        assert!(output.contains("1 warning"));
    }

    #[test]
    fn colors_match_severity() {
        let formatter = PrettyFormatter::with_sources(HashMap::new());
        let colored = formatter.colorize_severity(&Severity::Error);
        assert_eq!(colored.to_string(), "error".red().bold().to_string());
    }

    #[test]
    fn empty_diagnostics_produces_empty_output() {
        let formatter = PrettyFormatter::with_sources(HashMap::new());
        assert!(formatter.format(&[]).is_empty());
    }
}
