//! Inline disable comment directives for suppressing diagnostics
//!
//! Supported forms (kinds are diagnostic names or codes):
//! - `-- luma-disable-next-line unused-local` - disable a kind on the next line
//! - `-- luma-disable-line unused-local` - disable a kind on the current line
//! - `-- luma-disable-next-line` - disable every kind on the next line
//! - `-- luma-disable-line undefined-global, L001` - disable several kinds
//!
//! Line numbers are zero-based, matching [`crate::syntax::TextRange`].

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisableDirective {
    pub line: u32,
    pub kinds: Vec<String>,
}

impl DisableDirective {
    pub fn new(line: u32, kinds: Vec<String>) -> Self {
        Self { line, kinds }
    }

    pub fn for_all_kinds(line: u32) -> Self {
        Self {
            line,
            kinds: Vec::new(),
        }
    }

    pub fn disables_all(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn disables(&self, name: &str, code: &str) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k == name || k == code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisableDirectives {
    by_line: HashMap<u32, DisableDirective>,
}

impl DisableDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source(source: &str) -> Self {
        let mut directives = Self::new();

        for (line_idx, line) in source.lines().enumerate() {
            let line_num = line_idx as u32;

            if let Some(comment_start) = line.find("--") {
                let comment = line[comment_start + 2..].trim_start_matches('-').trim();

                if let Some(rest) = comment.strip_prefix("luma-disable-next-line") {
                    directives.add(DisableDirective::new(line_num + 1, parse_kinds(rest)));
                } else if let Some(rest) = comment.strip_prefix("luma-disable-line") {
                    directives.add(DisableDirective::new(line_num, parse_kinds(rest)));
                }
            }
        }

        directives
    }

    pub fn add(&mut self, directive: DisableDirective) {
        self.by_line.insert(directive.line, directive);
    }

    pub fn is_disabled(&self, line: u32, name: &str, code: &str) -> bool {
        self.by_line
            .get(&line)
            .is_some_and(|d| d.disables(name, code))
    }

    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_line.len()
    }
}

fn parse_kinds(rest: &str) -> Vec<String> {
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_next_line_with_specific_kind() {
        let source = "-- luma-disable-next-line unused-local\nlocal x = 1\n";
        let directives = DisableDirectives::from_source(source);

        assert!(directives.is_disabled(1, "unused-local", "L001"));
        assert!(!directives.is_disabled(1, "duplicate-key", "S001"));
        assert!(!directives.is_disabled(0, "unused-local", "L001"));
    }

    #[test]
    fn disable_line_with_code() {
        let directives = DisableDirectives::from_source("local x = 1 -- luma-disable-line L001");

        assert!(directives.is_disabled(0, "unused-local", "L001"));
    }

    #[test]
    fn disable_next_line_without_kinds_disables_all() {
        let directives = DisableDirectives::from_source("--- luma-disable-next-line\nx = y");

        assert!(directives.is_disabled(1, "undefined-global", "R001"));
        assert!(directives.is_disabled(1, "anything", "X"));
    }

    #[test]
    fn multiple_kinds_are_split_on_commas() {
        let directives = DisableDirectives::from_source(
            "-- luma-disable-next-line unused-local, duplicate-key\nlocal t = {a=1, a=2}",
        );

        assert!(directives.is_disabled(1, "unused-local", "L001"));
        assert!(directives.is_disabled(1, "duplicate-key", "S001"));
        assert_eq!(directives.len(), 1);
    }

    #[test]
    fn ordinary_comments_are_ignored() {
        let directives = DisableDirectives::from_source("-- just a comment\nlocal x = 1");

        assert!(directives.is_empty());
    }
}
