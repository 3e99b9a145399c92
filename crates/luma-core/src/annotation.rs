//! Annotation-comment type layer
//!
//! The walker asks a [`TypeOracle`] for declared types by `(file, line)`,
//! where `line` is the line of the annotated statement. The default oracle,
//! [`CommentAnnotations`], reads `---@` tags from the comment block directly
//! above that line.

use std::collections::HashMap;

use crate::syntax::CommentTable;

/// Declared parameter and return types of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTypes {
    pub params: HashMap<String, String>,
    pub returns: Vec<String>,
}

impl FunctionTypes {
    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.returns.is_empty()
    }
}

pub trait TypeOracle {
    fn function_types(&self, file: &str, line: u32) -> Option<FunctionTypes>;
    fn declared_type(&self, file: &str, line: u32) -> Option<String>;
    fn is_constant(&self, file: &str, line: u32) -> bool;
    fn is_enum(&self, file: &str, line: u32) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LineAnnotations {
    function: FunctionTypes,
    declared: Option<String>,
    constant: bool,
    is_enum: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommentAnnotations {
    files: HashMap<String, HashMap<u32, LineAnnotations>>,
}

impl CommentAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the annotations recorded for `file`.
    pub fn insert_file(&mut self, file: &str, comments: &CommentTable) {
        let mut lines = HashMap::new();
        for block in comments.blocks().iter().filter(|b| b.head) {
            let mut annotations = LineAnnotations::default();
            for text in &block.lines {
                parse_tag(text, &mut annotations);
            }
            if annotations != LineAnnotations::default() {
                lines.insert(block.range.end.line + 1, annotations);
            }
        }
        self.files.insert(file.to_string(), lines);
    }

    pub fn remove_file(&mut self, file: &str) {
        self.files.remove(file);
    }

    fn line(&self, file: &str, line: u32) -> Option<&LineAnnotations> {
        self.files.get(file)?.get(&line)
    }
}

impl TypeOracle for CommentAnnotations {
    fn function_types(&self, file: &str, line: u32) -> Option<FunctionTypes> {
        self.line(file, line)
            .map(|a| a.function.clone())
            .filter(|types| !types.is_empty())
    }

    fn declared_type(&self, file: &str, line: u32) -> Option<String> {
        self.line(file, line).and_then(|a| a.declared.clone())
    }

    fn is_constant(&self, file: &str, line: u32) -> bool {
        self.line(file, line).is_some_and(|a| a.constant)
    }

    fn is_enum(&self, file: &str, line: u32) -> bool {
        self.line(file, line).is_some_and(|a| a.is_enum)
    }
}

fn parse_tag(text: &str, out: &mut LineAnnotations) {
    let Some(body) = text.trim_start_matches('-').trim().strip_prefix('@') else {
        return;
    };
    let (tag, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let mut words = rest.split_whitespace();

    match tag {
        "param" => {
            if let (Some(name), Some(ty)) = (words.next(), words.next()) {
                let (name, ty) = match name.strip_suffix('?') {
                    Some(name) => (name, format!("{}?", ty)),
                    None => (name, ty.to_string()),
                };
                out.function.params.insert(name.to_string(), ty);
            }
        }
        "return" => {
            for part in rest.split(',') {
                if let Some(ty) = part.split_whitespace().next() {
                    out.function.returns.push(ty.to_string());
                }
            }
        }
        "type" => out.declared = words.next().map(str::to_string),
        "const" => out.constant = true,
        "enum" => out.is_enum = true,
        _ => {}
    }
}

const PRIMITIVES: &[&str] = &[
    "nil", "boolean", "number", "integer", "string", "function", "table", "thread", "userdata",
];

fn is_primitive(ty: &str) -> bool {
    PRIMITIVES.contains(&ty)
}

/// Whether a value of type `actual` may flow into a slot declared `expected`.
///
/// `number` and `integer` are interchangeable, every non-primitive name is a
/// table, and `any`, unknown shapes, unions and optionals are accepted
/// leniently.
pub fn types_compatible(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    let actual = actual.trim();

    if expected.is_empty() || actual.is_empty() {
        return true;
    }
    if matches!(expected, "any" | "unknown") || matches!(actual, "any" | "unknown") {
        return true;
    }
    if let Some(inner) = expected.strip_suffix('?') {
        return actual == "nil" || types_compatible(inner, actual);
    }
    if expected.contains('|') {
        return expected.split('|').any(|member| types_compatible(member, actual));
    }
    if actual.contains('|') || actual.ends_with('?') {
        return true;
    }

    let numeric = |ty: &str| matches!(ty, "number" | "integer");
    if numeric(expected) && numeric(actual) {
        return true;
    }

    match (is_primitive(expected), is_primitive(actual)) {
        (true, true) => expected == actual,
        (false, false) => true,
        (false, true) => actual == "table",
        (true, false) => expected == "table",
    }
}
