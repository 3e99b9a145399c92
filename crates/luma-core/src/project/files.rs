use std::collections::HashMap;

use serde::Serialize;

use crate::syntax::ParsedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileId(u32);

impl FileId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct SourceFile {
    pub id: FileId,
    pub path: String,
    pub parsed: ParsedFile,
}

/// Project files in registration order. Paths use `/` separators.
#[derive(Debug, Default)]
pub struct FileIndex {
    files: Vec<SourceFile>,
    by_path: HashMap<String, FileId>,
}

pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut out = path.as_str();
    while let Some(rest) = out.strip_prefix("./") {
        out = rest;
    }
    out.to_string()
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a file; a replaced file keeps its id.
    pub fn insert(&mut self, path: &str, source: &str) -> FileId {
        let path = normalize_path(path);
        let parsed = ParsedFile::from_source(&path, source);
        if let Some(&id) = self.by_path.get(&path) {
            self.files[id.index()].parsed = parsed;
            return id;
        }
        let id = FileId::new(self.files.len() as u32);
        self.by_path.insert(path.clone(), id);
        self.files.push(SourceFile { id, path, parsed });
        id
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    pub fn id_of(&self, path: &str) -> Option<FileId> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    pub fn path(&self, id: FileId) -> &str {
        self.files
            .get(id.index())
            .map(|f| f.path.as_str())
            .unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.iter().map(|f| f.id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// First file, in registration order, whose path ends with `candidate`
    /// compared component by component.
    pub fn find_by_suffix(&self, candidate: &str) -> Option<FileId> {
        let wanted: Vec<&str> = candidate
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        if wanted.is_empty() {
            return None;
        }
        self.files
            .iter()
            .find(|file| {
                let components: Vec<&str> = file.path.split('/').collect();
                components.ends_with(&wanted)
            })
            .map(|file| file.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_stable_ids() {
        let mut index = FileIndex::new();
        let a = index.insert("src/a.lua", "x = 1");
        let b = index.insert("src/b.lua", "y = 2");
        let again = index.insert("./src/a.lua", "x = 3");

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(a).unwrap().parsed.source(), "x = 3");
    }

    #[test]
    fn paths_are_normalized() {
        let mut index = FileIndex::new();
        let id = index.insert(r"lib\util.lua", "");

        assert_eq!(index.path(id), "lib/util.lua");
        assert_eq!(index.id_of("./lib/util.lua"), Some(id));
    }

    #[test]
    fn suffix_match_is_component_wise() {
        let mut index = FileIndex::new();
        index.insert("src/myutil.lua", "");
        let util = index.insert("src/util.lua", "");

        assert_eq!(index.find_by_suffix("util.lua"), Some(util));
        assert_eq!(index.find_by_suffix("src/util.lua"), Some(util));
        assert_eq!(index.find_by_suffix("other/util.lua"), None);
    }
}
