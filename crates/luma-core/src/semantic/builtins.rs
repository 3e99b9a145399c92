//! Names provided by the Lua runtime itself

use std::collections::HashSet;
use std::sync::LazyLock;

static BUILTINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // Base library
        "_G",
        "_ENV",
        "_VERSION",
        "assert",
        "collectgarbage",
        "dofile",
        "error",
        "getmetatable",
        "ipairs",
        "load",
        "loadfile",
        "loadstring",
        "next",
        "pairs",
        "pcall",
        "print",
        "rawequal",
        "rawget",
        "rawlen",
        "rawset",
        "require",
        "select",
        "setmetatable",
        "tonumber",
        "tostring",
        "type",
        "unpack",
        "warn",
        "xpcall",
        // Standard library tables
        "coroutine",
        "debug",
        "io",
        "math",
        "os",
        "package",
        "string",
        "table",
        "utf8",
        "bit32",
    ])
});

/// Modules that `require` resolves without a project file.
static BUILTIN_MODULES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "coroutine",
        "debug",
        "io",
        "math",
        "os",
        "package",
        "string",
        "table",
        "utf8",
        "bit32",
        "_G",
    ])
});

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}

pub fn is_builtin_module(name: &str) -> bool {
    BUILTIN_MODULES.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_library_names_are_builtin() {
        assert!(is_builtin("print"));
        assert!(is_builtin("setmetatable"));
        assert!(is_builtin("_G"));
        assert!(!is_builtin("printf"));
    }

    #[test]
    fn standard_modules_resolve_without_files() {
        assert!(is_builtin_module("string"));
        assert!(!is_builtin_module("socket"));
    }
}
