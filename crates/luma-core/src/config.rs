//! Configuration loading and parsing for luma
//!
//! Provides functionality to load and parse `luma.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "luma.toml";

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["include", "exclude", "globals", "imports", "diagnostics"];
const KNOWN_GLOBALS_KEYS: &[&str] = &["ignore"];
const KNOWN_IMPORTS_KEYS: &[&str] = &["separator", "extension", "ignore_modules", "functions"];
const KNOWN_DIAGNOSTICS_KEYS: &[&str] = &["disabled", "ignore_files", "ignore_file_kinds"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML in '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResult {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub globals: GlobalsConfig,
    pub imports: ImportsConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Names that never produce "undefined" diagnostics.
///
/// Entries are exact names (`vim`), prefix wildcards (`love*`) or member
/// wildcards (`love.*`, which also covers `love` itself).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalsConfig {
    pub ignore: Vec<String>,
}

impl GlobalsConfig {
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|pattern| wildcard_match(pattern, name))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportsConfig {
    pub separator: String,
    pub extension: String,
    pub ignore_modules: Vec<String>,
    pub functions: Vec<ImportFunction>,
}

impl Default for ImportsConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            extension: ".lua".to_string(),
            ignore_modules: Vec::new(),
            functions: Vec::new(),
        }
    }
}

impl ImportsConfig {
    pub fn is_module_ignored(&self, module: &str) -> bool {
        self.ignore_modules
            .iter()
            .any(|pattern| wildcard_match(pattern, module))
    }

    pub fn function(&self, name: &str) -> Option<&ImportFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A project-specific load primitive, e.g. `import "a.b"`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImportFunction {
    pub name: String,
    #[serde(default)]
    pub mode: ImportMode,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// The target's globals become the bound value's members.
    #[default]
    Import,
    /// The target's last top-level return value is bound.
    Require,
    /// `Require` when the target returns a value, `Import` otherwise.
    Auto,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub disabled: Vec<String>,
    pub ignore_files: Vec<String>,
    pub ignore_file_kinds: HashMap<String, Vec<String>>,
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return name == prefix
            || name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'));
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

fn read_config(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })?;

    Ok((config, content))
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    read_config(path).map(|(config, _)| config)
}

pub fn load_config_with_warnings(path: &Path) -> Result<ConfigResult, ConfigError> {
    let (config, content) = read_config(path)?;
    let warnings = detect_unknown_keys(&content);
    Ok(ConfigResult { config, warnings })
}

fn detect_unknown_keys(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(_) => return warnings,
    };

    let known_top: HashSet<&str> = KNOWN_TOP_LEVEL_KEYS.iter().copied().collect();
    for key in table.keys() {
        if !known_top.contains(key.as_str()) {
            warnings.push(format!("Unknown config option: '{}'", key));
        }
    }

    let sections = [
        ("globals", KNOWN_GLOBALS_KEYS),
        ("imports", KNOWN_IMPORTS_KEYS),
        ("diagnostics", KNOWN_DIAGNOSTICS_KEYS),
    ];
    for (section, known) in sections {
        if let Some(toml::Value::Table(values)) = table.get(section) {
            for key in values.keys() {
                if !known.contains(&key.as_str()) {
                    warnings.push(format!("Unknown config option in [{}]: '{}'", section, key));
                }
            }
        }
    }

    warnings
}

pub fn load_config_or_default(start_dir: &Path) -> Config {
    find_config_file(start_dir)
        .and_then(|path| load_config(&path).ok())
        .unwrap_or_default()
}

pub fn load_config_or_default_with_warnings(start_dir: &Path) -> ConfigResult {
    match find_config_file(start_dir) {
        Some(path) => match load_config_with_warnings(&path) {
            Ok(result) => result,
            Err(e) => ConfigResult {
                config: Config::default(),
                warnings: vec![e.to_string()],
            },
        },
        None => ConfigResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("Failed to create temp dir")
    }

    #[test]
    fn load_config_from_file() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            r#"
include = ["src"]
exclude = ["vendor"]

[globals]
ignore = ["vim", "love.*"]

[imports]
separator = "/"
ignore_modules = ["socket*"]

[[imports.functions]]
name = "import"
mode = "auto"

[diagnostics]
disabled = ["unused-local"]
ignore_files = ["re:_spec\\.lua$"]

[diagnostics.ignore_file_kinds]
"test/" = ["undefined-global"]
"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(config.include, vec!["src"]);
        assert_eq!(config.exclude, vec!["vendor"]);
        assert_eq!(config.globals.ignore, vec!["vim", "love.*"]);
        assert_eq!(config.imports.separator, "/");
        assert_eq!(config.imports.extension, ".lua");
        assert_eq!(
            config.imports.function("import").map(|f| f.mode),
            Some(ImportMode::Auto)
        );
        assert_eq!(config.diagnostics.disabled, vec!["unused-local"]);
        assert_eq!(
            config.diagnostics.ignore_file_kinds.get("test/"),
            Some(&vec!["undefined-global".to_string()])
        );
    }

    #[test]
    fn default_config_when_missing() {
        let dir = create_temp_dir();
        let config = load_config_or_default(dir.path());

        assert_eq!(config, Config::default());
        assert_eq!(config.imports.separator, ".");
        assert!(config.globals.ignore.is_empty());
    }

    #[test]
    fn error_on_invalid_toml() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "this is not valid { toml }").unwrap();

        let err = load_config(&config_path).unwrap_err();
        match err {
            ConfigError::ParseError { path, message } => {
                assert_eq!(path, config_path);
                assert!(!message.is_empty());
            }
            _ => panic!("Expected ParseError"),
        }
    }

    #[test]
    fn find_config_file_in_parent_directory() {
        let parent = create_temp_dir();
        let child = parent.path().join("subdir");
        fs::create_dir(&child).unwrap();
        let config_path = parent.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        assert_eq!(find_config_file(&child), Some(config_path));
    }

    #[test]
    fn find_config_file_returns_none_when_not_found() {
        let dir = create_temp_dir();

        assert!(find_config_file(dir.path()).is_none());
    }

    #[test]
    fn import_function_mode_defaults_to_import() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "[[imports.functions]]\nname = \"include\"").unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(config.imports.functions[0].mode, ImportMode::Import);
    }

    #[test]
    fn warns_on_unknown_options() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            r#"
typo = true

[globals]
ignroe = ["x"]
"#,
        )
        .unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("typo"));
        assert!(result.warnings[1].contains("[globals]"));
    }

    #[test]
    fn no_warnings_for_valid_config() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            "[diagnostics]\ndisabled = [\"self-assign\"]\n[globals]\nignore = [\"vim\"]",
        )
        .unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert!(result.warnings.is_empty());
    }

    #[test]
    fn broken_config_falls_back_to_default_with_warning() {
        let dir = create_temp_dir();
        fs::write(dir.path().join(CONFIG_FILENAME), "[globals\n").unwrap();

        let result = load_config_or_default_with_warnings(dir.path());

        assert_eq!(result.config, Config::default());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn global_ignore_wildcards() {
        let globals = GlobalsConfig {
            ignore: vec!["vim".into(), "love.*".into(), "UI_*".into()],
        };

        assert!(globals.is_ignored("vim"));
        assert!(!globals.is_ignored("vimx"));
        assert!(globals.is_ignored("love"));
        assert!(globals.is_ignored("love.graphics"));
        assert!(!globals.is_ignored("lovely"));
        assert!(globals.is_ignored("UI_Button"));
    }

    #[test]
    fn ignored_modules_accept_wildcards() {
        let imports = ImportsConfig {
            ignore_modules: vec!["socket*".into()],
            ..ImportsConfig::default()
        };

        assert!(imports.is_module_ignored("socket.http"));
        assert!(!imports.is_module_ignored("mysocket"));
    }
}
