//! Check command - analyzes the Lua files of a project

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use luma_core::config::{Config, load_config_or_default_with_warnings};
use luma_core::semantic::AnalysisOptions;
use luma_core::{Diagnostic, Project, Severity};
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::output::json::JsonFormatter;
use crate::output::pretty::PrettyFormatter;

const LUA_EXTENSION: &str = "lua";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Files or directories to analyze
    #[arg(value_name = "PATH", default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Entry file of the project walk; repeatable. Every file is an entry
    /// when omitted.
    #[arg(long, value_name = "FILE")]
    pub entry: Vec<String>,

    /// Output format for diagnostics
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: OutputFormat,

    /// Skip the checks that are too slow for editor use
    #[arg(long)]
    pub realtime: bool,

    /// Fail on warnings (exit code 1)
    #[arg(long)]
    pub fail_on_warnings: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        self.configure_colors();

        let root = project_root(&self.paths)?;
        let config_result = load_config_or_default_with_warnings(&root);
        for warning in &config_result.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
        let config = config_result.config;

        let mut files = Vec::new();
        for path in &self.paths {
            files.extend(discover_files(path, &root, &config)?);
        }
        files.sort();
        files.dedup();

        if files.is_empty() {
            println!("No Lua files found.");
            return Ok(());
        }

        let diagnostics = self.analyze(&root, &files, config)?;

        match self.format {
            OutputFormat::Json => {
                let formatter = JsonFormatter::new();
                let analyzed = root.to_string_lossy();
                println!("{}", formatter.format(&diagnostics, files.len(), &analyzed));
            }
            OutputFormat::Pretty => {
                let formatter = PrettyFormatter::with_root(root.clone());
                print!("{}", formatter.format(&diagnostics));
            }
        }

        let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
        let has_warnings = self.fail_on_warnings
            && diagnostics.iter().any(|d| d.severity == Severity::Warning);
        if has_errors || has_warnings {
            process::exit(1);
        }

        Ok(())
    }

    fn analyze(&self, root: &Path, files: &[PathBuf], config: Config) -> Result<Vec<Diagnostic>> {
        let options = AnalysisOptions {
            realtime: self.realtime,
        };
        let sources: Vec<(String, String)> = files
            .par_iter()
            .map(|file| {
                let content = fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                Ok((relative_path(file, root), content))
            })
            .collect::<Result<_>>()?;

        let mut project = Project::new(config).with_options(options);
        for (path, content) in &sources {
            project.add_file(path, content);
        }
        info!(files = files.len(), root = %root.display(), "analyzing project");

        let entries: Vec<&str> = self.entry.iter().map(String::as_str).collect();
        project.check_project(&entries)?;

        // Files no entry reaches still get the cross-file checks.
        let unreached: Vec<String> = project
            .files()
            .iter()
            .filter(|file| {
                project
                    .project_result()
                    .and_then(|result| result.file(file.id))
                    .is_none()
            })
            .map(|file| file.path.clone())
            .collect();
        for path in &unreached {
            debug!(path, "checking file outside the project walk");
            project.check_scattered(path)?;
        }

        Ok(project.all_diagnostics()?)
    }

    fn configure_colors(&self) {
        let no_color_env = std::env::var("NO_COLOR").is_ok();
        if self.no_color || no_color_env {
            colored::control::set_override(false);
        }
    }
}

/// Directory the project paths are reported relative to: the first path,
/// or its parent when it is a file.
fn project_root(paths: &[PathBuf]) -> Result<PathBuf> {
    let first = paths.first().cloned().unwrap_or_else(|| PathBuf::from("."));
    if !first.exists() {
        anyhow::bail!("Path does not exist: {}", first.display());
    }
    if first.is_file() {
        return Ok(first
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")));
    }
    Ok(first)
}

fn relative_path(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

fn discover_files(path: &Path, root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    if path.is_file() {
        if is_lua_file(path) {
            return Ok(vec![path.to_path_buf()]);
        } else {
            return Ok(vec![]);
        }
    }

    let files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_lua_file(e.path()))
        .filter(|e| is_selected(&relative_path(e.path(), root), config))
        .map(|e| e.path().to_path_buf())
        .collect();

    Ok(files)
}

/// `include` and `exclude` entries are path prefixes relative to the root.
fn is_selected(relative: &str, config: &Config) -> bool {
    let under = |prefix: &String| {
        let prefix = prefix.trim_start_matches("./").trim_end_matches('/');
        relative == prefix || relative.starts_with(&format!("{}/", prefix))
    };
    (config.include.is_empty() || config.include.iter().any(under))
        && !config.exclude.iter().any(under)
}

fn is_lua_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == LUA_EXTENSION)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use luma_core::ErrorKind;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn args(paths: Vec<PathBuf>) -> CheckArgs {
        CheckArgs {
            paths,
            entry: vec![],
            format: OutputFormat::Json,
            realtime: false,
            fail_on_warnings: false,
            no_color: true,
        }
    }

    #[test]
    fn discover_files_finds_single_lua_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("main.lua");
        File::create(&file_path).unwrap();

        let files = discover_files(&file_path, dir.path(), &Config::default()).unwrap();

        assert_eq!(files, vec![file_path]);
    }

    #[test]
    fn discover_files_recurses_and_skips_hidden() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        File::create(dir.path().join("main.lua")).unwrap();
        File::create(dir.path().join("src/util.lua")).unwrap();
        File::create(dir.path().join(".git/hook.lua")).unwrap();
        File::create(dir.path().join("readme.md")).unwrap();

        let files = discover_files(dir.path(), dir.path(), &Config::default()).unwrap();

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn include_and_exclude_select_files() {
        let config = Config {
            include: vec!["src".into()],
            exclude: vec!["src/vendor/".into()],
            ..Config::default()
        };

        assert!(is_selected("src/main.lua", &config));
        assert!(!is_selected("src/vendor/json.lua", &config));
        assert!(!is_selected("tools/build.lua", &config));
        assert!(!is_selected("srcx/main.lua", &config));
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(project_root(&[dir.path().join("nope")]).is_err());
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/work/game");
        assert_eq!(relative_path(Path::new("/work/game/ui/button.lua"), root), "ui/button.lua");
    }

    #[test]
    fn analyze_reports_across_files() {
        let dir = tempdir().unwrap();
        let mut main = File::create(dir.path().join("main.lua")).unwrap();
        writeln!(main, "local util = require 'util'").unwrap();
        writeln!(main, "print(util.shout('hi'), missing)").unwrap();
        let mut util = File::create(dir.path().join("util.lua")).unwrap();
        writeln!(util, "local M = {{}}").unwrap();
        writeln!(util, "function M.shout(s) return s .. '!' end").unwrap();
        writeln!(util, "return M").unwrap();

        let args = args(vec![dir.path().to_path_buf()]);
        let files = discover_files(dir.path(), dir.path(), &Config::default()).unwrap();
        let diagnostics = args.analyze(dir.path(), &files, Config::default()).unwrap();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::UndefinedGlobal);
        assert_eq!(diagnostics[0].file, "main.lua");
    }

    #[test]
    fn files_outside_the_entries_are_still_checked() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "print('ready')\n").unwrap();
        fs::write(dir.path().join("tool.lua"), "print(nope)\n").unwrap();

        let mut args = args(vec![dir.path().to_path_buf()]);
        args.entry = vec!["main.lua".into()];
        let files = discover_files(dir.path(), dir.path(), &Config::default()).unwrap();
        let diagnostics = args.analyze(dir.path(), &files, Config::default()).unwrap();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].file, "tool.lua");
    }
}
