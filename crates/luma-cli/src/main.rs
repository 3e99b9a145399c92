//! Luma CLI - command-line driver for the Luma Lua analyzer

mod commands;
mod logging;
mod output;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use commands::Commands;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "luma",
    author,
    version,
    about = "Semantic analyzer for Lua projects",
    long_about = "Luma analyzes Lua projects across files: undefined globals and members,\n\
                  load order, unused locals, nil-safety and annotated types.\n\n\
                  Configure logging with --log-level and --log-file options."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_enum, default_value = "warn", help = "Set the log level")]
    pub log_level: LogLevel,

    #[arg(long, global = true, help = "Write logs to the specified file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli);

    match cli.command {
        Commands::Check(args) => args.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_check_command() {
        let cli = Cli::try_parse_from(["luma", "check", "./src"]).unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("./src")]);
                assert!(args.entry.is_empty());
            }
        }
    }

    #[test]
    fn check_defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["luma", "check"]).unwrap();
        match cli.command {
            Commands::Check(args) => assert_eq!(args.paths, vec![PathBuf::from(".")]),
        }
    }

    #[test]
    fn cli_parses_entries_and_format() {
        let cli = Cli::try_parse_from([
            "luma", "check", "game", "--entry", "main.lua", "--entry", "conf.lua", "--format",
            "json", "--realtime",
        ])
        .unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.entry, vec!["main.lua", "conf.lua"]);
                assert_eq!(args.format, commands::check::OutputFormat::Json);
                assert!(args.realtime);
            }
        }
    }

    #[test]
    fn cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["luma", "check", "--format", "sarif"]).is_err());
    }

    #[test]
    fn logging_flags_are_global() {
        let cli = Cli::try_parse_from([
            "luma",
            "check",
            "--log-level",
            "debug",
            "--log-file",
            "/tmp/luma.log",
            "--log-json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/luma.log")));
        assert!(cli.log_json);
    }

    #[test]
    fn default_log_level_is_warn() {
        let cli = Cli::try_parse_from(["luma", "check"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert!(cli.log_file.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn check_help_shows_options() {
        let mut cmd = Cli::command();
        let check_cmd = cmd
            .get_subcommands_mut()
            .find(|c| c.get_name() == "check")
            .unwrap();
        let help = check_cmd.render_help().to_string();
        assert!(help.contains("PATH"));
        assert!(help.contains("--entry"));
        assert!(help.contains("--format"));
    }
}
