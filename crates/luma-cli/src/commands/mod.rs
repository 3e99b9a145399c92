//! CLI command implementations

pub mod check;

pub use check::CheckArgs;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze the Lua files of a project
    Check(CheckArgs),
}
