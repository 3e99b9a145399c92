//! Subscriber setup for the `luma` binary
//!
//! Diagnostics own stdout, so log records go to stderr or to `--log-file`.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::Cli;

const DEFAULT_LOG_FILE: &str = "luma.log";

/// `RUST_LOG` directives refine the `--log-level` floor. The returned guard
/// flushes the log file when dropped.
pub fn init_logging(cli: &Cli) -> Option<WorkerGuard> {
    let level = cli.log_level.as_tracing_level();
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let (writer, guard, ansi) = match cli.log_file.as_deref() {
        Some(path) => {
            let (writer, guard) = file_writer(path);
            (BoxMakeWriter::new(writer), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer).init();
    }

    guard
}

fn file_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let (dir, name) = log_file_parts(path);
    tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
}

/// A bare file name logs into the working directory.
fn log_file_parts(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, name)
}
