//! Tracing setup.
//!
//! - stderr: compact, filtered by `RUST_LOG` (default `warn`, plus `conductor=debug`
//!   with `--verbose`)
//! - optional JSON file: every `conductor` event at debug and above, written
//!   through a non-blocking appender to `logs/orchestration_<ts>.log`
//!
//! Console output for the operator goes through `ui`, not through tracing.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the file writer flushing; hold it until the process exits.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn stderr_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,conductor=debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<LogGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(stderr_filter(verbose));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .ok_or_else(|| anyhow!("Log file has no parent directory: {}", path.display()))?;
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("Log file has no name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("conductor=debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}
