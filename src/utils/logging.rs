//! Logging setup for the capture service.
//!
//! An explicit `RUST_LOG` always wins. Without one, the service logs at
//! the level implied by `--verbose` while dependency crates stay at warn,
//! so CDP and HTTP internals do not drown out capture telemetry.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the logging system. With a log file, everything also goes
/// to the file (ANSI-free, appended so service restarts keep history).
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = build_filter(level)?;

    let stderr_layer = fmt::layer().compact().with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            let file_layer = fmt::layer().with_ansi(false).with_writer(open_log_file(path)?);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
        }
    }

    Ok(())
}

fn build_filter(level: Level) -> Result<EnvFilter> {
    if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        return Ok(EnvFilter::from_default_env());
    }
    EnvFilter::try_new(format!("warn,webshot={}", level))
        .context("Failed to build log filter")
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .context(format!("Failed to create log directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open log file: {}", path.display()))
}
