//! Tracing subscriber setup.
//!
//! Logs go to stderr unless a log file is given. `RUST_LOG` overrides the
//! default filter.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when logging to stderr. The terminal is in raw mode during
/// a session, so only problems are reported there.
const STDERR_LEVEL: &str = "warn";

/// Default filter when logging to a file.
const FILE_LEVEL: &str = "info";

pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let default_level = if log_file.is_some() {
        FILE_LEVEL
    } else {
        STDERR_LEVEL
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sshx={default_level}")));

    match log_file {
        None => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?,
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init()
                .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?
        }
    }

    Ok(())
}
