//! Tracing subscriber setup.
//!
//! Filter: `MENUFLOW_LOG` when set, else the config's `log_level`.
//! Output: stderr, or a non-blocking file writer with `--log-file`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MENUFLOW_LOG";

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered file output is flushed.
pub fn init(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(log_level))
        .with_context(|| format!("invalid log filter '{log_level}'"))?;

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;
        return Ok(None);
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;
    Ok(Some(guard))
}
