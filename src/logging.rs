//! Tracing subscriber setup for the binary.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directive (`debug`, `quotabar=trace`, ...).
pub const LOG_ENV: &str = "QUOTABAR_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter from `directive`, falling back to `warn` when it is unset or invalid.
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs the global subscriber, writing to `log_file` (appending) or stderr.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter = env_filter(std::env::var(LOG_ENV).ok().as_deref());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|err| anyhow::anyhow!("Failed to install log subscriber: {}", err))
}
