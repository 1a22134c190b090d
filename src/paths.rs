//! Home-based storage paths for quotabar's own files.
//!
//! Everything lives under `~/.quotabar/`:
//! - `config.yaml` - optional user configuration
//! - `usage_cache.json` - last-known-good usage per provider
//! - `logs/quotabar.log` - log file when `--log-file` is given
//!
//! `QUOTABAR_HOME` replaces the whole directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const QUOTABAR_DIR: &str = ".quotabar";

/// Environment variable overriding the storage directory.
pub const HOME_ENV: &str = "QUOTABAR_HOME";

/// Storage directory for an optional override and home directory.
pub fn quotabar_dir_for(override_dir: Option<&str>, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = override_dir.map(str::trim).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    home.map(|h| h.join(QUOTABAR_DIR))
}

/// Returns `~/.quotabar/` (or `$QUOTABAR_HOME`), creating it if needed.
pub fn quotabar_home_dir() -> Result<PathBuf> {
    let override_dir = std::env::var(HOME_ENV).ok();
    let home = dirs::home_dir();
    let dir = quotabar_dir_for(override_dir.as_deref(), home.as_deref())
        .context("Could not determine home directory for quotabar storage")?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create quotabar directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns `~/.quotabar/logs/`, creating it if needed.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = quotabar_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

pub fn log_file_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join("quotabar.log"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(quotabar_home_dir()?.join("config.yaml"))
}

pub fn usage_cache_path() -> Result<PathBuf> {
    Ok(quotabar_home_dir()?.join("usage_cache.json"))
}

#[cfg(test)]
#[path = "tests/paths_tests.rs"]
mod tests;
