//! YAML configuration: enabled providers, timeouts, browser order and the
//! Gemini OAuth client.
//!
//! Lookup order is `--config`, then `$QUOTABAR_CONFIG`, then
//! `~/.quotabar/config.yaml`, then the defaults embedded from
//! `quotabar.yaml`. Missing fields take their defaults; unknown fields are
//! rejected.

use crate::credentials::cookies::Browser;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Providers the binary knows how to build.
pub const KNOWN_PROVIDERS: [&str; 4] = ["claude", "codex", "gemini", "copilot"];

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "QUOTABAR_CONFIG";

const DEFAULT_CONFIG_YAML: &str = include_str!("../quotabar.yaml");

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Seconds a resolved credential is served from memory. 0 disables caching.
    #[serde(default = "default_credential_cache_ttl_secs")]
    pub credential_cache_ttl_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Browser keys scanned for cookies, highest priority first.
    #[serde(default)]
    pub browsers: Vec<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub gemini_oauth: OAuthClientConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// OAuth client credentials for token refresh.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OAuthClientConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl OAuthClientConfig {
    /// Both halves, when both are set and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let secret = self
            .client_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        Some((id, secret))
    }
}

fn default_credential_cache_ttl_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_enabled() -> bool {
    true
}

fn default_provider_timeout_secs() -> u64 {
    20
}

/// Where the active configuration was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Embedded,
}

impl QuotaConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn default_config() -> Result<Self> {
        let config: Self = serde_yaml::from_str(DEFAULT_CONFIG_YAML)
            .context("Failed to parse embedded quotabar.yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the first configuration found: the explicit path, then
    /// `$QUOTABAR_CONFIG`, then `default_path` if it exists, then the
    /// embedded defaults.
    ///
    /// Explicitly named files must exist.
    pub fn discover(
        explicit: Option<&Path>,
        env_path: Option<&str>,
        default_path: Option<&Path>,
    ) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, ConfigSource::File(path.to_path_buf())));
        }
        if let Some(path) = env_path.map(str::trim).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, ConfigSource::File(path)));
        }
        if let Some(path) = default_path.filter(|p| p.is_file()) {
            return Ok((Self::load(path)?, ConfigSource::File(path.to_path_buf())));
        }
        Ok((Self::default_config()?, ConfigSource::Embedded))
    }

    fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be greater than zero");
        }

        for (name, provider) in &self.providers {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                anyhow::bail!(
                    "Unknown provider '{}' (expected one of: {})",
                    name,
                    KNOWN_PROVIDERS.join(", ")
                );
            }
            if provider.timeout_secs == 0 {
                anyhow::bail!("Provider '{}' timeout_secs must be greater than zero", name);
            }
        }

        for key in &self.browsers {
            if Browser::from_key(key).is_none() {
                anyhow::bail!("Unknown browser '{}' in browsers list", key);
            }
        }

        Ok(())
    }

    /// Settings for `name`; providers missing from the file use defaults.
    pub fn provider(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    pub fn provider_timeout(&self, name: &str) -> Duration {
        Duration::from_secs(self.provider(name).timeout_secs)
    }

    pub fn enabled_providers(&self) -> Vec<&'static str> {
        KNOWN_PROVIDERS
            .into_iter()
            .filter(|name| self.provider(name).enabled)
            .collect()
    }

    pub fn credential_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Configured browsers, or every supported browser when the list is empty.
    pub fn browsers(&self) -> Vec<Browser> {
        if self.browsers.is_empty() {
            return Browser::ALL.to_vec();
        }
        self.browsers
            .iter()
            .filter_map(|key| Browser::from_key(key))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
