//! Usage adapters for each supported service.
//!
//! Every adapter implements [`UsageProvider`] over [`ProviderUsage`]. The
//! credential work and HTTP calls are blocking, so each adapter moves them
//! onto the blocking pool from inside its own orchestrator task.

pub mod claude;
pub mod codex;
pub mod copilot;
pub mod gemini;
pub mod http;
pub mod oauth;

use crate::config::QuotaConfig;
use crate::credentials::{CredentialStore, LocationStatus, SecretKind};
use crate::fetch::{FetchError, SharedProvider};
use crate::usage::ProviderUsage;
use http::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use claude::ClaudeProvider;
pub use codex::CodexProvider;
pub use copilot::CopilotProvider;
pub use gemini::GeminiProvider;

/// What every adapter needs: shared credentials, an HTTP client and its timeout.
#[derive(Clone)]
pub struct ProviderContext {
    pub store: Arc<CredentialStore>,
    pub http: HttpClient,
    pub timeout: Duration,
}

impl ProviderContext {
    pub fn new(store: Arc<CredentialStore>, http: HttpClient, timeout: Duration) -> Self {
        Self {
            store,
            http,
            timeout,
        }
    }

    /// Path of the location that supplied `kind` on the last resolution.
    pub fn active_path(&self, kind: SecretKind) -> PathBuf {
        self.store
            .diagnostics(kind)
            .into_iter()
            .find(|report| report.status == LocationStatus::Active)
            .map(|report| report.location.path)
            .unwrap_or_default()
    }
}

/// Runs blocking credential and HTTP work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(FetchError::from)?
}

/// Builds the enabled providers in a stable order.
pub fn build_providers(
    config: &QuotaConfig,
    store: Arc<CredentialStore>,
) -> Vec<SharedProvider<ProviderUsage>> {
    let http = HttpClient::new(config.http_timeout());
    config
        .enabled_providers()
        .into_iter()
        .filter_map(|name| {
            let ctx = ProviderContext::new(
                Arc::clone(&store),
                http.clone(),
                config.provider_timeout(name),
            );
            let provider: SharedProvider<ProviderUsage> = match name {
                claude::PROVIDER_ID => Arc::new(ClaudeProvider::new(ctx)),
                codex::PROVIDER_ID => Arc::new(CodexProvider::new(ctx)),
                gemini::PROVIDER_ID => Arc::new(GeminiProvider::new(
                    ctx,
                    config
                        .gemini_oauth
                        .credentials()
                        .map(|(id, secret)| oauth::OAuthClient::google(id, secret)),
                )),
                copilot::PROVIDER_ID => Arc::new(CopilotProvider::new(ctx)),
                _ => return None,
            };
            Some(provider)
        })
        .collect()
}

/// Maps a missing secret onto the fetch taxonomy.
pub(crate) fn not_configured(what: &str) -> FetchError {
    FetchError::NotConfigured(what.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
