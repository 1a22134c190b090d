//! Fan-out/fan-in over all usage providers.

use super::cache::{CacheEntry, UsageCache};
use crate::credentials::CredentialError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{info, warn};

/// Stable identifier of a provider ("claude", "codex", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Why a provider produced no fresh value.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The provider did not finish within its own timeout.
    Timeout(Duration),
    Network(String),
    /// The remote answered but the body was not what we expected.
    Decode(String),
    /// The remote rejected the credential. Retrying will not help.
    Authentication(String),
    /// No usable credential could be resolved locally.
    Credential(CredentialError),
    /// No credential exists for the provider at all.
    NotConfigured(String),
    /// The provider task panicked or was cancelled.
    Task(String),
}

impl FetchError {
    /// Transient failures are worth showing next to stale data; the rest
    /// need user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Network(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, FetchError::Authentication(_))
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout(limit) => write!(f, "timed out after {}s", limit.as_secs_f64()),
            FetchError::Network(message) => write!(f, "network error: {}", message),
            FetchError::Decode(message) => write!(f, "unexpected response: {}", message),
            FetchError::Authentication(message) => {
                write!(f, "authentication failed (sign in again): {}", message)
            }
            FetchError::Credential(err) => write!(f, "credentials unavailable: {}", err),
            FetchError::NotConfigured(message) => write!(f, "not configured: {}", message),
            FetchError::Task(message) => write!(f, "provider task failed: {}", message),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Credential(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CredentialError> for FetchError {
    fn from(err: CredentialError) -> Self {
        FetchError::Credential(err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

impl From<JoinError> for FetchError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            FetchError::Task(format!("panicked: {}", message))
        } else {
            FetchError::Task(err.to_string())
        }
    }
}

/// A source of usage data. Each provider declares its own timeout.
#[async_trait]
pub trait UsageProvider: Send + Sync {
    type Usage: Clone + Send + 'static;

    fn id(&self) -> ProviderId;

    fn timeout(&self) -> Duration;

    async fn fetch(&self) -> Result<Self::Usage, FetchError>;
}

pub type SharedProvider<T> = Arc<dyn UsageProvider<Usage = T>>;

/// Result of one provider's run.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Success(T),
    Failure {
        error: FetchError,
        /// Last good value, if the provider ever succeeded.
        stale: Option<CacheEntry<T>>,
    },
}

/// A value a caller can show, fresh or from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult<T> {
    pub usage: T,
    pub fetched_at: DateTime<Utc>,
    /// True when `usage` came from the cache because the latest fetch failed.
    pub stale: bool,
}

/// `{results, errors}` of one orchestrator pass.
///
/// A provider may appear in both maps: stale data plus the error that
/// prevented a refresh.
#[derive(Debug, Clone)]
pub struct FetchReport<T> {
    pub results: HashMap<ProviderId, ProviderResult<T>>,
    pub errors: HashMap<ProviderId, String>,
    /// Typed form of `errors`, for callers that need to tell kinds apart.
    pub failures: HashMap<ProviderId, FetchError>,
}

impl<T> Default for FetchReport<T> {
    fn default() -> Self {
        Self {
            results: HashMap::new(),
            errors: HashMap::new(),
            failures: HashMap::new(),
        }
    }
}

impl<T> FetchReport<T> {
    fn record(
        &mut self,
        provider: ProviderId,
        outcome: FetchOutcome<T>,
        fetched_at: DateTime<Utc>,
    ) {
        match outcome {
            FetchOutcome::Success(usage) => {
                self.results.insert(
                    provider,
                    ProviderResult {
                        usage,
                        fetched_at,
                        stale: false,
                    },
                );
            }
            FetchOutcome::Failure { error, stale } => {
                if let Some(entry) = stale {
                    self.results.insert(
                        provider.clone(),
                        ProviderResult {
                            usage: entry.value,
                            fetched_at: entry.stored_at,
                            stale: true,
                        },
                    );
                }
                self.errors.insert(provider.clone(), error.to_string());
                self.failures.insert(provider, error);
            }
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs all providers concurrently and folds their outcomes into a report.
pub struct FetchOrchestrator<T> {
    cache: Arc<UsageCache<T>>,
}

impl<T: Clone + Send + 'static> FetchOrchestrator<T> {
    pub fn new(cache: Arc<UsageCache<T>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<UsageCache<T>> {
        &self.cache
    }

    /// Fetches every provider once.
    ///
    /// Providers run in separate tasks; a slow, failing or panicking
    /// provider affects only its own entry in the report.
    pub async fn fetch_all(&self, providers: &[SharedProvider<T>]) -> FetchReport<T> {
        let tasks = providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let id = provider.id();
            let handle = tokio::spawn(async move { fetch_with_timeout(provider).await });
            async move {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(err) => Err(FetchError::from(err)),
                };
                (id, result, Utc::now())
            }
        });

        let mut report = FetchReport::default();
        for (id, result, fetched_at) in join_all(tasks).await {
            let outcome = self.settle(&id, result);
            report.record(id, outcome, fetched_at);
        }
        report
    }

    /// Writes successes to the cache and attaches cached values to failures.
    fn settle(&self, id: &ProviderId, result: Result<T, FetchError>) -> FetchOutcome<T> {
        match result {
            Ok(usage) => {
                info!(provider = %id, "Usage fetched");
                self.cache.store(id.clone(), usage.clone());
                FetchOutcome::Success(usage)
            }
            Err(error) => {
                let stale = self.cache.get(id);
                warn!(
                    provider = %id,
                    has_stale = stale.is_some(),
                    "Usage fetch failed: {}",
                    error
                );
                FetchOutcome::Failure { error, stale }
            }
        }
    }
}

async fn fetch_with_timeout<T: Clone + Send + 'static>(
    provider: SharedProvider<T>,
) -> Result<T, FetchError> {
    let limit = provider.timeout();
    tokio::select! {
        result = provider.fetch() => result,
        _ = tokio::time::sleep(limit) => Err(FetchError::Timeout(limit)),
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
