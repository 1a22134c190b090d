//! Last-known-good usage values, one per provider.
//!
//! Entries are an availability fallback: they are never expired by age and
//! are only replaced by a newer successful fetch.

use super::orchestrator::ProviderId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

/// On-disk form of one entry.
#[derive(Serialize, Deserialize)]
struct PersistedEntry<T> {
    provider: String,
    value: T,
    stored_at: DateTime<Utc>,
}

/// Mutex-guarded map from provider to its last successful value.
pub struct UsageCache<T> {
    entries: Mutex<HashMap<ProviderId, CacheEntry<T>>>,
}

impl<T> Default for UsageCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> UsageCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, provider: &ProviderId) -> Option<CacheEntry<T>> {
        self.lock().get(provider).cloned()
    }

    /// Overwrites the provider's entry with a freshly fetched value.
    pub fn store(&self, provider: ProviderId, value: T) -> CacheEntry<T> {
        self.store_entry(
            provider,
            CacheEntry {
                value,
                stored_at: Utc::now(),
            },
        )
    }

    pub fn store_entry(&self, provider: ProviderId, entry: CacheEntry<T>) -> CacheEntry<T> {
        self.lock().insert(provider, entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProviderId, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Serialize + DeserializeOwned> UsageCache<T> {
    /// Loads a cache written by [`UsageCache::persist`]. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        let cache = Self::new();
        if !path.exists() {
            debug!("No usage cache at {}", path.display());
            return Ok(cache);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read usage cache {}", path.display()))?;
        let records: Vec<PersistedEntry<T>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse usage cache {}", path.display()))?;
        for record in records {
            cache.store_entry(
                ProviderId::new(record.provider),
                CacheEntry {
                    value: record.value,
                    stored_at: record.stored_at,
                },
            );
        }
        Ok(cache)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let mut records: Vec<PersistedEntry<T>> = self
            .lock()
            .iter()
            .map(|(provider, entry)| PersistedEntry {
                provider: provider.to_string(),
                value: entry.value.clone(),
                stored_at: entry.stored_at,
            })
            .collect();
        records.sort_by(|a, b| a.provider.cmp(&b.provider));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(&records).context("Failed to serialize usage cache")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write usage cache {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
