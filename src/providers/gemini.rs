//! Gemini quota from the Cloud Code quota API.
//!
//! The CLI login is preferred; the IDE's local session is the fallback.
//! An expiring token is refreshed in memory when an OAuth client is
//! configured.

use super::http::bearer;
use super::oauth::{self, OAuthClient};
use super::{blocking, not_configured, ProviderContext};
use crate::credentials::{Credential, OAuthCredential, SecretKind};
use crate::fetch::{FetchError, ProviderId, UsageProvider};
use crate::usage::{AccountUsage, ProviderUsage, ResetAt, UsageWindow, WindowSpan};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const PROVIDER_ID: &str = "gemini";

const QUOTA_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal:retrieveUserQuota";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Credential sources in priority order.
const SOURCES: [SecretKind; 2] = [SecretKind::GeminiOAuth, SecretKind::LocalSession];

#[derive(Clone)]
pub struct GeminiProvider {
    ctx: ProviderContext,
    client: Option<OAuthClient>,
}

impl GeminiProvider {
    pub fn new(ctx: ProviderContext, client: Option<OAuthClient>) -> Self {
        Self { ctx, client }
    }

    /// First OAuth credential among the sources, with the kind it came from.
    ///
    /// A broken source is skipped when a later one works; if none works the
    /// first error wins.
    fn credential(&self) -> Result<(SecretKind, OAuthCredential), FetchError> {
        let mut first_error = None;
        for kind in SOURCES {
            match self.ctx.store.credential(kind) {
                Ok(Some(Credential::OAuth(oauth))) => return Ok((kind, oauth)),
                Ok(Some(Credential::ApiKey(_))) | Ok(None) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Err(not_configured("no Gemini login found")),
        }
    }

    /// Refreshes an expiring credential and installs it in the store cache.
    fn ensure_fresh(
        &self,
        kind: SecretKind,
        credential: OAuthCredential,
    ) -> Result<OAuthCredential, FetchError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if !oauth::needs_refresh(&credential, now_ms) {
            return Ok(credential);
        }
        let Some(client) = &self.client else {
            debug!("Gemini token expiring but no OAuth client is configured");
            return Ok(credential);
        };
        if credential.refresh_token.is_none() {
            return Ok(credential);
        }

        let refreshed = oauth::refresh_access_token(&self.ctx.http, client, &credential)?;
        info!("Refreshed Gemini token from {}", kind);
        self.ctx
            .store
            .replace_credential(kind, Credential::OAuth(refreshed.clone()));
        Ok(refreshed)
    }

    fn fetch_blocking(&self) -> Result<ProviderUsage, FetchError> {
        let (kind, credential) = self.credential()?;
        let credential = self.ensure_fresh(kind, credential)?;
        let token = bearer(&credential.access_token);
        let auth = [("Authorization", token.as_str())];

        let quota = self.ctx.http.post_json(QUOTA_URL, &auth, &json!({}))?;
        let windows = parse_quota(&quota);

        let email = match self.ctx.http.get_json(USERINFO_URL, &auth) {
            Ok(info) => info["email"].as_str().map(String::from),
            Err(err) => {
                debug!("Gemini userinfo unavailable: {}", err);
                None
            }
        }
        .or(credential.email);

        let mut account = AccountUsage::new(email);
        account.windows = windows;
        Ok(ProviderUsage::single(PROVIDER_ID, account))
    }
}

/// One daily window per model from the quota buckets.
///
/// Only request buckets count. When a model has several buckets the most
/// used one is kept.
pub fn parse_quota(quota: &Value) -> Vec<UsageWindow> {
    let mut by_model: BTreeMap<String, UsageWindow> = BTreeMap::new();
    let Some(buckets) = quota["buckets"].as_array() else {
        return Vec::new();
    };

    for bucket in buckets {
        if bucket["tokenType"].as_str() != Some("REQUESTS") {
            continue;
        }
        let Some(remaining) = bucket["remainingFraction"].as_f64() else {
            continue;
        };
        let model = bucket["modelId"].as_str().unwrap_or("requests").to_string();
        let window = UsageWindow::new(model.clone(), WindowSpan::Hours(24))
            .with_percent((1.0 - remaining) * 100.0)
            .with_reset(
                bucket["resetTime"]
                    .as_str()
                    .and_then(ResetAt::parse_rfc3339),
            );

        let replace = by_model
            .get(&model)
            .is_none_or(|existing| existing.used_percent < window.used_percent);
        if replace {
            by_model.insert(model, window);
        }
    }

    by_model.into_values().collect()
}

#[async_trait]
impl UsageProvider for GeminiProvider {
    type Usage = ProviderUsage;

    fn id(&self) -> ProviderId {
        ProviderId::new(PROVIDER_ID)
    }

    fn timeout(&self) -> Duration {
        self.ctx.timeout
    }

    async fn fetch(&self) -> Result<ProviderUsage, FetchError> {
        let this = self.clone();
        blocking(move || this.fetch_blocking()).await
    }
}

#[cfg(test)]
#[path = "tests/gemini_tests.rs"]
mod tests;
