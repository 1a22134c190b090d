//! Claude usage from the OAuth usage and profile endpoints.

use super::http::{bearer, HttpClient};
use super::{blocking, not_configured, ProviderContext};
use crate::credentials::{Credential, SecretKind};
use crate::fetch::{FetchError, ProviderId, UsageProvider};
use crate::usage::{AccountUsage, ProviderUsage, ResetAt, UsageWindow, WindowSpan};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER_ID: &str = "claude";

const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const PROFILE_URL: &str = "https://api.anthropic.com/api/oauth/profile";
const OAUTH_BETA: &str = "oauth-2025-04-20";

/// Windows reported by the usage endpoint, in display order.
const WINDOWS: [(&str, WindowSpan); 4] = [
    ("five_hour", WindowSpan::Hours(5)),
    ("seven_day", WindowSpan::Days(7)),
    ("seven_day_opus", WindowSpan::Days(7)),
    ("seven_day_sonnet", WindowSpan::Days(7)),
];

#[derive(Clone)]
pub struct ClaudeProvider {
    ctx: ProviderContext,
}

impl ClaudeProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn fetch_blocking(&self) -> Result<ProviderUsage, FetchError> {
        let credential = self
            .ctx
            .store
            .credential(SecretKind::ClaudeOAuth)?
            .ok_or_else(|| not_configured("no Claude login found"))?;
        if let Credential::OAuth(oauth) = &credential {
            if oauth.is_expired() {
                return Err(FetchError::Authentication(
                    "Claude token expired; sign in with the Claude CLI".to_string(),
                ));
            }
        }

        let token = bearer(credential.secret());
        let usage = fetch_usage(&self.ctx.http, &token)?;
        let windows = parse_usage(&usage);

        let profile = self
            .ctx
            .http
            .get_json(PROFILE_URL, &[("Authorization", token.as_str())]);
        let (email, plan) = match profile {
            Ok(profile) => parse_profile(&profile),
            Err(err) => {
                debug!("Claude profile unavailable: {}", err);
                (None, None)
            }
        };

        let mut account = AccountUsage::new(email).with_plan(plan);
        account.windows = windows;
        Ok(ProviderUsage::single(PROVIDER_ID, account))
    }
}

fn fetch_usage(http: &HttpClient, token: &str) -> Result<Value, FetchError> {
    http.get_json(
        USAGE_URL,
        &[
            ("Authorization", token),
            ("anthropic-beta", OAUTH_BETA),
            ("Content-Type", "application/json"),
        ],
    )
}

/// Windows present in a usage response; absent or null windows are skipped.
pub fn parse_usage(usage: &Value) -> Vec<UsageWindow> {
    WINDOWS
        .iter()
        .filter_map(|(name, span)| {
            let window = usage.get(*name).filter(|w| w.is_object())?;
            let mut parsed = UsageWindow::new(*name, *span).with_reset(
                window
                    .get("resets_at")
                    .and_then(Value::as_str)
                    .and_then(ResetAt::parse_rfc3339),
            );
            if let Some(utilization) = window.get("utilization").and_then(Value::as_f64) {
                parsed = parsed.with_percent(utilization);
            }
            Some(parsed)
        })
        .collect()
}

/// `(email, plan)` from the profile response.
pub fn parse_profile(profile: &Value) -> (Option<String>, Option<String>) {
    let text = |value: &Value| value.as_str().filter(|s| !s.is_empty()).map(String::from);
    let email = text(&profile["account"]["email"]);
    let plan = text(&profile["organization"]["organization_type"])
        .or_else(|| text(&profile["account"]["rate_limit_tier"]));
    (email, plan)
}

#[async_trait]
impl UsageProvider for ClaudeProvider {
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
#[path = "tests/claude_tests.rs"]
mod tests;
