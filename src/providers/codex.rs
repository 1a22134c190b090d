//! Codex usage for every ChatGPT account quotabar can find.
//!
//! Tokens come from three places: the Codex CLI login, the encrypted
//! account vault and the OpenCode auth document. They are merged into one
//! entry per real account before any request is made. When no account can
//! be queried the newest rate-limit event in the CLI's session logs is used
//! instead.

use super::http::bearer;
use super::{blocking, not_configured, ProviderContext};
use crate::accounts::{self, AccountIdentity, EmailHints, MergedAccount};
use crate::credentials::decode::email_from_jwt;
use crate::credentials::{Credential, CredentialError, OAuthCredential, SecretKind};
use crate::fetch::{FetchError, ProviderId, UsageProvider};
use crate::usage::{AccountUsage, ProviderUsage, ResetAt, UsageWindow, WindowSpan};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub const PROVIDER_ID: &str = "codex";

pub const CLI_LABEL: &str = "Codex CLI";
pub const VAULT_LABEL: &str = "Account Vault";
pub const DOCUMENT_LABEL: &str = "OpenCode";
pub const SESSION_LABEL: &str = "Session log";

/// Entry of the shared auth document that holds the ChatGPT login.
const DOCUMENT_ENTRY: &str = "openai";

const USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";

/// Session files inspected, newest first.
const MAX_SESSION_FILES: usize = 10;
/// `sessions/YYYY/MM/DD/*.jsonl`
const MAX_SESSION_DEPTH: usize = 4;

/// Merged accounts plus whether the CLI only had an API key.
#[derive(Debug, Default)]
pub struct CodexAccounts {
    pub merged: Vec<MergedAccount>,
    pub api_key_only: bool,
}

#[derive(Clone)]
pub struct CodexProvider {
    ctx: ProviderContext,
}

impl CodexProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    /// Collects identities from every source and merges them.
    ///
    /// A source that fails to decode is skipped as long as another source
    /// produced an identity.
    pub fn accounts(&self) -> Result<CodexAccounts, FetchError> {
        let store = &self.ctx.store;
        let mut identities = Vec::new();
        let mut hints = EmailHints::new();
        let mut first_error: Option<CredentialError> = None;
        let mut api_key_only = false;

        match store.credential(SecretKind::CodexAuth) {
            Ok(Some(Credential::OAuth(oauth))) => {
                let path = self.ctx.active_path(SecretKind::CodexAuth);
                identities.push(identity(&oauth, CLI_LABEL, 0, path, &mut hints));
            }
            Ok(Some(Credential::ApiKey(_))) => api_key_only = true,
            Ok(None) => {}
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }

        match store.accounts() {
            Ok(vault) => {
                let path = self.ctx.active_path(SecretKind::AccountVault);
                for account in vault {
                    identities.push(identity(
                        &account.credential,
                        VAULT_LABEL,
                        1,
                        path.clone(),
                        &mut hints,
                    ));
                }
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }

        match store.entries() {
            Ok(entries) => {
                if let Some(Credential::OAuth(oauth)) = entries.get(DOCUMENT_ENTRY) {
                    let path = self.ctx.active_path(SecretKind::AuthDocument);
                    identities.push(identity(oauth, DOCUMENT_LABEL, 2, path, &mut hints));
                }
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }

        if identities.is_empty() {
            if let Some(err) = first_error {
                return Err(err.into());
            }
        }

        Ok(CodexAccounts {
            merged: accounts::merge_with_hints(identities, &hints),
            api_key_only,
        })
    }

    fn fetch_blocking(&self) -> Result<ProviderUsage, FetchError> {
        let found = self.accounts()?;
        if found.merged.is_empty() {
            if let Some(usage) = self.session_fallback(None) {
                return Ok(usage);
            }
            return Err(if found.api_key_only {
                not_configured("Codex is logged in with an API key, which has no plan usage")
            } else {
                not_configured("no Codex login found")
            });
        }

        let mut usage = ProviderUsage::new(PROVIDER_ID);
        let mut first_error = None;
        for account in &found.merged {
            match self.fetch_account(account) {
                Ok(account_usage) => usage.accounts.push(account_usage),
                Err(err) => {
                    warn!(
                        "Codex usage for {} failed: {}",
                        display_name(account).unwrap_or_else(|| "account".to_string()),
                        err
                    );
                    usage
                        .accounts
                        .push(AccountUsage::failed(display_name(account), err.to_string()));
                    first_error.get_or_insert(err);
                }
            }
        }

        let any_success = usage.accounts.iter().any(|a| a.error.is_none());
        match first_error {
            Some(err) if !any_success => {
                let fallback = (!err.is_authentication())
                    .then(|| self.session_fallback(display_name(&found.merged[0])))
                    .flatten();
                fallback.ok_or(err)
            }
            _ => Ok(usage),
        }
    }

    fn fetch_account(&self, account: &MergedAccount) -> Result<AccountUsage, FetchError> {
        let token = bearer(&account.access_token);
        let mut headers = vec![("Authorization", token.as_str())];
        if let Some(id) = account.account_id.as_deref() {
            headers.push(("ChatGPT-Account-Id", id));
        }
        let response = self.ctx.http.get_json(USAGE_URL, &headers)?;
        let (plan, windows) = parse_usage(&response, chrono::Utc::now().timestamp());

        let mut usage = AccountUsage::new(display_name(account))
            .with_plan(plan)
            .with_sources(account.source_labels.clone());
        usage.windows = windows;
        Ok(usage)
    }

    fn sessions_dir(&self) -> Option<PathBuf> {
        let env = self.ctx.store.environment();
        match env.var("CODEX_HOME") {
            Some(dir) => Some(PathBuf::from(dir).join("sessions")),
            None => env.home().map(|h| h.join(".codex").join("sessions")),
        }
    }

    fn session_fallback(&self, account: Option<String>) -> Option<ProviderUsage> {
        let dir = self.sessions_dir()?;
        let windows = latest_session_windows(&dir)?;
        debug!("Using Codex rate limits from session logs in {}", dir.display());
        let mut usage =
            AccountUsage::new(account).with_sources(vec![SESSION_LABEL.to_string()]);
        usage.windows = windows;
        Some(ProviderUsage::single(PROVIDER_ID, usage))
    }
}

fn identity(
    credential: &OAuthCredential,
    label: &str,
    rank: u32,
    origin: PathBuf,
    hints: &mut EmailHints,
) -> AccountIdentity {
    let email = credential
        .email
        .clone()
        .or_else(|| email_from_jwt(&credential.access_token));
    if let (Some(id), Some(email)) = (&credential.account_id, &email) {
        hints.insert(id, email);
    }
    AccountIdentity::new(credential.access_token.clone(), label, rank, origin)
        .with_account_id(credential.account_id.clone())
        .with_email(email)
}

fn display_name(account: &MergedAccount) -> Option<String> {
    account.email.clone().or_else(|| account.account_id.clone())
}

/// `(plan, windows)` from a `wham/usage` response.
pub fn parse_usage(
    response: &Value,
    now_epoch_seconds: i64,
) -> (Option<String>, Vec<UsageWindow>) {
    let plan = response["plan_type"].as_str().map(String::from);
    let windows = ["primary_window", "secondary_window"]
        .into_iter()
        .filter_map(|key| {
            let window = response["rate_limit"].get(key).filter(|w| w.is_object())?;
            let span = window["limit_window_seconds"]
                .as_u64()
                .and_then(|secs| u32::try_from(secs / 60).ok())
                .map(WindowSpan::Minutes)
                .unwrap_or_default();
            let reset = window["reset_at"]
                .as_i64()
                .or_else(|| {
                    window["reset_after_seconds"]
                        .as_i64()
                        .map(|after| now_epoch_seconds + after)
                })
                .map(ResetAt::from_epoch_seconds);
            let name = key.trim_end_matches("_window");
            let mut parsed = UsageWindow::new(name, span).with_reset(reset);
            if let Some(percent) = window["used_percent"].as_f64() {
                parsed = parsed.with_percent(percent);
            }
            Some(parsed)
        })
        .collect();
    (plan, windows)
}

/// Rate-limit windows from one session log line, if it is a token-count event.
pub fn parse_session_line(line: &str) -> Option<Vec<UsageWindow>> {
    let entry: Value = serde_json::from_str(line).ok()?;
    if entry["type"].as_str() != Some("event_msg") {
        return None;
    }
    let payload = &entry["payload"];
    if payload["type"].as_str() != Some("token_count") {
        return None;
    }
    let limits = payload.get("rate_limits").filter(|l| l.is_object())?;
    let event_time = entry["timestamp"]
        .as_str()
        .and_then(ResetAt::parse_rfc3339)
        .map(|t| t.epoch_seconds);

    let windows: Vec<UsageWindow> = ["primary", "secondary"]
        .into_iter()
        .filter_map(|key| {
            let limit = limits.get(key).filter(|l| l.is_object())?;
            let span = limit["window_minutes"]
                .as_u64()
                .and_then(|m| u32::try_from(m).ok())
                .map(WindowSpan::Minutes)
                .unwrap_or_default();
            let reset = limit["resets_at"]
                .as_i64()
                .or_else(|| {
                    let after = limit["resets_in_seconds"].as_i64()?;
                    event_time.map(|t| t + after)
                })
                .map(ResetAt::from_epoch_seconds);
            let percent = limit["used_percent"].as_f64()?;
            Some(
                UsageWindow::new(key, span)
                    .with_percent(percent)
                    .with_reset(reset),
            )
        })
        .collect();
    (!windows.is_empty()).then_some(windows)
}

/// Windows from the newest session log that contains a rate-limit event.
pub fn latest_session_windows(sessions_dir: &Path) -> Option<Vec<UsageWindow>> {
    let mut files = Vec::new();
    collect_session_files(sessions_dir, MAX_SESSION_DEPTH, &mut files);
    files.sort_by(|a, b| b.0.cmp(&a.0));

    files.iter().take(MAX_SESSION_FILES).find_map(|(_, path)| {
        let content = std::fs::read_to_string(path).ok()?;
        content.lines().rev().find_map(parse_session_line)
    })
}

fn collect_session_files(dir: &Path, depth: usize, out: &mut Vec<(SystemTime, PathBuf)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            if depth > 0 {
                collect_session_files(&path, depth - 1, out);
            }
        } else if path.extension().is_some_and(|e| e == "jsonl") {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            out.push((modified, path));
        }
    }
}

#[async_trait]
impl UsageProvider for CodexProvider {
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
#[path = "tests/codex_tests.rs"]
mod tests;
