//! Typed credential records produced by the credential store.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

/// Logical secrets the store knows how to locate and decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecretKind {
    /// `~/.claude/.credentials.json`
    ClaudeOAuth,
    /// `~/.codex/auth.json`
    CodexAuth,
    /// `~/.gemini/oauth_creds.json`
    GeminiOAuth,
    /// Shared multi-provider auth document (one entry per provider).
    AuthDocument,
    /// Encrypted multi-account store: SQLite database plus key file.
    AccountVault,
    /// Base64 protobuf session record kept by a local IDE.
    LocalSession,
    /// github.com session cookies from a browser profile.
    BrowserCookies,
}

impl SecretKind {
    pub const ALL: [SecretKind; 7] = [
        SecretKind::ClaudeOAuth,
        SecretKind::CodexAuth,
        SecretKind::GeminiOAuth,
        SecretKind::AuthDocument,
        SecretKind::AccountVault,
        SecretKind::LocalSession,
        SecretKind::BrowserCookies,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SecretKind::ClaudeOAuth => "claude-oauth",
            SecretKind::CodexAuth => "codex-auth",
            SecretKind::GeminiOAuth => "gemini-oauth",
            SecretKind::AuthDocument => "auth-document",
            SecretKind::AccountVault => "account-vault",
            SecretKind::LocalSession => "local-session",
            SecretKind::BrowserCookies => "browser-cookies",
        }
    }
}

impl Display for SecretKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// OAuth token set. Never mutated; a refresh produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry as epoch milliseconds.
    pub expires_at: Option<i64>,
    pub account_id: Option<String>,
    pub email: Option<String>,
}

impl OAuthCredential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            account_id: None,
            email: None,
        }
    }

    /// True when the expiry is known and at or before `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now_ms)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp_millis())
    }
}

impl Debug for OAuthCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    pub key: String,
}

impl Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeyCredential(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    OAuth(OAuthCredential),
    ApiKey(ApiKeyCredential),
}

impl Credential {
    /// The bearer secret regardless of credential shape.
    pub fn secret(&self) -> &str {
        match self {
            Credential::OAuth(oauth) => &oauth.access_token,
            Credential::ApiKey(api) => &api.key,
        }
    }

    pub fn as_oauth(&self) -> Option<&OAuthCredential> {
        match self {
            Credential::OAuth(oauth) => Some(oauth),
            Credential::ApiKey(_) => None,
        }
    }
}

/// One decrypted row of the account vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultAccount {
    pub id: String,
    pub label: Option<String>,
    pub credential: OAuthCredential,
}

/// Cookies for one domain taken from one browser profile.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieJar {
    pub profile: String,
    pub cookies: BTreeMap<String, String>,
}

impl Debug for CookieJar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("profile", &self.profile)
            .field("names", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CookieJar {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// `name=value; name=value` for a `Cookie:` request header.
    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// What a successful resolution yields, depending on the secret kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSecret {
    Credential(Credential),
    /// Per-provider entries of a multi-entry auth document.
    Entries(BTreeMap<String, Credential>),
    Accounts(Vec<VaultAccount>),
    Cookies(CookieJar),
}
