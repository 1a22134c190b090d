//! OAuth refresh-token exchange.
//!
//! Refreshed credentials only live in memory: the caller installs them in
//! the [`CredentialStore`](crate::credentials::CredentialStore) cache and
//! never writes them back to disk. Failures are not retried.

use super::http::HttpClient;
use crate::credentials::OAuthCredential;
use crate::fetch::FetchError;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use tracing::{debug, warn};

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
pub const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The token endpoint answered with a non-200 status.
    RefreshFailed { status: u16 },
    Network(String),
    InvalidResponse(String),
    /// The credential has no refresh token to exchange.
    NoRefreshToken,
}

impl Display for RefreshError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RefreshFailed { status } => {
                write!(f, "token refresh rejected with HTTP {}", status)
            }
            Self::Network(message) => write!(f, "token refresh failed: {}", message),
            Self::InvalidResponse(message) => {
                write!(f, "token refresh returned an invalid response: {}", message)
            }
            Self::NoRefreshToken => f.write_str("credential has no refresh token"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// A rejected or missing refresh token means signing in again; anything
/// else is transient or a protocol problem.
impl From<RefreshError> for FetchError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::RefreshFailed { .. } | RefreshError::NoRefreshToken => {
                FetchError::Authentication(err.to_string())
            }
            RefreshError::Network(_) => FetchError::Network(err.to_string()),
            RefreshError::InvalidResponse(_) => FetchError::Decode(err.to_string()),
        }
    }
}

/// Successful body of the token endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Client credentials plus the endpoint to call.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
}

impl OAuthClient {
    pub fn google(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        }
    }
}

/// True when the credential expires within [`EXPIRY_MARGIN_MS`] of `now_ms`.
pub fn needs_refresh(credential: &OAuthCredential, now_ms: i64) -> bool {
    credential.is_expired_at(now_ms.saturating_add(EXPIRY_MARGIN_MS))
}

pub fn parse_token_response(body: &str) -> Result<TokenResponse, RefreshError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
    if response.access_token.trim().is_empty() {
        return Err(RefreshError::InvalidResponse(
            "empty access_token".to_string(),
        ));
    }
    Ok(response)
}

/// New credential carrying over everything the endpoint does not return.
pub fn refreshed_credential(
    previous: &OAuthCredential,
    response: TokenResponse,
    now_ms: i64,
) -> OAuthCredential {
    OAuthCredential {
        access_token: response.access_token,
        refresh_token: previous.refresh_token.clone(),
        expires_at: Some(now_ms.saturating_add(response.expires_in.saturating_mul(1000))),
        account_id: previous.account_id.clone(),
        email: previous.email.clone(),
    }
}

/// Exchanges the credential's refresh token for a new access token.
pub fn refresh_access_token(
    http: &HttpClient,
    client: &OAuthClient,
    credential: &OAuthCredential,
) -> Result<OAuthCredential, RefreshError> {
    let refresh_token = credential
        .refresh_token
        .as_deref()
        .ok_or(RefreshError::NoRefreshToken)?;

    debug!("Refreshing OAuth token at {}", client.token_endpoint);
    let body = http
        .post_form(
            &client.token_endpoint,
            &[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )
        .map_err(|err| match err {
            ureq::Error::StatusCode(status) => RefreshError::RefreshFailed { status },
            other => RefreshError::Network(other.to_string()),
        })
        .inspect_err(|err| warn!("{}", err))?;

    let response = parse_token_response(&body)?;
    Ok(refreshed_credential(
        credential,
        response,
        chrono::Utc::now().timestamp_millis(),
    ))
}

#[cfg(test)]
#[path = "tests/oauth_tests.rs"]
mod tests;
