//! Decoders from raw file contents to typed credentials.
//!
//! Single-credential files decode all-or-nothing. The shared auth document
//! decodes entry by entry: a bad entry is logged and dropped, and only a
//! document where every entry fails is rejected.

use super::error::DecodeError;
use super::scalar;
use super::types::{ApiKeyCredential, Credential, OAuthCredential};
use crate::protowire::{decode_record, WireRecord};
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Untyped entry of a JSON auth document.
pub type RawSecretRecord = Map<String, Value>;

fn parse_object(bytes: &[u8]) -> Result<RawSecretRecord, DecodeError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::Malformed(format!(
            "expected a JSON object, found {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_field(record: &RawSecretRecord, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn required(record: &RawSecretRecord, key: &'static str) -> Result<String, DecodeError> {
    string_field(record, key).ok_or(DecodeError::MissingField(key))
}

/// `~/.claude/.credentials.json`: `{"claudeAiOauth": {accessToken, refreshToken, expiresAt}}`.
pub fn claude_oauth(bytes: &[u8]) -> Result<Credential, DecodeError> {
    let root = parse_object(bytes)?;
    let oauth = root
        .get("claudeAiOauth")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingField("claudeAiOauth"))?;

    Ok(Credential::OAuth(OAuthCredential {
        access_token: required(oauth, "accessToken")?,
        refresh_token: string_field(oauth, "refreshToken"),
        expires_at: scalar::epoch_millis(oauth.get("expiresAt")),
        account_id: None,
        email: None,
    }))
}

/// `~/.codex/auth.json`: ChatGPT tokens, or a bare `OPENAI_API_KEY`.
pub fn codex_auth(bytes: &[u8]) -> Result<Credential, DecodeError> {
    let root = parse_object(bytes)?;

    if let Some(tokens) = root.get("tokens").and_then(Value::as_object) {
        let access_token = required(tokens, "access_token")?;
        let id_claims = string_field(tokens, "id_token").and_then(|t| jwt_claims(&t));
        let account_id = scalar::identifier(tokens.get("account_id"))
            .or_else(|| id_claims.as_ref().and_then(openai_account_id))
            .or_else(|| jwt_claims(&access_token).as_ref().and_then(openai_account_id));
        let email = id_claims
            .as_ref()
            .and_then(email_claim)
            .or_else(|| email_from_jwt(&access_token));

        return Ok(Credential::OAuth(OAuthCredential {
            access_token,
            refresh_token: string_field(tokens, "refresh_token"),
            expires_at: None,
            account_id,
            email,
        }));
    }

    match string_field(&root, "OPENAI_API_KEY") {
        Some(key) => Ok(Credential::ApiKey(ApiKeyCredential { key })),
        None => Err(DecodeError::MissingField("tokens")),
    }
}

/// `~/.gemini/oauth_creds.json`: Google OAuth token set.
pub fn gemini_oauth(bytes: &[u8]) -> Result<Credential, DecodeError> {
    let root = parse_object(bytes)?;
    Ok(Credential::OAuth(OAuthCredential {
        access_token: required(&root, "access_token")?,
        refresh_token: string_field(&root, "refresh_token"),
        expires_at: scalar::epoch_millis(root.get("expiry_date")),
        account_id: None,
        email: string_field(&root, "id_token").and_then(|t| email_from_jwt(&t)),
    }))
}

/// Shared auth document: provider name to `{type, access|key, refresh, expires, accountId}`.
///
/// An empty document is valid and yields no entries.
pub fn auth_document(bytes: &[u8]) -> Result<BTreeMap<String, Credential>, DecodeError> {
    let root = parse_object(bytes)?;
    let total = root.len();
    let mut entries = BTreeMap::new();

    for (name, value) in &root {
        let decoded = match value {
            Value::Object(record) => auth_entry(record),
            other => Err(DecodeError::Malformed(format!(
                "entry is a {}",
                json_type(other)
            ))),
        };
        match decoded {
            Ok(credential) => {
                entries.insert(name.clone(), credential);
            }
            Err(e) => warn!("Dropping auth document entry '{}': {}", name, e),
        }
    }

    if total > 0 && entries.is_empty() {
        return Err(DecodeError::NoUsableEntries { dropped: total });
    }
    Ok(entries)
}

/// Decodes one auth document entry.
pub fn auth_entry(record: &RawSecretRecord) -> Result<Credential, DecodeError> {
    let kind = string_field(record, "type").ok_or(DecodeError::MissingField("type"))?;
    match kind.as_str() {
        "oauth" => {
            let access_token = required(record, "access")?;
            let account_id = scalar::identifier(record.get("accountId"))
                .or_else(|| jwt_claims(&access_token).as_ref().and_then(openai_account_id));
            let email = email_from_jwt(&access_token);
            Ok(Credential::OAuth(OAuthCredential {
                refresh_token: string_field(record, "refresh"),
                expires_at: scalar::epoch_millis(record.get("expires")),
                account_id,
                email,
                access_token,
            }))
        }
        "api" => Ok(Credential::ApiKey(ApiKeyCredential {
            key: required(record, "key")?,
        })),
        other => Err(DecodeError::Malformed(format!(
            "unsupported entry type '{}'",
            other
        ))),
    }
}

/// Decrypted vault row payload: `{access_token, account_id, email, refresh_token}`.
pub fn vault_payload(plaintext: &[u8]) -> Result<OAuthCredential, DecodeError> {
    let record = parse_object(plaintext)?;
    let access_token = required(&record, "access_token")?;
    Ok(OAuthCredential {
        refresh_token: string_field(&record, "refresh_token"),
        expires_at: scalar::epoch_millis(record.get("expires_at")),
        account_id: scalar::identifier(record.get("account_id")),
        email: string_field(&record, "email").or_else(|| email_from_jwt(&access_token)),
        access_token,
    })
}

// Field numbers of the local session record.
const SESSION_TOKEN: u64 = 1;
const SESSION_EMAIL: u64 = 2;
const TOKEN_ACCESS: u64 = 1;
const TOKEN_TYPE: u64 = 2;
const TOKEN_REFRESH: u64 = 3;
const TOKEN_EXPIRY: u64 = 4;
const EXPIRY_SECONDS: u64 = 1;

/// Local IDE session: base64 text of a protobuf record.
///
/// Outer field 1 is the token message (access, type, refresh, expiry
/// message holding seconds); outer field 2 is the account email.
pub fn local_session(text: &str) -> Result<Credential, DecodeError> {
    let trimmed = text.trim().trim_matches('"');
    let blob = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .or_else(|_| crate::crypto::fernet::decode_base64url(trimmed))
        .map_err(|e| DecodeError::Malformed(format!("session blob is not base64: {}", e)))?;

    let outer = decode_record(&blob)?;
    let token = outer
        .message(SESSION_TOKEN)?
        .ok_or(DecodeError::MissingField("oauth token"))?;

    let access_token = non_empty_string(&token, TOKEN_ACCESS)
        .ok_or(DecodeError::MissingField("access token"))?;
    if let Some(kind) = token.string(TOKEN_TYPE) {
        if !kind.eq_ignore_ascii_case("bearer") {
            tracing::debug!("Local session token type is '{}'", kind);
        }
    }

    Ok(Credential::OAuth(OAuthCredential {
        access_token,
        refresh_token: non_empty_string(&token, TOKEN_REFRESH),
        expires_at: expiry_millis(&token)?,
        account_id: None,
        email: non_empty_string(&outer, SESSION_EMAIL),
    }))
}

fn non_empty_string(record: &WireRecord, field: u64) -> Option<String> {
    record
        .string(field)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn expiry_millis(token: &WireRecord) -> Result<Option<i64>, DecodeError> {
    let Some(expiry) = token.message(TOKEN_EXPIRY)? else {
        return Ok(None);
    };
    Ok(expiry
        .varint(EXPIRY_SECONDS)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| secs.checked_mul(1000)))
}

/// Payload claims of a JWT, without verifying the signature.
pub fn jwt_claims(token: &str) -> Option<Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&payload).ok()
}

/// Email claim of a JWT (Google id_token or OpenAI token).
pub fn email_from_jwt(token: &str) -> Option<String> {
    email_claim(&jwt_claims(token)?)
}

fn email_claim(claims: &Value) -> Option<String> {
    claims["email"]
        .as_str()
        .or_else(|| claims["https://api.openai.com/profile"]["email"].as_str())
        .filter(|e| !e.is_empty())
        .map(String::from)
}

fn openai_account_id(claims: &Value) -> Option<String> {
    claims["https://api.openai.com/auth"]["chatgpt_account_id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(String::from)
}

#[cfg(test)]
#[path = "tests/decode_tests.rs"]
mod tests;
