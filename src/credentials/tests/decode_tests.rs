use super::*;
use crate::credentials::test_support::{field_bytes, session_blob};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

fn jwt(payload: &str) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(payload)
    )
}

#[test]
fn test_claude_oauth() {
    let json = br#"{"claudeAiOauth":{"accessToken":"sk-ant-1","refreshToken":"r","expiresAt":1700000000000}}"#;
    let credential = claude_oauth(json).unwrap();
    let oauth = credential.as_oauth().unwrap();
    assert_eq!(oauth.access_token, "sk-ant-1");
    assert_eq!(oauth.refresh_token.as_deref(), Some("r"));
    assert_eq!(oauth.expires_at, Some(1700000000000));
}

#[test]
fn test_claude_oauth_string_expiry_and_missing_block() {
    let json = br#"{"claudeAiOauth":{"accessToken":"t","expiresAt":"1700000000000"}}"#;
    assert_eq!(
        claude_oauth(json).unwrap().as_oauth().unwrap().expires_at,
        Some(1700000000000)
    );
    assert_eq!(
        claude_oauth(br#"{"other":{}}"#),
        Err(DecodeError::MissingField("claudeAiOauth"))
    );
}

#[test]
fn test_claude_oauth_rejects_non_object() {
    assert!(matches!(claude_oauth(b"[]"), Err(DecodeError::Malformed(_))));
    assert!(matches!(claude_oauth(b"{not json"), Err(DecodeError::Malformed(_))));
}

#[test]
fn test_codex_tokens_with_id_token_claims() {
    let id_token = jwt(
        r#"{"email":"dev@example.com","https://api.openai.com/auth":{"chatgpt_account_id":"acct-9"}}"#,
    );
    let json = format!(
        r#"{{"tokens":{{"access_token":"at","refresh_token":"rt","id_token":"{}"}}}}"#,
        id_token
    );
    let credential = codex_auth(json.as_bytes()).unwrap();
    let oauth = credential.as_oauth().unwrap();
    assert_eq!(oauth.account_id.as_deref(), Some("acct-9"));
    assert_eq!(oauth.email.as_deref(), Some("dev@example.com"));
    assert_eq!(oauth.refresh_token.as_deref(), Some("rt"));
}

#[test]
fn test_codex_explicit_account_id_wins() {
    let json = br#"{"tokens":{"access_token":"at","account_id":"explicit"}}"#;
    let credential = codex_auth(json).unwrap();
    assert_eq!(
        credential.as_oauth().unwrap().account_id.as_deref(),
        Some("explicit")
    );
}

#[test]
fn test_codex_api_key_only() {
    let credential = codex_auth(br#"{"OPENAI_API_KEY":"sk-123","tokens":null}"#).unwrap();
    assert_eq!(
        credential,
        Credential::ApiKey(ApiKeyCredential {
            key: "sk-123".into()
        })
    );
    assert_eq!(
        codex_auth(br#"{"OPENAI_API_KEY":null}"#),
        Err(DecodeError::MissingField("tokens"))
    );
}

#[test]
fn test_gemini_oauth_with_float_expiry() {
    let id_token = jwt(r#"{"email":"g@example.com"}"#);
    let json = format!(
        r#"{{"access_token":"ya29","refresh_token":"1//r","expiry_date":1700000000000.0,"id_token":"{}"}}"#,
        id_token
    );
    let credential = gemini_oauth(json.as_bytes()).unwrap();
    let oauth = credential.as_oauth().unwrap();
    assert_eq!(oauth.expires_at, Some(1700000000000));
    assert_eq!(oauth.email.as_deref(), Some("g@example.com"));
}

#[test]
fn test_auth_document_keeps_good_entries() {
    let json = br#"{
        "openai": {"type":"oauth","access":"at","refresh":"rt","expires":1700000000000,"accountId":"acct-1"},
        "anthropic": {"type":"oauth"},
        "google": {"type":"api","key":"AIza"},
        "broken": "not an object",
        "wellknown": {"type":"wellknown","token":"x"}
    }"#;
    let entries = auth_document(json).unwrap();
    assert_eq!(
        entries.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["google", "openai"]
    );
    let openai = entries["openai"].as_oauth().unwrap();
    assert_eq!(openai.account_id.as_deref(), Some("acct-1"));
    assert_eq!(openai.expires_at, Some(1700000000000));
    assert_eq!(entries["google"].secret(), "AIza");
}

#[test]
fn test_auth_document_all_entries_bad() {
    let json = br#"{"a":{"type":"oauth"},"b":5}"#;
    assert_eq!(
        auth_document(json),
        Err(DecodeError::NoUsableEntries { dropped: 2 })
    );
}

#[test]
fn test_auth_document_empty_is_valid() {
    assert!(auth_document(b"{}").unwrap().is_empty());
}

#[test]
fn test_auth_entry_numeric_account_id() {
    let record: RawSecretRecord =
        serde_json::from_str(r#"{"type":"oauth","access":"at","accountId":42}"#).unwrap();
    let credential = auth_entry(&record).unwrap();
    assert_eq!(credential.as_oauth().unwrap().account_id.as_deref(), Some("42"));
}

#[test]
fn test_vault_payload() {
    let credential =
        vault_payload(br#"{"access_token":"at","account_id":"a1","email":"x@y.z"}"#).unwrap();
    assert_eq!(credential.account_id.as_deref(), Some("a1"));
    assert_eq!(credential.email.as_deref(), Some("x@y.z"));
    assert_eq!(
        vault_payload(br#"{"account_id":"a1"}"#),
        Err(DecodeError::MissingField("access_token"))
    );
}

#[test]
fn test_local_session_decodes_nested_record() {
    let blob = session_blob("ya29.local", "1//refresh", 1_700_000_000, "me@example.com");
    let credential = local_session(&format!("\"{}\"\n", blob)).unwrap();
    let oauth = credential.as_oauth().unwrap();
    assert_eq!(oauth.access_token, "ya29.local");
    assert_eq!(oauth.refresh_token.as_deref(), Some("1//refresh"));
    assert_eq!(oauth.expires_at, Some(1_700_000_000_000));
    assert_eq!(oauth.email.as_deref(), Some("me@example.com"));
}

#[test]
fn test_local_session_without_token_message() {
    let blob = STANDARD.encode(field_bytes(2, b"me@example.com"));
    assert_eq!(
        local_session(&blob),
        Err(DecodeError::MissingField("oauth token"))
    );
}

#[test]
fn test_local_session_truncated_blob() {
    let mut raw = field_bytes(1, b"abcdef");
    raw.truncate(raw.len() - 2);
    let result = local_session(&STANDARD.encode(raw));
    assert!(matches!(result, Err(DecodeError::Wire(_))));
}

#[test]
fn test_local_session_not_base64() {
    assert!(matches!(
        local_session("!!! not base64 !!!"),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn test_jwt_helpers() {
    assert_eq!(email_from_jwt("not.a.jwt"), None);
    assert_eq!(email_from_jwt("invalid"), None);
    let token = jwt(r#"{"https://api.openai.com/profile":{"email":"p@example.com"}}"#);
    assert_eq!(email_from_jwt(&token).as_deref(), Some("p@example.com"));
}
