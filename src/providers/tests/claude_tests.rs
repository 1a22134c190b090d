use super::*;
use crate::providers::tests::context_for;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_parse_usage_windows() {
    let usage = json!({
        "five_hour": {"utilization": 37.0, "resets_at": "2025-11-04T04:59:59.943648+00:00"},
        "seven_day": {"utilization": 12, "resets_at": null},
        "seven_day_opus": null,
        "extra_usage": {"is_enabled": false}
    });
    let windows = parse_usage(&usage);

    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].name, "five_hour");
    assert_eq!(windows[0].used_percent, Some(37.0));
    assert_eq!(windows[0].span, WindowSpan::Hours(5));
    assert_eq!(
        windows[0].resets_at,
        ResetAt::parse_rfc3339("2025-11-04T04:59:59.943648+00:00")
    );
    assert!(windows[0].resets_at.is_some());
    assert_eq!(windows[1].name, "seven_day");
    assert_eq!(windows[1].used_percent, Some(12.0));
    assert_eq!(windows[1].resets_at, None);
}

#[test]
fn test_parse_usage_empty_response() {
    assert!(parse_usage(&json!({})).is_empty());
}

#[test]
fn test_parse_profile() {
    let profile = json!({
        "account": {"email": "dev@example.com", "rate_limit_tier": "default_claude_max_5x"},
        "organization": {"organization_type": "claude_max"}
    });
    assert_eq!(
        parse_profile(&profile),
        (Some("dev@example.com".into()), Some("claude_max".into()))
    );

    let tier_only = json!({"account": {"rate_limit_tier": "pro"}, "organization": {}});
    assert_eq!(parse_profile(&tier_only), (None, Some("pro".into())));
}

#[tokio::test]
async fn test_missing_login_is_not_configured() {
    let home = TempDir::new().unwrap();
    let provider = ClaudeProvider::new(context_for(home.path()));
    match provider.fetch().await {
        Err(FetchError::NotConfigured(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_token_is_authentication_failure() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".claude");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(".credentials.json"),
        r#"{"claudeAiOauth":{"accessToken":"sk-ant-old","expiresAt":1000}}"#,
    )
    .unwrap();

    let provider = ClaudeProvider::new(context_for(home.path()));
    assert!(provider.fetch().await.unwrap_err().is_authentication());
}

#[tokio::test]
async fn test_corrupt_login_is_credential_error() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".claude");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(".credentials.json"), "{oops").unwrap();

    let provider = ClaudeProvider::new(context_for(home.path()));
    assert!(matches!(
        provider.fetch().await,
        Err(FetchError::Credential(_))
    ));
}
