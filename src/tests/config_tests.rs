use super::*;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_default_config() {
    let config = QuotaConfig::default_config().unwrap();
    assert_eq!(config.credential_cache_ttl(), Duration::from_secs(30));
    assert_eq!(config.http_timeout(), Duration::from_secs(15));
    assert_eq!(config.enabled_providers(), KNOWN_PROVIDERS.to_vec());
    assert_eq!(config.provider_timeout("copilot"), Duration::from_secs(25));
    assert_eq!(config.browsers(), Browser::ALL.to_vec());
    assert_eq!(config.gemini_oauth.credentials(), None);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.yaml",
        "providers:\n  codex:\n    enabled: false\nbrowsers: [firefox, chrome]\n",
    );
    let config = QuotaConfig::load(&path).unwrap();

    assert_eq!(config.credential_cache_ttl_secs, 30);
    assert_eq!(config.enabled_providers(), vec!["claude", "gemini", "copilot"]);
    assert_eq!(config.provider_timeout("claude"), Duration::from_secs(20));
    assert_eq!(config.browsers(), vec![Browser::Firefox, Browser::Chrome]);
}

#[test]
fn test_gemini_client_credentials() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.yaml",
        "gemini_oauth:\n  client_id: abc.apps.googleusercontent.com\n  client_secret: shh\n",
    );
    let config = QuotaConfig::load(&path).unwrap();
    assert_eq!(
        config.gemini_oauth.credentials(),
        Some(("abc.apps.googleusercontent.com", "shh"))
    );

    let blank = OAuthClientConfig {
        client_id: Some("id".into()),
        client_secret: Some("  ".into()),
    };
    assert_eq!(blank.credentials(), None);
}

#[test]
fn test_validation_rejects_bad_values() {
    let dir = TempDir::new().unwrap();
    let cases = [
        ("providers:\n  bard:\n    enabled: true\n", "Unknown provider 'bard'"),
        ("providers:\n  claude:\n    timeout_secs: 0\n", "timeout_secs must be greater than zero"),
        ("http_timeout_secs: 0\n", "http_timeout_secs must be greater than zero"),
        ("browsers: [netscape]\n", "Unknown browser 'netscape'"),
    ];
    for (yaml, expected) in cases {
        let path = write(&dir, "bad.yaml", yaml);
        let err = QuotaConfig::load(&path).unwrap_err();
        assert!(
            format!("{:#}", err).contains(expected),
            "{:#} should contain {}",
            err,
            expected
        );
    }
}

#[test]
fn test_unknown_field_fails_to_parse() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.yaml", "refresh_interval: 5\n");
    let err = QuotaConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_discover_order() {
    let dir = TempDir::new().unwrap();
    let explicit = write(&dir, "explicit.yaml", "http_timeout_secs: 1\n");
    let from_env = write(&dir, "env.yaml", "http_timeout_secs: 2\n");
    let default = write(&dir, "config.yaml", "http_timeout_secs: 3\n");
    let env = from_env.to_string_lossy().to_string();

    let (config, source) =
        QuotaConfig::discover(Some(&explicit), Some(&env), Some(&default)).unwrap();
    assert_eq!(config.http_timeout_secs, 1);
    assert_eq!(source, ConfigSource::File(explicit));

    let (config, _) = QuotaConfig::discover(None, Some(&env), Some(&default)).unwrap();
    assert_eq!(config.http_timeout_secs, 2);

    let (config, _) = QuotaConfig::discover(None, Some("  "), Some(&default)).unwrap();
    assert_eq!(config.http_timeout_secs, 3);

    let missing = dir.path().join("missing.yaml");
    let (config, source) = QuotaConfig::discover(None, None, Some(&missing)).unwrap();
    assert_eq!(config.http_timeout_secs, 15);
    assert_eq!(source, ConfigSource::Embedded);
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.yaml");
    assert!(QuotaConfig::discover(Some(&missing), None, None).is_err());
}
