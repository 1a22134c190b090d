use super::*;
use crate::credentials::keystore::{KeyFlavor, StaticKeystore};
use crate::credentials::test_support::{
    encrypted_cookie, session_blob, vault_token, write_chromium_cookies, write_vault,
};
use crate::credentials::types::OAuthCredential;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use tempfile::TempDir;

const CLAUDE_OK: &str = r#"{"claudeAiOauth":{"accessToken":"good-token","expiresAt":1700000000000}}"#;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn statuses(store: &CredentialStore, kind: SecretKind) -> Vec<LocationStatus> {
    store
        .diagnostics(kind)
        .into_iter()
        .map(|report| report.status)
        .collect()
}

fn access_token(secret: &ResolvedSecret) -> &str {
    match secret {
        ResolvedSecret::Credential(credential) => credential.secret(),
        other => panic!("expected a credential, got {:?}", other),
    }
}

struct Fixture {
    home: TempDir,
    custom: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
            custom: TempDir::new().unwrap(),
        }
    }

    fn env(&self) -> SecretEnvironment {
        SecretEnvironment::new(self.home.path())
            .with_var("CLAUDE_CONFIG_DIR", self.custom.path().to_str().unwrap())
    }

    fn override_file(&self) -> PathBuf {
        self.custom.path().join(".credentials.json")
    }

    fn xdg_file(&self) -> PathBuf {
        self.home.path().join(".config/claude/.credentials.json")
    }

    fn home_file(&self) -> PathBuf {
        self.home.path().join(".claude/.credentials.json")
    }
}

#[test]
fn test_corrupt_override_falls_through_to_fallback() {
    let fx = Fixture::new();
    write(&fx.override_file(), "{ this is not json");
    write(&fx.xdg_file(), CLAUDE_OK);
    write(&fx.home_file(), CLAUDE_OK);

    let store = CredentialStore::new(fx.env());
    let secret = store.resolve(SecretKind::ClaudeOAuth).unwrap();
    assert_eq!(access_token(&secret), "good-token");

    let statuses = statuses(&store, SecretKind::ClaudeOAuth);
    assert!(matches!(statuses[0], LocationStatus::Corrupt(_)));
    assert_eq!(statuses[1], LocationStatus::Active);
    assert_eq!(statuses[2], LocationStatus::Shadowed);
}

#[test]
fn test_missing_override_reported_not_found() {
    let fx = Fixture::new();
    write(&fx.home_file(), CLAUDE_OK);

    let store = CredentialStore::new(fx.env());
    store.resolve(SecretKind::ClaudeOAuth).unwrap();
    assert_eq!(
        statuses(&store, SecretKind::ClaudeOAuth),
        vec![
            LocationStatus::NotFound,
            LocationStatus::NotFound,
            LocationStatus::Active
        ]
    );
}

#[test]
fn test_override_wins_when_valid() {
    let fx = Fixture::new();
    write(
        &fx.override_file(),
        r#"{"claudeAiOauth":{"accessToken":"override-token"}}"#,
    );
    write(&fx.home_file(), CLAUDE_OK);

    let store = CredentialStore::new(fx.env());
    let secret = store.resolve(SecretKind::ClaudeOAuth).unwrap();
    assert_eq!(access_token(&secret), "override-token");
    assert_eq!(
        statuses(&store, SecretKind::ClaudeOAuth)[2],
        LocationStatus::Shadowed
    );
}

#[test]
fn test_nothing_found() {
    let fx = Fixture::new();
    let store = CredentialStore::new(fx.env());
    assert_eq!(
        store.resolve(SecretKind::ClaudeOAuth),
        Err(CredentialError::NotFound {
            kind: SecretKind::ClaudeOAuth
        })
    );
    assert_eq!(store.credential(SecretKind::ClaudeOAuth), Ok(None));
}

#[test]
fn test_corrupt_outranks_unreadable() {
    let fx = Fixture::new();
    // A directory where a file is expected cannot be read as one.
    std::fs::create_dir_all(fx.override_file()).unwrap();
    write(&fx.home_file(), "[]");

    let store = CredentialStore::new(fx.env());
    let err = store.resolve(SecretKind::ClaudeOAuth).unwrap_err();
    match err {
        CredentialError::Corrupt { path, .. } => assert_eq!(path, fx.home_file()),
        other => panic!("expected Corrupt, got {:?}", other),
    }
    let statuses = statuses(&store, SecretKind::ClaudeOAuth);
    assert!(matches!(statuses[0], LocationStatus::Unreadable(_)));
    assert!(store.credential(SecretKind::ClaudeOAuth).is_err());
}

#[test]
fn test_unreadable_outranks_not_found() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.home_file()).unwrap();

    let store = CredentialStore::new(fx.env());
    assert!(matches!(
        store.resolve(SecretKind::ClaudeOAuth),
        Err(CredentialError::Unreadable { .. })
    ));
}

#[test]
fn test_cache_served_within_ttl() {
    let fx = Fixture::new();
    write(&fx.home_file(), CLAUDE_OK);
    let store = CredentialStore::new(fx.env());
    store.resolve(SecretKind::ClaudeOAuth).unwrap();

    std::fs::remove_file(fx.home_file()).unwrap();
    assert!(store.resolve(SecretKind::ClaudeOAuth).is_ok());

    store.invalidate(SecretKind::ClaudeOAuth);
    assert!(matches!(
        store.resolve(SecretKind::ClaudeOAuth),
        Err(CredentialError::NotFound { .. })
    ));
}

#[test]
fn test_zero_ttl_always_reads_disk() {
    let fx = Fixture::new();
    write(&fx.home_file(), CLAUDE_OK);
    let store = CredentialStore::new(fx.env()).with_ttl(Duration::ZERO);
    store.resolve(SecretKind::ClaudeOAuth).unwrap();

    std::fs::remove_file(fx.home_file()).unwrap();
    assert!(store.resolve(SecretKind::ClaudeOAuth).is_err());
}

#[test]
fn test_replaced_credential_pinned_until_expiry() {
    let fx = Fixture::new();
    write(&fx.home_file(), CLAUDE_OK);
    let store = CredentialStore::new(fx.env()).with_ttl(Duration::ZERO);

    let mut refreshed = OAuthCredential::new("refreshed-token");
    refreshed.expires_at = Some(chrono::Utc::now().timestamp_millis() + 3_600_000);
    store.replace_credential(SecretKind::ClaudeOAuth, Credential::OAuth(refreshed));
    let secret = store.resolve(SecretKind::ClaudeOAuth).unwrap();
    assert_eq!(access_token(&secret), "refreshed-token");

    let mut expired = OAuthCredential::new("expired-token");
    expired.expires_at = Some(1);
    store.replace_credential(SecretKind::ClaudeOAuth, Credential::OAuth(expired));
    let secret = store.resolve(SecretKind::ClaudeOAuth).unwrap();
    assert_eq!(access_token(&secret), "good-token");
}

#[test]
fn test_auth_document_entries() {
    let home = TempDir::new().unwrap();
    let doc = home.path().join("auth.json");
    write(
        &doc,
        r#"{"openai":{"type":"oauth","access":"at"},"bad":{"type":"oauth"}}"#,
    );
    let env =
        SecretEnvironment::new(home.path()).with_var("QUOTABAR_AUTH_DOCUMENT", doc.to_str().unwrap());
    let store = CredentialStore::new(env);

    let entries = store.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["openai"].secret(), "at");
}

#[test]
fn test_entries_empty_when_no_document() {
    let home = TempDir::new().unwrap();
    let store = CredentialStore::new(SecretEnvironment::new(home.path()));
    assert!(store.entries().unwrap().is_empty());
}

#[test]
fn test_vault_accounts_through_store() {
    let home = TempDir::new().unwrap();
    let vault_dir = home.path().join(".local/share/codexbar");
    write_vault(
        &vault_dir,
        &[(
            "a1",
            "Personal",
            "me@example.com",
            vault_token(r#"{"access_token":"vault-at","account_id":"acct-1"}"#),
        )],
    );
    let store = CredentialStore::new(SecretEnvironment::new(home.path()));

    let accounts = store.accounts().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].credential.email.as_deref(), Some("me@example.com"));
    assert_eq!(
        statuses(&store, SecretKind::AccountVault),
        vec![LocationStatus::Active, LocationStatus::Shadowed]
    );
}

#[test]
fn test_vault_without_key_is_corrupt() {
    let home = TempDir::new().unwrap();
    let vault_dir = home.path().join("vault");
    write_vault(&vault_dir, &[]);
    std::fs::remove_file(vault_dir.join("accounts.key")).unwrap();
    let env = SecretEnvironment::new(home.path())
        .with_var("QUOTABAR_VAULT_DIR", vault_dir.to_str().unwrap());
    let store = CredentialStore::new(env);

    assert!(matches!(
        store.accounts(),
        Err(CredentialError::Corrupt { .. })
    ));
}

#[test]
fn test_local_session_plain_file() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("session.txt");
    write(&file, &session_blob("ya29.a", "1//r", 1_700_000_000, "me@example.com"));
    let env = SecretEnvironment::new(home.path())
        .with_var("QUOTABAR_LOCAL_SESSION", file.to_str().unwrap());
    let store = CredentialStore::new(env);

    let credential = store.credential(SecretKind::LocalSession).unwrap().unwrap();
    assert_eq!(credential.secret(), "ya29.a");
    assert_eq!(
        credential.as_oauth().unwrap().email.as_deref(),
        Some("me@example.com")
    );
}

#[test]
fn test_local_session_state_database() {
    let home = TempDir::new().unwrap();
    let db = home
        .path()
        .join(".config/Antigravity/User/globalStorage/state.vscdb");
    std::fs::create_dir_all(db.parent().unwrap()).unwrap();
    let conn = Connection::open(&db).unwrap();
    conn.execute_batch("CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB)")
        .unwrap();
    conn.execute(
        "INSERT INTO ItemTable (key, value) VALUES (?1, ?2)",
        params![
            LOCAL_SESSION_ITEM,
            session_blob("ya29.db", "", 1_700_000_000, "db@example.com")
        ],
    )
    .unwrap();
    drop(conn);

    let store = CredentialStore::new(SecretEnvironment::new(home.path()));
    let credential = store.credential(SecretKind::LocalSession).unwrap().unwrap();
    assert_eq!(credential.secret(), "ya29.db");
    assert_eq!(credential.as_oauth().unwrap().refresh_token, None);
}

#[test]
fn test_cookies_from_first_usable_profile() {
    let home = TempDir::new().unwrap();
    let chrome = home.path().join("Library/Application Support/Google/Chrome");
    // Default has no github.com cookies; Profile 1 does.
    write_chromium_cookies(
        &chrome.join("Default/Cookies"),
        &[("example.com", "a", "b", Vec::new())],
    );
    write_chromium_cookies(
        &chrome.join("Profile 1/Cookies"),
        &[(
            ".github.com",
            "user_session",
            "",
            encrypted_cookie("pw", "sess"),
        )],
    );
    let keystore = StaticKeystore::new()
        .with_flavor(KeyFlavor::MacOs)
        .with_password("Chrome Safe Storage", "pw");
    let store = CredentialStore::new(SecretEnvironment::new(home.path()))
        .with_keystore(Arc::new(keystore))
        .with_browsers(vec![Browser::Chrome]);

    let jar = store.cookies().unwrap().unwrap();
    assert_eq!(jar.profile, "Chrome - Profile 1");
    assert_eq!(jar.get("user_session"), Some("sess"));

    let statuses = statuses(&store, SecretKind::BrowserCookies);
    assert!(matches!(statuses[0], LocationStatus::Corrupt(_)));
    assert_eq!(statuses[1], LocationStatus::Active);
}

#[test]
fn test_signed_out_profile_does_not_shadow_signed_in_one() {
    let home = TempDir::new().unwrap();
    let chrome = home.path().join("Library/Application Support/Google/Chrome");
    write_chromium_cookies(
        &chrome.join("Default/Cookies"),
        &[
            (".github.com", "logged_in", "no", Vec::new()),
            (".github.com", "_octo", "GH1.1.42", Vec::new()),
        ],
    );
    write_chromium_cookies(
        &chrome.join("Profile 1/Cookies"),
        &[
            (".github.com", "logged_in", "yes", Vec::new()),
            (".github.com", "user_session", "sess", Vec::new()),
        ],
    );
    let store = CredentialStore::new(SecretEnvironment::new(home.path()))
        .with_keystore(Arc::new(StaticKeystore::new().with_flavor(KeyFlavor::MacOs)))
        .with_browsers(vec![Browser::Chrome]);

    let jar = store.cookies().unwrap().unwrap();
    assert_eq!(jar.profile, "Chrome - Profile 1");
    assert_eq!(jar.get("user_session"), Some("sess"));

    let statuses = statuses(&store, SecretKind::BrowserCookies);
    assert_eq!(
        statuses[0],
        LocationStatus::Corrupt("Chrome - Default is not signed in".into())
    );
    assert_eq!(statuses[1], LocationStatus::Active);
}

#[test]
fn test_only_signed_out_profiles_report_not_signed_in() {
    let home = TempDir::new().unwrap();
    write_chromium_cookies(
        &home.path().join("Library/Application Support/Google/Chrome/Default/Cookies"),
        &[(".github.com", "logged_in", "no", Vec::new())],
    );
    let store = CredentialStore::new(SecretEnvironment::new(home.path()))
        .with_keystore(Arc::new(StaticKeystore::new().with_flavor(KeyFlavor::MacOs)))
        .with_browsers(vec![Browser::Chrome]);

    assert!(matches!(
        store.cookies(),
        Err(CredentialError::Corrupt {
            source: DecodeError::NotSignedIn { .. },
            ..
        })
    ));
}

#[test]
fn test_no_browsers_means_no_cookies() {
    let home = TempDir::new().unwrap();
    let store = CredentialStore::new(SecretEnvironment::new(home.path())).with_browsers(vec![]);
    assert_eq!(store.cookies(), Ok(None));
    assert!(store.diagnostics(SecretKind::BrowserCookies).is_empty());
}

#[test]
fn test_status_display() {
    assert_eq!(LocationStatus::NotFound.to_string(), "NOT FOUND");
    assert_eq!(
        LocationStatus::Corrupt("bad".into()).to_string(),
        "CORRUPT (bad)"
    );
}
