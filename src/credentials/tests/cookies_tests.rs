use super::*;
use crate::credentials::keystore::{KeyFlavor, StaticKeystore, LINUX_FALLBACK_PASSWORD};
use crate::credentials::test_support::{
    encrypted_cookie, linux_cookie, write_chromium_cookies, write_firefox_cookies,
};
use tempfile::TempDir;

fn chrome_keystore() -> StaticKeystore {
    StaticKeystore::new()
        .with_flavor(KeyFlavor::MacOs)
        .with_password("Chrome Safe Storage", "chrome-secret")
}

#[test]
fn test_discovers_chromium_and_firefox_profiles() {
    let home = TempDir::new().unwrap();
    let chrome = home.path().join("Library/Application Support/Google/Chrome");
    write_chromium_cookies(&chrome.join("Default/Cookies"), &[]);
    write_chromium_cookies(&chrome.join("Profile 2/Network/Cookies"), &[]);
    std::fs::write(
        chrome.join("Profile 2/Preferences"),
        r#"{"profile":{"name":"Work"}}"#,
    )
    .unwrap();
    std::fs::create_dir_all(chrome.join("System Profile")).unwrap();
    write_firefox_cookies(
        &home.path().join(".mozilla/firefox/ab12cd.default-release/cookies.sqlite"),
        &[],
    );

    let env = SecretEnvironment::new(home.path());
    let profiles = discover_profiles(&[Browser::Chrome, Browser::Firefox], &env);
    let labels: Vec<String> = profiles.iter().map(CookieProfile::label).collect();
    assert_eq!(
        labels,
        vec!["Chrome - Default", "Chrome - Work", "Firefox - default-release"]
    );
    assert!(profiles[1].cookie_db.ends_with("Network/Cookies"));

    let locations = profile_locations(&profiles);
    assert_eq!(locations[2].rank, 2);
    assert_eq!(locations[2].label.as_deref(), Some("Firefox - default-release"));
}

#[test]
fn test_browser_order_follows_request() {
    let home = TempDir::new().unwrap();
    write_chromium_cookies(
        &home
            .path()
            .join("Library/Application Support/BraveSoftware/Brave-Browser/Default/Cookies"),
        &[],
    );
    write_chromium_cookies(
        &home
            .path()
            .join("Library/Application Support/Google/Chrome/Default/Cookies"),
        &[],
    );
    let env = SecretEnvironment::new(home.path());
    let profiles = discover_profiles(&[Browser::Brave, Browser::Chrome], &env);
    let browsers: Vec<Browser> = profiles.iter().map(|p| p.browser).collect();
    assert_eq!(browsers, vec![Browser::Brave, Browser::Chrome]);
}

#[test]
fn test_reads_plain_and_encrypted_github_cookies() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("Default/Cookies");
    write_chromium_cookies(
        &db,
        &[
            (".github.com", "logged_in", "yes", Vec::new()),
            (
                "github.com",
                "user_session",
                "",
                encrypted_cookie("chrome-secret", "session-abc"),
            ),
            (".example.com", "other", "nope", Vec::new()),
        ],
    );
    let profile = CookieProfile {
        browser: Browser::Chrome,
        cookie_db: db,
        name: "Default".into(),
    };

    let jar = read_cookies(&profile, GITHUB_HOST, &chrome_keystore()).unwrap();
    assert_eq!(jar.profile, "Chrome - Default");
    assert_eq!(jar.get("logged_in"), Some("yes"));
    assert_eq!(jar.get("user_session"), Some("session-abc"));
    assert_eq!(jar.get("other"), None);
    assert_eq!(jar.header(), "logged_in=yes; user_session=session-abc");
}

#[test]
fn test_undecryptable_cookie_dropped_alone() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("Cookies");
    let mut truncated = encrypted_cookie("chrome-secret", "value");
    truncated.pop();
    write_chromium_cookies(
        &db,
        &[
            ("github.com", "broken", "", truncated),
            ("github.com", "dotcom_user", "octocat", Vec::new()),
        ],
    );
    let profile = CookieProfile {
        browser: Browser::Chrome,
        cookie_db: db,
        name: "Default".into(),
    };

    let jar = read_cookies(&profile, GITHUB_HOST, &chrome_keystore()).unwrap();
    assert_eq!(jar.cookies.len(), 1);
    assert_eq!(jar.get("dotcom_user"), Some("octocat"));
}

#[test]
fn test_profile_without_usable_cookies_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("Cookies");
    write_chromium_cookies(
        &db,
        &[(
            "github.com",
            "user_session",
            "",
            encrypted_cookie("chrome-secret", "value"),
        )],
    );
    let profile = CookieProfile {
        browser: Browser::Chrome,
        cookie_db: db,
        name: "Default".into(),
    };
    // No password in the keystore: the macOS key cannot be derived.
    let keystore = StaticKeystore::new().with_flavor(KeyFlavor::MacOs);
    assert_eq!(
        read_cookies(&profile, GITHUB_HOST, &keystore),
        Err(DecodeError::NoUsableEntries { dropped: 1 })
    );
}

#[test]
fn test_firefox_cookies_are_plaintext() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cookies.sqlite");
    write_firefox_cookies(
        &db,
        &[
            (".github.com", "user_session", "ff-session"),
            ("gist.github.com", "gist", "g"),
            ("example.org", "x", "y"),
        ],
    );
    let profile = CookieProfile {
        browser: Browser::Firefox,
        cookie_db: db,
        name: "default".into(),
    };
    let jar = read_cookies(&profile, GITHUB_HOST, &StaticKeystore::new()).unwrap();
    assert_eq!(jar.cookies.len(), 2);
    assert_eq!(jar.get("user_session"), Some("ff-session"));
}

fn chrome_profile(cookie_db: PathBuf) -> CookieProfile {
    CookieProfile {
        browser: Browser::Chrome,
        cookie_db,
        name: "Default".into(),
    }
}

#[test]
fn test_linux_v10_uses_fixed_key_even_with_keyring_entry() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("Cookies");
    write_chromium_cookies(
        &db,
        &[
            (
                ".github.com",
                "user_session",
                "",
                linux_cookie(CookieVersion::V10, LINUX_FALLBACK_PASSWORD, "old-session"),
            ),
            (
                ".github.com",
                "dotcom_user",
                "",
                linux_cookie(CookieVersion::V11, "keyring-secret", "octocat"),
            ),
        ],
    );
    let keystore = StaticKeystore::new()
        .with_flavor(KeyFlavor::Linux)
        .with_password("Chrome Safe Storage", "keyring-secret");

    let jar = read_cookies(&chrome_profile(db), GITHUB_HOST, &keystore).unwrap();
    assert_eq!(jar.get("user_session"), Some("old-session"));
    assert_eq!(jar.get("dotcom_user"), Some("octocat"));
}

#[test]
fn test_linux_v11_without_keyring_entry_is_dropped() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("Cookies");
    write_chromium_cookies(
        &db,
        &[
            (
                ".github.com",
                "user_session",
                "",
                linux_cookie(CookieVersion::V10, LINUX_FALLBACK_PASSWORD, "sess"),
            ),
            (
                ".github.com",
                "dotcom_user",
                "",
                linux_cookie(CookieVersion::V11, "keyring-secret", "octocat"),
            ),
        ],
    );
    let keystore = StaticKeystore::new().with_flavor(KeyFlavor::Linux);

    let jar = read_cookies(&chrome_profile(db), GITHUB_HOST, &keystore).unwrap();
    assert_eq!(jar.get("user_session"), Some("sess"));
    assert_eq!(jar.get("dotcom_user"), None);
}

fn jar(pairs: &[(&str, &str)]) -> CookieJar {
    CookieJar {
        profile: "Chrome - Default".into(),
        cookies: pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    }
}

#[test]
fn test_signed_in_requires_logged_in_flag_or_session() {
    assert!(require_signed_in(jar(&[("logged_in", "yes"), ("user_session", "s")])).is_ok());
    assert!(require_signed_in(jar(&[("user_session", "s")])).is_ok());
    assert_eq!(
        require_signed_in(jar(&[("logged_in", "no"), ("user_session", "stale")])),
        Err(DecodeError::NotSignedIn {
            profile: "Chrome - Default".into()
        })
    );
    assert!(require_signed_in(jar(&[("_octo", "GH1.1.1"), ("dotcom_user", "octocat")])).is_err());
}

#[test]
fn test_browser_keys_round_trip() {
    for browser in Browser::ALL {
        assert_eq!(Browser::from_key(browser.key()), Some(browser));
    }
    assert_eq!(Browser::from_key(" Chrome "), Some(Browser::Chrome));
    assert_eq!(Browser::from_key("safari"), None);
}
