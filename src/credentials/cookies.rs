//! Browser profile discovery and cookie extraction.
//!
//! Each Chromium-family profile (and each Firefox profile) with a cookie
//! database is one candidate location. Chromium values may be encrypted
//! with a key derived from the browser's keystore passphrase; Firefox
//! stores them in plain text.

use super::error::DecodeError;
use super::keystore::Keystore;
use super::locations::{SecretEnvironment, SecretLocation};
use super::snapshot::DatabaseSnapshot;
use super::types::CookieJar;
use crate::crypto::chromium::{self, CookieKey, CookieVersion};
use crate::crypto::DecryptError;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const GITHUB_HOST: &str = "github.com";
/// Present only while the profile holds a GitHub login.
pub const SESSION_COOKIE: &str = "user_session";
/// `yes` while signed in; GitHub flips it to `no` on sign-out.
pub const LOGGED_IN_COOKIE: &str = "logged_in";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Browser {
    Chrome,
    Brave,
    Arc,
    Edge,
    Vivaldi,
    Opera,
    Chromium,
    Firefox,
}

impl Browser {
    pub const ALL: [Browser; 8] = [
        Browser::Chrome,
        Browser::Brave,
        Browser::Arc,
        Browser::Edge,
        Browser::Vivaldi,
        Browser::Opera,
        Browser::Chromium,
        Browser::Firefox,
    ];

    /// Name used in configuration files.
    pub fn key(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Brave => "brave",
            Browser::Arc => "arc",
            Browser::Edge => "edge",
            Browser::Vivaldi => "vivaldi",
            Browser::Opera => "opera",
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
        }
    }

    pub fn from_key(key: &str) -> Option<Browser> {
        let key = key.trim().to_lowercase();
        Browser::ALL.into_iter().find(|b| b.key() == key)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Browser::Chrome => "Chrome",
            Browser::Brave => "Brave",
            Browser::Arc => "Arc",
            Browser::Edge => "Edge",
            Browser::Vivaldi => "Vivaldi",
            Browser::Opera => "Opera",
            Browser::Chromium => "Chromium",
            Browser::Firefox => "Firefox",
        }
    }

    pub fn is_chromium(&self) -> bool {
        !matches!(self, Browser::Firefox)
    }

    /// Keystore `(service, account)` holding the cookie passphrase.
    pub fn keystore_entry(&self) -> (&'static str, &'static str) {
        match self {
            Browser::Chrome => ("Chrome Safe Storage", "Chrome"),
            Browser::Brave => ("Brave Safe Storage", "Brave"),
            Browser::Arc => ("Arc Safe Storage", "Arc"),
            Browser::Edge => ("Microsoft Edge Safe Storage", "Microsoft Edge"),
            Browser::Vivaldi => ("Vivaldi Safe Storage", "Vivaldi"),
            Browser::Opera => ("Opera Safe Storage", "Opera"),
            Browser::Chromium | Browser::Firefox => ("Chromium Safe Storage", "Chromium"),
        }
    }

    /// Directories holding this browser's profiles, macOS first.
    fn roots(&self) -> &'static [&'static str] {
        match self {
            Browser::Chrome => &["$APP_SUPPORT/Google/Chrome", "$XDG_CONFIG_HOME/google-chrome"],
            Browser::Brave => &[
                "$APP_SUPPORT/BraveSoftware/Brave-Browser",
                "$XDG_CONFIG_HOME/BraveSoftware/Brave-Browser",
            ],
            Browser::Arc => &["$APP_SUPPORT/Arc/User Data"],
            Browser::Edge => &["$APP_SUPPORT/Microsoft Edge", "$XDG_CONFIG_HOME/microsoft-edge"],
            Browser::Vivaldi => &["$APP_SUPPORT/Vivaldi", "$XDG_CONFIG_HOME/vivaldi"],
            Browser::Opera => &["$APP_SUPPORT/com.operasoftware.Opera", "$XDG_CONFIG_HOME/opera"],
            Browser::Chromium => &["$APP_SUPPORT/Chromium", "$XDG_CONFIG_HOME/chromium"],
            Browser::Firefox => &["$APP_SUPPORT/Firefox/Profiles", "~/.mozilla/firefox"],
        }
    }
}

impl Display for Browser {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One browser profile's cookie database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieProfile {
    pub browser: Browser,
    pub cookie_db: PathBuf,
    pub name: String,
}

impl CookieProfile {
    pub fn label(&self) -> String {
        format!("{} - {}", self.browser, self.name)
    }
}

/// Finds cookie databases for `browsers`, in the given browser order.
pub fn discover_profiles(browsers: &[Browser], env: &SecretEnvironment) -> Vec<CookieProfile> {
    let mut profiles = Vec::new();
    for browser in browsers {
        for root in browser.roots().iter().filter_map(|r| env.expand(r)) {
            let found = if browser.is_chromium() {
                chromium_profiles(*browser, &root)
            } else {
                firefox_profiles(&root)
            };
            profiles.extend(found);
        }
    }
    profiles
}

/// Profiles as ranked candidate locations.
pub fn profile_locations(profiles: &[CookieProfile]) -> Vec<SecretLocation> {
    profiles
        .iter()
        .enumerate()
        .map(|(rank, p)| SecretLocation::new(&p.cookie_db, rank).with_label(p.label()))
        .collect()
}

fn sorted_subdirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn chromium_profiles(browser: Browser, root: &Path) -> Vec<CookieProfile> {
    sorted_subdirs(root)
        .into_iter()
        .filter(|dir| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n == "Default" || n.starts_with("Profile "))
        })
        .filter_map(|dir| {
            // Newer Chromium keeps the database under Network/.
            let cookie_db = [dir.join("Network").join("Cookies"), dir.join("Cookies")]
                .into_iter()
                .find(|p| p.exists())?;
            Some(CookieProfile {
                browser,
                name: chromium_profile_name(&dir),
                cookie_db,
            })
        })
        .collect()
}

/// Display name from the profile's `Preferences`, else the directory name.
fn chromium_profile_name(dir: &Path) -> String {
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    std::fs::read(dir.join("Preferences"))
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
        .and_then(|prefs| prefs["profile"]["name"].as_str().map(String::from))
        .filter(|name| !name.is_empty())
        .unwrap_or(dir_name)
}

fn firefox_profiles(root: &Path) -> Vec<CookieProfile> {
    sorted_subdirs(root)
        .into_iter()
        .filter_map(|dir| {
            let cookie_db = dir.join("cookies.sqlite");
            if !cookie_db.exists() {
                return None;
            }
            // Profile directories are named "<random>.<name>".
            let dir_name = dir.file_name()?.to_string_lossy().into_owned();
            let name = dir_name
                .split_once('.')
                .map(|(_, name)| name.to_string())
                .unwrap_or(dir_name);
            Some(CookieProfile {
                browser: Browser::Firefox,
                cookie_db,
                name,
            })
        })
        .collect()
}

/// Reads the cookies for `host` (and its subdomains) from one profile.
///
/// Cookies that fail to decrypt are skipped; a profile where nothing
/// usable remains is rejected.
pub fn read_cookies(
    profile: &CookieProfile,
    host: &str,
    keystore: &dyn Keystore,
) -> Result<CookieJar, DecodeError> {
    let snapshot = DatabaseSnapshot::open(&profile.cookie_db)?;
    let pattern = format!("%{}", host);

    let (cookies, dropped) = if profile.browser.is_chromium() {
        read_chromium(&snapshot, &pattern, profile.browser, keystore)?
    } else {
        (read_firefox(&snapshot, &pattern)?, 0)
    };

    if cookies.is_empty() {
        return Err(DecodeError::NoUsableEntries { dropped });
    }
    debug!(
        "Read {} {} cookies from {} ({} dropped)",
        cookies.len(),
        host,
        profile.label(),
        dropped
    );
    Ok(CookieJar {
        profile: profile.label(),
        cookies,
    })
}

/// Rejects a GitHub jar that has no live session.
///
/// Signed-out profiles keep tracking cookies, so a non-empty jar is not
/// enough to make the profile usable.
pub fn require_signed_in(jar: CookieJar) -> Result<CookieJar, DecodeError> {
    let signed_in = match jar.get(LOGGED_IN_COOKIE) {
        Some(flag) => flag == "yes",
        None => jar.get(SESSION_COOKIE).is_some(),
    };
    if signed_in {
        Ok(jar)
    } else {
        Err(DecodeError::NotSignedIn {
            profile: jar.profile,
        })
    }
}

fn read_firefox(
    snapshot: &DatabaseSnapshot,
    pattern: &str,
) -> Result<BTreeMap<String, String>, DecodeError> {
    let mut stmt = snapshot
        .connection()
        .prepare("SELECT name, value FROM moz_cookies WHERE host LIKE ?1")?;
    let rows = stmt
        .query_map([pattern], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

fn read_chromium(
    snapshot: &DatabaseSnapshot,
    pattern: &str,
    browser: Browser,
    keystore: &dyn Keystore,
) -> Result<(BTreeMap<String, String>, usize), DecodeError> {
    let mut stmt = snapshot.connection().prepare(
        "SELECT name, value, encrypted_value FROM cookies WHERE host_key LIKE ?1",
    )?;
    let rows = stmt
        .query_map([pattern], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Derived once per version on first use; keystore lookups can prompt the user.
    let mut keys: HashMap<CookieVersion, Result<CookieKey, DecryptError>> = HashMap::new();
    let mut cookies = BTreeMap::new();
    let mut dropped = 0;

    for (name, plain, encrypted) in rows {
        if let Some(value) = plain.filter(|v| !v.is_empty()) {
            cookies.insert(name, value);
            continue;
        }
        let Some(blob) = encrypted.filter(|b| !b.is_empty()) else {
            continue;
        };

        let cookie_key = if let Some(version) = chromium::cookie_version(&blob) {
            let (service, account) = browser.keystore_entry();
            match keys
                .entry(version)
                .or_insert_with(|| keystore.cookie_key(service, account, version))
                .as_ref()
            {
                Ok(k) => Some(k),
                Err(e) => {
                    warn!("No cookie key for {}: {}", browser, e);
                    dropped += 1;
                    continue;
                }
            }
        } else {
            None
        };

        match chromium::decrypt_cookie(cookie_key, &blob) {
            Ok(value) if !value.is_empty() => {
                cookies.insert(name, value);
            }
            Ok(_) => dropped += 1,
            Err(e) => {
                warn!("Dropping {} cookie '{}': {}", browser, name, e);
                dropped += 1;
            }
        }
    }

    Ok((cookies, dropped))
}

#[cfg(test)]
#[path = "tests/cookies_tests.rs"]
mod tests;
