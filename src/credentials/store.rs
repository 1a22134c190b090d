//! Credential discovery across candidate locations.
//!
//! [`CredentialStore::resolve`] walks a secret's candidates in priority
//! order. Each candidate is first checked for existence, then for
//! readability, then decoded. The first candidate that decodes becomes
//! ACTIVE and every later one is SHADOWED without being touched. A
//! candidate that fails to decode is CORRUPT and the walk continues, so a
//! broken override never hides a good fallback.
//!
//! Resolved secrets are cached for a short TTL. A credential installed by
//! [`CredentialStore::replace_credential`] (after an OAuth refresh) stays
//! pinned until it expires.

use super::cookies::{self, Browser, CookieProfile, GITHUB_HOST};
use super::decode;
use super::error::{CredentialError, DecodeError};
use super::keystore::{Keystore, SystemKeystore};
use super::locations::{resolve_locations, LocationSpec, SecretEnvironment, SecretLocation};
use super::snapshot::{is_sqlite, DatabaseSnapshot};
use super::types::{CookieJar, Credential, ResolvedSecret, SecretKind, VaultAccount};
use super::vault;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Key of the session record inside the IDE's `ItemTable`.
pub const LOCAL_SESSION_ITEM: &str = "antigravityUnifiedStateSync.oauthToken";

/// What happened to one candidate during the most recent resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationStatus {
    Active,
    Shadowed,
    NotFound,
    Unreadable(String),
    Corrupt(String),
}

impl Display for LocationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Shadowed => f.write_str("SHADOWED"),
            Self::NotFound => f.write_str("NOT FOUND"),
            Self::Unreadable(reason) => write!(f, "UNREADABLE ({})", reason),
            Self::Corrupt(reason) => write!(f, "CORRUPT ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationReport {
    pub location: SecretLocation,
    pub status: LocationStatus,
}

/// How a candidate's contents are turned into a secret.
enum Source {
    Json(fn(&[u8]) -> Result<ResolvedSecret, DecodeError>),
    Vault,
    LocalSession,
    Cookies(CookieProfile),
}

struct Candidate {
    location: SecretLocation,
    source: Source,
}

enum Probe {
    Missing,
    Unreadable(String),
    /// Readable; file contents when the source is a single file.
    Readable(Option<Vec<u8>>),
}

struct CachedSecret {
    secret: ResolvedSecret,
    stored_at: Instant,
    /// Epoch ms until which a refreshed credential outlives the TTL.
    pinned_until: Option<i64>,
}

/// Resolves, decodes and caches credentials. Create once and share.
pub struct CredentialStore {
    env: SecretEnvironment,
    keystore: Arc<dyn Keystore>,
    browsers: Vec<Browser>,
    ttl: Duration,
    cache: Mutex<HashMap<SecretKind, CachedSecret>>,
    reports: Mutex<HashMap<SecretKind, Vec<LocationReport>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CredentialStore {
    pub fn new(env: SecretEnvironment) -> Self {
        Self {
            env,
            keystore: Arc::new(SystemKeystore),
            browsers: Browser::ALL.to_vec(),
            ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
            reports: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_keystore(mut self, keystore: Arc<dyn Keystore>) -> Self {
        self.keystore = keystore;
        self
    }

    /// Browsers scanned for cookies, in priority order.
    pub fn with_browsers(mut self, browsers: Vec<Browser>) -> Self {
        self.browsers = browsers;
        self
    }

    pub fn environment(&self) -> &SecretEnvironment {
        &self.env
    }

    /// Resolves a secret, consulting the cache before the filesystem.
    pub fn resolve(&self, kind: SecretKind) -> Result<ResolvedSecret, CredentialError> {
        if let Some(secret) = self.cached(kind) {
            debug!("Using cached {} credentials", kind);
            return Ok(secret);
        }

        let secret = self.resolve_uncached(kind)?;
        lock(&self.cache).insert(
            kind,
            CachedSecret {
                secret: secret.clone(),
                stored_at: Instant::now(),
                pinned_until: None,
            },
        );
        Ok(secret)
    }

    fn cached(&self, kind: SecretKind) -> Option<ResolvedSecret> {
        let cache = lock(&self.cache);
        let entry = cache.get(&kind)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let fresh = match entry.pinned_until {
            Some(until) => now_ms < until,
            None => entry.stored_at.elapsed() < self.ttl,
        };
        fresh.then(|| entry.secret.clone())
    }

    /// Drops a cached secret so the next resolution reads from disk.
    pub fn invalidate(&self, kind: SecretKind) {
        lock(&self.cache).remove(&kind);
    }

    /// Installs a refreshed credential in memory. Files are not rewritten.
    ///
    /// The credential is served until its own expiry (or the TTL when it
    /// has none).
    pub fn replace_credential(&self, kind: SecretKind, credential: Credential) {
        let pinned_until = credential.as_oauth().and_then(|c| c.expires_at);
        lock(&self.cache).insert(
            kind,
            CachedSecret {
                secret: ResolvedSecret::Credential(credential),
                stored_at: Instant::now(),
                pinned_until,
            },
        );
    }

    /// Per-location outcome of the most recent filesystem resolution.
    pub fn diagnostics(&self, kind: SecretKind) -> Vec<LocationReport> {
        lock(&self.reports).get(&kind).cloned().unwrap_or_default()
    }

    /// Single credential for `kind`; `None` when nothing exists.
    pub fn credential(&self, kind: SecretKind) -> Result<Option<Credential>, CredentialError> {
        match absent_as_none(self.resolve(kind))? {
            Some(ResolvedSecret::Credential(credential)) => Ok(Some(credential)),
            _ => Ok(None),
        }
    }

    /// Per-provider entries of the shared auth document.
    pub fn entries(&self) -> Result<BTreeMap<String, Credential>, CredentialError> {
        match absent_as_none(self.resolve(SecretKind::AuthDocument))? {
            Some(ResolvedSecret::Entries(entries)) => Ok(entries),
            _ => Ok(BTreeMap::new()),
        }
    }

    /// Decrypted accounts of the account vault.
    pub fn accounts(&self) -> Result<Vec<VaultAccount>, CredentialError> {
        match absent_as_none(self.resolve(SecretKind::AccountVault))? {
            Some(ResolvedSecret::Accounts(accounts)) => Ok(accounts),
            _ => Ok(Vec::new()),
        }
    }

    /// github.com cookies from the first browser profile that has them.
    pub fn cookies(&self) -> Result<Option<CookieJar>, CredentialError> {
        match absent_as_none(self.resolve(SecretKind::BrowserCookies))? {
            Some(ResolvedSecret::Cookies(jar)) => Ok(Some(jar)),
            _ => Ok(None),
        }
    }

    fn candidates(&self, kind: SecretKind) -> Vec<Candidate> {
        if kind == SecretKind::BrowserCookies {
            let profiles = cookies::discover_profiles(&self.browsers, &self.env);
            return cookies::profile_locations(&profiles)
                .into_iter()
                .zip(profiles)
                .map(|(location, profile)| Candidate {
                    location,
                    source: Source::Cookies(profile),
                })
                .collect();
        }

        let source = || match kind {
            SecretKind::ClaudeOAuth => {
                Source::Json(|b| decode::claude_oauth(b).map(ResolvedSecret::Credential))
            }
            SecretKind::CodexAuth => {
                Source::Json(|b| decode::codex_auth(b).map(ResolvedSecret::Credential))
            }
            SecretKind::GeminiOAuth => {
                Source::Json(|b| decode::gemini_oauth(b).map(ResolvedSecret::Credential))
            }
            SecretKind::AuthDocument => {
                Source::Json(|b| decode::auth_document(b).map(ResolvedSecret::Entries))
            }
            SecretKind::AccountVault => Source::Vault,
            SecretKind::LocalSession | SecretKind::BrowserCookies => Source::LocalSession,
        };
        resolve_locations(&LocationSpec::for_kind(kind), &self.env)
            .into_iter()
            .map(|location| Candidate {
                location,
                source: source(),
            })
            .collect()
    }

    fn resolve_uncached(&self, kind: SecretKind) -> Result<ResolvedSecret, CredentialError> {
        let mut reports = Vec::new();
        let mut resolved = None;
        let mut first_unreadable: Option<CredentialError> = None;
        let mut first_corrupt: Option<CredentialError> = None;

        for candidate in self.candidates(kind) {
            let path = candidate.location.path.clone();
            if resolved.is_some() {
                reports.push(LocationReport {
                    location: candidate.location,
                    status: LocationStatus::Shadowed,
                });
                continue;
            }

            let status = match probe(&candidate) {
                Probe::Missing => {
                    debug!("{} not found at {}", kind, path.display());
                    LocationStatus::NotFound
                }
                Probe::Unreadable(reason) => {
                    warn!("Cannot read {} at {}: {}", kind, path.display(), reason);
                    first_unreadable.get_or_insert(CredentialError::Unreadable {
                        path: path.clone(),
                        reason: reason.clone(),
                    });
                    LocationStatus::Unreadable(reason)
                }
                Probe::Readable(contents) => match self.decode(&candidate, contents) {
                    Ok(secret) => {
                        debug!("Resolved {} from {}", kind, path.display());
                        resolved = Some(secret);
                        LocationStatus::Active
                    }
                    Err(e) => {
                        warn!("Ignoring {} at {}: {}", kind, path.display(), e);
                        let reason = e.to_string();
                        first_corrupt.get_or_insert(CredentialError::Corrupt {
                            path: path.clone(),
                            source: e,
                        });
                        LocationStatus::Corrupt(reason)
                    }
                },
            };
            reports.push(LocationReport {
                location: candidate.location,
                status,
            });
        }

        lock(&self.reports).insert(kind, reports);

        match resolved {
            Some(secret) => Ok(secret),
            None => Err(first_corrupt
                .or(first_unreadable)
                .unwrap_or(CredentialError::NotFound { kind })),
        }
    }

    fn decode(
        &self,
        candidate: &Candidate,
        contents: Option<Vec<u8>>,
    ) -> Result<ResolvedSecret, DecodeError> {
        let path = &candidate.location.path;
        match &candidate.source {
            Source::Json(decode) => decode(&contents.unwrap_or_default()),
            Source::LocalSession => read_local_session(path, &contents.unwrap_or_default())
                .map(ResolvedSecret::Credential),
            Source::Vault => vault::read_vault(path).map(ResolvedSecret::Accounts),
            Source::Cookies(profile) => {
                cookies::read_cookies(profile, GITHUB_HOST, self.keystore.as_ref())
                    .and_then(cookies::require_signed_in)
                    .map(ResolvedSecret::Cookies)
            }
        }
    }
}

fn absent_as_none(
    result: Result<ResolvedSecret, CredentialError>,
) -> Result<Option<ResolvedSecret>, CredentialError> {
    match result {
        Ok(secret) => Ok(Some(secret)),
        Err(CredentialError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn probe(candidate: &Candidate) -> Probe {
    let path = &candidate.location.path;
    match &candidate.source {
        Source::Json(_) | Source::LocalSession => probe_file(path, true),
        Source::Cookies(_) => probe_file(path, false),
        Source::Vault => {
            let (db, key) = vault::vault_files(path);
            match probe_file(&db, false) {
                Probe::Readable(_) => match probe_file(&key, false) {
                    Probe::Unreadable(reason) => Probe::Unreadable(reason),
                    // A missing key file surfaces as a decode failure.
                    _ => Probe::Readable(None),
                },
                other => other,
            }
        }
    }
}

/// Existence first, then readability; optionally keeps the bytes.
fn probe_file(path: &Path, keep_contents: bool) -> Probe {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Probe::Missing,
        Err(e) => return Probe::Unreadable(e.to_string()),
        Ok(meta) if meta.is_dir() => return Probe::Unreadable("is a directory".to_string()),
        Ok(_) => {}
    }

    if keep_contents {
        match std::fs::read(path) {
            Ok(bytes) => Probe::Readable(Some(bytes)),
            Err(e) => Probe::Unreadable(e.to_string()),
        }
    } else {
        match std::fs::File::open(path) {
            Ok(_) => Probe::Readable(None),
            Err(e) => Probe::Unreadable(e.to_string()),
        }
    }
}

/// The session blob lives either in a plain file or in the IDE's state database.
fn read_local_session(path: &Path, contents: &[u8]) -> Result<Credential, DecodeError> {
    if !is_sqlite(contents) {
        let text = std::str::from_utf8(contents)
            .map_err(|_| DecodeError::Malformed("session file is not text".to_string()))?;
        return decode::local_session(text);
    }

    let snapshot = DatabaseSnapshot::open(path)?;
    let value: Option<String> = snapshot
        .connection()
        .query_row(
            "SELECT value FROM ItemTable WHERE key = ?1",
            [LOCAL_SESSION_ITEM],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    let value = value.ok_or(DecodeError::MissingField(LOCAL_SESSION_ITEM))?;
    decode::local_session(&value)
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
