//! Browser "Safe Storage" passphrases from the OS keystore.

use crate::crypto::chromium::{CookieKey, CookieVersion};
use crate::crypto::DecryptError;
use std::collections::HashMap;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Chromium's hard-coded Linux passphrase when no keyring is available.
pub const LINUX_FALLBACK_PASSWORD: &str = "peanuts";

/// Longest one keystore lookup may take, unlock prompt included.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Which Chromium key derivation the cookies on this machine use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFlavor {
    /// 1003 PBKDF2 rounds, filler-prefixed plaintext.
    MacOs,
    /// One round; `v10` uses `peanuts`, `v11` the keyring secret.
    Linux,
}

impl KeyFlavor {
    pub fn native() -> Self {
        if cfg!(target_os = "macos") {
            KeyFlavor::MacOs
        } else {
            KeyFlavor::Linux
        }
    }
}

/// Source of browser cookie passphrases.
pub trait Keystore: Send + Sync {
    /// Passphrase stored under `service`/`account`, `None` when absent.
    fn password(&self, service: &str, account: &str) -> Option<String>;

    fn flavor(&self) -> KeyFlavor {
        KeyFlavor::native()
    }

    /// Cookie key for one blob version of a browser.
    ///
    /// Linux `v10` blobs never consult the keystore.
    fn cookie_key(
        &self,
        service: &str,
        account: &str,
        version: CookieVersion,
    ) -> Result<CookieKey, DecryptError> {
        match (self.flavor(), version) {
            (KeyFlavor::MacOs, _) => {
                CookieKey::derive(self.password(service, account).as_deref().unwrap_or_default())
            }
            (KeyFlavor::Linux, CookieVersion::V10) => {
                CookieKey::derive_linux(LINUX_FALLBACK_PASSWORD)
            }
            (KeyFlavor::Linux, CookieVersion::V11) => {
                let password = self.password(service, account).ok_or_else(|| {
                    DecryptError::KeyDerivationFailed {
                        message: format!("no keyring entry for '{}'", service),
                    }
                })?;
                CookieKey::derive_linux(&password)
            }
        }
    }
}

/// macOS Keychain via `security`, libsecret via `secret-tool` elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKeystore;

impl Keystore for SystemKeystore {
    fn password(&self, service: &str, account: &str) -> Option<String> {
        let mut command = if cfg!(target_os = "macos") {
            let mut command = Command::new(which::which("security").ok()?);
            command.args(["find-generic-password", "-w", "-s", service, "-a", account]);
            command
        } else {
            let mut command = Command::new(which::which("secret-tool").ok()?);
            command.args(["lookup", "application", &account.to_lowercase()]);
            command
        };

        match output_within(&mut command, LOOKUP_TIMEOUT) {
            Ok(Some(out)) if out.status.success() => {
                let password = String::from_utf8_lossy(&out.stdout).trim().to_string();
                (!password.is_empty()).then_some(password)
            }
            Ok(Some(out)) => {
                debug!(
                    "Keystore lookup for '{}' exited with {}",
                    service, out.status
                );
                None
            }
            Ok(None) => {
                warn!(
                    "Keystore lookup for '{}' gave no answer within {}s",
                    service,
                    LOOKUP_TIMEOUT.as_secs()
                );
                None
            }
            Err(e) => {
                debug!("Keystore lookup for '{}' failed: {}", service, e);
                None
            }
        }
    }
}

/// Runs `command` and collects its stdout, killing it once `deadline` passes.
///
/// `Ok(None)` means the process was killed.
pub fn output_within(
    command: &mut Command,
    deadline: Duration,
) -> std::io::Result<Option<Output>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let give_up = Instant::now() + deadline;
    loop {
        match child.try_wait()? {
            Some(_) => return child.wait_with_output().map(Some),
            None if Instant::now() >= give_up => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Fixed passphrases, keyed by service name.
#[derive(Debug, Clone)]
pub struct StaticKeystore {
    passwords: HashMap<String, String>,
    flavor: KeyFlavor,
}

impl Default for StaticKeystore {
    fn default() -> Self {
        Self {
            passwords: HashMap::new(),
            flavor: KeyFlavor::native(),
        }
    }
}

impl StaticKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flavor(mut self, flavor: KeyFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_password(mut self, service: &str, password: &str) -> Self {
        self.passwords
            .insert(service.to_string(), password.to_string());
        self
    }
}

impl Keystore for StaticKeystore {
    fn password(&self, service: &str, _account: &str) -> Option<String> {
        self.passwords.get(service).cloned()
    }

    fn flavor(&self) -> KeyFlavor {
        self.flavor
    }
}

#[cfg(test)]
#[path = "tests/keystore_tests.rs"]
mod tests;
