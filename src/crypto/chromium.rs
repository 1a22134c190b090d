//! Chromium cookie value decryption (`os_crypt` v10/v11 format).
//!
//! The AES key is derived from the browser's keystore passphrase with
//! PBKDF2-HMAC-SHA1 over the fixed salt `saltysalt`. Values are AES-128-CBC
//! with an IV of sixteen spaces; the IV is never stored in the blob.

use super::DecryptError;
use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use sha1::Sha1;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const SALT: &[u8] = b"saltysalt";
/// PBKDF2 rounds used by Chromium on macOS.
pub const MACOS_ITERATIONS: u32 = 1003;
/// PBKDF2 rounds used by Chromium on Linux.
pub const LINUX_ITERATIONS: u32 = 1;

const IV: [u8; 16] = [b' '; 16];
/// Non-text filler that macOS builds place in front of the plaintext.
const MACOS_FILLER_LEN: usize = 32;

/// Encryption scheme named by a blob's three-byte prefix.
///
/// On Linux the two use different passphrases: `v10` the fixed fallback,
/// `v11` the keyring secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieVersion {
    V10,
    V11,
}

impl CookieVersion {
    pub fn prefix(self) -> &'static [u8; 3] {
        match self {
            CookieVersion::V10 => b"v10",
            CookieVersion::V11 => b"v11",
        }
    }
}

/// AES-128 key for cookie values, tied to the layout it decrypts.
#[derive(Clone)]
pub struct CookieKey {
    key: [u8; 16],
    strip_filler: bool,
}

impl std::fmt::Debug for CookieKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieKey")
            .field("strip_filler", &self.strip_filler)
            .finish_non_exhaustive()
    }
}

impl CookieKey {
    /// Derives the macOS key: 1003 rounds, plaintext carries 32 filler bytes.
    pub fn derive(password: &str) -> Result<Self, DecryptError> {
        Ok(Self {
            key: derive_key_bytes(password, MACOS_ITERATIONS)?,
            strip_filler: true,
        })
    }

    /// Derives the Linux key: a single round, no filler.
    pub fn derive_linux(password: &str) -> Result<Self, DecryptError> {
        Ok(Self {
            key: derive_key_bytes(password, LINUX_ITERATIONS)?,
            strip_filler: false,
        })
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.key
    }
}

/// Raw PBKDF2-HMAC-SHA1 derivation with the Chromium salt.
pub fn derive_key_bytes(password: &str, iterations: u32) -> Result<[u8; 16], DecryptError> {
    if password.is_empty() {
        return Err(DecryptError::KeyDerivationFailed {
            message: "empty keystore passphrase".to_string(),
        });
    }
    if iterations == 0 {
        return Err(DecryptError::KeyDerivationFailed {
            message: "iteration count must be positive".to_string(),
        });
    }
    let mut key = [0u8; 16];
    pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), SALT, iterations, &mut key);
    Ok(key)
}

/// Version named by the blob's prefix, `None` for legacy plaintext.
pub fn cookie_version(blob: &[u8]) -> Option<CookieVersion> {
    [CookieVersion::V10, CookieVersion::V11]
        .into_iter()
        .find(|v| blob.starts_with(v.prefix()))
}

/// True when the blob carries a `v10`/`v11` encryption prefix.
pub fn is_encrypted(blob: &[u8]) -> bool {
    cookie_version(blob).is_some()
}

/// Decrypts one cookie value.
///
/// Blobs without a version prefix are legacy plaintext and are returned
/// as-is; those never need the key.
pub fn decrypt_cookie(key: Option<&CookieKey>, blob: &[u8]) -> Result<String, DecryptError> {
    if !is_encrypted(blob) {
        return std::str::from_utf8(blob)
            .map(str::to_string)
            .map_err(|_| DecryptError::InvalidFormat);
    }

    let key = key.ok_or_else(|| DecryptError::KeyDerivationFailed {
        message: "encrypted cookie but no keystore passphrase".to_string(),
    })?;
    let ciphertext = &blob[3..];
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(DecryptError::CryptoOperationFailed {
            message: format!("ciphertext length {} is not a block multiple", ciphertext.len()),
        });
    }

    let plaintext = Aes128CbcDec::new_from_slices(&key.key, &IV)
        .map_err(|e| DecryptError::CryptoOperationFailed {
            message: e.to_string(),
        })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecryptError::CryptoOperationFailed {
            message: "bad padding".to_string(),
        })?;

    if key.strip_filler {
        strip_filler(&plaintext)
    } else {
        String::from_utf8(plaintext).map_err(|_| DecryptError::InvalidFormat)
    }
}

/// Skips the macOS filler: exactly 32 bytes first, then 0..31 as a fallback.
fn strip_filler(plaintext: &[u8]) -> Result<String, DecryptError> {
    let offsets = std::iter::once(MACOS_FILLER_LEN).chain(0..MACOS_FILLER_LEN);
    for skip in offsets {
        let Some(rest) = plaintext.get(skip..) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        if let Ok(text) = std::str::from_utf8(rest) {
            return Ok(text.to_string());
        }
    }
    Err(DecryptError::InvalidFormat)
}

/// Builds `v10` blobs for fixtures.
#[cfg(test)]
pub(crate) fn seal(key: &CookieKey, plaintext: &[u8]) -> Vec<u8> {
    seal_as(CookieVersion::V10, key, plaintext)
}

#[cfg(test)]
pub(crate) fn seal_as(version: CookieVersion, key: &CookieKey, plaintext: &[u8]) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;
    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    let mut blob = version.prefix().to_vec();
    blob.extend(
        Aes128CbcEnc::new_from_slices(&key.key, &IV)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    );
    blob
}

#[cfg(test)]
#[path = "tests/chromium_tests.rs"]
mod tests;
