//! Fernet-style authenticated token decryption.
//!
//! Token layout: `0x80 || timestamp(8) || iv(16) || ciphertext || hmac(32)`.
//! The 32-byte key splits into a signing half and an encryption half.

use super::DecryptError;
use aes::Aes128;
use base64::Engine;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 0x80;
const TIMESTAMP_END: usize = 9;
const IV_END: usize = 25;
const SIGNATURE_LEN: usize = 32;

/// Shortest possible token: header, IV and signature with no ciphertext.
pub const MIN_TOKEN_LEN: usize = 57;

/// A 32-byte key split into its signing and encryption halves.
#[derive(Clone)]
pub struct FernetKey {
    signing: [u8; 16],
    encryption: [u8; 16],
}

impl std::fmt::Debug for FernetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FernetKey(..)")
    }
}

impl FernetKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptError> {
        if bytes.len() != 32 {
            return Err(DecryptError::InvalidKey {
                message: format!("expected 32 bytes, got {}", bytes.len()),
            });
        }
        let mut signing = [0u8; 16];
        let mut encryption = [0u8; 16];
        signing.copy_from_slice(&bytes[..16]);
        encryption.copy_from_slice(&bytes[16..]);
        Ok(Self {
            signing,
            encryption,
        })
    }

    /// Parses the base64url text stored in key files.
    pub fn from_base64(text: &str) -> Result<Self, DecryptError> {
        let bytes = decode_base64url(text).map_err(|e| DecryptError::InvalidKey {
            message: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }
}

/// Decodes base64url text, tolerating missing padding and stray whitespace.
pub fn decode_base64url(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let mut normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    base64::engine::general_purpose::STANDARD.decode(normalized)
}

/// Verifies and decrypts a token given either as raw bytes or base64url text.
pub fn decrypt(key: &FernetKey, token: impl AsRef<[u8]>) -> Result<Vec<u8>, DecryptError> {
    let token = token.as_ref();
    let decoded;
    let bytes: &[u8] = if token.first() == Some(&VERSION) {
        token
    } else {
        let text = std::str::from_utf8(token).map_err(|_| DecryptError::InvalidToken {
            message: "token is neither raw bytes nor base64 text".to_string(),
        })?;
        decoded = decode_base64url(text).map_err(|e| DecryptError::InvalidToken {
            message: format!("base64: {}", e),
        })?;
        &decoded
    };

    if bytes.len() < MIN_TOKEN_LEN {
        return Err(DecryptError::InvalidToken {
            message: format!("{} bytes is shorter than {}", bytes.len(), MIN_TOKEN_LEN),
        });
    }
    if bytes[0] != VERSION {
        return Err(DecryptError::InvalidToken {
            message: format!("unsupported version byte 0x{:02x}", bytes[0]),
        });
    }

    let (signed, signature) = bytes.split_at(bytes.len() - SIGNATURE_LEN);
    let mut mac =
        HmacSha256::new_from_slice(&key.signing).map_err(|e| DecryptError::InvalidKey {
            message: e.to_string(),
        })?;
    mac.update(signed);
    mac.verify_slice(signature)
        .map_err(|_| DecryptError::InvalidSignature)?;

    let iv = &signed[TIMESTAMP_END..IV_END];
    let ciphertext = &signed[IV_END..];
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(DecryptError::CryptoOperationFailed {
            message: format!("ciphertext length {} is not a block multiple", ciphertext.len()),
        });
    }

    Aes128CbcDec::new_from_slices(&key.encryption, iv)
        .map_err(|e| DecryptError::CryptoOperationFailed {
            message: e.to_string(),
        })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecryptError::CryptoOperationFailed {
            message: "bad padding".to_string(),
        })
}

/// Seconds-since-epoch embedded in a raw token, without verifying it.
pub fn token_timestamp(token: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = token.get(1..TIMESTAMP_END)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Builds tokens for fixtures. Production code never encrypts.
#[cfg(test)]
pub(crate) fn seal(
    key_bytes: &[u8; 32],
    plaintext: &[u8],
    iv: [u8; 16],
    timestamp: u64,
) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;
    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    let mut token = vec![VERSION];
    token.extend_from_slice(&timestamp.to_be_bytes());
    token.extend_from_slice(&iv);
    let ciphertext = Aes128CbcEnc::new_from_slices(&key_bytes[16..], &iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    token.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(&key_bytes[..16]).unwrap();
    mac.update(&token);
    token.extend_from_slice(&mac.finalize().into_bytes());
    token
}

#[cfg(test)]
#[path = "tests/fernet_tests.rs"]
mod tests;
