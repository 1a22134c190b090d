//! Secret decryption primitives.
//!
//! Two unrelated unlock algorithms live here:
//! - [`fernet`]: authenticated tokens protecting the encrypted account vault
//! - [`chromium`]: PBKDF2 + AES-CBC cookie values from Chromium-family browsers
//!
//! Both are pure functions over bytes. Each has its own key type so a key
//! derived for one algorithm cannot be handed to the other.

pub mod chromium;
pub mod fernet;

use std::fmt::{Display, Formatter};

/// Failures of the decryption primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// Key material is not valid base64 or has the wrong length.
    InvalidKey { message: String },
    /// Token is malformed: too short, wrong version byte, bad encoding.
    InvalidToken { message: String },
    /// HMAC over the token did not match its trailing signature.
    InvalidSignature,
    /// No usable key could be derived (missing keystore passphrase).
    KeyDerivationFailed { message: String },
    /// The block cipher rejected the input (bad padding, bad length).
    CryptoOperationFailed { message: String },
    /// Decryption succeeded but no fallback produced valid text.
    InvalidFormat,
}

impl Display for DecryptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey { message } => write!(f, "invalid key: {}", message),
            Self::InvalidToken { message } => write!(f, "invalid token: {}", message),
            Self::InvalidSignature => write!(f, "token signature mismatch"),
            Self::KeyDerivationFailed { message } => {
                write!(f, "key derivation failed: {}", message)
            }
            Self::CryptoOperationFailed { message } => {
                write!(f, "cipher operation failed: {}", message)
            }
            Self::InvalidFormat => write!(f, "decrypted value is not valid text"),
        }
    }
}

impl std::error::Error for DecryptError {}
