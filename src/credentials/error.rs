//! Error types for credential discovery and decoding.

use super::types::SecretKind;
use crate::crypto::DecryptError;
use crate::protowire::WireError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Why a readable candidate (or a single record inside it) could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Malformed(String),
    MissingField(&'static str),
    Crypto(DecryptError),
    Wire(WireError),
    Storage(String),
    /// Every entry of a multi-entry source failed on its own.
    NoUsableEntries { dropped: usize },
    /// A browser profile has cookies for the host but no live session.
    NotSignedIn { profile: String },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed: {}", message),
            Self::MissingField(field) => write!(f, "missing field '{}'", field),
            Self::Crypto(e) => write!(f, "{}", e),
            Self::Wire(e) => write!(f, "binary record: {}", e),
            Self::Storage(message) => write!(f, "storage: {}", message),
            Self::NoUsableEntries { dropped } => {
                write!(f, "no usable entries ({} dropped)", dropped)
            }
            Self::NotSignedIn { profile } => write!(f, "{} is not signed in", profile),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<DecryptError> for DecodeError {
    fn from(e: DecryptError) -> Self {
        Self::Crypto(e)
    }
}

impl From<WireError> for DecodeError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<rusqlite::Error> for DecodeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Outcome of resolving a secret when no candidate produced a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No candidate location exists. Expected; not a warning.
    NotFound { kind: SecretKind },
    /// A candidate exists but could not be opened.
    Unreadable { path: PathBuf, reason: String },
    /// Candidates were readable but none decoded.
    Corrupt { path: PathBuf, source: DecodeError },
}

impl Display for CredentialError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind } => write!(f, "no {} credentials found", kind),
            Self::Unreadable { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            Self::Corrupt { path, source } => {
                write!(f, "unusable credentials in {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Corrupt { source, .. } => Some(source),
            _ => None,
        }
    }
}
