//! Credential discovery, decoding and caching.
//!
//! Every secret the providers need is described by a [`SecretKind`]. The
//! [`CredentialStore`] turns a kind into candidate locations
//! ([`locations`]), probes them in order and decodes the first usable one
//! with the matching decoder ([`decode`], [`vault`], [`cookies`]).

pub mod cookies;
pub mod decode;
pub mod error;
pub mod keystore;
pub mod locations;
pub mod scalar;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod vault;

pub use error::{CredentialError, DecodeError};
pub use locations::{SecretEnvironment, SecretLocation};
pub use store::{CredentialStore, LocationReport, LocationStatus};
pub use types::{
    ApiKeyCredential, CookieJar, Credential, OAuthCredential, ResolvedSecret, SecretKind,
    VaultAccount,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
