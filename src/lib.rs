//! Aggregates usage quotas of AI coding assistants from locally stored credentials.
//!
//! Credentials left behind by the vendors' own tools are discovered and decoded
//! by [`credentials`], merged per real account by [`accounts`], and used by
//! the [`providers`] to query each vendor's usage endpoint. [`fetch`] runs the
//! providers concurrently with per-provider timeouts and a last-known-good cache.

pub mod accounts;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod fetch;
pub mod logging;
pub mod paths;
pub mod protowire;
pub mod providers;
pub mod report;
pub mod usage;
