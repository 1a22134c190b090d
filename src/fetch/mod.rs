//! Concurrent usage fetching with a last-known-good fallback.
//!
//! [`FetchOrchestrator`] runs every [`UsageProvider`] in its own task, races
//! each one against that provider's timeout and falls back to the
//! [`UsageCache`] when a fetch fails.

pub mod cache;
pub mod orchestrator;
pub mod runtime;

pub use cache::{CacheEntry, UsageCache};
pub use orchestrator::{
    FetchError, FetchOrchestrator, FetchOutcome, FetchReport, ProviderId, ProviderResult,
    SharedProvider, UsageProvider,
};
