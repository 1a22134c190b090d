//! The async runtime the CLI runs on.
//!
//! Provider fetches do their blocking I/O on the runtime's blocking pool. A
//! fetch that lost its timeout race keeps that thread until the I/O returns,
//! so shutdown waits for leftover work only for a bounded grace period.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;

/// How long exit waits for provider work still running in the background.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Drives `future` to completion on a fresh multi-threaded runtime, then
/// shuts the runtime down without waiting more than `grace` for stragglers.
pub fn run<F: Future>(future: F, grace: Duration) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
