//! Process runtime: a multi-threaded Tokio runtime that is torn down with a
//! bounded grace period.
//!
//! Console stdin reads sit on the blocking pool and only return on the next
//! line. Dropping the runtime would wait for them, so shutdown uses
//! [`Runtime::shutdown_timeout`] instead.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::debug;

use crate::error::AppError;

/// How long shutdown waits for leftover blocking work.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

pub fn build() -> Result<Runtime, AppError> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

/// Drive `future` to completion, then shut the runtime down, abandoning
/// blocking tasks still running after `grace`.
pub fn run_to_completion<F: Future>(runtime: Runtime, future: F, grace: Duration) -> F::Output {
    let output = runtime.block_on(future);
    debug!(grace_ms = grace.as_millis() as u64, "shutting down runtime");
    runtime.shutdown_timeout(grace);
    output
}
