//! Background task registry — "fire, track, forget" for deferred persistence.
//!
//! The orchestrator hands blocking persistence work to [`TaskRegistry::schedule`]
//! and returns to the user immediately. The registry:
//!
//! - inserts a task id into its live set *before* spawning, so a task can
//!   never finish before it is tracked;
//! - removes the id when the task ends, whether it succeeded, failed or
//!   panicked (a drop guard does the removal);
//! - catches failures at the task boundary and logs them; nothing flows
//!   back to the caller;
//! - runs the operation in place when no Tokio runtime is available.
//!
//! One registry is created at startup and shared via `Arc`; call
//! [`drain`](TaskRegistry::drain) before exit to let pending writes land.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Identifier of a scheduled background task.
pub type TaskId = u64;

/// How a background task ended. Consumed by the registry only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    live: Mutex<HashMap<TaskId, String>>,
    next_id: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    tracker: TaskTracker,
    /// Held for a whole close/wait/reopen cycle so concurrent drains cannot
    /// reopen the tracker under each other.
    drain_lock: tokio::sync::Mutex<()>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Schedule a blocking `operation` labelled `label`.
    ///
    /// Returns the task id when the work was deferred to the runtime's
    /// blocking pool, `None` when it already ran synchronously because no
    /// runtime was available.
    pub fn schedule<F, E>(self: &Arc<Self>, label: impl Into<String>, operation: F) -> Option<TaskId>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Display,
    {
        let label = label.into();
        let Ok(handle) = Handle::try_current() else {
            debug!(%label, "no runtime available, running background operation in place");
            let outcome = into_outcome(operation());
            self.record(&label, &outcome);
            return None;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live().insert(id, label.clone());
        debug!(task_id = id, %label, "background task scheduled");

        let guard = LiveGuard { registry: Arc::clone(self), id, label };
        self.tracker.spawn_blocking_on(
            move || {
                let outcome = into_outcome(operation());
                guard.finish(outcome);
            },
            &handle,
        );
        Some(id)
    }

    /// Number of tasks scheduled but not yet finished.
    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    pub fn is_idle(&self) -> bool {
        self.live_count() == 0
    }

    /// Labels of in-flight tasks, for diagnostics.
    pub fn live_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.live().values().cloned().collect();
        labels.sort();
        labels
    }

    /// Total finished tasks as `(succeeded, failed)`.
    pub fn totals(&self) -> (u64, u64) {
        (self.succeeded.load(Ordering::Relaxed), self.failed.load(Ordering::Relaxed))
    }

    /// Wait for every task scheduled so far. New tasks may still be
    /// scheduled afterwards. Concurrent callers are serialized.
    pub async fn drain(&self) {
        let _cycle = self.drain_lock.lock().await;
        let pending = self.live_count();
        if pending > 0 {
            debug!(pending, "draining background tasks");
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn live(&self) -> MutexGuard<'_, HashMap<TaskId, String>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, label: &str, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(%label, "background task finished");
            }
            TaskOutcome::Failed(reason) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%label, error = %reason, "background task failed");
            }
        }
    }
}

fn into_outcome<E: Display>(result: Result<(), E>) -> TaskOutcome {
    match result {
        Ok(()) => TaskOutcome::Succeeded,
        Err(e) => TaskOutcome::Failed(e.to_string()),
    }
}

/// Removes a task from the live set when dropped, including on panic.
struct LiveGuard {
    registry: Arc<TaskRegistry>,
    id: TaskId,
    label: String,
}

impl LiveGuard {
    fn finish(self, outcome: TaskOutcome) {
        self.registry.record(&self.label, &outcome);
        // Drop removes the id.
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.registry.record(&self.label, &TaskOutcome::Failed("task panicked".into()));
        }
        self.registry.live().remove(&self.id);
    }
}
