//! Memory client adapter — long-term memory lives in an external graph service.
//!
//! ```text
//! TurnOrchestrator ──▶ MemoryAdapter ──spawn_blocking──▶ dyn MemoryService
//!                                                          └─ ZepClient (HTTP)
//! ```
//!
//! [`MemoryService`] is the narrow, blocking contract the core needs from the
//! backend. Every call returns a result-or-failure value; the
//! [`MemoryAdapter`] runs calls on the blocking pool and applies the
//! "best effort" policy per operation, so a memory outage only ever degrades
//! answer quality.

pub mod adapter;
pub mod zep;

pub use adapter::MemoryAdapter;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::Role;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    /// No memory client is configured.
    #[error("memory service unavailable")]
    Unavailable,
    /// Create of an entity that already exists.
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Transport failure or non-success status.
    #[error("memory request failed: {0}")]
    Request(String),
    #[error("unexpected memory response: {0}")]
    Decode(String),
    /// The blocking task running the call did not finish normally.
    #[error("memory task failed: {0}")]
    Join(String),
}

// ── Types ─────────────────────────────────────────────────────────────────────

/// A message as stored in a memory thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    /// Speaker name (user id for user turns, assistant label otherwise).
    pub name: String,
    pub role: Role,
    pub content: String,
}

impl MemoryMessage {
    pub fn new(name: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self { name: name.into(), role, content: content.into() }
    }
}

/// Optional profile fields sent when creating a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ── Service contract ──────────────────────────────────────────────────────────

/// Blocking operations the core requires from a memory backend.
///
/// Implementations are `Send + Sync` and may block on network I/O; the
/// [`MemoryAdapter`] always calls them from `spawn_blocking`.
pub trait MemoryService: Send + Sync {
    fn add_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), MemoryError>;

    fn create_thread(&self, thread_id: &str, user_id: &str) -> Result<(), MemoryError>;

    fn add_messages(&self, thread_id: &str, messages: &[MemoryMessage]) -> Result<(), MemoryError>;

    /// Synthesized context block for the thread's user.
    fn get_user_context(&self, thread_id: &str, template_id: Option<&str>) -> Result<String, MemoryError>;

    /// Raw graph search result. `user_id` scopes the search when the backend
    /// keeps one graph per user.
    fn search_graph(
        &self,
        query: Option<&str>,
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Value, MemoryError>;
}
