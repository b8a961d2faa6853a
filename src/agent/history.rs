//! Short-term history policy.
//!
//! The caller owns its rolling window; these helpers return new values and
//! never mutate the caller's copy.

use crate::message::{ChatMessage, Role};

/// Default bound on the short history window.
pub const DEFAULT_SHORT_HISTORY_MAX: usize = 6;

/// Keep the `max_len` most recent entries, in their original order.
pub fn trim_short_history(history: &[ChatMessage], max_len: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(max_len);
    history[start..].to_vec()
}

/// Latest user message and the latest assistant message (empty if none).
///
/// Returns `None` when the history holds no user message.
pub fn last_exchange(history: &[ChatMessage]) -> Option<(String, String)> {
    let last = |role: Role| {
        history
            .iter()
            .rev()
            .find(|m| m.role == role)
            .map(|m| m.content.clone())
    };
    let user = last(Role::User)?;
    Some((user, last(Role::Assistant).unwrap_or_default()))
}

/// Render the history as markdown, one paragraph per message.
pub fn to_markdown(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let who = if m.role == Role::User { "You" } else { "Assistant" };
            format!("**{who}**: {}\n", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
