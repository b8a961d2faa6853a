//! Completion client adapter.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! Unlike the memory adapter, errors here are *not* swallowed: the turn
//! orchestrator decides what the user sees when a completion fails.

pub mod providers;

use thiserror::Error;

use crate::message::ChatMessage;

/// Generation ceiling applied to every completion request.
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// Low temperature for focused, reproducible answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    #[cfg(test)]
    Scripted(providers::scripted::ScriptedProvider),
}

impl LlmProvider {
    /// Send the ordered `messages` to `model` and return the reply text.
    pub async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(messages, model).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(messages, model).await,
            #[cfg(test)]
            LlmProvider::Scripted(p) => p.complete(messages, model).await,
        }
    }
}
