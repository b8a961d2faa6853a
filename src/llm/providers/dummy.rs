//! Dummy LLM provider — echoes the latest user message back prefixed with `[echo]`.
//! Used to exercise the full turn pipeline without an API key.

use crate::llm::ProviderError;
use crate::message::{ChatMessage, Role};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, messages: &[ChatMessage], _model: &str) -> Result<String, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(format!("[echo] {last_user}"))
    }
}
