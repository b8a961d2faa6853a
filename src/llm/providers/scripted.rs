//! Test-only provider with a fixed outcome that records every prompt it sees.

use std::sync::{Arc, Mutex};

use crate::llm::ProviderError;
use crate::message::ChatMessage;

#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    outcome: Result<String, String>,
    calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    pub fn replying(text: impl Into<String>) -> Self {
        Self { outcome: Ok(text.into()), calls: Arc::default() }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self { outcome: Err(reason.into()), calls: Arc::default() }
    }

    /// Prompts received so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn complete(&self, messages: &[ChatMessage], _model: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.outcome.clone().map_err(ProviderError::Request)
    }
}
