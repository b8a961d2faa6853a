//! Prompt assembly for a chat turn.
//!
//! Fixed order:
//!
//! ```text
//! 0. system  — instruction to treat memory facts as ground truth
//! 1. system  — "[MEMORY]\n<context>"      (only when context is non-empty)
//! 2. ...     — caller's short history, unchanged
//! 3. user    — the new message
//! ```

use crate::message::ChatMessage;

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Use the user-provided memory context and \
short-term chat history to answer precisely. If the memory contains facts, prefer those as ground truth.";

/// Header line of the memory system message.
pub const MEMORY_LABEL: &str = "[MEMORY]";

/// Fluent builder producing the ordered message list for one completion.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    messages: Vec<ChatMessage>,
}

impl PromptBuilder {
    /// Start with the fixed system instruction.
    pub fn new() -> Self {
        Self { messages: vec![ChatMessage::system(SYSTEM_INSTRUCTION)] }
    }

    /// Add the memory context block; skipped when empty.
    pub fn memory(mut self, context: &str) -> Self {
        if !context.is_empty() {
            self.messages.push(ChatMessage::system(format!("{MEMORY_LABEL}\n{context}")));
        }
        self
    }

    pub fn history(mut self, history: &[ChatMessage]) -> Self {
        self.messages.extend_from_slice(history);
        self
    }

    pub fn user(mut self, text: &str) -> Self {
        self.messages.push(ChatMessage::user(text));
        self
    }

    pub fn build(self) -> Vec<ChatMessage> {
        self.messages
    }
}

/// Assemble the turn prompt in the fixed order above.
pub fn build_prompt(context: &str, history: &[ChatMessage], user_text: &str) -> Vec<ChatMessage> {
    PromptBuilder::new().memory(context).history(history).user(user_text).build()
}
