//! Turn orchestrator — one user message in, one assistant reply out.
//!
//! ```text
//! Start
//!   └─▶ UserPersisted       append user message (awaited, failure logged)
//!        └─▶ ContextFetched  memory context block ("" on failure)
//!             └─▶ PromptBuilt
//!                  └─▶ Completed          LLM reply, or APOLOGY_REPLY
//!                       └─▶ AssistantScheduled   deferred append via TaskRegistry
//!                            └─▶ Done     reply returned
//! ```
//!
//! The user message is written synchronously so the context fetch can see
//! it; the assistant message is written in the background so the reply is
//! not held up by storage. A turn never returns an error.

pub mod history;
pub mod prompt;
pub mod thread;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::chunker;
use crate::llm::LlmProvider;
use crate::memory::{MemoryAdapter, MemoryError, MemoryMessage};
use crate::message::{ChatMessage, Role};
use crate::tasks::{TaskId, TaskRegistry};

/// Reply used when the completion service fails.
pub const APOLOGY_REPLY: &str = "Sorry, I couldn't get a response from the model.";

/// Speaker name stored with assistant messages.
pub const ASSISTANT_NAME: &str = "AI Assistant";

/// Window and overlap used when chunking a saved exchange.
pub const EXCHANGE_CHUNK_WORDS: usize = 250;
pub const EXCHANGE_CHUNK_OVERLAP: usize = 40;

/// Progress of a single turn. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TurnStage {
    Start,
    UserPersisted,
    ContextFetched,
    PromptBuilt,
    Completed,
    AssistantScheduled,
    Done,
}

/// Coordinates memory, completion and background persistence for chat turns.
///
/// Cheap to share behind an `Arc`; concurrent turns are independent.
#[derive(Debug, Clone)]
pub struct TurnOrchestrator {
    memory: MemoryAdapter,
    llm: LlmProvider,
    tasks: Arc<TaskRegistry>,
    model: String,
    template_id: Option<String>,
}

impl TurnOrchestrator {
    pub fn new(memory: MemoryAdapter, llm: LlmProvider, tasks: Arc<TaskRegistry>, model: impl Into<String>) -> Self {
        Self { memory, llm, tasks, model: model.into(), template_id: None }
    }

    /// Context template passed to every context fetch.
    pub fn with_template_id(mut self, template_id: Option<String>) -> Self {
        self.template_id = template_id.filter(|t| !t.is_empty());
        self
    }

    pub fn memory(&self) -> &MemoryAdapter {
        &self.memory
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Make sure the user and thread exist in the memory service.
    pub async fn ensure_user_and_thread(&self, thread_id: &str, user_id: &str) {
        if !self.memory.is_available() {
            return;
        }
        self.memory.ensure_user(user_id).await;
        self.memory.ensure_thread(thread_id, user_id).await;
        info!(%thread_id, %user_id, "memory user and thread ensured");
    }

    /// Run one turn and return the assistant's reply.
    ///
    /// `short_history` is the caller's window of prior messages, used as-is;
    /// the new `user_text` is appended to the prompt here.
    pub async fn handle_turn(
        &self,
        thread_id: &str,
        user_id: &str,
        user_text: &str,
        short_history: &[ChatMessage],
    ) -> String {
        let mut stage = TurnStage::Start;
        let mut advance = |next: TurnStage| {
            debug_assert!(next > stage);
            stage = next;
            debug!(%thread_id, stage = ?stage, "turn stage");
        };

        let user_message = MemoryMessage::new(user_id, Role::User, user_text);
        if let Err(e) = self.memory.append_messages(thread_id, vec![user_message]).await {
            absorb_write_failure(thread_id, "user message", &e);
        }
        advance(TurnStage::UserPersisted);

        let context = self.memory.get_context(thread_id, self.template_id.as_deref()).await;
        debug!(%thread_id, context_len = context.len(), "memory context fetched");
        advance(TurnStage::ContextFetched);

        let messages = prompt::build_prompt(&context, short_history, user_text);
        advance(TurnStage::PromptBuilt);

        let reply = match self.llm.complete(&messages, &self.model).await {
            Ok(text) => text,
            Err(e) => {
                error!(%thread_id, model = %self.model, error = %e, "completion failed");
                APOLOGY_REPLY.to_string()
            }
        };
        advance(TurnStage::Completed);

        let assistant_message = MemoryMessage::new(ASSISTANT_NAME, Role::Assistant, reply.as_str());
        self.schedule_append(thread_id, vec![assistant_message], "persist assistant message");
        advance(TurnStage::AssistantScheduled);

        advance(TurnStage::Done);
        reply
    }

    /// Chunk a user/assistant exchange and persist the chunks in the background.
    ///
    /// Chunks are stored as `system` messages named after the user. Returns
    /// the number of chunk messages handed to the registry (0 when memory is
    /// disabled or the exchange is empty).
    pub fn persist_exchange_chunks(
        &self,
        thread_id: &str,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> usize {
        let messages = exchange_chunk_messages(user_id, user_text, assistant_text, EXCHANGE_CHUNK_WORDS);
        let count = messages.len();
        if count == 0 || !self.memory.is_available() {
            return 0;
        }
        self.schedule_append(thread_id, messages, "persist exchange chunks");
        count
    }

    fn schedule_append(&self, thread_id: &str, messages: Vec<MemoryMessage>, label: &str) -> Option<TaskId> {
        if !self.memory.is_available() {
            return None;
        }
        let memory = self.memory.clone();
        let thread = thread_id.to_string();
        self.tasks.schedule(format!("{label} [{thread_id}]"), move || {
            memory.append_messages_blocking(&thread, &messages)
        })
    }
}

/// Chunk `"User: …\n\nAssistant: …"` into storage messages.
pub fn exchange_chunk_messages(
    user_id: &str,
    user_text: &str,
    assistant_text: &str,
    max_words: usize,
) -> Vec<MemoryMessage> {
    let combined = format!("User: {user_text}\n\nAssistant: {assistant_text}");
    chunker::chunk(&combined, max_words, EXCHANGE_CHUNK_OVERLAP)
        .into_iter()
        .map(|text| MemoryMessage::new(user_id, Role::System, text))
        .collect()
}

fn absorb_write_failure(thread_id: &str, what: &str, e: &MemoryError) {
    match e {
        MemoryError::Unavailable => debug!(%thread_id, "memory disabled, {what} not stored"),
        _ => warn!(%thread_id, error = %e, "failed to store {what}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::scripted::ScriptedProvider;
    use crate::memory::adapter::testing::FakeMemory;

    fn orchestrator(fake: FakeMemory, llm: ScriptedProvider) -> (TurnOrchestrator, Arc<FakeMemory>) {
        let fake = Arc::new(fake);
        let orch = TurnOrchestrator::new(
            MemoryAdapter::new(fake.clone()),
            LlmProvider::Scripted(llm),
            TaskRegistry::new(),
            "test-model",
        );
        (orch, fake)
    }

    #[tokio::test]
    async fn favourite_colour_scenario() {
        let llm = ScriptedProvider::replying("I don't have that information yet.");
        let (orch, fake) = orchestrator(FakeMemory::default(), llm.clone());

        let reply = orch.handle_turn("t1", "u1", "What is my favorite color?", &[]).await;
        assert_eq!(reply, "I don't have that information yet.");

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[0][1], ChatMessage::user("What is my favorite color?"));

        orch.tasks().drain().await;
        assert_eq!(orch.tasks().totals(), (1, 0));
        let stored = fake.stored();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].1, MemoryMessage::new("u1", Role::User, "What is my favorite color?"));
        assert_eq!(
            stored[1].1,
            MemoryMessage::new(ASSISTANT_NAME, Role::Assistant, "I don't have that information yet.")
        );
    }

    #[tokio::test]
    async fn user_message_is_stored_before_context_fetch() {
        let (orch, fake) = orchestrator(
            FakeMemory { context: "likes teal".into(), ..Default::default() },
            ScriptedProvider::replying("ok"),
        );
        orch.handle_turn("t", "u", "hi", &[]).await;
        orch.tasks().drain().await;
        assert_eq!(fake.calls()[..2], ["add_messages", "get_user_context"]);
    }

    #[tokio::test]
    async fn context_and_history_reach_the_prompt() {
        let llm = ScriptedProvider::replying("teal");
        let (orch, _) = orchestrator(
            FakeMemory { context: "User likes teal.".into(), ..Default::default() },
            llm.clone(),
        );
        let history = vec![ChatMessage::user("hello"), ChatMessage::assistant("hi!")];
        orch.handle_turn("t", "u", "favourite colour?", &history).await;

        let prompt = &llm.calls()[0];
        assert_eq!(prompt.len(), 5);
        assert_eq!(prompt[1].content, "[MEMORY]\nUser likes teal.");
        assert_eq!(&prompt[2..4], &history[..]);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn completion_failure_yields_apology() {
        let (orch, fake) = orchestrator(FakeMemory::default(), ScriptedProvider::failing("503"));
        let reply = orch.handle_turn("t", "u", "hi", &[]).await;
        assert_eq!(reply, APOLOGY_REPLY);
        assert!(!reply.is_empty());

        orch.tasks().drain().await;
        assert_eq!(fake.stored().last().map(|(_, m)| m.content.clone()), Some(APOLOGY_REPLY.to_string()));
    }

    #[tokio::test]
    async fn context_failure_proceeds_without_memory() {
        let llm = ScriptedProvider::replying("fine");
        let (orch, _) = orchestrator(
            FakeMemory { fail_reads: true, context: "hidden".into(), ..Default::default() },
            llm.clone(),
        );
        assert_eq!(orch.handle_turn("t", "u", "hi", &[]).await, "fine");
        assert_eq!(llm.calls()[0].len(), 2);
    }

    #[tokio::test]
    async fn write_failures_never_reach_the_caller() {
        let (orch, _) = orchestrator(
            FakeMemory { fail_writes: true, ..Default::default() },
            ScriptedProvider::replying("still here"),
        );
        assert_eq!(orch.handle_turn("t", "u", "hi", &[]).await, "still here");
        orch.tasks().drain().await;
        assert!(orch.tasks().is_idle());
        assert_eq!(orch.tasks().totals(), (0, 1));
    }

    #[tokio::test]
    async fn absent_memory_still_answers() {
        let llm = ScriptedProvider::replying("no memory needed");
        let orch = TurnOrchestrator::new(
            MemoryAdapter::disabled(),
            LlmProvider::Scripted(llm.clone()),
            TaskRegistry::new(),
            "m",
        );
        orch.ensure_user_and_thread("t", "u").await;
        assert_eq!(orch.handle_turn("t", "u", "hi", &[]).await, "no memory needed");
        assert_eq!(llm.calls()[0].len(), 2);
        orch.tasks().drain().await;
        assert_eq!(orch.tasks().totals(), (0, 0));
        assert_eq!(orch.persist_exchange_chunks("t", "u", "q", "a"), 0);
    }

    #[tokio::test]
    async fn exchange_chunks_are_saved_as_system_messages() {
        let (orch, fake) = orchestrator(FakeMemory::default(), ScriptedProvider::replying("x"));
        let long_answer = vec!["word"; 600].join(" ");
        let n = orch.persist_exchange_chunks("t", "alice", "tell me a story", &long_answer);
        assert_eq!(n, 3);

        orch.tasks().drain().await;
        let stored = fake.stored();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|(t, m)| t == "t" && m.role == Role::System && m.name == "alice"));
        assert!(stored[0].1.content.starts_with("User: tell me a story Assistant: word"));
    }

    #[test]
    fn empty_exchange_has_prefix_chunks_only() {
        let msgs = exchange_chunk_messages("u", "", "", 250);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "User: Assistant:");
    }

    #[tokio::test]
    async fn ensure_user_and_thread_calls_service() {
        let (orch, fake) = orchestrator(FakeMemory::default(), ScriptedProvider::replying("x"));
        orch.ensure_user_and_thread("t", "u").await;
        assert_eq!(fake.calls(), vec!["add_user", "create_thread"]);
    }
}
