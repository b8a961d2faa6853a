//! [`MemoryAdapter`] — async, failure-tolerant front for a [`MemoryService`].
//!
//! Every service call is dispatched to `tokio::task::spawn_blocking` so a
//! slow or hung backend never stalls the async workers serving other turns.
//!
//! Failure policy per operation:
//!
//! | operation         | on failure / absent service           |
//! |-------------------|---------------------------------------|
//! | `ensure_user`     | swallowed (debug log)                 |
//! | `ensure_thread`   | swallowed (debug log)                 |
//! | `append_messages` | returned to the caller as `Err`       |
//! | `get_context`     | empty string (warn log)               |
//! | `search_graph`    | empty JSON object (warn log)          |

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{MemoryError, MemoryMessage, MemoryService, UserProfile};

/// Cheaply cloneable handle; `None` service means memory is disabled.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    service: Option<Arc<dyn MemoryService>>,
}

impl MemoryAdapter {
    pub fn new(service: Arc<dyn MemoryService>) -> Self {
        Self { service: Some(service) }
    }

    /// An adapter with no backend: every operation is a neutral no-op.
    pub fn disabled() -> Self {
        Self { service: None }
    }

    pub fn is_available(&self) -> bool {
        self.service.is_some()
    }

    /// Run `f` against the service on the blocking pool.
    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MemoryService) -> Result<T, MemoryError> + Send + 'static,
    {
        let service = self.service.clone().ok_or(MemoryError::Unavailable)?;
        tokio::task::spawn_blocking(move || f(service.as_ref()))
            .await
            .map_err(|e| MemoryError::Join(format!("{op} join: {e}")))?
    }

    /// Best-effort user creation; "already exists" and every other error are swallowed.
    pub async fn ensure_user(&self, user_id: &str) {
        let id = user_id.to_string();
        match self.call("user.add", move |s| s.add_user(&id, &UserProfile::default())).await {
            Ok(()) => debug!(%user_id, "memory user created"),
            Err(e) => debug!(%user_id, error = %e, "ensure_user ignored"),
        }
    }

    /// Best-effort thread creation; same swallow policy as [`ensure_user`](Self::ensure_user).
    pub async fn ensure_thread(&self, thread_id: &str, user_id: &str) {
        let (tid, uid) = (thread_id.to_string(), user_id.to_string());
        match self.call("thread.create", move |s| s.create_thread(&tid, &uid)).await {
            Ok(()) => debug!(%thread_id, "memory thread created"),
            Err(e) => debug!(%thread_id, error = %e, "ensure_thread ignored"),
        }
    }

    /// Persist messages to a thread. The caller decides how to absorb a failure.
    pub async fn append_messages(&self, thread_id: &str, messages: Vec<MemoryMessage>) -> Result<(), MemoryError> {
        let tid = thread_id.to_string();
        self.call("thread.add_messages", move |s| s.add_messages(&tid, &messages)).await
    }

    /// Blocking variant of [`append_messages`](Self::append_messages) for code
    /// already running on the blocking pool (background persistence).
    pub fn append_messages_blocking(&self, thread_id: &str, messages: &[MemoryMessage]) -> Result<(), MemoryError> {
        let service = self.service.as_ref().ok_or(MemoryError::Unavailable)?;
        service.add_messages(thread_id, messages)
    }

    /// Synthesized context block for the thread; empty on any failure.
    pub async fn get_context(&self, thread_id: &str, template_id: Option<&str>) -> String {
        if !self.is_available() {
            return String::new();
        }
        let tid = thread_id.to_string();
        let template = template_id.map(str::to_string);
        match self
            .call("thread.get_user_context", move |s| s.get_user_context(&tid, template.as_deref()))
            .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!(%thread_id, error = %e, "failed fetching memory context");
                String::new()
            }
        }
    }

    /// Raw graph search; empty JSON object on any failure.
    pub async fn search_graph(&self, query: Option<&str>, limit: usize, user_id: Option<&str>) -> Value {
        if !self.is_available() {
            return empty_graph();
        }
        let query = query.map(str::to_string);
        let user = user_id.map(str::to_string);
        match self
            .call("graph.search", move |s| s.search_graph(query.as_deref(), limit, user.as_deref()))
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "memory graph search failed");
                empty_graph()
            }
        }
    }
}

fn empty_graph() -> Value {
    Value::Object(serde_json::Map::new())
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording in-process fake used by unit tests across the crate.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeMemory {
        pub fail_writes: bool,
        pub fail_reads: bool,
        pub context: String,
        pub calls: Mutex<Vec<String>>,
        pub stored: Mutex<Vec<(String, MemoryMessage)>>,
    }

    impl FakeMemory {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn stored(&self) -> Vec<(String, MemoryMessage)> {
            self.stored.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    impl MemoryService for FakeMemory {
        fn add_user(&self, user_id: &str, _profile: &UserProfile) -> Result<(), MemoryError> {
            self.record("add_user");
            if self.fail_writes {
                return Err(MemoryError::Conflict(user_id.to_string()));
            }
            Ok(())
        }

        fn create_thread(&self, thread_id: &str, _user_id: &str) -> Result<(), MemoryError> {
            self.record("create_thread");
            if self.fail_writes {
                return Err(MemoryError::Conflict(thread_id.to_string()));
            }
            Ok(())
        }

        fn add_messages(&self, thread_id: &str, messages: &[MemoryMessage]) -> Result<(), MemoryError> {
            self.record("add_messages");
            if self.fail_writes {
                return Err(MemoryError::Request("write refused".into()));
            }
            let mut stored = self.stored.lock().unwrap();
            stored.extend(messages.iter().map(|m| (thread_id.to_string(), m.clone())));
            Ok(())
        }

        fn get_user_context(&self, _thread_id: &str, _template_id: Option<&str>) -> Result<String, MemoryError> {
            self.record("get_user_context");
            if self.fail_reads {
                return Err(MemoryError::Request("context unavailable".into()));
            }
            Ok(self.context.clone())
        }

        fn search_graph(&self, query: Option<&str>, limit: usize, _user_id: Option<&str>) -> Result<Value, MemoryError> {
            self.record("search_graph");
            if self.fail_reads {
                return Err(MemoryError::Request("search unavailable".into()));
            }
            Ok(serde_json::json!({ "query": query, "limit": limit, "edges": [] }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeMemory;
    use super::*;
    use crate::message::Role;

    fn adapter(fake: FakeMemory) -> (MemoryAdapter, Arc<FakeMemory>) {
        let fake = Arc::new(fake);
        (MemoryAdapter::new(fake.clone()), fake)
    }

    #[tokio::test]
    async fn disabled_adapter_is_neutral() {
        let m = MemoryAdapter::disabled();
        m.ensure_user("u").await;
        m.ensure_thread("t", "u").await;
        assert_eq!(m.get_context("t", None).await, "");
        assert_eq!(m.search_graph(Some("q"), 10, None).await, serde_json::json!({}));
        assert!(matches!(
            m.append_messages("t", vec![]).await,
            Err(MemoryError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn ensure_swallows_conflicts() {
        let (m, fake) = adapter(FakeMemory { fail_writes: true, ..Default::default() });
        m.ensure_user("u").await;
        m.ensure_thread("t", "u").await;
        assert_eq!(fake.calls(), vec!["add_user", "create_thread"]);
    }

    #[tokio::test]
    async fn context_errors_become_empty() {
        let (m, _) = adapter(FakeMemory {
            fail_reads: true,
            context: "never seen".into(),
            ..Default::default()
        });
        assert_eq!(m.get_context("t", Some("tpl")).await, "");
        assert_eq!(m.search_graph(None, 5, None).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn context_is_returned() {
        let (m, _) = adapter(FakeMemory { context: "likes blue".into(), ..Default::default() });
        assert_eq!(m.get_context("t", None).await, "likes blue");
    }

    #[tokio::test]
    async fn append_failure_is_reported_not_raised() {
        let (m, _) = adapter(FakeMemory { fail_writes: true, ..Default::default() });
        let err = m
            .append_messages("t", vec![MemoryMessage::new("u", Role::User, "hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Request(_)));
    }

    #[test]
    fn blocking_append_stores_messages() {
        let (m, fake) = adapter(FakeMemory::default());
        m.append_messages_blocking("t", &[MemoryMessage::new("AI Assistant", Role::Assistant, "ok")])
            .unwrap();
        let stored = fake.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, "t");
        assert_eq!(stored[0].1.content, "ok");
    }
}
