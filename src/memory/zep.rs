//! Zep Cloud memory backend over its REST API.
//!
//! Blocking HTTP (`reqwest::blocking`): every method is invoked from the
//! blocking pool by [`MemoryAdapter`](super::MemoryAdapter), never from an
//! async task directly.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{MemoryError, MemoryMessage, MemoryService, UserProfile};

pub const DEFAULT_API_BASE_URL: &str = "https://api.getzep.com/api/v2";

/// HTTP client for the Zep Cloud API.
///
/// `api_key` is sent as `Authorization: Api-Key <key>`.
#[derive(Debug, Clone)]
pub struct ZepClient {
    client: Client,
    api_base_url: Url,
    api_key: String,
}

impl ZepClient {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>, timeout_seconds: u64) -> Result<Self, MemoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| MemoryError::Request(format!("failed to build HTTP client: {e}")))?;
        let raw = api_base_url.into();
        let api_base_url = Url::parse(&raw)
            .map_err(|e| MemoryError::Request(format!("invalid memory API base URL '{raw}': {e}")))?;
        if api_base_url.cannot_be_a_base() {
            return Err(MemoryError::Request(format!("memory API base URL '{raw}' cannot take a path")));
        }
        Ok(Self { client, api_base_url, api_key: api_key.into() })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path
    /// segment. Ids containing `/`, `?` or `#` stay inside their segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn send(&self, op: &str, req: RequestBuilder) -> Result<Response, MemoryError> {
        let response = req
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .send()
            .map_err(|e| MemoryError::Request(format!("{op}: {e}")))?;
        let status = response.status();
        debug!(%op, %status, "zep response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        Err(classify_status(op, status, &body))
    }
}

/// Map a non-success HTTP status to the memory error taxonomy.
fn classify_status(op: &str, status: StatusCode, body: &str) -> MemoryError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());
    match status {
        StatusCode::NOT_FOUND => MemoryError::NotFound(format!("{op}: {detail}")),
        StatusCode::CONFLICT => MemoryError::Conflict(format!("{op}: {detail}")),
        StatusCode::BAD_REQUEST if detail.to_lowercase().contains("already exists") => {
            MemoryError::Conflict(format!("{op}: {detail}"))
        }
        _ => MemoryError::Request(format!("{op}: HTTP {status}: {detail}")),
    }
}

impl MemoryService for ZepClient {
    fn add_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), MemoryError> {
        let body = AddUserRequest { user_id, profile };
        self.send("user.add", self.client.post(self.url(&["users"])).json(&body))?;
        Ok(())
    }

    fn create_thread(&self, thread_id: &str, user_id: &str) -> Result<(), MemoryError> {
        let body = CreateThreadRequest { thread_id, user_id };
        self.send("thread.create", self.client.post(self.url(&["threads"])).json(&body))?;
        Ok(())
    }

    fn add_messages(&self, thread_id: &str, messages: &[MemoryMessage]) -> Result<(), MemoryError> {
        let body = AddMessagesRequest { messages };
        let url = self.url(&["threads", thread_id, "messages"]);
        self.send("thread.add_messages", self.client.post(url).json(&body))?;
        Ok(())
    }

    fn get_user_context(&self, thread_id: &str, template_id: Option<&str>) -> Result<String, MemoryError> {
        let mut req = self.client.get(self.url(&["threads", thread_id, "context"]));
        if let Some(template_id) = template_id {
            req = req.query(&[("template_id", template_id)]);
        }
        let response = self.send("thread.get_user_context", req)?;
        let parsed: ContextResponse = response
            .json()
            .map_err(|e| MemoryError::Decode(format!("thread.get_user_context: {e}")))?;
        Ok(parsed.context.unwrap_or_default())
    }

    fn search_graph(
        &self,
        query: Option<&str>,
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Value, MemoryError> {
        let body = GraphSearchRequest { query: query.unwrap_or_default(), limit, user_id };
        let response = self.send("graph.search", self.client.post(self.url(&["graph", "search"])).json(&body))?;
        let value: Value = response
            .json()
            .map_err(|e| MemoryError::Decode(format!("graph.search: {e}")))?;
        trace!(result = %value, "graph search result");
        Ok(value)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AddUserRequest<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    profile: &'a UserProfile,
}

#[derive(Debug, Serialize)]
struct CreateThreadRequest<'a> {
    thread_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AddMessagesRequest<'a> {
    messages: &'a [MemoryMessage],
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Serialize)]
struct GraphSearchRequest<'a> {
    query: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn add_user_body_omits_empty_profile_fields() {
        let profile = UserProfile { email: Some("a@b.c".into()), ..Default::default() };
        let v = serde_json::to_value(AddUserRequest { user_id: "u1", profile: &profile }).unwrap();
        assert_eq!(v, serde_json::json!({"user_id": "u1", "email": "a@b.c"}));
    }

    #[test]
    fn messages_body_uses_name_role_content() {
        let messages = vec![MemoryMessage::new("AI Assistant", Role::Assistant, "hi")];
        let v = serde_json::to_value(AddMessagesRequest { messages: &messages }).unwrap();
        assert_eq!(v["messages"][0]["name"], "AI Assistant");
        assert_eq!(v["messages"][0]["role"], "assistant");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn context_field_may_be_missing() {
        let parsed: ContextResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.context.is_none());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status("user.add", StatusCode::BAD_REQUEST, r#"{"message":"user already exists"}"#),
            MemoryError::Conflict(_)
        ));
        assert!(matches!(
            classify_status("thread.create", StatusCode::CONFLICT, ""),
            MemoryError::Conflict(_)
        ));
        assert!(matches!(
            classify_status("thread.get_user_context", StatusCode::NOT_FOUND, "nope"),
            MemoryError::NotFound(_)
        ));
        let err = classify_status("graph.search", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(err.to_string().contains("HTTP 500"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = ZepClient::new("http://localhost:8000/api/v2/", "k", 1).unwrap();
        assert_eq!(c.url(&["users"]).as_str(), "http://localhost:8000/api/v2/users");
        let c = ZepClient::new("http://localhost:8000/api/v2", "k", 1).unwrap();
        assert_eq!(c.url(&["graph", "search"]).as_str(), "http://localhost:8000/api/v2/graph/search");
    }

    #[test]
    fn thread_ids_are_encoded_as_one_path_segment() {
        let c = ZepClient::new("http://localhost:8000/api/v2", "k", 1).unwrap();
        for (thread_id, encoded) in [("sess?x=1", "sess%3Fx=1"), ("team#1", "team%231"), ("a/b", "a%2Fb")] {
            let url = c.url(&["threads", thread_id, "context"]);
            assert_eq!(url.path(), format!("/api/v2/threads/{encoded}/context"), "{thread_id}");
            assert_eq!(url.query(), None, "{thread_id}");
            assert_eq!(url.fragment(), None, "{thread_id}");

            let req = c.client.get(url).build().unwrap();
            let segments: Vec<&str> = req.url().path_segments().unwrap().collect();
            assert_eq!(segments, ["api", "v2", "threads", encoded, "context"]);
        }
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(ZepClient::new("not a url", "k", 1), Err(MemoryError::Request(_))));
        assert!(matches!(ZepClient::new("mailto:zep@example.com", "k", 1), Err(MemoryError::Request(_))));
    }
}
