//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! All OpenAI wire types are private to this module; callers only see
//! `complete(&[ChatMessage], model) -> String`. The response body is parsed
//! leniently: when the first choice does not carry text where we expect it,
//! the raw response is returned as a string instead of failing the call.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::llm::ProviderError;
use crate::message::ChatMessage;

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// When `api_key` is present it is sent as `Authorization: Bearer <key>`.
    pub fn new(
        api_base_url: String,
        temperature: f32,
        max_tokens: u32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, temperature, max_tokens, api_key })
    }

    /// One round-trip: send the ordered messages, return the reply text.
    pub async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ProviderError> {
        let temperature = temperature_for(model, self.temperature);

        let payload = ChatCompletionRequest {
            model,
            messages,
            temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            max_tokens = payload.max_tokens,
            messages = messages.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let raw = response.json::<Value>().await.map_err(|e| {
            error!(error = %e, "LLM response body is not JSON");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        trace!(response = %raw, "full LLM response payload");

        Ok(extract_reply(raw))
    }
}

/// Temperature to send for `model`. The gpt-5 family rejects the
/// parameter, so it is omitted there.
pub(crate) fn temperature_for(model: &str, configured: f32) -> Option<f32> {
    if model.starts_with("gpt-5") {
        debug!(%model, configured, "model does not accept temperature, omitting it");
        None
    } else {
        Some(configured)
    }
}

/// Pull the first choice's text out of a completion response.
///
/// Accepts `content` as a plain string or as an object with a `text` field.
/// Anything else degrades to the raw response rendered as a string.
pub(crate) fn extract_reply(raw: Value) -> String {
    let parsed = match serde_json::from_value::<ChatCompletionResponse>(raw.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "unexpected completion response shape, using raw body");
            return raw.to_string();
        }
    };

    debug!(choices = parsed.choices.len(), "received LLM response");

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .and_then(|content| match content {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        });

    match text {
        Some(text) => text,
        None => {
            warn!("completion response carried no text content, using raw body");
            raw.to_string()
        }
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<Value>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = error_message(status, &body);
    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(body) {
        let code = env.error.code.map(|v| match v {
            Value::String(s) => format!(" [code={s}]"),
            other => format!(" [code={other}]"),
        }).unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_string_content() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "hi there"}}]});
        assert_eq!(extract_reply(raw), "hi there");
    }

    #[test]
    fn extracts_text_from_structured_content() {
        let raw = json!({"choices": [{"message": {"content": {"type": "text", "text": "structured"}}}]});
        assert_eq!(extract_reply(raw), "structured");
    }

    #[test]
    fn empty_choices_fall_back_to_raw() {
        let raw = json!({"choices": []});
        assert_eq!(extract_reply(raw.clone()), raw.to_string());
    }

    #[test]
    fn missing_choices_fall_back_to_raw() {
        let raw = json!({"id": "cmpl-1", "object": "weird"});
        let out = extract_reply(raw);
        assert!(out.contains("cmpl-1"));
    }

    #[test]
    fn null_content_falls_back_to_raw() {
        let raw = json!({"choices": [{"message": {"content": null}}]});
        assert!(extract_reply(raw).contains("choices"));
    }

    #[test]
    fn request_carries_fixed_generation_settings() {
        let messages = vec![ChatMessage::user("q")];
        let req = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: Some(0.2),
            max_tokens: 800,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["max_tokens"], 800);
        assert_eq!(v["messages"][0]["role"], "user");
        assert!((v["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn temperature_is_omitted_only_for_gpt5_family() {
        assert_eq!(temperature_for("gpt-3.5-turbo", 0.2), Some(0.2));
        assert_eq!(temperature_for("gpt-4o-mini", 0.2), Some(0.2));
        assert_eq!(temperature_for("gpt-5-mini", 0.2), None);

        let messages = vec![ChatMessage::user("q")];
        let req = ChatCompletionRequest {
            model: "gpt-5",
            messages: &messages,
            temperature: temperature_for("gpt-5", 0.2),
            max_tokens: 800,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("temperature").is_none());
        assert_eq!(v["max_tokens"], 800);
    }

    #[test]
    fn error_envelope_is_summarised() {
        let body = r#"{"error": {"message": "bad key", "code": "invalid_api_key"}}"#;
        let msg = error_message(reqwest::StatusCode::UNAUTHORIZED, body);
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid_api_key"));
        assert!(msg.contains("bad key"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let p = OpenAiCompatibleProvider::new(
            "http://127.0.0.1:1/v1/chat/completions".into(),
            0.2,
            800,
            2,
            None,
        )
        .unwrap();
        let err = p.complete(&[ChatMessage::user("hi")], "m").await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
    }
}
