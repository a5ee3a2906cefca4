//! Minimal Anthropic Claude API client.
//!
//! Non-streaming text completions against the Messages API. This is all the
//! story generator needs: one system prompt, a short conversation, and a
//! single text reply that carries a JSON payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const MESSAGES_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: usize = 1024;

/// Errors from the Claude client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingKey,

    #[error("Could not reach Claude: {0}")]
    Transport(String),

    #[error("Claude returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Unreadable reply from Claude: {0}")]
    Decode(String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// Claude API client.
#[derive(Clone)]
pub struct Claude {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl Claude {
    /// Build a client for an API key.
    ///
    /// `request_timeout` caps a whole request at the HTTP layer. Callers with
    /// a tighter budget should still race the call themselves.
    pub fn new(api_key: impl Into<String>, request_timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Setup(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: MESSAGES_ENDPOINT.to_string(),
        })
    }

    /// Build a client from ANTHROPIC_API_KEY. A blank key counts as missing.
    pub fn from_env(request_timeout: Duration) -> Result<Self, Error> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::new(key, request_timeout),
            _ => Err(Error::MissingKey),
        }
    }

    /// Model used when a request doesn't name one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Send requests to another API base, such as a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint = format!("{}/messages", base_url.into().trim_end_matches('/'));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one completion.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let body = self.wire_body(&request);

        let reply = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let code = reply.status();
        if !code.is_success() {
            return Err(Error::Status {
                code: code.as_u16(),
                body: reply.text().await.unwrap_or_default(),
            });
        }

        let wire: WireResponse = reply
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;
        Ok(wire.into())
    }

    fn wire_body<'a>(&'a self, request: &'a Request) -> WireRequest<'a> {
        WireRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: &request.messages,
            temperature: request.temperature,
        }
    }
}

// ============================================================================
// Requests and responses
// ============================================================================

/// One completion call.
#[derive(Debug, Clone)]
pub struct Request {
    /// Overrides the client's model.
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
}

impl Request {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
            messages,
            temperature: None,
        }
    }

    pub fn with_model(self, model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..self
        }
    }

    pub fn with_max_tokens(self, max_tokens: usize) -> Self {
        Self { max_tokens, ..self }
    }

    pub fn with_system(self, system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..self
        }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }
}

/// A plain-text conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// What came back from one completion.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    /// Text blocks in reply order; other block kinds are skipped.
    pub blocks: Vec<String>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl Response {
    /// All text blocks joined.
    pub fn text(&self) -> String {
        self.blocks.concat()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

/// Token counts billed for a call.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    model: String,
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl From<WireResponse> for Response {
    fn from(wire: WireResponse) -> Self {
        let blocks = wire
            .content
            .into_iter()
            .filter_map(|block| match block {
                WireBlock::Text { text } => Some(text),
                WireBlock::Other => None,
            })
            .collect();

        Response {
            id: wire.id,
            model: wire.model,
            blocks,
            stop_reason: wire.stop_reason.unwrap_or_default(),
            usage: wire.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Claude {
        Claude::new("test-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_client_defaults() {
        let client = client();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.endpoint, MESSAGES_ENDPOINT);
    }

    #[test]
    fn test_client_overrides() {
        let client = client()
            .with_model("claude-3-5-haiku-latest")
            .with_base_url("http://localhost:9000/v1/");
        assert_eq!(client.model(), "claude-3-5-haiku-latest");
        assert_eq!(client.endpoint, "http://localhost:9000/v1/messages");
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(vec![Message::user("Begin")])
            .with_system("You oversee the trial")
            .with_max_tokens(600)
            .with_temperature(0.4);

        assert_eq!(request.max_tokens, 600);
        assert_eq!(request.system.as_deref(), Some("You oversee the trial"));
        assert_eq!(request.temperature, Some(0.4));
    }

    #[test]
    fn test_wire_body_uses_default_model() {
        let client = client();
        let request = Request::new(vec![Message::user("one"), Message::assistant("two")]);
        let json = serde_json::to_value(client.wire_body(&request)).unwrap();

        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "two");
        assert!(json.get("system").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_reply_skips_non_text_blocks() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "{\"narrative\":"},
                {"type": "text", "text": "\"x\"}"}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let response = Response::from(serde_json::from_str::<WireResponse>(raw).unwrap());
        assert_eq!(response.text(), "{\"narrative\":\"x\"}");
        assert_eq!(response.stop_reason, StopReason::MaxTokens);
        assert_eq!(response.usage.output_tokens, 4);

        let odd: WireResponse = serde_json::from_str(
            r#"{"id":"m","model":"c","content":[],"stop_reason":"refusal"}"#,
        )
        .unwrap();
        assert_eq!(Response::from(odd).stop_reason, StopReason::Other);
    }
}
