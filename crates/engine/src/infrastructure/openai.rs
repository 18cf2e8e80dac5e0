//! OpenAI-compatible completion client.
//!
//! One chat-completions endpoint, used in three modes: plain, constrained
//! (pinned temperature, small output ceiling), and streaming over SSE.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ports::{ChatMessage, CompletionPort, CompletionStream, LlmError};

/// Default chat-completions endpoint base.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Default model for conversation turns.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Temperature for constrained completions.
const CONSTRAINED_TEMPERATURE: f32 = 0.0;

/// Output ceiling for constrained completions (single words/short phrases).
const CONSTRAINED_MAX_TOKENS: u32 = 20;

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        // LLM requests can be slow; allow well over interactive latency.
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from environment variables.
    ///
    /// A missing `OPENAI_API_KEY` is a startup-class misconfiguration,
    /// not a per-request error.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(&base_url, &api_key, &model))
    }

    fn ensure_credential(&self) -> Result<(), LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingCredential);
        }
        Ok(())
    }

    async fn post_chat(
        &self,
        turns: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        self.ensure_credential()?;

        let request = ApiChatRequest {
            model: self.model.clone(),
            messages: turns.iter().map(ApiMessage::from).collect(),
            temperature,
            max_tokens,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("{status} {body}")));
        }
        Ok(response)
    }

    async fn one_shot(
        &self,
        turns: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let response = self.post_chat(turns, temperature, max_tokens, false).await?;
        let body: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.and_then(|m| m.content))
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl CompletionPort for OpenAiClient {
    async fn complete(&self, turns: Vec<ChatMessage>) -> Result<String, LlmError> {
        self.one_shot(&turns, None, None).await
    }

    async fn complete_constrained(&self, turns: Vec<ChatMessage>) -> Result<String, LlmError> {
        self.one_shot(
            &turns,
            Some(CONSTRAINED_TEMPERATURE),
            Some(CONSTRAINED_MAX_TOKENS),
        )
        .await
    }

    async fn stream_complete(
        &self,
        turns: Vec<ChatMessage>,
    ) -> Result<CompletionStream, LlmError> {
        let response = self.post_chat(&turns, None, None, true).await?;

        let state = SseState {
            bytes: response.bytes_stream().boxed(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Some((Ok(fragment), state));
                }
                if state.done {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.extend_from_slice(&chunk);
                        state.drain_complete_lines();
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(LlmError::StreamInterrupted(e.to_string())), state));
                    }
                    None => {
                        state.done = true;
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct SseState {
    bytes: futures_util::stream::BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl SseState {
    /// Consume complete lines from the byte buffer into pending fragments.
    /// A partial trailing line stays buffered for the next chunk.
    fn drain_complete_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            match parse_sse_line(line.trim_end()) {
                SseEvent::Delta(text) => self.pending.push_back(text),
                SseEvent::Done => {
                    self.done = true;
                    return;
                }
                SseEvent::Ignore => {}
            }
        }
    }
}

enum SseEvent {
    Delta(String),
    Done,
    Ignore,
}

/// Parse one server-sent-events line from the chat-completions stream.
///
/// Incomplete or non-JSON data lines are ignored rather than failing the
/// whole stream; the terminator is the literal `[DONE]` payload.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseEvent::Ignore;
    };
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<ApiStreamChunk>(data) {
        Ok(chunk) => {
            let delta = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.and_then(|d| d.content))
                .unwrap_or_default();
            if delta.is_empty() {
                SseEvent::Ignore
            } else {
                SseEvent::Delta(delta)
            }
        }
        Err(_) => SseEvent::Ignore,
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    delta: Option<ApiDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sse_line_extracts_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Bonjour"}}]}"#;
        match parse_sse_line(line) {
            SseEvent::Delta(text) => assert_eq!(text, "Bonjour"),
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn parse_sse_line_recognizes_terminator() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
    }

    #[test]
    fn parse_sse_line_ignores_noise() {
        assert!(matches!(parse_sse_line(""), SseEvent::Ignore));
        assert!(matches!(parse_sse_line(": keepalive"), SseEvent::Ignore));
        assert!(matches!(
            parse_sse_line("data: {not json"),
            SseEvent::Ignore
        ));
        // Role-only first chunk carries no content.
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Ignore
        ));
    }

    #[test]
    fn drain_complete_lines_keeps_partial_tail() {
        let mut state = SseState {
            bytes: futures_util::stream::empty().boxed(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        };
        state.buffer.extend_from_slice(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Bon\"}}]}\ndata: {\"cho",
        );
        state.drain_complete_lines();
        assert_eq!(state.pending.pop_front().as_deref(), Some("Bon"));
        assert!(state.pending.is_empty());
        assert_eq!(state.buffer, b"data: {\"cho".to_vec());
    }

    #[test]
    fn missing_credential_rejected_before_any_call() {
        let client = OpenAiClient::new(DEFAULT_BASE_URL, "", DEFAULT_MODEL);
        assert!(matches!(
            client.ensure_credential(),
            Err(LlmError::MissingCredential)
        ));
    }
}
