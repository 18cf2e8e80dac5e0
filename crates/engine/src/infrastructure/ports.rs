//! Port traits for infrastructure boundaries.
//!
//! The completion port is the only abstraction in the engine: everything
//! else is concrete types. It exists so the orchestrator and evaluators
//! can be tested against a scripted provider, and so the upstream vendor
//! could be swapped without touching the use cases.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Failure at the completion-provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No credential configured. Raised before any network call.
    #[error("Missing completion API credential")]
    MissingCredential,
    /// The upstream call failed or returned a non-success status.
    #[error("Completion request failed: {0}")]
    RequestFailed(String),
    /// The upstream reply could not be decoded.
    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
    /// The streaming connection failed after it was opened.
    #[error("Completion stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One turn of provider input.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Finite, forward-only sequence of incremental text fragments.
///
/// Not restartable; dropping it early is legal and releases the
/// underlying transport. A mid-stream failure surfaces as an `Err` item
/// at the point of failure; fragments yielded before it stand.
pub type CompletionStream = BoxStream<'static, Result<String, LlmError>>;

/// The external text-generation capability in its three modes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// One-shot completion. Empty text is valid output.
    async fn complete(&self, turns: Vec<ChatMessage>) -> Result<String, LlmError>;

    /// Deterministic, short-output completion for single-word answers.
    async fn complete_constrained(&self, turns: Vec<ChatMessage>) -> Result<String, LlmError>;

    /// Streaming completion, yielding fragments as they arrive.
    async fn stream_complete(&self, turns: Vec<ChatMessage>)
        -> Result<CompletionStream, LlmError>;
}
