//! Parley Protocol - Shared types for the engine HTTP API
//!
//! This crate contains every request and response body the engine's HTTP
//! surface speaks:
//! - Wire-format DTOs for sessions, chat turns, and the evaluator endpoints
//! - Shared enums (`TurnRole`, `TurnKind`)
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Tolerant input** - Client-supplied fields are optional and coerced
//!    server-side rather than rejected at deserialization time

pub mod requests;
pub mod responses;

pub use requests::{
    ChatTurnRequest, CheckTaskRequest, DifficultyRequest, ExamplesRequest, FeedbackRequest,
    GenerateTaskRequest, ScenarioRequest, SessionContextRequest, SuggestionRequest,
    TranslateRequest, VocabListRequest,
};
pub use responses::{
    CheckTaskResponse, ErrorResponse, ExamplesResponse, FeedbackResponse, FeedbackStatus,
    GenerateTaskResponse, NewSessionResponse, SessionContextResponse, SessionSummary,
    SuggestionResponse, TranslateResponse, VocabItem, VocabListResponse,
};

use serde::{Deserialize, Serialize};

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// What kind of chat turn the client is submitting.
///
/// This replaces in-band sentinel strings in the message text: the turn
/// kind travels as an explicit field so genuine user text can never
/// collide with a control marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    /// First turn of a scene; the partner produces the opening line.
    Start,
    /// An ordinary user message.
    #[default]
    User,
    /// A synthetic turn asking the partner to keep the scene going.
    Continue,
}

/// One transcript entry as the client sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDto {
    pub role: TurnRole,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_kind_defaults_to_user() {
        assert_eq!(TurnKind::default(), TurnKind::User);
    }

    #[test]
    fn turn_kind_round_trips_lowercase() {
        let json = serde_json::to_string(&TurnKind::Start).unwrap();
        assert_eq!(json, "\"start\"");
        let kind: TurnKind = serde_json::from_str("\"continue\"").unwrap();
        assert_eq!(kind, TurnKind::Continue);
    }

    #[test]
    fn turn_role_round_trips_lowercase() {
        let role: TurnRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, TurnRole::Assistant);
    }
}
