//! Request bodies for the engine HTTP API.
//!
//! Every field a client may send is optional unless the operation cannot
//! mean anything without it. Difficulty travels as a raw JSON value so
//! legacy clients that still send numeric encodings deserialize cleanly;
//! the engine coerces it to a valid tier.

use serde::{Deserialize, Serialize};

use crate::{TurnDto, TurnKind};

/// Context merge for an existing or to-be-created session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContextRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub scenario_preset: Option<String>,
    #[serde(default)]
    pub scenario_custom: Option<String>,
    #[serde(default)]
    pub scenario_role: Option<String>,
    #[serde(default)]
    pub scenario_start: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub difficulty: Option<serde_json::Value>,
}

/// One chat turn. Carries the same optional context overrides as
/// [`SessionContextRequest`] so a single request can repair a stale
/// session before the model is called.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub kind: TurnKind,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub scenario_preset: Option<String>,
    #[serde(default)]
    pub scenario_custom: Option<String>,
    #[serde(default)]
    pub scenario_role: Option<String>,
    #[serde(default)]
    pub scenario_start: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub difficulty: Option<serde_json::Value>,
    /// The client's copy of the transcript, used to reconcile a stale
    /// server session after a restart.
    #[serde(default)]
    pub messages: Vec<TurnDto>,
}

/// Grammar/naturalness feedback on the user's last message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub previous_assistant: Option<String>,
}

/// Task-completion judgement over a transcript window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTaskRequest {
    pub task: String,
    pub language: String,
    #[serde(default)]
    pub scenario_title: Option<String>,
    #[serde(default)]
    pub role_guide: Option<String>,
    pub messages: Vec<TurnDto>,
}

/// Single-word translation, with optional surrounding sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub word: String,
    #[serde(default)]
    pub sentence: Option<String>,
}

/// One generated practice task for a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTaskRequest {
    pub scenario_title: String,
    #[serde(default)]
    pub scenario_subtitle: Option<String>,
    #[serde(default)]
    pub role_guide: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
    pub language: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub previous_tasks: Vec<String>,
}

/// Bounded vocabulary-list generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabListRequest {
    pub language: String,
    pub count: i64,
    #[serde(default)]
    pub existing: Vec<String>,
    #[serde(default)]
    pub scenario_title: Option<String>,
    #[serde(default)]
    pub scenario_detail: Option<String>,
    #[serde(default)]
    pub role_guide: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}

/// Hint for what to say next in the current conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub session_id: String,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub messages: Vec<TurnDto>,
}

/// Example sentences for one vocabulary word.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamplesRequest {
    pub language: String,
    pub word: String,
}

/// Scenario metadata update for an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub session_id: String,
    #[serde(default)]
    pub scenario_preset: Option<String>,
    #[serde(default)]
    pub scenario_custom: Option<String>,
}

/// Difficulty update for an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyRequest {
    pub session_id: String,
    #[serde(default)]
    pub difficulty: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_turn_request_accepts_minimal_body() {
        let req: ChatTurnRequest =
            serde_json::from_str(r#"{"sessionId":"abc","message":"hi"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));
        assert_eq!(req.kind, TurnKind::User);
        assert!(req.messages.is_empty());
    }

    #[test]
    fn chat_turn_request_accepts_legacy_numeric_difficulty() {
        let req: ChatTurnRequest = serde_json::from_str(r#"{"difficulty":1}"#).unwrap();
        assert_eq!(req.difficulty, Some(serde_json::json!(1)));
    }

    #[test]
    fn check_task_request_is_camel_case() {
        let req: CheckTaskRequest = serde_json::from_str(
            r#"{"task":"Order coffee","language":"French","scenarioTitle":"Cafe","messages":[]}"#,
        )
        .unwrap();
        assert_eq!(req.scenario_title.as_deref(), Some("Cafe"));
    }
}
