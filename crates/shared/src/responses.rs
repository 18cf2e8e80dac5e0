//! Response bodies for the engine HTTP API.

use serde::{Deserialize, Serialize};

use crate::TurnDto;

/// Compact session view returned by the session endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub language: Option<String>,
    pub scenario_preset: String,
    pub scenario_custom: String,
    pub difficulty: String,
    pub task: Option<String>,
    pub messages: Vec<TurnDto>,
    /// Latest background feedback verdict, if one has landed yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<FeedbackResponse>,
    pub task_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    pub session_id: String,
    pub session: SessionSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContextResponse {
    pub session_id: String,
    /// True when the request caused the session to be created.
    pub created: bool,
    pub session: SessionSummary,
}

/// Verdict of the feedback evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Ok,
    Corrected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub status: FeedbackStatus,
    /// Improved version with changed spans bolded; empty when status is ok.
    pub corrected: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTaskResponse {
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub translation: String,
    /// True when served from the session's translation cache.
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTaskResponse {
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabItem {
    pub word: String,
    pub translation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabListResponse {
    pub items: Vec<VocabItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamplesResponse {
    pub lines: Vec<String>,
}

/// Uniform error body for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}
