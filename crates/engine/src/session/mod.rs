//! Conversation session state.
//!
//! A [`Session`] is the server-side record of one practice run: target
//! language, scenario descriptors, difficulty, current task, a bounded
//! transcript, and a per-session translation cache. Sessions live in the
//! [`SessionStore`] for the lifetime of the process; durable state is the
//! concern of the excluded profile layer, not this registry.

mod rate_limit;
mod store;
mod words;

pub use rate_limit::RateLimiter;
pub use store::{SessionHandle, SessionStore};
pub use words::normalize_word;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use parley_shared::{FeedbackResponse, TurnDto, TurnRole};

/// Retention cap for the transcript. Oldest turns are dropped first.
pub const MAX_MESSAGES: usize = 200;

/// How many recent turns are handed to prompt assembly.
pub const HISTORY_WINDOW: usize = 24;

/// Default preset for a fresh session.
pub const DEFAULT_PRESET: &str = "Cafe";

/// Conversation difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    /// Total coercion from any client-supplied value.
    ///
    /// Accepts the canonical strings, plus the legacy numeric encoding
    /// (0/1/2) older clients still send. Anything else maps to the
    /// default tier; invalid input is never an error.
    pub fn coerce(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => match s.as_str() {
                "easy" => Self::Easy,
                "medium" => Self::Medium,
                "hard" => Self::Hard,
                _ => Self::default(),
            },
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(0) => Self::Easy,
                Some(1) => Self::Medium,
                Some(2) => Self::Hard,
                _ => Self::default(),
            },
            _ => Self::default(),
        }
    }
}

/// One recorded conversation turn.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn to_dto(&self) -> TurnDto {
        TurnDto {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Server-side state for one practice run.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub language: Option<String>,
    pub scenario_preset: String,
    pub scenario_custom: String,
    pub scenario_role: String,
    pub scenario_start: String,
    pub difficulty: Difficulty,
    pub task: Option<String>,
    pub messages: Vec<Message>,
    /// Normalized word -> cached translation. Only additive.
    pub translation_cache: HashMap<String, String>,
    /// Most recent background feedback verdict, if any.
    pub last_feedback: Option<FeedbackResponse>,
    /// Set once the task-completion evaluator judges the task done.
    pub task_completed: bool,
}

impl Session {
    pub fn new(id: String) -> Self {
        Self {
            id,
            language: None,
            scenario_preset: DEFAULT_PRESET.to_string(),
            scenario_custom: String::new(),
            scenario_role: String::new(),
            scenario_start: String::new(),
            difficulty: Difficulty::default(),
            task: None,
            messages: Vec::new(),
            translation_cache: HashMap::new(),
            last_feedback: None,
            task_completed: false,
        }
    }

    /// Last assistant line, used as context for feedback evaluation.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == TurnRole::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// Accept a language value only if it looks like one.
///
/// Implausible updates are ignored rather than rejected so a single bad
/// payload cannot corrupt a session other requests are using.
pub fn is_plausible_language(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > 50 || trimmed.chars().count() < 2 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("http") {
        return false;
    }
    !trimmed.chars().all(|c| c.is_ascii_digit())
}
