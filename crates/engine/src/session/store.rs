//! In-memory session registry.
//!
//! The store is a volatile cache by design: nothing is persisted, and a
//! process restart loses all sessions. `get_or_create` is the repair
//! mechanism that lets a client holding a stale id degrade gracefully to
//! a fresh session under the same key instead of hard-failing.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use parley_shared::{SessionSummary, TurnDto, TurnRole};

use super::{Message, Session, MAX_MESSAGES};

/// Shared handle to one session. The lock serializes appends per session
/// while leaving unrelated sessions free to proceed.
pub type SessionHandle = Arc<RwLock<Session>>;

/// Registry of all live sessions, keyed by opaque id.
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Allocate a session. A requested id registers idempotently: if a
    /// session already exists under that key, it is returned as-is.
    pub fn create(&self, requested_id: Option<&str>) -> SessionHandle {
        let id = match requested_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_session_id(),
        };
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(Session::new(id))))
            .clone()
    }

    /// Pure lookup; never creates.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Existing session, or a fresh one registered under the requested id.
    /// Returns `true` when the call created the session.
    pub fn get_or_create(&self, id: Option<&str>) -> (SessionHandle, bool) {
        if let Some(id) = id {
            if let Some(handle) = self.get(id) {
                return (handle, false);
            }
        }
        (self.create(id), true)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Append one turn with a server-assigned timestamp, dropping the
    /// oldest entries once the transcript exceeds the retention cap.
    /// One atomic read-modify-write under the session's write lock.
    pub async fn append_turn(&self, handle: &SessionHandle, role: TurnRole, content: &str) {
        let mut session = handle.write().await;
        session.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        if session.messages.len() > MAX_MESSAGES {
            let overflow = session.messages.len() - MAX_MESSAGES;
            session.messages.drain(..overflow);
        }
    }

    /// The last `window` turns in chronological order, flattened for
    /// prompt assembly.
    pub async fn recent_history(&self, handle: &SessionHandle, window: usize) -> Vec<TurnDto> {
        let session = handle.read().await;
        let skip = session.messages.len().saturating_sub(window);
        session.messages[skip..].iter().map(Message::to_dto).collect()
    }

    pub async fn get_translation(&self, handle: &SessionHandle, word_key: &str) -> Option<String> {
        let session = handle.read().await;
        session.translation_cache.get(word_key).cloned()
    }

    pub async fn set_translation(&self, handle: &SessionHandle, word_key: &str, value: &str) {
        let mut session = handle.write().await;
        session
            .translation_cache
            .insert(word_key.to_string(), value.to_string());
    }

    /// Compact wire view of a session.
    pub async fn summary(&self, handle: &SessionHandle) -> SessionSummary {
        let session = handle.read().await;
        SessionSummary {
            language: session.language.clone(),
            scenario_preset: session.scenario_preset.clone(),
            scenario_custom: session.scenario_custom.clone(),
            difficulty: session.difficulty.as_str().to_string(),
            task: session.task.clone(),
            messages: session.messages.iter().map(Message::to_dto).collect(),
            last_feedback: session.last_feedback.clone(),
            task_completed: session.task_completed,
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}
