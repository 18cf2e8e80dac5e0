//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::ports::CompletionPort;
use crate::session::{RateLimiter, SessionStore};
use crate::use_cases::{
    self, ChatTurn, CheckTaskCompletion, EvaluateFeedback, GenerateExamples, GenerateSuggestion,
    GenerateTask,
};

/// Main application state.
///
/// Holds the session registry, the rate limiter, and all use cases.
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub sessions: Arc<SessionStore>,
    pub rate: Arc<RateLimiter>,
    pub use_cases: UseCases,
}

/// Container for all use cases, each wired to the shared completion port.
pub struct UseCases {
    pub chat: ChatTurn,
    pub feedback: Arc<EvaluateFeedback>,
    pub task_check: Arc<CheckTaskCompletion>,
    pub translate: use_cases::TranslateWord,
    pub task_gen: GenerateTask,
    pub vocab: use_cases::GenerateVocabList,
    pub suggest: GenerateSuggestion,
    pub examples: GenerateExamples,
}

impl App {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let rate = Arc::new(RateLimiter::new());

        let feedback = Arc::new(EvaluateFeedback::new(llm.clone()));
        let task_check = Arc::new(CheckTaskCompletion::new(llm.clone()));
        let chat = ChatTurn::new(
            sessions.clone(),
            rate.clone(),
            llm.clone(),
            feedback.clone(),
            task_check.clone(),
        );

        Self {
            sessions: sessions.clone(),
            rate,
            use_cases: UseCases {
                chat,
                feedback,
                task_check,
                translate: use_cases::TranslateWord::new(sessions, llm.clone()),
                task_gen: GenerateTask::new(llm.clone()),
                vocab: use_cases::GenerateVocabList::new(llm.clone()),
                suggest: GenerateSuggestion::new(llm.clone()),
                examples: GenerateExamples::new(llm),
            },
        }
    }
}
