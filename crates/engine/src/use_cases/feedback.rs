//! Grammar/naturalness feedback on the user's last message.

use std::sync::Arc;

use serde::Deserialize;

use parley_shared::{FeedbackResponse, FeedbackStatus};

use crate::infrastructure::ports::{ChatMessage, CompletionPort};
use crate::infrastructure::tolerant_json;

/// Judge one user message against the preceding assistant line.
///
/// Fails open: any provider or parse failure resolves to an "ok" verdict
/// with an empty correction, so a feedback hiccup never blocks the
/// conversation.
pub struct EvaluateFeedback {
    llm: Arc<dyn CompletionPort>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: Option<String>,
    corrected: Option<String>,
}

impl EvaluateFeedback {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        Self { llm }
    }

    pub async fn execute(
        &self,
        language: &str,
        user_message: &str,
        previous_assistant: Option<&str>,
    ) -> FeedbackResponse {
        let turns = build_prompt(language, user_message, previous_assistant);

        let reply = match self.llm.complete(turns).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Feedback evaluation failed, defaulting to ok");
                return ok_verdict();
            }
        };

        let Some(raw) = tolerant_json::decode::<RawVerdict>(&reply) else {
            tracing::warn!(reply_len = reply.len(), "Unparseable feedback reply, defaulting to ok");
            return ok_verdict();
        };

        match raw.status.as_deref() {
            Some("corrected") => FeedbackResponse {
                status: FeedbackStatus::Corrected,
                corrected: raw.corrected.unwrap_or_default().trim().to_string(),
            },
            Some("ok") => FeedbackResponse {
                status: FeedbackStatus::Ok,
                corrected: String::new(),
            },
            _ => ok_verdict(),
        }
    }
}

fn ok_verdict() -> FeedbackResponse {
    FeedbackResponse {
        status: FeedbackStatus::Ok,
        corrected: String::new(),
    }
}

fn build_prompt(
    language: &str,
    user_message: &str,
    previous_assistant: Option<&str>,
) -> Vec<ChatMessage> {
    let system = [
        "You are a language coach helping learners improve their language skills.".to_string(),
        format!("Target language: {language}."),
        "Analyze the user's message for grammar, vocabulary, and natural phrasing.".to_string(),
        "IMPORTANT: Ignore punctuation marks and capitalization completely when deciding if correction is needed.".to_string(),
        "Provide corrections when you see: spelling errors, grammar mistakes, missing words, unnatural phrasing, wrong vocabulary.".to_string(),
        "DO NOT correct just for: 'hello' vs 'Hello' vs 'hello!', missing periods, question marks, etc.".to_string(),
        "If the message is perfectly correct in grammar/vocabulary (ignoring punctuation/case), respond with status 'ok'.".to_string(),
        "If ANY improvement is needed, respond with status 'corrected' and provide exactly one natural, improved version.".to_string(),
        "FORMAT the corrected text using markdown: put **bold** around the parts that were changed or corrected.".to_string(),
        "Return only JSON, no extra text.".to_string(),
        "Schema: {\"status\":\"ok\"|\"corrected\",\"corrected\":\"\"}.".to_string(),
        "The corrected text must be in the target language and natural.".to_string(),
    ]
    .join(" ");

    let previous = previous_assistant
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("(none)");

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "Previous assistant message: {previous}\nUser message: {user_message}"
        )),
    ]
}
