//! Hint generation: what the learner should try saying next.

use std::sync::Arc;

use parley_shared::TurnDto;

use crate::infrastructure::ports::{ChatMessage, CompletionPort, LlmError};
use crate::infrastructure::tolerant_json;

/// How many trailing turns inform the suggestion.
const HISTORY_WINDOW: usize = 6;

pub struct GenerateSuggestion {
    llm: Arc<dyn CompletionPort>,
}

impl GenerateSuggestion {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        Self { llm }
    }

    pub async fn execute(
        &self,
        language: &str,
        scenario: Option<&str>,
        messages: &[TurnDto],
    ) -> Result<String, LlmError> {
        let system = "You are a language learning coach. Based on the scenario and conversation so far, suggest ONE specific conversational response or phrase that the user should practice saying next. Make it relevant to the current conversation context and scenario. Keep it concise (1 short sentence, max 15 words) and natural. Focus on what they should actually say in the conversation, not learning goals.";

        let history = if messages.is_empty() {
            "No conversation started yet".to_string()
        } else {
            let skip = messages.len().saturating_sub(HISTORY_WINDOW);
            messages[skip..]
                .iter()
                .map(|turn| {
                    let role = match turn.role {
                        parley_shared::TurnRole::User => "user",
                        parley_shared::TurnRole::Assistant => "assistant",
                    };
                    format!("{role}: {}", turn.content)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let context = format!(
            "Language: {language}\nScenario: {}\nConversation so far:\n{history}\n\nWhat should they practice next?",
            scenario.unwrap_or("Unknown")
        );

        let reply = self
            .llm
            .complete(vec![ChatMessage::system(system), ChatMessage::user(context)])
            .await?;
        Ok(tolerant_json::first_line(&reply).to_string())
    }
}
