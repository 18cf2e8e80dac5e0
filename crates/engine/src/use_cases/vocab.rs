//! Bounded vocabulary-list generation.

use std::sync::Arc;

use serde::Deserialize;

use parley_shared::{VocabItem, VocabListRequest};

use crate::infrastructure::ports::{ChatMessage, CompletionPort, LlmError};
use crate::infrastructure::tolerant_json;

/// Smallest list a caller can request.
const MIN_COUNT: usize = 5;

/// Largest list a caller can request.
const MAX_COUNT: usize = 30;

/// How many existing words are carried into the avoid list.
const AVOID_WINDOW: usize = 60;

#[derive(Debug, Deserialize)]
struct RawVocabList {
    items: Option<Vec<RawVocabItem>>,
}

#[derive(Debug, Deserialize)]
struct RawVocabItem {
    word: Option<String>,
    translation: Option<String>,
}

/// Generate practical, high-frequency vocabulary for a language/scenario.
pub struct GenerateVocabList {
    llm: Arc<dyn CompletionPort>,
}

impl GenerateVocabList {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        Self { llm }
    }

    pub async fn execute(&self, request: &VocabListRequest) -> Result<Vec<VocabItem>, LlmError> {
        // Out-of-range counts are clamped, never rejected.
        let count = (request.count.max(0) as usize).clamp(MIN_COUNT, MAX_COUNT);
        let reply = self.llm.complete(build_prompt(request, count)).await?;

        let items = tolerant_json::decode::<RawVocabList>(&reply)
            .and_then(|raw| raw.items)
            .unwrap_or_default();

        Ok(items
            .into_iter()
            .filter_map(|item| match (item.word, item.translation) {
                (Some(word), Some(translation)) if !word.is_empty() => Some(VocabItem {
                    word,
                    translation,
                }),
                _ => None,
            })
            .take(count)
            .collect())
    }
}

fn build_prompt(request: &VocabListRequest, count: usize) -> Vec<ChatMessage> {
    let system = [
        "Generate a compact list of common everyday words for language learners.".to_string(),
        format!("Return exactly {count} items."),
        "Each item must be JSON with keys word and translation.".to_string(),
        "Word must be in the target language, translation in English.".to_string(),
        "Choose practical, high-frequency vocabulary.".to_string(),
        "If a scenario is provided, bias toward words commonly used in that setting.".to_string(),
        "Avoid duplicates and avoid the words in the avoid list.".to_string(),
        "Output only JSON: {\"items\":[{\"word\":\"...\",\"translation\":\"...\"}]}".to_string(),
    ]
    .join(" ");

    let avoid = if request.existing.is_empty() {
        "None".to_string()
    } else {
        let skip = request.existing.len().saturating_sub(AVOID_WINDOW);
        request.existing[skip..]
            .iter()
            .map(|w| format!("- {w}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut context = vec![format!("Target language: {}", request.language)];
    if let Some(title) = request.scenario_title.as_deref() {
        context.push(format!("Scenario: {title}"));
    }
    if let Some(detail) = request.scenario_detail.as_deref() {
        context.push(format!("Scenario detail: {detail}"));
    }
    if let Some(guide) = request.role_guide.as_deref() {
        context.push(format!("Role guide: {guide}"));
    }
    if let Some(role) = request.user_role.as_deref() {
        context.push(format!("Learner role: {role}"));
    }
    context.push(format!("Avoid words:\n{avoid}"));

    vec![
        ChatMessage::system(system),
        ChatMessage::user(context.join("\n")),
    ]
}
