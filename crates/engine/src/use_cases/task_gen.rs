//! Practice-task generation for a scenario.

use std::sync::Arc;

use parley_shared::GenerateTaskRequest;

use crate::infrastructure::ports::{ChatMessage, CompletionPort, LlmError};
use crate::infrastructure::tolerant_json;

/// How many previous tasks are carried into the avoid list.
const AVOID_WINDOW: usize = 8;

pub struct GenerateTask {
    llm: Arc<dyn CompletionPort>,
}

impl GenerateTask {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        Self { llm }
    }

    pub async fn execute(&self, request: &GenerateTaskRequest) -> Result<String, LlmError> {
        let reply = self.llm.complete(build_prompt(request)).await?;
        Ok(tolerant_json::first_line(&reply).to_string())
    }
}

fn build_prompt(request: &GenerateTaskRequest) -> Vec<ChatMessage> {
    let system = [
        "You create a single, realistic task for a language practice roleplay.",
        "Return exactly ONE short imperative sentence (max 12 words).",
        "Write the task in English only.",
        "Do NOT translate the task into the target language.",
        "Use only ASCII letters, numbers, spaces, and basic punctuation.",
        "Keep it concrete and plausible for the scenario.",
        "Avoid repeating the tasks in the avoid list.",
        "Use simple, common words suitable for language learners.",
        "The task is for the learner's role, not the staff role.",
        "Output only the task sentence, no quotes or extra text.",
    ]
    .join(" ");

    let avoid = if request.previous_tasks.is_empty() {
        "None".to_string()
    } else {
        let skip = request.previous_tasks.len().saturating_sub(AVOID_WINDOW);
        request.previous_tasks[skip..]
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut context = vec![format!("Scenario: {}", request.scenario_title)];
    if let Some(subtitle) = request.scenario_subtitle.as_deref() {
        context.push(format!("Scenario detail: {subtitle}"));
    }
    if let Some(guide) = request.role_guide.as_deref() {
        context.push(format!("Role guide: {guide}"));
    }
    context.push(format!(
        "Learner role: {}",
        request.user_role.as_deref().unwrap_or("guest/customer")
    ));
    if let Some(difficulty) = request.difficulty.as_deref() {
        context.push(format!("Difficulty: {difficulty}"));
    }
    context.push(format!("Avoid tasks:\n{avoid}"));

    vec![
        ChatMessage::system(system),
        ChatMessage::user(context.join("\n")),
    ]
}
