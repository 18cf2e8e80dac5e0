//! Task-completion judgement over a transcript window.

use std::sync::Arc;

use serde::Deserialize;

use parley_shared::TurnDto;

use crate::infrastructure::ports::{ChatMessage, CompletionPort};
use crate::infrastructure::tolerant_json;

/// How many trailing turns the judge sees.
const TRANSCRIPT_WINDOW: usize = 20;

/// Everything the judge needs to decide.
#[derive(Debug, Clone)]
pub struct CheckTaskInput {
    pub task: String,
    pub language: String,
    pub scenario_title: Option<String>,
    pub role_guide: Option<String>,
    pub messages: Vec<TurnDto>,
}

#[derive(Debug, Deserialize)]
struct RawCompletion {
    completed: Option<bool>,
}

/// Decide whether the user fully completed the current task.
///
/// Fails closed: any provider or parse failure resolves to `false`, so
/// completion is never falsely awarded.
pub struct CheckTaskCompletion {
    llm: Arc<dyn CompletionPort>,
}

impl CheckTaskCompletion {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        Self { llm }
    }

    pub async fn execute(&self, input: CheckTaskInput) -> bool {
        let turns = build_prompt(&input);

        let reply = match self.llm.complete(turns).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Task check failed, defaulting to not completed");
                return false;
            }
        };

        tolerant_json::decode::<RawCompletion>(&reply)
            .and_then(|raw| raw.completed)
            .unwrap_or(false)
    }
}

fn build_prompt(input: &CheckTaskInput) -> Vec<ChatMessage> {
    let system = [
        "You are a strict evaluator of task completion in a roleplay chat.",
        "Decide if the user has fully completed the task based on the conversation.",
        "The task must be fully completed; partial attempts are not enough.",
        "Return only JSON: {\"completed\": true|false}.",
        "No extra text.",
    ]
    .join(" ");

    let skip = input.messages.len().saturating_sub(TRANSCRIPT_WINDOW);
    let history = input.messages[skip..]
        .iter()
        .map(|turn| format!("{}: {}", role_label(turn), turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut context = vec![format!(
        "Scenario: {}",
        input.scenario_title.as_deref().unwrap_or("Unknown")
    )];
    if let Some(guide) = input.role_guide.as_deref().filter(|g| !g.is_empty()) {
        context.push(format!("Role guide: {guide}"));
    }
    context.push(format!("Target language: {}", input.language));
    context.push(format!("Task: {}", input.task));
    context.push("Conversation:".to_string());
    context.push(history);

    vec![
        ChatMessage::system(system),
        ChatMessage::user(context.join("\n")),
    ]
}

fn role_label(turn: &TurnDto) -> &'static str {
    match turn.role {
        parley_shared::TurnRole::User => "user",
        parley_shared::TurnRole::Assistant => "assistant",
    }
}
