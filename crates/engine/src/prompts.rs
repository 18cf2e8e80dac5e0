//! Prompt assembly.
//!
//! Pure functions from a [`Session`] snapshot to instruction text. Every
//! function is total: missing or odd session fields fall back to sensible
//! defaults instead of producing partial output.

use crate::scenarios::{self, CUSTOM_PRESET};
use crate::session::{Difficulty, Session};

/// End-of-reply marker the model appends when the scene calls for one
/// more assistant message without waiting for the user. Stripped before
/// the reply is shown or recorded.
pub const CONTINUE_MARKER: &str = "[[NEXT]]";

/// Fixed roleplay-discipline directives appended to every system prompt.
///
/// These keep the partner in character and the register learner-friendly
/// across all scenarios, so they are assembled unconditionally.
const DISCIPLINE_DIRECTIVES: &[&str] = &[
    "Keep responses concise by default (1-2 sentences). Avoid long monologues unless the user asks for more detail.",
    "Keep the conversation moving: end most replies with a short, relevant question.",
    "Do not correct the user's language or explain grammar unless they explicitly ask.",
    "Prefer the most common words and phrases used in daily life; avoid rare, academic, or poetic vocabulary.",
    "Use standard, neutral, everyday phrasing a native speaker would use; avoid literal translations from English.",
    "Help the user complete the task naturally without explicitly calling it a task or giving meta instructions.",
    "Avoid formal honorifics or ceremonial wording unless the user uses it first.",
    "Avoid old-fashioned or overly polite set phrases; use modern, common service language.",
    "Avoid slang, quirky expressions, or regionalisms; keep it simple and widely understood.",
    "Track what the user has already ordered or answered; do not ask for the same item twice. Ask only for missing details.",
    "CRITICAL: You are a REAL PERSON in this scenario. Never mention or imply you are AI, a language model, or an assistant.",
    "If the user says something absurd, confusing, or impossible - pretend it's normal and continue the conversation naturally.",
    "Make up reasonable details, lie convincingly, and stay in character NO MATTER WHAT to keep the role-play going.",
    "Respond as a real human would - with personality, emotions, and natural reactions.",
    "If confused, improvise creatively while staying in character - never break the illusion.",
    "IMPORTANT: Any scene descriptions or context shown are JUST INSTRUCTIONS for what the USER should practice. They are NOT part of the conversation. Do not reference them, acknowledge them, or treat them as dialogue. Focus only on natural conversation with the user.",
];

/// Human-readable scenario description for the session.
pub fn scenario_description(session: &Session) -> String {
    let custom = session.scenario_custom.trim();
    if session.scenario_preset == CUSTOM_PRESET && !custom.is_empty() {
        return custom.to_string();
    }
    if !custom.is_empty() {
        return format!("{}: {}", session.scenario_preset, custom);
    }
    session.scenario_preset.clone()
}

/// Session override or per-preset default role guide.
pub fn role_guide(session: &Session) -> String {
    let explicit = session.scenario_role.trim();
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    scenarios::role_guide_for_preset(&session.scenario_preset, &session.scenario_custom)
}

/// Session override or per-preset default opening-line instruction.
pub fn opening_line(session: &Session) -> String {
    let explicit = session.scenario_start.trim();
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    scenarios::start_prompt_for_preset(&session.scenario_preset).to_string()
}

fn difficulty_guide(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "ALWAYS use complete, grammatically correct sentences. Never use sentence fragments or incomplete thoughts. Use proper subject-verb agreement and basic sentence structure. Keep vocabulary simple and sentences short, but ensure every response is a complete, proper sentence that could appear in a textbook. Prefer the most common, everyday words; avoid rare or advanced vocabulary.",
        Difficulty::Medium => "Use medium-length sentences with natural, common vocabulary. Keep conversations understandable but engaging. Prefer everyday words over rare terms. Ask relevant questions.",
        Difficulty::Hard => "Use longer, more in-depth conversations with varied vocabulary and occasional idioms, but still prefer common, everyday words. Maintain natural pacing and ask thoughtful, engaging questions.",
    }
}

/// Compose the full system instruction for one turn.
pub fn system_instruction(session: &Session) -> String {
    let language = session.language.as_deref().unwrap_or("English");
    let scenario = scenario_description(session);

    let scenario_instruction = if scenario.is_empty() {
        "You are having a casual conversation. Ask what situation the user wants to practice."
            .to_string()
    } else {
        format!(
            "You are fully immersed in this scenario: {scenario}. Act as a real person in this situation - use appropriate behavior, emotions, and responses. Stay completely in character throughout the conversation. Respond naturally as someone actually in that situation would."
        )
    };

    let mut parts = vec![
        format!("You are a native speaker in {language}. Respond ONLY in {language}."),
        scenario_instruction,
        role_guide(session),
    ];
    if let Some(task) = session.task.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("Current task: {task}."));
    }
    parts.push(difficulty_guide(session.difficulty).to_string());
    parts.extend(DISCIPLINE_DIRECTIVES.iter().map(|d| d.to_string()));
    parts.push(format!(
        "RARELY, if the scene clearly calls for you to follow up immediately without waiting for the user (for example, coming back after checking on something), end your reply with {CONTINUE_MARKER}. Otherwise never include it."
    ));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let mut s = Session::new("sess_test".into());
        s.language = Some("French".into());
        s
    }

    #[test]
    fn scenario_description_prefers_custom_for_custom_preset() {
        let mut s = session();
        s.scenario_preset = CUSTOM_PRESET.into();
        s.scenario_custom = "returning a faulty kettle".into();
        assert_eq!(scenario_description(&s), "returning a faulty kettle");
    }

    #[test]
    fn scenario_description_prefixes_preset_to_custom_text() {
        let mut s = session();
        s.scenario_custom = "a busy morning rush".into();
        assert_eq!(scenario_description(&s), "Cafe: a busy morning rush");
    }

    #[test]
    fn role_guide_override_wins_over_preset_default() {
        let mut s = session();
        s.scenario_role = "Role: grumpy regular customer.".into();
        assert_eq!(role_guide(&s), "Role: grumpy regular customer.");
        s.scenario_role = "   ".into();
        assert!(role_guide(&s).contains("barista"));
    }

    #[test]
    fn opening_line_falls_back_to_preset_prompt() {
        let mut s = session();
        assert!(opening_line(&s).contains("barista opener"));
        s.scenario_start = "Open by asking about the weather.".into();
        assert_eq!(opening_line(&s), "Open by asking about the weather.");
    }

    #[test]
    fn system_instruction_pins_language_and_discipline() {
        let s = session();
        let prompt = system_instruction(&s);
        assert!(prompt.contains("Respond ONLY in French"));
        assert!(prompt.contains("Never mention or imply you are AI"));
        assert!(prompt.contains("end most replies with a short, relevant question"));
        assert!(prompt.contains(CONTINUE_MARKER));
    }

    #[test]
    fn system_instruction_includes_task_when_set() {
        let mut s = session();
        s.task = Some("Order a coffee and a croissant".into());
        assert!(system_instruction(&s).contains("Current task: Order a coffee and a croissant."));
        s.task = Some("  ".into());
        assert!(!system_instruction(&s).contains("Current task"));
    }

    #[test]
    fn system_instruction_is_total_over_defaults() {
        // A brand-new session with nothing set still yields a full prompt.
        let s = Session::new("sess_blank".into());
        let prompt = system_instruction(&s);
        assert!(prompt.contains("Respond ONLY in English"));
        assert!(prompt.contains("Cafe"));
    }

    #[test]
    fn difficulty_tiers_have_distinct_style_guides() {
        let mut s = session();
        s.difficulty = Difficulty::Easy;
        assert!(system_instruction(&s).contains("complete, grammatically correct sentences"));
        s.difficulty = Difficulty::Hard;
        assert!(system_instruction(&s).contains("occasional idioms"));
    }
}
