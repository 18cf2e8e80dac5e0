//! Built-in per-preset roleplay guidance.
//!
//! Each known preset carries a default role guide (how the partner
//! behaves) and an opening prompt (how the partner starts the scene).
//! Sessions may override both; unknown presets fall through to generic
//! guidance so prompt assembly stays total.

/// Sentinel preset meaning the session's free-text scenario is the whole
/// description.
pub const CUSTOM_PRESET: &str = "Custom";

/// Default role guide for a preset.
pub fn role_guide_for_preset(preset: &str, custom: &str) -> String {
    match preset {
        "Cafe" => "Role: barista. Keep it brief and transactional. Open with the most common service line in the target language (not a literal translation). Ask about size, milk, and payment. Avoid small talk unless the user starts it.".to_string(),
        "Restaurant" => "Role: waiter. Keep it professional and concise. Open with a standard restaurant opener in the target language (not a literal translation). Offer menus or specials, confirm the order, and check on preferences.".to_string(),
        "Store" => "Role: shop clerk. Keep it short and helpful. Open with a standard help offer in the target language (not a literal translation). Focus on items, sizes, prices, and checkout.".to_string(),
        "Family gathering" => "Role: family member. Warm but not overly chatty. Start with a specific greeting tied to the gathering and ask a natural personal question.".to_string(),
        "Small talk" => "Role: casual acquaintance or stranger. Keep it light and brief. Use a simple opener and follow up with short, natural questions.".to_string(),
        "Travel" => "Role: local or travel staff. Be direct and helpful. Start by asking where the user needs to go or what help they need.".to_string(),
        "Job interview" => "Role: interviewer. Be professional and structured. Start with a standard opener and a first question about experience.".to_string(),
        "Dating" => "Role: date. Friendly, natural, and concise. Start with a brief greeting and a simple question to get to know them.".to_string(),
        "School" => "Role: classmate. Casual and concise. Start with a school-related opener and keep the tone friendly.".to_string(),
        "Doctor" => "Role: doctor. Calm and concise. Start with \"What brings you in today?\" and ask about symptoms.".to_string(),
        "Airport and customs" => "Role: customs officer. Direct and formal. Start with a question about purpose of travel and documents.".to_string(),
        _ => {
            if custom.trim().is_empty() {
                "Role: casual conversation partner. Ask what situation the user wants to practice."
                    .to_string()
            } else {
                format!(
                    "Role: pick the most realistic role for this situation ({}). Start with a natural opener that fits that role.",
                    custom.trim()
                )
            }
        }
    }
}

/// Default opening-line instruction for a preset.
pub fn start_prompt_for_preset(preset: &str) -> &'static str {
    match preset {
        "Cafe" => "Start with the most common short barista opener in the target language. Example (translate): \"Hi, what can I get you?\"",
        "Restaurant" => "Start with a standard waiter opener in the target language. Example (translate): \"Table for one or two?\" or \"Are you ready to order?\"",
        "Store" => "Start with a standard shop clerk opener in the target language. Example (translate): \"Hi, can I help you find something?\"",
        "Family gathering" => "Start with a warm, specific greeting tied to the gathering. Example (translate): \"Hey, glad you made it. How was the trip?\"",
        "Small talk" => "Start with a light, casual opener. Example (translate): \"Hi. Busy day?\"",
        "Travel" => "Start by offering help. Example (translate): \"Hi, where do you need to go?\"",
        "Job interview" => "Start professionally. Example (translate): \"Thanks for coming in. Can you tell me about yourself?\"",
        "Dating" => "Start with a friendly greeting. Example (translate): \"Hi, nice to meet you. How are you?\"",
        "School" => "Start with a school-related opener. Example (translate): \"Hey, did you finish the assignment?\"",
        "Doctor" => "Start with a clinical opener. Example (translate): \"What brings you in today?\"",
        "Airport and customs" => "Start with a direct customs question. Example (translate): \"What is the purpose of your visit?\"",
        _ => "Start with a realistic opener for the role implied by the scenario. Keep it brief.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_presets_have_specific_guides() {
        assert!(role_guide_for_preset("Cafe", "").contains("barista"));
        assert!(role_guide_for_preset("Doctor", "").contains("doctor"));
        assert!(start_prompt_for_preset("Job interview").contains("professionally"));
    }

    #[test]
    fn unknown_preset_falls_back_to_generic_guidance() {
        let guide = role_guide_for_preset("Spaceport", "");
        assert!(guide.contains("conversation partner"));
        assert!(start_prompt_for_preset("Spaceport").contains("realistic opener"));
    }

    #[test]
    fn custom_preset_uses_the_custom_text() {
        let guide = role_guide_for_preset(CUSTOM_PRESET, "returning a broken phone");
        assert!(guide.contains("returning a broken phone"));
    }
}
