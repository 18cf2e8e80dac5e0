//! Single-word translation with per-session caching.

use std::sync::Arc;

use crate::infrastructure::ports::{ChatMessage, CompletionPort, LlmError};
use crate::session::{normalize_word, SessionHandle, SessionStore};

/// Characters of sentence context kept on each side of the word.
const CONTEXT_RADIUS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Missing word")]
    MissingWord,
    #[error("Translation failed: {0}")]
    Provider(#[from] LlmError),
}

/// Result of a translation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub translation: String,
    /// True when served from the session cache without a model call.
    pub cached: bool,
}

/// Translate one word to English, consulting the session cache first.
///
/// Unlike the background evaluators this surfaces provider failures:
/// guessing a translation would be worse than admitting the miss.
pub struct TranslateWord {
    sessions: Arc<SessionStore>,
    llm: Arc<dyn CompletionPort>,
}

impl TranslateWord {
    pub fn new(sessions: Arc<SessionStore>, llm: Arc<dyn CompletionPort>) -> Self {
        Self { sessions, llm }
    }

    pub async fn execute(
        &self,
        handle: &SessionHandle,
        word: &str,
        sentence: Option<&str>,
    ) -> Result<Translation, TranslateError> {
        let clean_word = word.trim();
        if clean_word.is_empty() {
            return Err(TranslateError::MissingWord);
        }

        let cache_key = normalize_word(clean_word);
        if let Some(hit) = self.sessions.get_translation(handle, &cache_key).await {
            return Ok(Translation {
                translation: hit,
                cached: true,
            });
        }

        let turns = build_prompt(clean_word, sentence);
        let reply = self.llm.complete_constrained(turns).await?;
        let translation = clean_reply(&reply, clean_word);

        self.sessions
            .set_translation(handle, &cache_key, &translation)
            .await;

        Ok(Translation {
            translation,
            cached: false,
        })
    }
}

fn build_prompt(word: &str, sentence: Option<&str>) -> Vec<ChatMessage> {
    let system = [
        "You are a fast translator.",
        "Translate ONLY the single word provided to English.",
        "Use the sentence ONLY as context; do NOT translate the sentence.",
        "Return only the translated word or short phrase (1-4 words).",
        "No punctuation, no extra text, no explanations.",
    ]
    .join(" ");

    let context = match sentence.and_then(|s| context_window(s, word)) {
        Some(window) => format!("Word: \"{word}\"\nContext sentence: \"{window}\""),
        None => format!("Word: \"{word}\""),
    };

    vec![ChatMessage::system(system), ChatMessage::user(context)]
}

/// Truncate the sentence to a small window around the word, for latency.
/// Returns None when the word does not occur in the sentence.
fn context_window(sentence: &str, word: &str) -> Option<String> {
    let lower_word = word.to_lowercase();
    let word_chars = word.chars().count();
    let chars: Vec<char> = sentence.chars().collect();

    // Match case-insensitively against the original characters, so the
    // offsets stay valid even when lowercasing changes byte lengths.
    let char_pos = (0..chars.len()).find(|&i| {
        i + word_chars <= chars.len()
            && chars[i..i + word_chars]
                .iter()
                .collect::<String>()
                .to_lowercase()
                == lower_word
    })?;

    let start = char_pos.saturating_sub(CONTEXT_RADIUS);
    let end = (char_pos + word_chars + CONTEXT_RADIUS).min(chars.len());
    Some(chars[start..end].iter().collect())
}

/// Aggressively reduce the model reply to a single short gloss.
fn clean_reply(reply: &str, fallback: &str) -> String {
    let first_line = reply.lines().next().unwrap_or("").trim();
    let unquoted = first_line
        .trim_start_matches(['"', '\''])
        .trim_end_matches(['"', '\''])
        .trim_start_matches(['*', '-'])
        .trim();
    let before_punct = unquoted
        .split([',', '.', '!', '?', ';', ':'])
        .next()
        .unwrap_or("")
        .trim();

    if !before_punct.is_empty() {
        before_punct.to_string()
    } else if !first_line.is_empty() {
        first_line.to_string()
    } else {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockCompletionPort;

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let sessions = Arc::new(SessionStore::new());
        let handle = sessions.create(None);

        let mut mock = MockCompletionPort::new();
        // The provider must be called exactly once for two lookups.
        mock.expect_complete_constrained()
            .times(1)
            .returning(|_| Ok("house".to_string()));
        let translate = TranslateWord::new(sessions, Arc::new(mock));

        let first = translate.execute(&handle, "maison", None).await.unwrap();
        assert_eq!(first.translation, "house");
        assert!(!first.cached);

        let second = translate.execute(&handle, "Maison!", None).await.unwrap();
        assert_eq!(second.translation, "house");
        assert!(second.cached);
    }

    #[tokio::test]
    async fn empty_word_is_rejected_before_any_call() {
        let sessions = Arc::new(SessionStore::new());
        let handle = sessions.create(None);
        let translate = TranslateWord::new(sessions, Arc::new(MockCompletionPort::new()));
        assert!(matches!(
            translate.execute(&handle, "   ", None).await,
            Err(TranslateError::MissingWord)
        ));
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced() {
        let sessions = Arc::new(SessionStore::new());
        let handle = sessions.create(None);
        let mut mock = MockCompletionPort::new();
        mock.expect_complete_constrained()
            .returning(|_| Err(LlmError::RequestFailed("down".into())));
        let translate = TranslateWord::new(sessions, Arc::new(mock));
        assert!(matches!(
            translate.execute(&handle, "maison", None).await,
            Err(TranslateError::Provider(_))
        ));
    }

    #[test]
    fn context_window_truncates_around_the_word() {
        let sentence = format!("{}maison{}", "a".repeat(80), "b".repeat(80));
        let window = context_window(&sentence, "maison").unwrap();
        assert_eq!(window.chars().count(), 50 + 6 + 50);
        assert!(window.contains("maison"));
    }

    #[test]
    fn context_window_survives_case_folding_that_changes_byte_length() {
        // 'İ' lowercases to a two-character sequence, which would shift
        // every offset computed on a lowercased copy of the sentence.
        let sentence = format!("{}maison{}", "İ".repeat(60), "b".repeat(60));
        let window = context_window(&sentence, "maison").unwrap();
        assert!(window.contains("maison"));
        assert_eq!(window.chars().count(), 50 + 6 + 50);
    }

    #[test]
    fn context_window_is_case_insensitive() {
        assert!(context_window("La Maison est belle", "maison").is_some());
        assert!(context_window("rien ici", "maison").is_none());
    }

    #[test]
    fn clean_reply_strips_quotes_bullets_and_trailing_clauses() {
        assert_eq!(clean_reply("\"house\"", "x"), "house");
        assert_eq!(clean_reply("- house, a dwelling", "x"), "house");
        assert_eq!(clean_reply("house.\nMore detail", "x"), "house");
        assert_eq!(clean_reply("", "maison"), "maison");
    }
}
