//! Word-key normalization for the translation cache.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a word into a stable cache key.
///
/// Lowercases, canonically composes (NFC), and strips everything that is
/// not a letter, mark, digit, apostrophe, or hyphen. Idempotent.
pub fn normalize_word(word: &str) -> String {
    word.to_lowercase()
        .nfc()
        .filter(|c| c.is_alphanumeric() || is_combining_mark(*c) || *c == '\'' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_lowercases() {
        assert_eq!(normalize_word("Maison!"), "maison");
        assert_eq!(normalize_word("\"café\""), "café");
        assert_eq!(normalize_word("l'eau"), "l'eau");
        assert_eq!(normalize_word("grand-mère"), "grand-mère");
    }

    #[test]
    fn composes_decomposed_accents() {
        // "café" with a combining acute accent vs the precomposed form
        let decomposed = "cafe\u{0301}";
        assert_eq!(normalize_word(decomposed), normalize_word("café"));
    }

    #[test]
    fn is_idempotent() {
        for word in ["Café", "l'EAU", "¿qué?", "naïve", "über"] {
            let once = normalize_word(word);
            assert_eq!(normalize_word(&once), once);
        }
    }

    #[test]
    fn keeps_digits() {
        assert_eq!(normalize_word("A1!"), "a1");
    }
}
