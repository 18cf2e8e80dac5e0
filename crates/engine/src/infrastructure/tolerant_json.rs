//! Tolerant decoding of model-generated replies.
//!
//! Provider output is untrusted free text that is only usually well-formed
//! JSON. Every evaluator decodes through the same fallback order: strict
//! parse, then the first-`{`-to-last-`}` span, then the caller's safe
//! default (signalled here by `None`).

use serde::de::DeserializeOwned;

/// Decode a JSON-shaped reply, tolerating prose around the JSON block.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return Some(value);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<T>(&raw[start..=end]).ok()
}

/// First line of a reply, trimmed. For generators whose contract is a
/// single sentence but whose output sometimes rambles on.
pub fn first_line(raw: &str) -> &str {
    raw.lines().next().unwrap_or("").trim()
}
