//! Example-sentence generation for one vocabulary word.

use std::sync::Arc;

use serde::Deserialize;

use crate::infrastructure::ports::{ChatMessage, CompletionPort, LlmError};
use crate::infrastructure::tolerant_json;

#[derive(Debug, Deserialize)]
struct RawExamples {
    lines: Option<Vec<String>>,
}

pub struct GenerateExamples {
    llm: Arc<dyn CompletionPort>,
}

impl GenerateExamples {
    pub fn new(llm: Arc<dyn CompletionPort>) -> Self {
        Self { llm }
    }

    pub async fn execute(&self, language: &str, word: &str) -> Result<Vec<String>, LlmError> {
        let system = [
            "Generate example sentences for a single vocabulary word.",
            "Use the target language for all sentences.",
            "Provide 3 to 4 short, natural sentences using the word in different forms or roles.",
            "Format each line as: form: sentence",
            "Return only JSON: {\"lines\": [\"form: sentence\", \"form2: sentence\"]}",
        ]
        .join(" ");

        let reply = self
            .llm
            .complete(vec![
                ChatMessage::system(system),
                ChatMessage::user(format!("Target language: {language}\nWord: {word}")),
            ])
            .await?;

        Ok(tolerant_json::decode::<RawExamples>(&reply)
            .and_then(|raw| raw.lines)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockCompletionPort;

    #[tokio::test]
    async fn parses_lines_from_json_reply() {
        let mut mock = MockCompletionPort::new();
        mock.expect_complete().returning(|_| {
            Ok(r#"{"lines":["singular: La maison est grande.","plural: Les maisons sont grandes."]}"#
                .to_string())
        });
        let generate = GenerateExamples::new(Arc::new(mock));
        let lines = generate.execute("French", "maison").await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("singular:"));
    }

    #[tokio::test]
    async fn garbage_reply_yields_empty_list() {
        let mut mock = MockCompletionPort::new();
        mock.expect_complete()
            .returning(|_| Ok("sorry, no can do".to_string()));
        let generate = GenerateExamples::new(Arc::new(mock));
        let lines = generate.execute("French", "maison").await.unwrap();
        assert!(lines.is_empty());
    }
}
