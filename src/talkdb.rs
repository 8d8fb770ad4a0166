use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use bantuai_backend::webhook::truthy_text;

use crate::api::StoreClient;

pub const SUGGESTED_QUESTIONS: [&str; 3] = [
    "Berapa total ticket yang open?",
    "Channel mana yang paling banyak digunakan?",
    "Ticket kategori apa yang paling sering muncul?",
];

#[async_trait]
pub trait TalkDbBackend: Send + Sync {
    async fn ask(&self, query: &str) -> Result<Value>;
}

#[async_trait]
impl TalkDbBackend for StoreClient {
    async fn ask(&self, query: &str) -> Result<Value> {
        self.ask_talkdb(query).await
    }
}

/// Answer text: a bare string, else the first truthy of `output`, `response`,
/// `answer`, else the payload pretty-printed.
pub fn extract_answer(payload: &Value) -> String {
    if let Value::String(text) = payload {
        return text.clone();
    }
    for key in ["output", "response", "answer"] {
        if let Some(text) = payload.get(key).and_then(truthy_text) {
            return text;
        }
    }
    serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct TalkDbExchange {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// Question/answer history, newest first.
pub struct TalkDbConsole<B: TalkDbBackend> {
    backend: B,
    history: Vec<TalkDbExchange>,
}

impl<B: TalkDbBackend> TalkDbConsole<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[TalkDbExchange] {
        &self.history
    }

    /// Blank questions are ignored. Failures are recorded as `Error: ...` answers.
    pub async fn ask(&mut self, question: &str) -> Option<&TalkDbExchange> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }
        let asked_at = Utc::now();
        let answer = match self.backend.ask(question).await {
            Ok(payload) => extract_answer(&payload),
            Err(error) => {
                tracing::warn!("Talk to DB query failed: {:#}", error);
                format!("Error: {}", error)
            }
        };
        self.history.insert(
            0,
            TalkDbExchange {
                question: question.to_string(),
                answer,
                asked_at,
            },
        );
        self.history.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;

    struct Scripted;

    #[async_trait]
    impl TalkDbBackend for Scripted {
        async fn ask(&self, query: &str) -> Result<Value> {
            if query.contains("rusak") {
                bail!("Request failed with status 500");
            }
            Ok(json!({"output": format!("Jawaban untuk: {}", query)}))
        }
    }

    #[test]
    fn answer_extraction_order() {
        assert_eq!(extract_answer(&json!("12 tiket")), "12 tiket");
        assert_eq!(
            extract_answer(&json!({"response": "r", "output": "o"})),
            "o"
        );
        assert_eq!(extract_answer(&json!({"answer": "a"})), "a");
        assert_eq!(
            extract_answer(&json!({"output": false, "response": 0, "answer": "ada 12"})),
            "ada 12"
        );
        assert_eq!(extract_answer(&json!({"output": "", "response": "x"})), "x");
        assert_eq!(
            extract_answer(&json!({"rows": [1]})),
            "{\n  \"rows\": [\n    1\n  ]\n}"
        );
    }

    #[tokio::test]
    async fn history_is_newest_first_and_errors_become_answers() {
        let mut console = TalkDbConsole::new(Scripted);
        assert!(console.ask("   ").await.is_none());

        console.ask("Berapa tiket open?").await.expect("answered");
        let failed = console.ask("query rusak").await.expect("recorded").clone();
        assert_eq!(failed.answer, "Error: Request failed with status 500");

        let questions: Vec<&str> = console
            .history()
            .iter()
            .map(|exchange| exchange.question.as_str())
            .collect();
        assert_eq!(questions, vec!["query rusak", "Berapa tiket open?"]);
        assert_eq!(
            console.history()[1].answer,
            "Jawaban untuk: Berapa tiket open?"
        );
    }
}
