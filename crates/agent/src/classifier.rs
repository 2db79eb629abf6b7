//! Intent classification.

use std::sync::Arc;

use tracing::{debug, warn};

use tabletalk_core::errors::StageFault;
use tabletalk_core::intent::{Classification, IntentSignal, Turn};
use tabletalk_core::schema::SchemaSnapshot;

use crate::llm::LlmClient;
use crate::prompts;

/// Asks the model which way a request should route. Classification never
/// fails the run: any fault degrades to an unclear signal at zero
/// confidence, which the gate turns into a clarification.
pub struct Classifier {
    llm: Arc<dyn LlmClient>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(
        &self,
        user_input: &str,
        history: &[Turn],
        snapshot: &SchemaSnapshot,
    ) -> Classification {
        let prompt = prompts::classify(user_input, history, snapshot);
        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                let fault = StageFault::Classification(error.to_string());
                warn!(event_name = "classifier.call_failed", error = %fault, "model call failed; treating intent as unclear");
                return Classification::degraded(fault.to_string());
            }
        };
        match parse_signal(&raw) {
            Some(signal) => {
                let classification = Classification::from_signal(signal);
                debug!(
                    event_name = "classifier.classified",
                    intent = classification.intent.as_str(),
                    confidence = classification.confidence,
                    "intent classified"
                );
                classification
            }
            None => {
                let fault =
                    StageFault::Classification("no parsable JSON object in the model reply".to_string());
                warn!(event_name = "classifier.unparsable_reply", error = %fault, raw_len = raw.len(), "discarding unparsable classification");
                Classification::degraded(fault.to_string())
            }
        }
    }
}

fn parse_signal(raw: &str) -> Option<IntentSignal> {
    let object = prompts::extract_json_object(raw)?;
    serde_json::from_str(object).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tabletalk_core::intent::{Intent, Turn};
    use tabletalk_core::schema::{SchemaSnapshot, SchemaTable};

    use crate::llm::testing::ScriptedClient;
    use crate::llm::LlmClient;

    use super::Classifier;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::from_tables(vec![SchemaTable::new("hr", "employees")])
    }

    #[tokio::test]
    async fn parses_a_plain_json_reply() {
        let client = Arc::new(ScriptedClient::replies(&[
            r#"{"intent": "data_query", "confidence": 0.92, "reasoning": "asks for rows"}"#,
        ]));
        let classifier = Classifier::new(client);
        let classification = classifier.classify("show 5 employees", &[], &snapshot()).await;

        assert_eq!(classification.intent, Intent::DataQuery);
        assert!((classification.confidence - 0.92).abs() < 1e-9);
        assert_eq!(classification.reasoning, "asks for rows");
    }

    #[tokio::test]
    async fn parses_json_wrapped_in_fences_and_prose() {
        let client = Arc::new(ScriptedClient::replies(&[
            "Sure, here you go:\n```json\n{\"intent\": \"conversation\", \"confidence\": 0.8}\n```",
        ]));
        let classifier = Classifier::new(client);
        let classification = classifier.classify("hello there", &[], &snapshot()).await;

        assert_eq!(classification.intent, Intent::Conversation);
        assert!((classification.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_labels_degrade_to_unclear() {
        let client = Arc::new(ScriptedClient::replies(&[
            r#"{"intent": "prophecy", "confidence": 0.99}"#,
        ]));
        let classifier = Classifier::new(client);
        let classification = classifier.classify("tell my future", &[], &snapshot()).await;

        assert_eq!(classification.intent, Intent::Unclear);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_zero_confidence() {
        let client = Arc::new(ScriptedClient::failing("connection refused"));
        let classifier = Classifier::new(client);
        let classification = classifier.classify("show employees", &[], &snapshot()).await;

        assert_eq!(classification.intent, Intent::Unclear);
        assert_eq!(classification.confidence, 0.0);
        assert!(classification.reasoning.contains("intent classification failed"));
        assert!(classification.reasoning.contains("connection refused"));
    }

    #[tokio::test]
    async fn unparsable_reply_degrades_to_zero_confidence() {
        let client = Arc::new(ScriptedClient::replies(&["I think it is a data query."]));
        let classifier = Classifier::new(client);
        let classification = classifier.classify("show employees", &[], &snapshot()).await;

        assert_eq!(classification.intent, Intent::Unclear);
        assert_eq!(classification.confidence, 0.0);
        assert!(classification.reasoning.contains("no parsable JSON object"));
    }

    #[tokio::test]
    async fn prompt_carries_history_and_schema() {
        let client = Arc::new(ScriptedClient::replies(&[
            r#"{"intent": "data_query", "confidence": 0.9}"#,
        ]));
        let classifier = Classifier::new(Arc::clone(&client) as Arc<dyn LlmClient>);
        let history = vec![Turn::user("earlier question")];
        classifier.classify("current question", &history, &snapshot()).await;

        let prompts = client.seen_prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("user: earlier question"));
        assert!(prompts[0].contains("hr.employees"));
        assert!(prompts[0].contains("Current query: current question"));
    }
}
