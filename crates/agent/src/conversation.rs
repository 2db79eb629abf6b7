//! Conversational and clarification replies.

use std::sync::Arc;

use tracing::warn;

use tabletalk_core::intent::Turn;
use tabletalk_core::schema::SchemaSnapshot;
use tabletalk_core::workflow::ClarifyReason;

use crate::llm::LlmClient;
use crate::prompts;

/// Tables suggested in the canned clarification.
const SUGGESTED_TABLE_CAP: usize = 5;

/// Composes the two reply flavors that end a run without SQL: small talk on
/// the converse path and guidance on the clarify path. Both degrade to fixed
/// text when the model is unavailable, so neither path can fail a run.
pub struct Conversationalist {
    llm: Arc<dyn LlmClient>,
}

impl Conversationalist {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn reply(&self, user_input: &str, history: &[Turn]) -> String {
        let prompt = prompts::converse(user_input, history);
        match self.llm.complete(&prompt).await {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            Ok(_) => {
                warn!(event_name = "conversation.empty_reply", "model returned an empty reply");
                degraded_reply("the model returned an empty reply")
            }
            Err(error) => {
                warn!(event_name = "conversation.call_failed", error = %error, "model call failed");
                degraded_reply(&error.to_string())
            }
        }
    }

    pub async fn clarify(
        &self,
        user_input: &str,
        reason: ClarifyReason,
        error: Option<&str>,
        snapshot: &SchemaSnapshot,
    ) -> String {
        let prompt = prompts::clarify(user_input, reason, error, snapshot);
        match self.llm.complete(&prompt).await {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            Ok(_) => {
                warn!(
                    event_name = "conversation.empty_clarification",
                    reason = reason.as_str(),
                    "model returned an empty clarification"
                );
                canned_clarification(snapshot)
            }
            Err(model_error) => {
                warn!(
                    event_name = "conversation.clarify_failed",
                    reason = reason.as_str(),
                    error = %model_error,
                    "model call failed"
                );
                canned_clarification(snapshot)
            }
        }
    }
}

fn degraded_reply(detail: &str) -> String {
    format!("I apologize, but I encountered an error: {detail}. Please try again.")
}

fn canned_clarification(snapshot: &SchemaSnapshot) -> String {
    let mut text =
        "I'm not quite sure what you're looking for. Could you please be more specific?".to_string();
    if !snapshot.is_empty() {
        let mut names = snapshot.table_names();
        names.truncate(SUGGESTED_TABLE_CAP);
        text.push_str(&format!(
            "\n\nFor example, you could ask about data from these tables: {}",
            names.join(", ")
        ));
    }
    text
}
