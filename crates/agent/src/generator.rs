//! Candidate SQL generation.

use std::sync::Arc;

use tracing::{debug, warn};

use tabletalk_core::schema::SchemaTable;

use crate::llm::LlmClient;
use crate::prompts;

/// Turns a request plus the feasible schema subset into one candidate
/// statement. The candidate is a proposal only; the validator decides
/// whether it runs. A missing candidate is reported as `None`, never as a
/// fabricated statement.
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, user_input: &str, subset: &[&SchemaTable]) -> Option<String> {
        let prompt = prompts::generate(user_input, subset);
        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(event_name = "generator.call_failed", error = %error, "model call failed; no candidate produced");
                return None;
            }
        };
        let candidate = prompts::clean_sql(&raw);
        if candidate.is_empty() {
            warn!(event_name = "generator.empty_candidate", raw_len = raw.len(), "model reply cleaned down to nothing");
            return None;
        }
        debug!(
            event_name = "generator.candidate_produced",
            sql_len = candidate.len(),
            "candidate SQL produced"
        );
        Some(candidate)
    }
}
