//! Result summarization.

use std::sync::Arc;

use tracing::{debug, warn};

use tabletalk_core::errors::StageFault;
use tabletalk_core::exec::ExecutionResult;

use crate::llm::LlmClient;
use crate::prompts;

const EMPTY_RESULT_MESSAGE: &str = "No matching records found.";

/// Narrates an execution result. The summary is never empty and never an
/// error: a zero-row result gets a fixed message without a model call, and
/// a summarization fault falls back to counting rows and columns.
pub struct ResultSummarizer {
    llm: Arc<dyn LlmClient>,
    max_chars: usize,
}

impl ResultSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, max_chars: usize) -> Self {
        Self { llm, max_chars }
    }

    pub async fn summarize(&self, user_input: &str, sql: &str, execution: &ExecutionResult) -> String {
        if execution.rows.is_empty() {
            return finish(EMPTY_RESULT_MESSAGE.to_string(), execution);
        }
        let prompt = prompts::summarize(user_input, sql, execution);
        let summary = match self.llm.complete(&prompt).await {
            Ok(raw) if !raw.trim().is_empty() => {
                let summary = prompts::enforce_char_budget(raw.trim(), self.max_chars);
                debug!(
                    event_name = "summarizer.summary_composed",
                    chars = summary.chars().count(),
                    "summary composed"
                );
                summary
            }
            Ok(_) => {
                let fault = StageFault::Summarization("the model returned an empty reply".to_string());
                warn!(event_name = "summarizer.call_failed", error = %fault, "falling back to the counted summary");
                fallback_summary(execution)
            }
            Err(error) => {
                let fault = StageFault::Summarization(error.to_string());
                warn!(event_name = "summarizer.call_failed", error = %fault, "falling back to the counted summary");
                fallback_summary(execution)
            }
        };
        finish(summary, execution)
    }
}

fn finish(mut summary: String, execution: &ExecutionResult) -> String {
    if execution.truncated {
        summary.push_str(&format!("\n\n(Showing first {} results)", execution.row_count));
    }
    summary
}

fn fallback_summary(execution: &ExecutionResult) -> String {
    let columns = execution.columns();
    if columns.is_empty() {
        format!("Found {} results", execution.row_count)
    } else {
        format!(
            "Found {} results with columns: {}",
            execution.row_count,
            columns.join(", ")
        )
    }
}
