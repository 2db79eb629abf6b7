//! Run outcomes and the per-run response envelope.
//!
//! A finished run is one of exactly three shapes. Keeping them as distinct
//! variants (rather than one bag of optional fields) makes illegal
//! combinations, like an answered run without SQL, unrepresentable.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::exec::{ExecutionResult, Row};
use crate::intent::{Classification, Intent, Turn};
use crate::workflow::states::TransitionOutcome;

/// Short correlation id, printable in logs and returned to callers.
pub fn new_request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// One incoming question plus the session history it arrived with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunRequest {
    pub user_input: String,
    pub history: Vec<Turn>,
}

impl RunRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }
}

/// Why a run ended in clarification. Ordered by severity so that when
/// several apply, `max` picks the one worth telling the user about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyReason {
    Unclear,
    LowConfidence,
    Infeasible,
    InvalidSql,
    ExecutionFault,
}

impl ClarifyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClarifyReason::Unclear => "unclear",
            ClarifyReason::LowConfidence => "low_confidence",
            ClarifyReason::Infeasible => "infeasible",
            ClarifyReason::InvalidSql => "invalid_sql",
            ClarifyReason::ExecutionFault => "execution_fault",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnsweredRun {
    pub summary: String,
    pub sql: String,
    pub execution: ExecutionResult,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversationRun {
    pub reply: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClarificationRun {
    pub prompt: String,
    pub reason: ClarifyReason,
    /// SQL that was generated but never executed, when there was any.
    pub rejected_sql: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Answered(AnsweredRun),
    Conversation(ConversationRun),
    Clarification(ClarificationRun),
}

impl RunOutcome {
    /// Terminal state name reported in the envelope.
    pub fn path_taken(&self) -> &'static str {
        match self {
            RunOutcome::Answered(_) => "summarize",
            RunOutcome::Conversation(_) => "converse",
            RunOutcome::Clarification(_) => "clarify",
        }
    }

    pub fn response_text(&self) -> &str {
        match self {
            RunOutcome::Answered(run) => &run.summary,
            RunOutcome::Conversation(run) => &run.reply,
            RunOutcome::Clarification(run) => &run.prompt,
        }
    }
}

/// Everything the router hands back for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub request_id: String,
    pub outcome: RunOutcome,
    pub classification: Classification,
    pub transitions: Vec<TransitionOutcome>,
    /// Wall-clock time for the whole run, not just the query.
    pub elapsed: Duration,
}

/// Wire shape of a finished run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunEnvelope {
    pub response: String,
    pub sql: Option<String>,
    pub results: Option<Vec<Row>>,
    /// Warehouse query time in seconds; zero when no query ran.
    pub execution_time: f64,
    pub path_taken: String,
    pub error: Option<String>,
    pub intent: Intent,
    pub confidence: f64,
}

impl RunReport {
    pub fn envelope(&self) -> RunEnvelope {
        let (sql, results, execution_time, error) = match &self.outcome {
            RunOutcome::Answered(run) => (
                Some(run.sql.clone()),
                Some(run.execution.rows.clone()),
                run.execution.elapsed_secs(),
                None,
            ),
            RunOutcome::Conversation(_) => (None, None, 0.0, None),
            RunOutcome::Clarification(run) => {
                (run.rejected_sql.clone(), None, 0.0, run.error.clone())
            }
        };
        RunEnvelope {
            response: self.outcome.response_text().to_string(),
            sql,
            results,
            execution_time,
            path_taken: self.outcome.path_taken().to_string(),
            error,
            intent: self.classification.intent,
            confidence: self.classification.confidence,
        }
    }
}
