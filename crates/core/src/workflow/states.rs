use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Stations a run moves through. CONVERSE, CLARIFY, and SUMMARIZE are the
/// three terminal response states; DONE means the envelope is sealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    Start,
    Classify,
    Converse,
    Clarify,
    Feasibility,
    Generate,
    Validate,
    Execute,
    Summarize,
    Done,
}

impl RouterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterState::Start => "start",
            RouterState::Classify => "classify",
            RouterState::Converse => "converse",
            RouterState::Clarify => "clarify",
            RouterState::Feasibility => "feasibility",
            RouterState::Generate => "generate",
            RouterState::Validate => "validate",
            RouterState::Execute => "execute",
            RouterState::Summarize => "summarize",
            RouterState::Done => "done",
        }
    }
}

/// Everything a stage reports back to the router. Carrying the outcome in
/// the event keeps the transition table a pure function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RouterEvent {
    Started,
    Classified { intent: Intent, confidence: f64 },
    FeasibilityAssessed { feasible: bool, detail: String },
    CandidateProduced { generated: bool },
    VerdictReached { valid: bool, detail: String },
    ExecutionFinished { ok: bool, detail: String },
    SummaryComposed,
    ReplyComposed,
    ClarificationComposed,
    FaultIntercepted { stage: RouterState, detail: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterContext {
    pub confidence_threshold: f64,
}

impl Default for RouterContext {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
        }
    }
}

/// One recorded hop: where the run was, where it went, and why.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RouterState,
    pub to: RouterState,
    pub reason: String,
}
