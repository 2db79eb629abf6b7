pub mod engine;
pub mod outcome;
pub mod states;

pub use engine::{RouterEngine, TransitionError};
pub use outcome::{
    new_request_id, AnsweredRun, ClarificationRun, ClarifyReason, ConversationRun, RunEnvelope,
    RunOutcome, RunReport, RunRequest,
};
pub use states::{RouterContext, RouterEvent, RouterState, TransitionOutcome};
