pub mod audit;
pub mod config;
pub mod errors;
pub mod exec;
pub mod feasibility;
pub mod intent;
pub mod schema;
pub mod validator;
pub mod workflow;

pub use errors::{ApplicationError, DomainError, InterfaceError, StageFault};
pub use exec::{ExecutionFault, ExecutionResult, QueryPort, Row};
pub use feasibility::{FeasibilityMatcher, FeasibilityReport};
pub use intent::{recent_turns, Classification, Intent, IntentSignal, Turn, TurnRole};
pub use schema::{SchemaCache, SchemaColumn, SchemaSnapshot, SchemaTable};
pub use validator::{LimitPolicy, SqlValidator, ValidationVerdict};
pub use workflow::{
    new_request_id, AnsweredRun, ClarificationRun, ClarifyReason, ConversationRun, RouterContext,
    RouterEngine, RouterEvent, RouterState, RunEnvelope, RunOutcome, RunReport, RunRequest,
    TransitionError, TransitionOutcome,
};
