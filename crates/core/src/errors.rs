use thiserror::Error;

use crate::workflow::outcome::ClarifyReason;
use crate::workflow::TransitionError;

/// A stage-level failure inside one run. Faults never escape the router;
/// they are converted into a clarification (or a degraded output for the
/// classifier and summarizer) and logged under the owning stage.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageFault {
    #[error("intent classification failed: {0}")]
    Classification(String),
    #[error("schema cannot satisfy the request: {0}")]
    Feasibility(String),
    #[error("SQL validation failed: {0}")]
    Validation(String),
    #[error("query timeout after {seconds}s")]
    ExecutionTimeout { seconds: u64 },
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error("result summarization failed: {0}")]
    Summarization(String),
}

impl StageFault {
    pub fn clarify_reason(&self) -> ClarifyReason {
        match self {
            StageFault::Classification(_) => ClarifyReason::Unclear,
            StageFault::Feasibility(_) => ClarifyReason::Infeasible,
            StageFault::Validation(_) => ClarifyReason::InvalidSql,
            StageFault::ExecutionTimeout { .. } | StageFault::Execution(_) => {
                ClarifyReason::ExecutionFault
            }
            StageFault::Summarization(_) => ClarifyReason::ExecutionFault,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("schema snapshot is empty")]
    EmptySnapshot,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("warehouse failure: {0}")]
    Warehouse(String),
    #[error("model provider failure: {0}")]
    Provider(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Warehouse(message) | ApplicationError::Provider(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
