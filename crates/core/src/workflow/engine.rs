use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::intent::Intent;
use crate::workflow::states::{RouterContext, RouterEvent, RouterState, TransitionOutcome};

/// The routing state machine. Holds no per-run state; a run is a fold of
/// events over `apply`, starting from `initial_state`.
#[derive(Clone, Debug, Default)]
pub struct RouterEngine {
    context: RouterContext,
}

impl RouterEngine {
    pub fn new(context: RouterContext) -> Self {
        Self { context }
    }

    pub fn initial_state(&self) -> RouterState {
        RouterState::Start
    }

    pub fn context(&self) -> &RouterContext {
        &self.context
    }

    pub fn apply(
        &self,
        current: RouterState,
        event: &RouterEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        transition(current, event, &self.context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: RouterState,
        event: &RouterEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "router.transition_applied",
                        AuditCategory::Routing,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("reason", outcome.reason.clone()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "router.transition_rejected",
                        AuditCategory::Routing,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition {
        state: RouterState,
        event: RouterEvent,
    },
}

/// The complete transition table. The confidence gate lives here, not in
/// the classifier: any confidence below the threshold routes to CLARIFY
/// regardless of the classified intent.
fn transition(
    current: RouterState,
    event: &RouterEvent,
    context: &RouterContext,
) -> Result<TransitionOutcome, TransitionError> {
    use RouterEvent::{
        CandidateProduced, Classified, ClarificationComposed, ExecutionFinished, FaultIntercepted,
        FeasibilityAssessed, ReplyComposed, Started, SummaryComposed, VerdictReached,
    };
    use RouterState::{
        Clarify, Classify, Converse, Done, Execute, Feasibility, Generate, Start, Summarize,
        Validate,
    };

    let (to, reason) = match (current, event) {
        (Start, Started) => (Classify, "run started".to_string()),
        (Classify, Classified { intent, confidence }) => {
            if *confidence < context.confidence_threshold {
                (
                    Clarify,
                    format!(
                        "confidence {confidence:.2} below threshold {:.2}",
                        context.confidence_threshold
                    ),
                )
            } else {
                match intent {
                    Intent::DataQuery => (
                        Feasibility,
                        format!("data_query intent at confidence {confidence:.2}"),
                    ),
                    Intent::Conversation => (
                        Converse,
                        format!("conversation intent at confidence {confidence:.2}"),
                    ),
                    Intent::Unclear => (
                        Clarify,
                        format!("unclear intent at confidence {confidence:.2}"),
                    ),
                }
            }
        }
        (Feasibility, FeasibilityAssessed { feasible: true, detail }) => {
            (Generate, format!("feasible; {detail}"))
        }
        (Feasibility, FeasibilityAssessed { feasible: false, detail }) => {
            (Clarify, format!("infeasible; {detail}"))
        }
        (Generate, CandidateProduced { generated: true }) => {
            (Validate, "candidate SQL produced".to_string())
        }
        (Generate, CandidateProduced { generated: false }) => (
            Validate,
            "generation produced no candidate; validation will reject".to_string(),
        ),
        (Validate, VerdictReached { valid: true, detail }) => {
            (Execute, format!("verdict valid; {detail}"))
        }
        (Validate, VerdictReached { valid: false, detail }) => {
            (Clarify, format!("verdict invalid; {detail}"))
        }
        (Execute, ExecutionFinished { ok: true, detail }) => {
            (Summarize, format!("execution succeeded; {detail}"))
        }
        (Execute, ExecutionFinished { ok: false, detail }) => {
            (Clarify, format!("execution failed; {detail}"))
        }
        (Summarize, SummaryComposed) => (Done, "summary composed".to_string()),
        (Converse, ReplyComposed) => (Done, "conversational reply composed".to_string()),
        (Clarify, ClarificationComposed) => (Done, "clarification composed".to_string()),
        // Any stage fault lands in CLARIFY; a sealed run cannot be reopened.
        (state, FaultIntercepted { stage, detail }) if state != Done => (
            Clarify,
            format!("fault intercepted in {}; {detail}", stage.as_str()),
        ),
        _ => {
            return Err(TransitionError::InvalidTransition {
                state: current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome {
        from: current,
        to,
        reason,
    })
}
