//! The request router.
//!
//! One [`Router`] instance serves every request. Each run walks the state
//! machine in `tabletalk_core::workflow` from START to DONE, calling the
//! model-backed stages along the way and recording every transition it
//! takes. Whatever goes wrong mid-run, the caller still gets a finished
//! report; only a broken transition sequence surfaces as an error.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use tabletalk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use tabletalk_core::config::RouterSettings;
use tabletalk_core::errors::{ApplicationError, DomainError, StageFault};
use tabletalk_core::exec::{ExecutionFault, QueryPort};
use tabletalk_core::feasibility::FeasibilityMatcher;
use tabletalk_core::intent::recent_turns;
use tabletalk_core::schema::{SchemaCache, SchemaSnapshot};
use tabletalk_core::validator::{SqlValidator, ValidationVerdict};
use tabletalk_core::workflow::{
    new_request_id, AnsweredRun, ClarificationRun, ClarifyReason, ConversationRun, RouterContext,
    RouterEngine, RouterEvent, RouterState, RunOutcome, RunReport, RunRequest, TransitionOutcome,
};

use crate::classifier::Classifier;
use crate::conversation::Conversationalist;
use crate::generator::SqlGenerator;
use crate::llm::LlmClient;
use crate::summarizer::ResultSummarizer;

/// Confidence-gated NL to SQL router.
///
/// Holds no per-request state; concurrent runs share the same instance
/// behind an `Arc`.
pub struct Router {
    engine: RouterEngine,
    classifier: Classifier,
    matcher: FeasibilityMatcher,
    generator: SqlGenerator,
    validator: SqlValidator,
    executor: Arc<dyn QueryPort>,
    summarizer: ResultSummarizer,
    conversationalist: Conversationalist,
    schema: Arc<SchemaCache>,
    audit: Arc<dyn AuditSink>,
    settings: RouterSettings,
}

impl Router {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn QueryPort>,
        schema: Arc<SchemaCache>,
        audit: Arc<dyn AuditSink>,
        settings: RouterSettings,
    ) -> Self {
        let engine = RouterEngine::new(RouterContext {
            confidence_threshold: settings.confidence_threshold,
        });
        Self {
            engine,
            classifier: Classifier::new(Arc::clone(&llm)),
            matcher: FeasibilityMatcher::new(),
            generator: SqlGenerator::new(Arc::clone(&llm)),
            validator: SqlValidator::new(settings.on_missing_limit, settings.max_result_rows),
            executor,
            summarizer: ResultSummarizer::new(Arc::clone(&llm), settings.summary_max_chars),
            conversationalist: Conversationalist::new(llm),
            schema,
            audit,
            settings,
        }
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunReport, ApplicationError> {
        self.run_with_session(request, None).await
    }

    pub async fn run_with_session(
        &self,
        request: RunRequest,
        session_id: Option<String>,
    ) -> Result<RunReport, ApplicationError> {
        let started = Instant::now();
        let request_id = new_request_id();
        let audit_context = AuditContext::new(session_id, request_id.clone(), "router");
        let snapshot = self.schema.snapshot();

        info!(
            event_name = "router.run_started",
            correlation_id = %request_id,
            input_len = request.user_input.len(),
            "run started"
        );

        let mut driver = Driver::new(&self.engine, self.audit.as_ref(), &audit_context);
        driver.apply(RouterEvent::Started)?;

        let window = recent_turns(&request.history, self.settings.history_turns);
        let classification = self
            .classifier
            .classify(&request.user_input, window, &snapshot)
            .await;
        driver.apply(RouterEvent::Classified {
            intent: classification.intent,
            confidence: classification.confidence,
        })?;

        let outcome = match driver.state {
            RouterState::Feasibility => self.data_path(&request, &snapshot, &mut driver).await?,
            RouterState::Converse => {
                let reply = self.conversationalist.reply(&request.user_input, window).await;
                driver.apply(RouterEvent::ReplyComposed)?;
                RunOutcome::Conversation(ConversationRun { reply })
            }
            RouterState::Clarify => {
                // The gate outranks the label: a confidently unclear intent
                // clarifies for a different reason than a gated one.
                let reason = if classification.confidence < self.settings.confidence_threshold {
                    ClarifyReason::LowConfidence
                } else {
                    ClarifyReason::Unclear
                };
                self.clarification(&request, reason, None, None, &snapshot, &mut driver)
                    .await?
            }
            other => {
                return Err(DomainError::InvariantViolation(format!(
                    "classification left the router in {}",
                    other.as_str()
                ))
                .into());
            }
        };

        debug_assert_eq!(driver.state, RouterState::Done);

        info!(
            event_name = "router.run_completed",
            correlation_id = %request_id,
            path_taken = outcome.path_taken(),
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run completed"
        );
        self.audit.emit(
            AuditEvent::new(
                audit_context.session_id.clone(),
                request_id.clone(),
                "router.run_completed",
                AuditCategory::Routing,
                "router",
                AuditOutcome::Success,
            )
            .with_metadata("path_taken", outcome.path_taken())
            .with_metadata("intent", classification.intent.as_str()),
        );

        Ok(RunReport {
            request_id,
            outcome,
            classification,
            transitions: driver.transitions,
            elapsed: started.elapsed(),
        })
    }

    async fn data_path(
        &self,
        request: &RunRequest,
        snapshot: &SchemaSnapshot,
        driver: &mut Driver<'_>,
    ) -> Result<RunOutcome, ApplicationError> {
        if snapshot.is_empty() {
            let detail = DomainError::EmptySnapshot.to_string();
            driver.apply(RouterEvent::FaultIntercepted {
                stage: driver.state,
                detail: detail.clone(),
            })?;
            return self
                .clarification(
                    request,
                    ClarifyReason::Infeasible,
                    None,
                    Some(detail),
                    snapshot,
                    driver,
                )
                .await;
        }

        let report = self.matcher.assess(&request.user_input, snapshot);
        driver.apply(RouterEvent::FeasibilityAssessed {
            feasible: report.feasible,
            detail: report.reason.clone(),
        })?;
        if !report.feasible {
            let fault = StageFault::Feasibility(report.reason.clone());
            return self
                .clarification(
                    request,
                    fault.clarify_reason(),
                    None,
                    Some(fault.to_string()),
                    snapshot,
                    driver,
                )
                .await;
        }

        let subset = report.subset(snapshot);
        let candidate = self.generator.generate(&request.user_input, &subset).await;
        driver.apply(RouterEvent::CandidateProduced {
            generated: candidate.is_some(),
        })?;

        // A missing candidate flows through validation as an empty statement
        // so the rejection is recorded the same way as any other bad SQL.
        let candidate_text = candidate.unwrap_or_default();
        let verdict = self.validator.validate(&candidate_text, snapshot);
        driver.apply(RouterEvent::VerdictReached {
            valid: verdict.valid,
            detail: verdict_detail(&verdict),
        })?;
        if !verdict.valid {
            let fault = StageFault::Validation(verdict.error_summary());
            let rejected = (!candidate_text.is_empty()).then(|| candidate_text.clone());
            return self
                .clarification(
                    request,
                    fault.clarify_reason(),
                    rejected,
                    Some(fault.to_string()),
                    snapshot,
                    driver,
                )
                .await;
        }

        let sql = verdict.sql.clone();
        match self.executor.execute(&sql, self.settings.query_timeout()).await {
            Ok(execution) => {
                driver.apply(RouterEvent::ExecutionFinished {
                    ok: true,
                    detail: format!(
                        "{} rows in {:.3}s",
                        execution.row_count,
                        execution.elapsed_secs()
                    ),
                })?;
                let summary = self
                    .summarizer
                    .summarize(&request.user_input, &sql, &execution)
                    .await;
                driver.apply(RouterEvent::SummaryComposed)?;
                Ok(RunOutcome::Answered(AnsweredRun {
                    summary,
                    sql,
                    execution,
                }))
            }
            Err(fault) => {
                let fault = match fault {
                    ExecutionFault::Timeout { seconds } => StageFault::ExecutionTimeout { seconds },
                    other => StageFault::Execution(other.to_string()),
                };
                driver.apply(RouterEvent::ExecutionFinished {
                    ok: false,
                    detail: fault.to_string(),
                })?;
                self.clarification(
                    request,
                    fault.clarify_reason(),
                    Some(sql),
                    Some(fault.to_string()),
                    snapshot,
                    driver,
                )
                .await
            }
        }
    }

    async fn clarification(
        &self,
        request: &RunRequest,
        reason: ClarifyReason,
        rejected_sql: Option<String>,
        error: Option<String>,
        snapshot: &SchemaSnapshot,
        driver: &mut Driver<'_>,
    ) -> Result<RunOutcome, ApplicationError> {
        let prompt = self
            .conversationalist
            .clarify(&request.user_input, reason, error.as_deref(), snapshot)
            .await;
        driver.apply(RouterEvent::ClarificationComposed)?;
        Ok(RunOutcome::Clarification(ClarificationRun {
            prompt,
            reason,
            rejected_sql,
            error,
        }))
    }
}

/// Walks one run through the engine, collecting the audited transitions.
struct Driver<'a> {
    engine: &'a RouterEngine,
    state: RouterState,
    transitions: Vec<TransitionOutcome>,
    audit: &'a dyn AuditSink,
    context: &'a AuditContext,
}

impl<'a> Driver<'a> {
    fn new(engine: &'a RouterEngine, audit: &'a dyn AuditSink, context: &'a AuditContext) -> Self {
        Self {
            engine,
            state: engine.initial_state(),
            transitions: Vec::new(),
            audit,
            context,
        }
    }

    fn apply(&mut self, event: RouterEvent) -> Result<RouterState, ApplicationError> {
        let outcome = self
            .engine
            .apply_with_audit(self.state, &event, self.audit, self.context)
            .map_err(DomainError::from)
            .map_err(ApplicationError::from)?;
        self.state = outcome.to;
        self.transitions.push(outcome);
        Ok(self.state)
    }
}

fn verdict_detail(verdict: &ValidationVerdict) -> String {
    if verdict.valid {
        if verdict.warnings.is_empty() {
            "no warnings".to_string()
        } else {
            format!("warnings: {}", verdict.warnings.join("; "))
        }
    } else {
        verdict.error_summary()
    }
}
