use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use tabletalk_agent::runtime::Router;
use tabletalk_core::errors::InterfaceError;
use tabletalk_core::workflow::{RunEnvelope, RunRequest};

use crate::sessions::SessionStore;

/// Session used when the caller does not name one.
const DEFAULT_SESSION: &str = "default";

#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<Router>,
    pub sessions: Arc<SessionStore>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub request_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub envelope: RunEnvelope,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    session_id: String,
}

pub fn router(state: ApiState) -> axum::Router {
    axum::Router::new().route("/v1/query", post(query)).with_state(state)
}

/// One routed run. Every routed outcome is a 200, clarifications included;
/// error statuses are reserved for faults in this layer or below the router.
pub async fn query(State(state): State<ApiState>, Json(request): Json<QueryRequest>) -> Response {
    let session_id = request
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());
    let history = state.sessions.history(&session_id).await;
    let run = RunRequest::new(request.question.clone()).with_history(history);

    match state.router.run_with_session(run, Some(session_id.clone())).await {
        Ok(report) => {
            state
                .sessions
                .record_exchange(&session_id, &request.question, report.outcome.response_text())
                .await;
            info!(
                event_name = "api.query_served",
                correlation_id = %report.request_id,
                session_id = %session_id,
                path_taken = report.outcome.path_taken(),
                "query served"
            );
            let body = QueryResponse {
                request_id: report.request_id.clone(),
                session_id,
                envelope: report.envelope(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(run_error) => {
            error!(
                event_name = "api.run_failed",
                session_id = %session_id,
                error = %run_error,
                "query run failed"
            );
            let interface = run_error.into_interface(session_id.clone());
            let status = match &interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = ErrorBody {
                error: interface.user_message().to_string(),
                session_id,
            };
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use tabletalk_agent::llm::LlmClient;
    use tabletalk_agent::runtime::Router;
    use tabletalk_core::audit::{AuditSink, TracingAuditSink};
    use tabletalk_core::config::RouterSettings;
    use tabletalk_core::exec::QueryPort;
    use tabletalk_core::schema::SchemaCache;
    use tabletalk_core::validator::LimitPolicy;
    use tabletalk_db::{connect_admin, connect_warehouse, load_snapshot, DemoWarehouse, SqliteQueryPort};

    use crate::sessions::SessionStore;

    use super::{router, ApiState};

    /// Plays back completions in order; panics are avoided so a miscounted
    /// script surfaces as a failed run rather than a poisoned lock.
    struct ScriptedLlm {
        script: Mutex<Vec<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replies(replies: &[&str]) -> Self {
            Self {
                script: Mutex::new(replies.iter().map(|reply| Ok(reply.to_string())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn seen_prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompt lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().expect("prompt lock").push(prompt.to_string());
            let mut script = self.script.lock().expect("script lock");
            if script.is_empty() {
                return Err(anyhow!("scripted llm exhausted"));
            }
            script.remove(0).map_err(|message| anyhow!(message))
        }
    }

    fn settings() -> RouterSettings {
        RouterSettings {
            confidence_threshold: 0.75,
            query_timeout_secs: 2,
            max_result_rows: 1000,
            history_turns: 5,
            summary_max_chars: 600,
            on_missing_limit: LimitPolicy::Inject,
        }
    }

    async fn seeded_state(llm: Arc<ScriptedLlm>) -> (tempfile::TempDir, ApiState) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("api.db").display());
        let admin = connect_admin(&url, 1, 5).await.expect("connect admin pool");
        DemoWarehouse::load(&admin).await.expect("seed demo warehouse");
        admin.close().await;

        let pool = connect_warehouse(&url, 2, 5).await.expect("connect warehouse pool");
        let snapshot = load_snapshot(&pool).await.expect("load snapshot");
        let executor = Arc::new(SqliteQueryPort::new(pool, settings().max_result_rows));
        let router = Arc::new(Router::new(
            llm as Arc<dyn LlmClient>,
            executor as Arc<dyn QueryPort>,
            Arc::new(SchemaCache::new(snapshot)),
            Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
            settings(),
        ));
        let state = ApiState {
            router,
            sessions: Arc::new(SessionStore::new()),
        };
        (dir, state)
    }

    async fn post_query(state: ApiState, body: Value) -> (StatusCode, Value) {
        let app = router(state);
        let request = Request::builder()
            .method("POST")
            .uri("/v1/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request");
        let response = app.oneshot(request).await.expect("handler responds");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        // Rejections produce plain-text bodies; map those to null.
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn classify_json(intent: &str, confidence: f64) -> String {
        format!(r#"{{"intent": "{intent}", "confidence": {confidence}, "reasoning": "test"}}"#)
    }

    #[tokio::test]
    async fn conversational_question_returns_the_reply_envelope() {
        let classify = classify_json("conversation", 0.95);
        let llm = Arc::new(ScriptedLlm::replies(&[
            classify.as_str(),
            "Hello! Ask me about your data.",
        ]));
        let (_dir, state) = seeded_state(llm).await;

        let (status, body) = post_query(state, json!({ "question": "hi there" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Hello! Ask me about your data.");
        assert_eq!(body["path_taken"], "converse");
        assert_eq!(body["session_id"], "default");
        assert_eq!(body["intent"], "conversation");
        assert_eq!(body["request_id"].as_str().expect("request id").len(), 8);
        assert!(body["sql"].is_null());
        assert!(body["error"].is_null());
    }

    #[tokio::test]
    async fn data_question_runs_sql_against_the_warehouse() {
        let classify = classify_json("data_query", 0.9);
        let llm = Arc::new(ScriptedLlm::replies(&[
            classify.as_str(),
            "SELECT first_name, last_name FROM main.employees ORDER BY salary DESC LIMIT 5",
            "The five best paid employees are led by Ada Lovelace.",
        ]));
        let (_dir, state) = seeded_state(llm).await;

        let (status, body) = post_query(
            state,
            json!({ "question": "who are the five best paid employees?", "session_id": "s-42" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path_taken"], "summarize");
        assert_eq!(body["session_id"], "s-42");
        assert_eq!(
            body["sql"],
            "SELECT first_name, last_name FROM main.employees ORDER BY salary DESC LIMIT 5"
        );
        let rows = body["results"].as_array().expect("rows are returned");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["last_name"], "Lovelace");
        assert_eq!(body["response"], "The five best paid employees are led by Ada Lovelace.");
    }

    #[tokio::test]
    async fn second_question_carries_the_recorded_history() {
        let classify = classify_json("conversation", 0.95);
        let llm = Arc::new(ScriptedLlm::replies(&[
            classify.as_str(),
            "Hi! I can query your warehouse.",
            classify.as_str(),
            "You asked me to say hello.",
        ]));
        let (_dir, state) = seeded_state(Arc::clone(&llm)).await;

        let (first, _) = post_query(
            state.clone(),
            json!({ "question": "say hello", "session_id": "s-7" }),
        )
        .await;
        assert_eq!(first, StatusCode::OK);

        let (second, _) = post_query(
            state,
            json!({ "question": "what did I just ask?", "session_id": "s-7" }),
        )
        .await;
        assert_eq!(second, StatusCode::OK);

        let prompts = llm.seen_prompts();
        // Third call is the second run's classification.
        assert!(prompts[2].contains("user: say hello"));
        assert!(prompts[2].contains("assistant: Hi! I can query your warehouse."));
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected_before_routing() {
        let llm = Arc::new(ScriptedLlm::replies(&[]));
        let (_dir, state) = seeded_state(llm).await;

        let (status, _) = post_query(state, json!({ "prompt": "wrong field" })).await;
        assert!(status.is_client_error(), "got {status}");
    }
}
