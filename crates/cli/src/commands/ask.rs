use std::sync::Arc;

use tabletalk_agent::providers::build_client;
use tabletalk_agent::runtime::Router;
use tabletalk_core::audit::{AuditSink, TracingAuditSink};
use tabletalk_core::config::{AppConfig, LoadOptions};
use tabletalk_core::schema::SchemaCache;
use tabletalk_core::workflow::{RunReport, RunRequest};
use tabletalk_db::{connect_warehouse, load_snapshot, DbPool, SqliteQueryPort};

use crate::commands::CommandResult;

pub fn run(question: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_warehouse(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| {
            ("db_connectivity", format!("failed to connect to warehouse: {error}"), 4u8)
        })?;

        let report = route_question(&config, &pool, question).await;
        pool.close().await;
        report
    });

    match result {
        Ok(report) => {
            let envelope = report.envelope();
            let machine = serde_json::to_string(&envelope).unwrap_or_else(|error| {
                format!(
                    "{{\"response\":\"serialization failed\",\"error\":\"{}\"}}",
                    error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
                )
            });
            CommandResult {
                exit_code: 0,
                output: format!("{}\n{machine}", envelope.response),
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

async fn route_question(
    config: &AppConfig,
    pool: &DbPool,
    question: &str,
) -> Result<RunReport, (&'static str, String, u8)> {
    let snapshot = load_snapshot(pool)
        .await
        .map_err(|error| ("schema_load", format!("schema introspection failed: {error}"), 5u8))?;
    if snapshot.is_empty() {
        return Err((
            "schema_load",
            "the warehouse has no tables; run `tabletalk seed` first".to_string(),
            5,
        ));
    }

    let llm = build_client(&config.llm)
        .map_err(|error| ("llm_provider", format!("model provider setup failed: {error}"), 5u8))?;
    let executor = Arc::new(SqliteQueryPort::new(pool.clone(), config.router.max_result_rows));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let router = Router::new(
        llm,
        executor,
        Arc::new(SchemaCache::new(snapshot)),
        audit,
        config.router.clone(),
    );

    router
        .run(RunRequest::new(question))
        .await
        .map_err(|error| ("run_failure", error.to_string(), 6u8))
}
