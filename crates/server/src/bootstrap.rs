use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tabletalk_agent::providers::build_client;
use tabletalk_agent::runtime::Router;
use tabletalk_core::audit::{AuditSink, TracingAuditSink};
use tabletalk_core::config::{AppConfig, ConfigError, LoadOptions};
use tabletalk_core::schema::SchemaCache;
use tabletalk_db::{connect_warehouse, load_snapshot, DbPool, SqliteQueryPort};

use crate::sessions::SessionStore;

/// Fully wired service: one router, one warehouse pool, one session store.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub schema: Arc<SchemaCache>,
    pub router: Arc<Router>,
    pub sessions: Arc<SessionStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("schema introspection failed: {0}")]
    SchemaLoad(#[source] sqlx::Error),
    #[error("the warehouse has no tables; seed it before starting the server")]
    EmptySchema,
    #[error("model provider setup failed: {0}")]
    Provider(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the application from an already-loaded configuration. A warehouse
/// with no tables fails here rather than serving runs that can only clarify.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_warehouse(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "bootstrap.database_connected",
        correlation_id = "bootstrap",
        "read-only warehouse connection established"
    );

    let snapshot = load_snapshot(&db_pool).await.map_err(BootstrapError::SchemaLoad)?;
    if snapshot.is_empty() {
        return Err(BootstrapError::EmptySchema);
    }
    info!(
        event_name = "bootstrap.schema_loaded",
        correlation_id = "bootstrap",
        tables = snapshot.len(),
        "schema snapshot cached"
    );

    let llm = build_client(&config.llm).map_err(|error| BootstrapError::Provider(error.to_string()))?;
    let executor = Arc::new(SqliteQueryPort::new(db_pool.clone(), config.router.max_result_rows));
    let schema = Arc::new(SchemaCache::new(snapshot));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let router = Arc::new(Router::new(
        llm,
        executor,
        Arc::clone(&schema),
        audit,
        config.router.clone(),
    ));

    Ok(Application {
        config,
        db_pool,
        schema,
        router,
        sessions: Arc::new(SessionStore::new()),
    })
}
