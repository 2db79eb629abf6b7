use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use tabletalk_core::schema::SchemaCache;
use tabletalk_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    schema: Arc<SchemaCache>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub schema: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, schema: Arc<SchemaCache>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { db_pool, schema })
}

/// Serves `/health` on its own port so probes stay reachable while the
/// query API drains.
pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    schema: Arc<SchemaCache>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "health.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(serve_error) = axum::serve(listener, router(db_pool, schema)).await {
            error!(
                event_name = "health.terminated",
                correlation_id = "bootstrap",
                error = %serve_error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let schema = schema_check(&state.schema);
    let ready = database.status == "ready" && schema.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tabletalk-server runtime initialized".to_string(),
        },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(query_error) => HealthCheck {
            status: "degraded",
            detail: format!("database query failed: {query_error}"),
        },
    }
}

fn schema_check(schema: &SchemaCache) -> HealthCheck {
    let snapshot = schema.snapshot();
    if snapshot.is_empty() {
        HealthCheck { status: "degraded", detail: "schema snapshot is empty".to_string() }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!("{} tables cached", snapshot.len()),
        }
    }
}
