use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::warn;

use tabletalk_core::exec::{ExecutionFault, ExecutionResult, QueryPort, Row};

use crate::connection::DbPool;

/// Runs validated statements against the SQLite warehouse.
///
/// Each statement executes inside its own spawned task with a deadline, so a
/// caller that gives up early never strands a connection: the task either
/// finishes and releases, or hits the deadline and releases. Results are
/// capped at `row_cap` rows and the overflow is reported as truncation.
#[derive(Clone)]
pub struct SqliteQueryPort {
    pool: DbPool,
    row_cap: usize,
}

impl SqliteQueryPort {
    pub fn new(pool: DbPool, row_cap: u32) -> Self {
        Self { pool, row_cap: row_cap.max(1) as usize }
    }

    async fn attempt(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionFault> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let cap = self.row_cap;
        let seconds = timeout.as_secs().max(1);

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, run_query(&pool, &sql, cap)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecutionFault::Timeout { seconds }),
            }
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                Err(ExecutionFault::Query(format!("executor task failed: {join_error}")))
            }
        }
    }
}

#[async_trait]
impl QueryPort for SqliteQueryPort {
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionFault> {
        match self.attempt(sql, timeout).await {
            Err(fault) if fault.is_transient() => {
                warn!(
                    event_name = "executor.retry",
                    error = %fault,
                    "transient warehouse fault; retrying once"
                );
                self.attempt(sql, timeout).await.map_err(|retry_fault| match retry_fault {
                    ExecutionFault::Connection(message) => {
                        ExecutionFault::Connection(format!("{message} (after retry)"))
                    }
                    other => other,
                })
            }
            outcome => outcome,
        }
    }
}

async fn run_query(pool: &DbPool, sql: &str, cap: usize) -> Result<ExecutionResult, ExecutionFault> {
    let started = Instant::now();
    let raw_rows = sqlx::query(sql).fetch_all(pool).await.map_err(fault_from_sqlx)?;
    let elapsed = started.elapsed();

    let truncated = raw_rows.len() > cap;
    let mut rows = Vec::with_capacity(raw_rows.len().min(cap));
    for raw in raw_rows.into_iter().take(cap) {
        rows.push(decode_row(&raw));
    }
    let row_count = rows.len();

    Ok(ExecutionResult { rows, row_count, elapsed, truncated })
}

fn fault_from_sqlx(error: sqlx::Error) -> ExecutionFault {
    match &error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => ExecutionFault::Connection(error.to_string()),
        sqlx::Error::Database(db_error) => ExecutionFault::Query(db_error.message().to_string()),
        _ => ExecutionFault::Query(error.to_string()),
    }
}

fn decode_row(raw: &SqliteRow) -> Row {
    let mut row = Row::new();
    for column in raw.columns() {
        row.insert(column.name().to_string(), decode_value(raw, column.ordinal()));
    }
    row
}

/// SQLite values are dynamically typed, so decoding follows the storage class
/// of each value rather than the declared column type.
fn decode_value(raw: &SqliteRow, index: usize) -> Value {
    let (is_null, type_name) = match raw.try_get_raw(index) {
        Ok(value) => (value.is_null(), value.type_info().name().to_string()),
        Err(_) => return Value::Null,
    };
    if is_null {
        return Value::Null;
    }

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => {
            raw.try_get::<i64, _>(index).map(Value::from).unwrap_or(Value::Null)
        }
        "REAL" | "NUMERIC" => raw.try_get::<f64, _>(index).map(Value::from).unwrap_or(Value::Null),
        // Raw bytes have no JSON representation worth inventing.
        "BLOB" => Value::Null,
        _ => raw.try_get::<String, _>(index).map(Value::from).unwrap_or(Value::Null),
    }
}
