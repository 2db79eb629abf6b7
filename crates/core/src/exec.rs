//! Execution port: the single seam between the workflow and the warehouse.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// One result row, column name to JSON value.
pub type Row = Map<String, Value>;

/// Rows plus accounting for a completed query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    /// Rows returned to the caller, after the cap.
    pub row_count: usize,
    pub elapsed: Duration,
    /// True when the warehouse produced more rows than the cap allows.
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Column names from the first row, sorted; empty for an empty result.
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionFault {
    #[error("query timeout after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("warehouse connection failure: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl ExecutionFault {
    /// Connection-level faults are worth exactly one retry; everything else
    /// fails immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionFault::Connection(_))
    }
}

/// Executes one validated statement against the warehouse.
///
/// Implementations own the timeout, the row cap, and connection release on
/// every exit path. Callers never see a connection handle.
#[async_trait]
pub trait QueryPort: Send + Sync {
    async fn execute(&self, sql: &str, timeout: Duration)
        -> Result<ExecutionResult, ExecutionFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_fault_names_the_budget() {
        let fault = ExecutionFault::Timeout { seconds: 2 };
        assert_eq!(fault.to_string(), "query timeout after 2s");
        assert!(!fault.is_transient());
    }

    #[test]
    fn only_connection_faults_are_transient() {
        assert!(ExecutionFault::Connection("pool exhausted".into()).is_transient());
        assert!(!ExecutionFault::Query("no such column".into()).is_transient());
    }

    #[test]
    fn columns_come_from_the_first_row() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::from(1));
        row.insert("name".to_string(), Value::from("ops"));
        let result = ExecutionResult {
            rows: vec![row],
            row_count: 1,
            elapsed: Duration::from_millis(3),
            truncated: false,
        };
        assert_eq!(result.columns(), vec!["id".to_string(), "name".to_string()]);
        assert!(ExecutionResult::default().columns().is_empty());
    }
}
