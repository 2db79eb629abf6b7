use serde::Serialize;

use tabletalk_core::config::{AppConfig, LoadOptions};
use tabletalk_core::validator::SqlValidator;
use tabletalk_db::{connect_warehouse, load_snapshot};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct CheckReport {
    command: &'static str,
    status: &'static str,
    sql: String,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validates one SQL statement the same way the router does before
/// execution, against whatever the configured warehouse exposes.
pub fn run(candidate: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "check",
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
                "check",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let snapshot = runtime.block_on(async {
        let pool = connect_warehouse(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| {
            ("db_connectivity", format!("failed to connect to warehouse: {error}"), 4u8)
        })?;

        let snapshot = load_snapshot(&pool).await.map_err(|error| {
            ("schema_load", format!("schema introspection failed: {error}"), 5u8)
        });
        pool.close().await;
        snapshot
    });

    let snapshot = match snapshot {
        Ok(snapshot) if snapshot.is_empty() => {
            return CommandResult::failure(
                "check",
                "schema_load",
                "the warehouse has no tables; run `tabletalk seed` first",
                5,
            );
        }
        Ok(snapshot) => snapshot,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("check", error_class, message, exit_code);
        }
    };

    let validator =
        SqlValidator::new(config.router.on_missing_limit, config.router.max_result_rows);
    let verdict = validator.validate(candidate, &snapshot);

    let human = if verdict.valid {
        if verdict.warnings.is_empty() {
            "check: statement passed all safety rules".to_string()
        } else {
            format!("check: statement passed with {} warning(s)", verdict.warnings.len())
        }
    } else {
        format!("check: statement rejected: {}", verdict.error_summary())
    };

    let report = CheckReport {
        command: "check",
        status: if verdict.valid { "pass" } else { "fail" },
        sql: verdict.sql,
        errors: verdict.errors,
        warnings: verdict.warnings,
    };
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"check\",\"status\":\"fail\",\"errors\":[\"serialization: {}\"]}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult {
        exit_code: if report.status == "pass" { 0 } else { 1 },
        output: format!("{human}\n{machine}"),
    }
}
