use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tabletalk_cli::commands::{ask, check, config, doctor, seed};

#[test]
fn seed_loads_and_verifies_the_demo_warehouse() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("  - departments: 4 rows (Four departments across four cities)"));
        assert!(message.contains("  - employees: 10 rows (Ten employees with salaries and hire dates)"));
        assert!(message.contains("  - orders: 12 rows (Twelve orders owned by the sales team)"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed success: {}", second.output);

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn seed_reports_config_failure() {
    with_env(&[("TABLETALK_ROUTER_CONFIDENCE_THRESHOLD", "2.0")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn check_accepts_a_guarded_select() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed should succeed before check");

        let result = check::run("SELECT first_name FROM main.employees LIMIT 5");
        assert_eq!(result.exit_code, 0, "expected valid statement: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "check");
        assert_eq!(payload["status"], "pass");
        assert!(payload["errors"].as_array().is_some_and(|errors| errors.is_empty()));
    });
}

#[test]
fn check_injects_the_row_cap_when_limit_is_missing() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed should succeed before check");

        let result = check::run("SELECT first_name FROM main.employees");
        assert_eq!(result.exit_code, 0, "expected valid statement: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["status"], "pass");
        assert!(payload["warnings"].as_array().is_some_and(|warnings| !warnings.is_empty()));

        let sql = payload["sql"].as_str().unwrap_or("");
        assert!(sql.ends_with("LIMIT 1000"), "expected injected cap, got `{sql}`");
    });
}

#[test]
fn check_rejects_a_write_statement() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed should succeed before check");

        let result = check::run("DELETE FROM main.employees");
        assert_eq!(result.exit_code, 1, "expected rejection exit code: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "check");
        assert_eq!(payload["status"], "fail");
        assert!(payload["errors"].as_array().is_some_and(|errors| !errors.is_empty()));
    });
}

#[test]
fn check_fails_when_the_warehouse_is_empty() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        let result = check::run("SELECT first_name FROM main.employees LIMIT 5");
        assert_eq!(result.exit_code, 5, "expected schema failure code: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "check");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "schema_load");
    });
}

#[test]
fn ask_reports_config_failure() {
    with_env(&[("TABLETALK_ROUTER_CONFIDENCE_THRESHOLD", "2.0")], || {
        let result = ask::run("Who has the highest salary?");
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_reports_db_failure_for_unreachable_warehouse() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}", dir.path().join("missing").join("warehouse.db").display());

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        let result = ask::run("Who has the highest salary?");
        assert_eq!(result.exit_code, 4, "expected db failure code: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("TABLETALK_DATABASE_URL", "sqlite://custom.db")], || {
        let output = config::run();

        assert!(
            output.contains("- database.url = sqlite://custom.db (source: env (TABLETALK_DATABASE_URL))"),
            "missing env attribution in:\n{output}"
        );
        assert!(
            output.contains("- llm.model = llama3.1 (source: default)"),
            "missing default attribution in:\n{output}"
        );
    });
}

#[test]
fn config_redacts_the_api_key() {
    with_env(
        &[
            ("TABLETALK_LLM_PROVIDER", "openai"),
            ("TABLETALK_LLM_API_KEY", "sk-secret-123"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- llm.api_key = <redacted>"), "missing redaction in:\n{output}");
            assert!(!output.contains("sk-secret-123"), "secret leaked into:\n{output}");
        },
    );
}

#[test]
fn doctor_passes_with_a_seeded_warehouse() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed should succeed before doctor");

        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass", "expected healthy report: {payload}");

        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 4);
        assert!(checks.iter().all(|check| check["status"] == "pass"));
    });
}

#[test]
fn doctor_flags_an_empty_warehouse() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().expect("checks array");
        let schema = checks
            .iter()
            .find(|check| check["name"] == "schema_snapshot")
            .expect("schema_snapshot check");
        assert_eq!(schema["status"], "fail");

        let database = checks
            .iter()
            .find(|check| check["name"] == "database_connectivity")
            .expect("database_connectivity check");
        assert_eq!(database["status"], "pass");
    });
}

#[test]
fn doctor_renders_human_readable_checks() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = scratch_db_url(&dir);

    with_env(&[("TABLETALK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed should succeed before doctor");

        let output = doctor::run(false);
        assert!(output.starts_with("doctor: all readiness checks passed"), "got:\n{output}");
        assert!(output.contains("- [ok] config_validation:"), "got:\n{output}");
        assert!(output.contains("- [ok] llm_readiness:"), "got:\n{output}");
    });
}

fn scratch_db_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("warehouse.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TABLETALK_DATABASE_URL",
        "TABLETALK_DATABASE_MAX_CONNECTIONS",
        "TABLETALK_DATABASE_TIMEOUT_SECS",
        "TABLETALK_LLM_PROVIDER",
        "TABLETALK_LLM_API_KEY",
        "TABLETALK_LLM_BASE_URL",
        "TABLETALK_LLM_MODEL",
        "TABLETALK_LLM_TIMEOUT_SECS",
        "TABLETALK_LLM_MAX_RETRIES",
        "TABLETALK_ROUTER_CONFIDENCE_THRESHOLD",
        "TABLETALK_ROUTER_QUERY_TIMEOUT_SECS",
        "TABLETALK_ROUTER_MAX_RESULT_ROWS",
        "TABLETALK_ROUTER_HISTORY_TURNS",
        "TABLETALK_ROUTER_SUMMARY_MAX_CHARS",
        "TABLETALK_ROUTER_ON_MISSING_LIMIT",
        "TABLETALK_SERVER_BIND_ADDRESS",
        "TABLETALK_SERVER_API_PORT",
        "TABLETALK_SERVER_HEALTH_CHECK_PORT",
        "TABLETALK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "TABLETALK_LOGGING_LEVEL",
        "TABLETALK_LOGGING_FORMAT",
        "TABLETALK_LOG_LEVEL",
        "TABLETALK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
