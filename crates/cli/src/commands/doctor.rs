use serde::Serialize;

use tabletalk_core::config::{AppConfig, LlmProvider, LoadOptions};
use tabletalk_core::schema::SchemaSnapshot;
use tabletalk_db::{connect_warehouse, load_snapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

enum WarehouseProbe {
    Connect(String),
    Introspect(String),
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let (database, schema) = check_warehouse(&config);
            checks.push(database);
            checks.push(schema);
            checks.push(check_llm_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("database_connectivity"));
            checks.push(skipped("schema_snapshot"));
            checks.push(skipped("llm_readiness"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because an earlier check failed".to_string(),
    }
}

/// One connection round-trip answers two checks: can we reach the
/// warehouse, and does it expose any tables for the router to work with.
fn check_warehouse(config: &AppConfig) -> (DoctorCheck, DoctorCheck) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return (
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped("schema_snapshot"),
            );
        }
    };

    let result: Result<SchemaSnapshot, WarehouseProbe> = runtime.block_on(async {
        let pool = connect_warehouse(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| {
            WarehouseProbe::Connect(format!("failed to connect to warehouse: {error}"))
        })?;

        let snapshot = load_snapshot(&pool).await.map_err(|error| {
            WarehouseProbe::Introspect(format!("schema introspection failed: {error}"))
        });
        pool.close().await;
        snapshot
    });

    match result {
        Ok(snapshot) => {
            let database = DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            };
            let schema = if snapshot.is_empty() {
                DoctorCheck {
                    name: "schema_snapshot",
                    status: CheckStatus::Fail,
                    details: "the warehouse has no tables; run `tabletalk seed`".to_string(),
                }
            } else {
                DoctorCheck {
                    name: "schema_snapshot",
                    status: CheckStatus::Pass,
                    details: format!("{} tables visible", snapshot.len()),
                }
            };
            (database, schema)
        }
        Err(WarehouseProbe::Connect(details)) => (
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details },
            skipped("schema_snapshot"),
        ),
        Err(WarehouseProbe::Introspect(details)) => (
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            DoctorCheck { name: "schema_snapshot", status: CheckStatus::Fail, details },
        ),
    }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let details = match config.llm.provider {
        LlmProvider::Ollama => format!(
            "ollama model `{}` configured at {}",
            config.llm.model,
            config.llm.base_url.as_deref().unwrap_or("http://localhost:11434"),
        ),
        LlmProvider::OpenAi => {
            format!("openai model `{}` configured with an api key", config.llm.model)
        }
    };

    // Credential presence is enforced by config validation; reaching this
    // check means the provider has what it needs to start.
    DoctorCheck { name: "llm_readiness", status: CheckStatus::Pass, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
