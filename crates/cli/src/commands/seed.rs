use tabletalk_core::config::{AppConfig, LoadOptions};
use tabletalk_db::{connect_admin, DbPool, DemoWarehouse, SeedSummary};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_admin(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let outcome = load_and_verify(&pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => {
            let table_lines: Vec<String> = summary
                .tables_seeded
                .iter()
                .map(|table| {
                    format!("  - {}: {} rows ({})", table.table, table.row_count, table.description)
                })
                .collect();
            let message =
                format!("demo warehouse loaded and verified:\n{}", table_lines.join("\n"));
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn load_and_verify(
    pool: &DbPool,
) -> Result<SeedSummary, (&'static str, String, u8)> {
    let summary = DemoWarehouse::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = DemoWarehouse::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

    if !verification.all_present {
        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        let message = if failed_checks.is_empty() {
            "some seeded rows failed verification".to_string()
        } else {
            format!("seed verification failed for checks: {}", failed_checks.join(", "))
        };
        return Err(("seed_verification", message, 6));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [
            ("departments-row-count", true),
            ("employees-columns", false),
            ("orders-shipped-count", false),
        ];

        let failed_checks = checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();

        let message = if failed_checks.is_empty() {
            "some seeded rows failed verification".to_string()
        } else {
            format!("seed verification failed for checks: {}", failed_checks.join(", "))
        };

        assert_eq!(
            message,
            "seed verification failed for checks: employees-columns, orders-shipped-count"
        );
    }
}
