use sqlx::Executor;

use crate::connection::DbPool;

/// Deterministic contract for the demo warehouse dataset.
const SEED_TABLES: &[SeedTableContract] = &[
    SeedTableContract {
        table: "departments",
        row_count: 4,
        columns: &["id", "name", "location"],
        description: "Four departments across four cities",
    },
    SeedTableContract {
        table: "employees",
        row_count: 10,
        columns: &["id", "first_name", "last_name", "department_id", "salary", "hire_date"],
        description: "Ten employees with salaries and hire dates",
    },
    SeedTableContract {
        table: "orders",
        row_count: 12,
        columns: &["id", "employee_id", "amount", "status", "ordered_at"],
        description: "Twelve orders owned by the sales team",
    },
];

const TOP_SALARY: f64 = 125000.0;
const SHIPPED_ORDERS: i64 = 6;

/// Demo warehouse used by the quickstart, the seed command, and the
/// end-to-end tests. Contents are deterministic so query results can be
/// asserted exactly.
pub struct DemoWarehouse;

impl DemoWarehouse {
    /// SQL fixture content for the demo warehouse.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_warehouse.sql");

    /// Load the demo dataset. Loading twice leaves the same rows behind.
    pub async fn load(pool: &DbPool) -> Result<SeedSummary, sqlx::Error> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let tables_seeded = SEED_TABLES
            .iter()
            .map(|contract| TableSeedInfo {
                table: contract.table,
                row_count: contract.row_count,
                description: contract.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedSummary { tables_seeded })
    }

    /// Verify that the loaded dataset matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationReport, sqlx::Error> {
        let mut checks = Vec::new();

        for contract in SEED_TABLES {
            let row_count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {}", contract.table))
                    .fetch_one(pool)
                    .await?;
            checks.push((contract.row_count_label(), row_count == contract.row_count));

            let quoted_columns = sql_name_list(contract.columns);
            let columns_present: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(1) FROM pragma_table_info('{}') WHERE name IN {quoted_columns}",
                contract.table
            ))
            .fetch_one(pool)
            .await?;
            checks.push((
                contract.columns_label(),
                columns_present == contract.columns.len() as i64,
            ));
        }

        let top_salary: f64 = sqlx::query_scalar("SELECT MAX(salary) FROM employees")
            .fetch_one(pool)
            .await?;
        checks.push(("employees-top-salary", top_salary == TOP_SALARY));

        let orphan_employees: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM employees e WHERE NOT EXISTS (SELECT 1 FROM departments d WHERE d.id = e.department_id)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("employees-department-links", orphan_employees == 0));

        let orphan_orders: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM orders o WHERE NOT EXISTS (SELECT 1 FROM employees e WHERE e.id = o.employee_id)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("orders-employee-links", orphan_orders == 0));

        let shipped: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM orders WHERE status = 'shipped'")
                .fetch_one(pool)
                .await?;
        checks.push(("orders-shipped-count", shipped == SHIPPED_ORDERS));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationReport { all_present, checks })
    }

    /// Drop the demo tables from a scratch database.
    pub async fn clean(pool: &DbPool) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS orders").execute(&mut *tx).await?;
        sqlx::query("DROP TABLE IF EXISTS employees").execute(&mut *tx).await?;
        sqlx::query("DROP TABLE IF EXISTS departments").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTableContract {
    table: &'static str,
    row_count: i64,
    columns: &'static [&'static str],
    description: &'static str,
}

impl SeedTableContract {
    fn row_count_label(&self) -> &'static str {
        match self.table {
            "departments" => "departments-row-count",
            "employees" => "employees-row-count",
            _ => "orders-row-count",
        }
    }

    fn columns_label(&self) -> &'static str {
        match self.table {
            "departments" => "departments-columns",
            "employees" => "employees-columns",
            _ => "orders-columns",
        }
    }
}

fn sql_name_list(names: &[&str]) -> String {
    let quoted = names.iter().map(|name| format!("'{}'", name)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedSummary {
    pub tables_seeded: Vec<TableSeedInfo>,
}

#[derive(Debug)]
pub struct TableSeedInfo {
    pub table: &'static str,
    pub row_count: i64,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationReport {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_admin;

    async fn scratch_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("demo.db").display());
        let pool = connect_admin(&url, 1, 5).await.expect("connect pool");
        (dir, pool)
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoWarehouse::SQL.is_empty());
        for contract in SEED_TABLES {
            assert!(
                DemoWarehouse::SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {}", contract.table)),
                "fixture should create {}",
                contract.table
            );
        }
    }

    #[tokio::test]
    async fn load_verify_and_reload_are_deterministic() {
        let (_dir, pool) = scratch_pool().await;

        let first = DemoWarehouse::load(&pool).await.expect("load demo warehouse");
        assert_eq!(first.tables_seeded.len(), 3);
        let first_verification = DemoWarehouse::verify(&pool).await.expect("verify demo warehouse");
        assert!(
            first_verification.all_present,
            "failed checks: {:?}",
            first_verification.checks
        );

        let second = DemoWarehouse::load(&pool).await.expect("reload demo warehouse");
        assert_eq!(second.tables_seeded.len(), 3);
        let second_verification =
            DemoWarehouse::verify(&pool).await.expect("re-verify demo warehouse");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_values_match_contract() {
        let (_dir, pool) = scratch_pool().await;
        DemoWarehouse::load(&pool).await.expect("load demo warehouse");

        let engineering_headcount: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM employees e JOIN departments d ON e.department_id = d.id WHERE d.name = 'Engineering'",
        )
        .fetch_one(&pool)
        .await
        .expect("count engineering employees");
        assert_eq!(engineering_headcount, 4);

        let top_earner: String = sqlx::query_scalar(
            "SELECT last_name FROM employees ORDER BY salary DESC LIMIT 1",
        )
        .fetch_one(&pool)
        .await
        .expect("find top earner");
        assert_eq!(top_earner, "Lovelace");

        let pending: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM orders WHERE status = 'pending'")
                .fetch_one(&pool)
                .await
                .expect("count pending orders");
        assert_eq!(pending, 4);
    }

    #[tokio::test]
    async fn clean_drops_demo_tables() {
        let (_dir, pool) = scratch_pool().await;
        DemoWarehouse::load(&pool).await.expect("load demo warehouse");
        DemoWarehouse::clean(&pool).await.expect("clean demo warehouse");

        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name IN ('departments', 'employees', 'orders')",
        )
        .fetch_one(&pool)
        .await
        .expect("count remaining tables");
        assert_eq!(remaining, 0);

        DemoWarehouse::verify(&pool).await.expect_err("verify should fail once tables are gone");
    }
}
