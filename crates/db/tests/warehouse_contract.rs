type WarehouseContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

const FIXTURE_SQL: &str = include_str!("../../../config/fixtures/demo_warehouse.sql");

struct TableExpectation {
    table: &'static str,
    insert_count: usize,
    columns: &'static [&'static str],
}

const EXPECTED_TABLES: &[TableExpectation] = &[
    TableExpectation {
        table: "departments",
        insert_count: 4,
        columns: &["id", "name", "location"],
    },
    TableExpectation {
        table: "employees",
        insert_count: 10,
        columns: &["id", "first_name", "last_name", "department_id", "salary", "hire_date"],
    },
    TableExpectation {
        table: "orders",
        insert_count: 12,
        columns: &["id", "employee_id", "amount", "status", "ordered_at"],
    },
];

fn create_block<'a>(sql: &'a str, table: &str) -> WarehouseContractTestResult<&'a str> {
    let marker = format!("CREATE TABLE IF NOT EXISTS {table} (");
    let start = sql
        .find(&marker)
        .ok_or_else(|| format!("fixture should create table {table}"))?;
    let rest = &sql[start..];
    let end = rest.find(");").ok_or_else(|| format!("create block for {table} should close"))?;
    Ok(&rest[..end])
}

fn insert_lines<'a>(sql: &'a str, table: &str) -> Vec<&'a str> {
    let marker = format!("INSERT INTO {table} (");
    sql.lines().filter(|line| line.trim_start().starts_with(&marker)).collect()
}

fn tuple_fields(line: &str) -> WarehouseContractTestResult<Vec<&str>> {
    let start = line
        .find("VALUES (")
        .ok_or_else(|| format!("insert line should carry a VALUES tuple: {line}"))?;
    let tuple = &line[start + "VALUES (".len()..];
    let end = tuple
        .rfind(')')
        .ok_or_else(|| format!("insert tuple should close: {line}"))?;
    Ok(tuple[..end].split(", ").collect())
}

fn unquoted<'a>(field: &'a str) -> WarehouseContractTestResult<&'a str> {
    let trimmed = field.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        Ok(&trimmed[1..trimmed.len() - 1])
    } else {
        Err(format!("expected a quoted text field, got {field}"))
    }
}

#[test]
fn fixture_creates_and_reloads_every_table() -> WarehouseContractTestResult {
    for expectation in EXPECTED_TABLES {
        let block = create_block(FIXTURE_SQL, expectation.table)?;
        for column in expectation.columns {
            require!(
                block.contains(column),
                "create block for {} should declare column {}",
                expectation.table,
                column
            );
        }

        let delete = format!("DELETE FROM {};", expectation.table);
        let delete_at = FIXTURE_SQL
            .find(&delete)
            .ok_or_else(|| format!("fixture should clear {} before reloading", expectation.table))?;
        let first_insert = FIXTURE_SQL
            .find(&format!("INSERT INTO {} (", expectation.table))
            .ok_or_else(|| format!("fixture should insert into {}", expectation.table))?;
        require!(
            delete_at < first_insert,
            "{} must be cleared before it is repopulated",
            expectation.table
        );
    }

    require!(
        FIXTURE_SQL.contains("REFERENCES departments(id)"),
        "employees should reference departments"
    );
    require!(
        FIXTURE_SQL.contains("REFERENCES employees(id)"),
        "orders should reference employees"
    );
    Ok(())
}

#[test]
fn fixture_row_counts_match_contract() -> WarehouseContractTestResult {
    for expectation in EXPECTED_TABLES {
        let lines = insert_lines(FIXTURE_SQL, expectation.table);
        require_eq!(
            lines.len(),
            expectation.insert_count,
            "{} should seed {} rows, found {}",
            expectation.table,
            expectation.insert_count,
            lines.len()
        );
        for line in lines {
            require!(
                line.trim_end().ends_with(';'),
                "insert statement should be terminated: {line}"
            );
        }
    }
    Ok(())
}

#[test]
fn employee_rows_reference_seeded_departments() -> WarehouseContractTestResult {
    for line in insert_lines(FIXTURE_SQL, "employees") {
        let fields = tuple_fields(line)?;
        require_eq!(fields.len(), 6, "employee tuple should have six fields: {line}");

        let department_id: i64 = fields[3]
            .trim()
            .parse()
            .map_err(|_| format!("department_id should be an integer: {line}"))?;
        require!(
            (1..=4).contains(&department_id),
            "department_id {department_id} is outside the seeded range"
        );

        let salary: f64 = fields[4]
            .trim()
            .parse()
            .map_err(|_| format!("salary should be numeric: {line}"))?;
        require!(salary > 0.0, "salary should be positive: {line}");

        let hire_date = unquoted(fields[5])?;
        require_eq!(hire_date.len(), 10, "hire_date should be YYYY-MM-DD: {line}");
        require!(
            hire_date.as_bytes()[4] == b'-' && hire_date.as_bytes()[7] == b'-',
            "hire_date should be YYYY-MM-DD: {line}"
        );
    }
    Ok(())
}

#[test]
fn order_rows_are_consistent() -> WarehouseContractTestResult {
    let allowed_statuses = ["shipped", "pending", "cancelled"];
    for line in insert_lines(FIXTURE_SQL, "orders") {
        let fields = tuple_fields(line)?;
        require_eq!(fields.len(), 5, "order tuple should have five fields: {line}");

        let employee_id: i64 = fields[1]
            .trim()
            .parse()
            .map_err(|_| format!("employee_id should be an integer: {line}"))?;
        require!(
            (1..=10).contains(&employee_id),
            "employee_id {employee_id} is outside the seeded range"
        );

        let amount: f64 = fields[2]
            .trim()
            .parse()
            .map_err(|_| format!("amount should be numeric: {line}"))?;
        require!(amount > 0.0, "amount should be positive: {line}");

        let status = unquoted(fields[3])?;
        require!(
            allowed_statuses.contains(&status),
            "unexpected order status {status} in line: {line}"
        );
    }
    Ok(())
}
