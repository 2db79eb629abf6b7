//! Feasibility screening: can the snapshot plausibly answer the question?
//!
//! Deterministic lexical matching against table and column names. The point
//! is to refuse early when nothing in the warehouse relates to the request,
//! before any SQL is generated.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::schema::{SchemaSnapshot, SchemaTable};

/// How many tables a "nothing matched" reason lists before cutting off.
const SUGGESTION_CAP: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeasibilityReport {
    pub feasible: bool,
    /// Qualified names of matched tables, sorted.
    pub tables: Vec<String>,
    /// Fully qualified columns the request mentioned by name, sorted.
    pub columns: Vec<String>,
    pub reason: String,
}

impl FeasibilityReport {
    /// Table definitions for the matched subset, for prompt assembly.
    pub fn subset<'a>(&self, snapshot: &'a SchemaSnapshot) -> Vec<&'a SchemaTable> {
        self.tables
            .iter()
            .filter_map(|name| snapshot.table(name))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FeasibilityMatcher;

impl FeasibilityMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Pure function of the input and the snapshot. Matched tables are
    /// always a subset of the snapshot, never invented.
    pub fn assess(&self, user_input: &str, snapshot: &SchemaSnapshot) -> FeasibilityReport {
        if snapshot.is_empty() {
            return FeasibilityReport {
                feasible: false,
                tables: Vec::new(),
                columns: Vec::new(),
                reason: "the schema snapshot is empty".to_string(),
            };
        }

        let tokens = tokenize(&normalize_text(user_input));
        let mut tables: BTreeSet<String> = BTreeSet::new();
        let mut columns: BTreeSet<String> = BTreeSet::new();

        for table in snapshot.tables() {
            if name_matches(&tokens, &table.name) {
                tables.insert(table.qualified_name());
            }
            // A column mention pulls its table in even when the table name
            // itself never appears in the question.
            for column in &table.columns {
                if name_matches(&tokens, &column.name) {
                    tables.insert(table.qualified_name());
                    columns.insert(format!("{}.{}", table.qualified_name(), column.name));
                }
            }
        }

        if tables.is_empty() {
            let mut names = snapshot.table_names();
            names.truncate(SUGGESTION_CAP);
            return FeasibilityReport {
                feasible: false,
                tables: Vec::new(),
                columns: Vec::new(),
                reason: format!(
                    "no table in the snapshot matches the request; available tables: {}",
                    names.join(", ")
                ),
            };
        }

        let tables: Vec<String> = tables.into_iter().collect();
        let columns: Vec<String> = columns.into_iter().collect();
        let mut reason = format!("matched tables: {}", tables.join(", "));
        if !columns.is_empty() {
            reason.push_str(&format!("; matched columns: {}", columns.join(", ")));
        }

        FeasibilityReport {
            feasible: true,
            tables,
            columns,
            reason,
        }
    }
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

/// Keeps identifier characters so `order_items` survives as one token.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Folds trailing plural `s` on both sides so "employees" matches
/// "employee" and vice versa.
fn fold_plural(word: &str) -> &str {
    if word.len() > 3 {
        word.strip_suffix('s').unwrap_or(word)
    } else {
        word
    }
}

fn token_matches(token: &str, part: &str) -> bool {
    fold_plural(token) == fold_plural(part)
}

/// A name matches when it appears as a token, or when every underscore part
/// of the name appears ("order items" matches `order_items`).
fn name_matches(tokens: &[String], name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if tokens.iter().any(|token| token_matches(token, &name)) {
        return true;
    }
    let parts: Vec<&str> = name.split('_').filter(|part| !part.is_empty()).collect();
    parts.len() > 1
        && parts
            .iter()
            .all(|part| tokens.iter().any(|token| token_matches(token, part)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaColumn, SchemaTable};

    fn warehouse() -> SchemaSnapshot {
        SchemaSnapshot::from_tables(vec![
            SchemaTable::new("hr", "employees")
                .with_column(SchemaColumn::new("id", "INTEGER"))
                .with_column(SchemaColumn::new("first_name", "TEXT"))
                .with_column(SchemaColumn::new("salary", "REAL"))
                .with_column(SchemaColumn::new("department_id", "INTEGER")),
            SchemaTable::new("hr", "departments")
                .with_column(SchemaColumn::new("id", "INTEGER"))
                .with_column(SchemaColumn::new("name", "TEXT")),
            SchemaTable::new("sales", "order_items")
                .with_column(SchemaColumn::new("order_id", "INTEGER"))
                .with_column(SchemaColumn::new("quantity", "INTEGER")),
        ])
    }

    struct Case {
        text: &'static str,
        expect_feasible: bool,
        expect_tables: &'static [&'static str],
    }

    #[test]
    fn matches_tables_and_columns() {
        let cases = [
            Case {
                text: "Show me 5 employees",
                expect_feasible: true,
                expect_tables: &["hr.employees"],
            },
            Case {
                text: "average SALARY please",
                expect_feasible: true,
                expect_tables: &["hr.employees"],
            },
            Case {
                text: "list departments and their employees",
                expect_feasible: true,
                expect_tables: &["hr.departments", "hr.employees"],
            },
            Case {
                text: "how many order items shipped",
                expect_feasible: true,
                expect_tables: &["sales.order_items"],
            },
            Case {
                text: "what is the meaning of life",
                expect_feasible: false,
                expect_tables: &[],
            },
            Case {
                text: "",
                expect_feasible: false,
                expect_tables: &[],
            },
        ];

        let matcher = FeasibilityMatcher::new();
        let snapshot = warehouse();
        for case in cases {
            let report = matcher.assess(case.text, &snapshot);
            assert_eq!(report.feasible, case.expect_feasible, "text: {}", case.text);
            let expected: Vec<String> =
                case.expect_tables.iter().map(|t| t.to_string()).collect();
            assert_eq!(report.tables, expected, "text: {}", case.text);
        }
    }

    #[test]
    fn column_mention_pulls_in_its_table() {
        let report =
            FeasibilityMatcher::new().assess("what quantity did we move", &warehouse());
        assert!(report.feasible);
        assert_eq!(report.tables, vec!["sales.order_items".to_string()]);
        assert_eq!(
            report.columns,
            vec!["sales.order_items.quantity".to_string()]
        );
    }

    #[test]
    fn infeasible_reason_lists_available_tables() {
        let report = FeasibilityMatcher::new().assess("weather tomorrow", &warehouse());
        assert!(!report.feasible);
        assert!(report.reason.contains("hr.employees"));
        assert!(report.reason.contains("sales.order_items"));
    }

    #[test]
    fn empty_snapshot_is_always_infeasible() {
        let report =
            FeasibilityMatcher::new().assess("employees", &SchemaSnapshot::default());
        assert!(!report.feasible);
        assert!(report.reason.contains("empty"));
    }

    #[test]
    fn matched_tables_always_exist_in_the_snapshot() {
        let snapshot = warehouse();
        let report = FeasibilityMatcher::new()
            .assess("salary of employees per department name", &snapshot);
        for table in &report.tables {
            assert!(snapshot.contains_table(table), "invented table: {table}");
        }
    }

    #[test]
    fn assessment_is_deterministic() {
        let snapshot = warehouse();
        let matcher = FeasibilityMatcher::new();
        let first = matcher.assess("employees by department", &snapshot);
        let second = matcher.assess("employees by department", &snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn subset_resolves_matched_definitions() {
        let snapshot = warehouse();
        let report = FeasibilityMatcher::new().assess("employees", &snapshot);
        let subset = report.subset(&snapshot);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].qualified_name(), "hr.employees");
    }
}
