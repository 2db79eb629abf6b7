//! Pre-execution screening of candidate SQL.
//!
//! Rules run in a fixed order and the first failure wins, so a verdict
//! carries at most one error. Checks are lexical: the statement is masked
//! (string literals and comments removed), tokenized, and inspected against
//! the schema snapshot. No SQL reaches the warehouse without passing here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::SchemaSnapshot;

/// What to do with a statement that has no top-level LIMIT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    #[default]
    Inject,
    Reject,
}

impl LimitPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inject" => Some(LimitPolicy::Inject),
            "reject" => Some(LimitPolicy::Reject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LimitPolicy::Inject => "inject",
            LimitPolicy::Reject => "reject",
        }
    }
}

/// Outcome of validation. `sql` is the effective statement: the candidate
/// with at most a LIMIT clause appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sql: String,
}

impl ValidationVerdict {
    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "CREATE", "ALTER", "DROP", "TRUNCATE", "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE",
    "GRANT", "REVOKE", "EXEC", "EXECUTE", "ATTACH", "DETACH", "PRAGMA", "VACUUM",
];

const SYSTEM_NAMESPACES: &[&str] = &[
    "information_schema",
    "sys",
    "pg_catalog",
    "mysql",
    "performance_schema",
];

const RESERVED_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "AS", "ON",
    "AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE", "GLOB", "BETWEEN", "EXISTS", "CASE", "WHEN",
    "THEN", "ELSE", "END", "ASC", "DESC", "DISTINCT", "ALL", "JOIN", "INNER", "LEFT", "RIGHT",
    "FULL", "OUTER", "CROSS", "NATURAL", "USING", "UNION", "EXCEPT", "INTERSECT", "CAST",
    "COLLATE", "ESCAPE", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "TRUE", "FALSE",
];

#[derive(Clone, Debug)]
pub struct SqlValidator {
    limit_policy: LimitPolicy,
    row_limit: u32,
}

#[derive(Debug)]
struct TableRef {
    name: String,
    alias: Option<String>,
    token_indices: Vec<usize>,
}

impl SqlValidator {
    pub fn new(limit_policy: LimitPolicy, row_limit: u32) -> Self {
        Self {
            limit_policy,
            row_limit,
        }
    }

    pub fn validate(&self, candidate: &str, snapshot: &SchemaSnapshot) -> ValidationVerdict {
        let mut warnings = Vec::new();
        match self.analyze(candidate, snapshot, &mut warnings) {
            Ok(effective) => ValidationVerdict {
                valid: true,
                errors: Vec::new(),
                warnings,
                sql: effective,
            },
            Err(error) => ValidationVerdict {
                valid: false,
                errors: vec![error],
                warnings,
                sql: candidate.trim().to_string(),
            },
        }
    }

    fn analyze(
        &self,
        candidate: &str,
        snapshot: &SchemaSnapshot,
        warnings: &mut Vec<String>,
    ) -> Result<String, String> {
        let display = candidate.trim();
        if display.is_empty() {
            return Err("no SQL statement was produced".to_string());
        }

        let masked = mask_statement(display);

        // Single statement: a trailing semicolon is tolerated, any other
        // semicolon outside literals and comments is not.
        let masked_body = masked.trim().trim_end_matches(';');
        if masked_body.contains(';') {
            return Err("candidate contains multiple SQL statements".to_string());
        }
        let base = display.trim_end_matches(';').trim_end().to_string();

        let tokens = lex(masked_body);
        let Some(first) = tokens.first() else {
            return Err("no SQL statement was produced".to_string());
        };

        // Read-only SELECT, no write or DDL keyword anywhere.
        if !eq_kw(first, "SELECT") {
            return Err(format!(
                "only SELECT statements are allowed, found `{}`",
                first.to_ascii_uppercase()
            ));
        }
        for token in &tokens {
            if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|kw| eq_kw(token, kw)) {
                return Err(format!("forbidden keyword `{keyword}`"));
            }
        }

        check_projection(&tokens)?;

        let refs = collect_table_refs(&tokens);
        for table_ref in &refs {
            let Some((schema_part, table_part)) = table_ref.name.split_once('.') else {
                return Err(format!(
                    "table `{}` must be schema-qualified",
                    table_ref.name
                ));
            };
            // System namespaces are screened before snapshot membership so
            // they report as such even when absent from the snapshot.
            if SYSTEM_NAMESPACES
                .iter()
                .any(|ns| schema_part.eq_ignore_ascii_case(ns))
                || table_part.to_ascii_lowercase().starts_with("sqlite_")
            {
                return Err(format!(
                    "access to system namespace `{}` is not allowed",
                    table_ref.name
                ));
            }
            if !snapshot.contains_table(&table_ref.name) {
                return Err(format!(
                    "table `{}` is not present in the schema snapshot",
                    table_ref.name
                ));
            }
        }
        if refs.is_empty() && tokens.iter().any(|t| eq_kw(t, "FROM")) {
            return Err("could not resolve any table reference".to_string());
        }

        self.check_columns(&tokens, &refs, snapshot, warnings)?;
        check_joins(&tokens, &refs, snapshot, warnings)?;

        // Row bound: every statement that executes carries a top-level LIMIT.
        let effective = match top_level_limit(&tokens) {
            None => match self.limit_policy {
                LimitPolicy::Inject => {
                    warnings.push(format!("no LIMIT clause; injected LIMIT {}", self.row_limit));
                    format!("{base} LIMIT {}", self.row_limit)
                }
                LimitPolicy::Reject => {
                    return Err("statement has no LIMIT clause".to_string());
                }
            },
            Some(value) => {
                if let Some(value) = value {
                    if value > u64::from(self.row_limit) {
                        warnings.push(format!(
                            "LIMIT {value} exceeds the row cap of {}; results will be truncated",
                            self.row_limit
                        ));
                    }
                }
                base
            }
        };

        Ok(effective)
    }

    fn check_columns(
        &self,
        tokens: &[String],
        refs: &[TableRef],
        snapshot: &SchemaSnapshot,
        warnings: &mut Vec<String>,
    ) -> Result<(), String> {
        let alias_map = build_alias_map(refs);
        let ref_indices: BTreeSet<usize> = refs
            .iter()
            .flat_map(|r| r.token_indices.iter().copied())
            .collect();

        // Aliases introduced by AS in the projection may legally reappear in
        // ORDER BY or HAVING without being columns.
        let mut output_aliases: BTreeSet<String> = BTreeSet::new();
        for (i, token) in tokens.iter().enumerate() {
            if eq_kw(token, "AS") && !ref_indices.contains(&i) {
                if let Some(next) = tokens.get(i + 1) {
                    if is_identifier(next) {
                        output_aliases.insert(next.to_ascii_lowercase());
                    }
                }
            }
        }

        for (i, token) in tokens.iter().enumerate() {
            if ref_indices.contains(&i) || !is_identifier(token) {
                continue;
            }
            if token == "*" || token.ends_with(".*") {
                continue;
            }
            // Identifier followed by `(` is a function call, not a column.
            if tokens.get(i + 1).map(|t| t == "(").unwrap_or(false) {
                continue;
            }

            if let Some((qualifier, column)) = token.rsplit_once('.') {
                let Some(table_name) = alias_map.get(&qualifier.to_ascii_lowercase()) else {
                    return Err(format!(
                        "`{token}` references unknown table or alias `{qualifier}`"
                    ));
                };
                let known = snapshot
                    .table(table_name)
                    .map(|table| table.has_column(column))
                    .unwrap_or(false);
                if !known {
                    return Err(format!(
                        "column `{column}` does not exist on `{table_name}`"
                    ));
                }
            } else {
                if is_reserved(token)
                    || output_aliases.contains(&token.to_ascii_lowercase())
                    || alias_map.contains_key(&token.to_ascii_lowercase())
                {
                    continue;
                }
                let owners = owners_of(token, refs, snapshot);
                match owners.len() {
                    0 => {
                        return Err(format!(
                            "column `{token}` does not belong to any referenced table"
                        ));
                    }
                    1 => {}
                    _ => warnings.push(format!(
                        "column `{token}` is ambiguous across {}",
                        owners.join(" and ")
                    )),
                }
            }
        }
        Ok(())
    }
}

/// Tables that carry a column named `name`, deduplicated, sorted.
fn owners_of(name: &str, refs: &[TableRef], snapshot: &SchemaSnapshot) -> Vec<String> {
    let mut owners: BTreeSet<String> = BTreeSet::new();
    for table_ref in refs {
        if let Some(table) = snapshot.table(&table_ref.name) {
            if table.has_column(name) {
                owners.insert(table.qualified_name());
            }
        }
    }
    owners.into_iter().collect()
}

fn build_alias_map(refs: &[TableRef]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for table_ref in refs {
        map.insert(table_ref.name.to_ascii_lowercase(), table_ref.name.clone());
        if let Some((_, table_part)) = table_ref.name.split_once('.') {
            map.insert(table_part.to_ascii_lowercase(), table_ref.name.clone());
        }
        if let Some(alias) = &table_ref.alias {
            map.insert(alias.to_ascii_lowercase(), table_ref.name.clone());
        }
    }
    map
}

/// Explicit projection only: `*` and `alias.*` are rejected. Splitting
/// happens at top-level commas so `count(*)` and `price * quantity` pass.
fn check_projection(tokens: &[String]) -> Result<(), String> {
    let mut depth = 0usize;
    let mut end = tokens.len();
    for (i, token) in tokens.iter().enumerate().skip(1) {
        match token.as_str() {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            _ if depth == 0 && eq_kw(token, "FROM") => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    let mut items: Vec<Vec<&String>> = Vec::new();
    let mut item: Vec<&String> = Vec::new();
    let mut depth = 0usize;
    for token in &tokens[1..end] {
        match token.as_str() {
            "(" => {
                depth += 1;
                item.push(token);
            }
            ")" => {
                depth = depth.saturating_sub(1);
                item.push(token);
            }
            "," if depth == 0 => items.push(std::mem::take(&mut item)),
            _ => item.push(token),
        }
    }
    items.push(item);

    for mut item in items {
        while item
            .first()
            .map(|t| eq_kw(t, "DISTINCT") || eq_kw(t, "ALL"))
            .unwrap_or(false)
        {
            item.remove(0);
        }
        match item.as_slice() {
            [] => return Err("projection is empty".to_string()),
            [single] if single.as_str() == "*" => {
                return Err(
                    "wildcard projection is not allowed; name each column explicitly".to_string(),
                );
            }
            [single] if single.ends_with(".*") => {
                return Err(format!(
                    "wildcard projection `{single}` is not allowed; name each column explicitly"
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Every identifier after FROM or JOIN, including comma-separated lists.
/// A `(` after FROM opens a subquery whose own FROM is scanned on its own.
fn collect_table_refs(tokens: &[String]) -> Vec<TableRef> {
    let mut refs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if !(eq_kw(&tokens[i], "FROM") || eq_kw(&tokens[i], "JOIN")) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        loop {
            let Some(token) = tokens.get(j) else { break };
            if token == "(" {
                break;
            }
            if !is_identifier(token) {
                break;
            }
            let mut indices = vec![j];
            let name = token.clone();
            let mut alias = None;
            let mut k = j + 1;
            if tokens.get(k).map(|t| eq_kw(t, "AS")).unwrap_or(false) {
                indices.push(k);
                k += 1;
            }
            if let Some(candidate) = tokens.get(k) {
                if is_identifier(candidate) && !is_reserved(candidate) {
                    alias = Some(candidate.clone());
                    indices.push(k);
                    k += 1;
                }
            }
            refs.push(TableRef {
                name,
                alias,
                token_indices: indices,
            });
            // FROM a.x, b.y continues the table list.
            if tokens.get(k).map(|t| t == ",").unwrap_or(false) {
                j = k + 1;
                continue;
            }
            j = k;
            break;
        }
        i = j.max(i + 1);
    }
    refs
}

/// Each JOIN needs an ON whose condition touches both joined tables.
/// CROSS and NATURAL joins are exempt from the ON requirement.
fn check_joins(
    tokens: &[String],
    refs: &[TableRef],
    snapshot: &SchemaSnapshot,
    warnings: &mut Vec<String>,
) -> Result<(), String> {
    let alias_map = build_alias_map(refs);
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "(" => {
                depth += 1;
                continue;
            }
            ")" => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if !eq_kw(token, "JOIN") {
            continue;
        }
        let exempt = i
            .checked_sub(1)
            .and_then(|p| tokens.get(p))
            .map(|prev| eq_kw(prev, "CROSS") || eq_kw(prev, "NATURAL"))
            .unwrap_or(false);
        if exempt {
            continue;
        }

        match find_on_clause(tokens, i + 1, depth) {
            None => warnings.push("join without an explicit ON condition".to_string()),
            Some(expr) => {
                let mut touched: BTreeSet<String> = BTreeSet::new();
                for expr_token in expr {
                    if !is_identifier(expr_token) {
                        continue;
                    }
                    if let Some((qualifier, _)) = expr_token.rsplit_once('.') {
                        if let Some(table) = alias_map.get(&qualifier.to_ascii_lowercase()) {
                            touched.insert(table.to_ascii_lowercase());
                        }
                    } else if !is_reserved(expr_token) {
                        let owners = owners_of(expr_token, refs, snapshot);
                        if owners.len() == 1 {
                            touched.insert(owners[0].to_ascii_lowercase());
                        }
                    }
                }
                if touched.len() < 2 {
                    return Err(
                        "join condition must reference columns of both joined tables".to_string(),
                    );
                }
            }
        }
    }
    Ok(())
}

/// Tokens of the ON expression following a JOIN, if any, up to the next
/// clause boundary at the join's depth.
fn find_on_clause(tokens: &[String], start: usize, join_depth: usize) -> Option<&[String]> {
    let mut depth = join_depth;
    let mut on_start = None;
    let mut i = start;
    while i < tokens.len() {
        let token = &tokens[i];
        match token.as_str() {
            "(" => depth += 1,
            ")" => {
                if depth == join_depth {
                    break;
                }
                depth -= 1;
            }
            _ if depth == join_depth && on_start.is_none() && eq_kw(token, "ON") => {
                on_start = Some(i + 1);
            }
            _ if depth == join_depth && is_clause_boundary(token) => break,
            _ => {}
        }
        i += 1;
    }
    on_start.map(|s| &tokens[s..i])
}

fn is_clause_boundary(token: &str) -> bool {
    [
        "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT",
        "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL",
    ]
    .iter()
    .any(|kw| eq_kw(token, kw))
}

/// `Some(Some(n))` for `LIMIT n`, `Some(None)` for a LIMIT whose bound is
/// not a plain integer, `None` when there is no top-level LIMIT.
fn top_level_limit(tokens: &[String]) -> Option<Option<u64>> {
    let mut depth = 0usize;
    let mut found = None;
    for (i, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            _ if depth == 0 && eq_kw(token, "LIMIT") => {
                found = Some(tokens.get(i + 1).and_then(|t| t.parse::<u64>().ok()));
            }
            _ => {}
        }
    }
    found
}

fn eq_kw(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

fn is_reserved(token: &str) -> bool {
    RESERVED_WORDS.iter().any(|kw| eq_kw(token, kw))
}

fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
}

/// Replaces each single-quoted literal with `?` and strips `--` and
/// `/* */` comments, so later passes never trip on their contents.
fn mask_statement(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push('?');
                while let Some(inner) = chars.next() {
                    if inner == '\'' {
                        // Doubled quote is an escaped quote inside the literal.
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Identifier tokens keep dots, so `hr.employees` and `e.salary` are single
/// tokens; `alias.*` is folded into one token as well. Everything else is a
/// one-character symbol token.
fn lex(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_alphabetic() || c == '_' || c == '"' {
            let mut token = String::new();
            while let Some(&inner) = chars.peek() {
                if inner.is_ascii_alphanumeric() || inner == '_' || inner == '.' {
                    token.push(inner);
                    chars.next();
                } else if inner == '"' {
                    chars.next();
                } else if inner == '*' && token.ends_with('.') {
                    token.push('*');
                    chars.next();
                    break;
                } else {
                    break;
                }
            }
            tokens.push(token);
        } else if c.is_ascii_digit() {
            let mut token = String::new();
            while let Some(&inner) = chars.peek() {
                if inner.is_ascii_digit() || inner == '.' {
                    token.push(inner);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(token);
        } else {
            tokens.push(c.to_string());
            chars.next();
        }
    }
    tokens
}
