//! Prompt assembly and model-output parsing.
//!
//! Every prompt the router sends and every raw completion it reads back is
//! handled here, so the contract between the two sides stays in one file.

use serde_json::Value;

use tabletalk_core::exec::ExecutionResult;
use tabletalk_core::intent::{Turn, TurnRole};
use tabletalk_core::schema::{SchemaSnapshot, SchemaTable};
use tabletalk_core::workflow::ClarifyReason;

/// Table names listed in the classification context.
const CLASSIFY_TABLE_CAP: usize = 15;
/// Table names offered to the clarifier as suggestions.
const CLARIFY_TABLE_CAP: usize = 10;
/// Rows shown to the summarizer; anything past this is counted, not shown.
const PREVIEW_ROWS: usize = 5;

const CLASSIFY_INSTRUCTIONS: &str = r#"You are an intent classifier for a natural-language warehouse assistant.

Classify the user's request into exactly ONE of three categories:

1. data_query - the user wants rows, aggregates, or insights from warehouse tables
   Examples: "Show me 5 employees", "What is the total order amount?", "Average salary by department"

2. conversation - greetings, questions about the assistant, general chat not about data
   Examples: "Hello", "What can you do?", "Thank you"

3. unclear - ambiguous, incomplete, or impossible to act on as written
   Examples: "Show me that thing", "What about yesterday?", "Give me the data"

Also provide a confidence score from 0.0 to 1.0:
- 0.9-1.0: very clear intent
- 0.75-0.89: clear intent
- 0.5-0.74: somewhat clear
- 0.0-0.49: ambiguous

Respond ONLY with JSON:
{"intent": "data_query" | "conversation" | "unclear", "confidence": 0.85, "reasoning": "brief explanation"}"#;

const GENERATE_INSTRUCTIONS: &str = r#"You are an expert SQL generator for a SQLite warehouse.

Generate one SQL query following these STRICT rules:

1. NO SELECT * - name every projected column explicitly
2. Use fully qualified table names (schema.table)
3. ALWAYS include a LIMIT clause
4. Use proper JOIN syntax when multiple tables are needed
5. Add WHERE clauses for filtering
6. Read-only SELECT only - no DDL or DML

Return ONLY the SQL query, nothing else."#;

const SUMMARIZE_INSTRUCTIONS: &str = r#"You are a data analyst presenting query results to a user.

Summarize the query results in 2-3 sentences:
1. Key findings or insights
2. Notable patterns or values
3. Brief context

Keep it concise and informative.

DO NOT:
- List all rows
- Dump raw data
- Repeat column names excessively"#;

const CONVERSE_INSTRUCTIONS: &str = r#"You are a helpful assistant for a natural-language warehouse service.

You help users with:
- General questions and conversation
- Explaining what you can do
- Guiding them toward querying their data

Keep responses concise (2-3 sentences), friendly, and actionable. If the user
wants data, encourage a specific question naming the tables they care about."#;

/// Classification prompt: instructions, recent history, table names, and the
/// question itself. Column detail stays out to keep the call fast.
pub fn classify(user_input: &str, history: &[Turn], snapshot: &SchemaSnapshot) -> String {
    let mut sections = vec![CLASSIFY_INSTRUCTIONS.to_string()];

    if !history.is_empty() {
        sections.push(format!("Recent conversation:\n{}", render_history(history)));
    }

    if !snapshot.is_empty() {
        let mut names = snapshot.table_names();
        names.truncate(CLASSIFY_TABLE_CAP);
        sections.push(format!("Available tables: {}", names.join(", ")));
    }

    sections.push(format!("Current query: {user_input}"));
    sections.join("\n\n")
}

/// Generation prompt over the feasible subset only; the model never sees
/// tables the matcher did not approve.
pub fn generate(user_input: &str, subset: &[&SchemaTable]) -> String {
    format!(
        "{GENERATE_INSTRUCTIONS}\n\nSchema:\n\n{}\n\nUser request: {user_input}\n\nGenerate the SQL query.",
        render_schema_subset(subset)
    )
}

pub fn summarize(user_input: &str, sql: &str, execution: &ExecutionResult) -> String {
    format!(
        "{SUMMARIZE_INSTRUCTIONS}\n\nUser asked: {user_input}\n\nQuery executed:\n{sql}\n\nResults ({} rows):\n{}\n\nSummarize these results.",
        execution.row_count,
        result_preview(execution, PREVIEW_ROWS)
    )
}

pub fn converse(user_input: &str, history: &[Turn]) -> String {
    let mut sections = vec![CONVERSE_INSTRUCTIONS.to_string()];
    if !history.is_empty() {
        sections.push(format!("Recent conversation:\n{}", render_history(history)));
    }
    sections.push(format!("Current message: {user_input}"));
    sections.join("\n\n")
}

/// Clarification prompt. The context block tells the model why the run
/// failed so its question can be specific rather than generic.
pub fn clarify(
    user_input: &str,
    reason: ClarifyReason,
    error: Option<&str>,
    snapshot: &SchemaSnapshot,
) -> String {
    let mut context = Vec::new();
    if let Some(error) = error {
        context.push(format!("Error encountered: {error}"));
    }
    if reason == ClarifyReason::Infeasible {
        context.push("The requested query cannot be fulfilled with the available tables.".to_string());
    }
    if !snapshot.is_empty() {
        let mut names = snapshot.table_names();
        names.truncate(CLARIFY_TABLE_CAP);
        context.push(format!("Available tables: {}", names.join(", ")));
    }
    let context = if context.is_empty() {
        "None".to_string()
    } else {
        context.join("\n")
    };

    format!(
        "You are a helpful assistant that asks clarifying questions.\n\n\
         The user's request was unclear or could not be processed.\n\n\
         Reason: {}\n\n\
         Your task:\n\
         1. Ask ONE specific clarifying question, OR\n\
         2. Suggest a rephrased version of the request.\n\n\
         Be helpful and guide the user toward a successful query. Keep your\n\
         response concise (2-3 sentences).\n\n\
         Context:\n{context}\n\n\
         User query: {user_input}",
        reason.as_str()
    )
}

/// Slices the first `{` through the last `}` out of a completion. Models
/// wrap JSON replies in prose and code fences; the object is what survives.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Deterministic cleanup of a generated statement: code fences, `--` and
/// `/* */` comments, whitespace runs, and a trailing semicolon all go.
/// Cleanup is not validation; the result may still be rejected downstream.
pub fn clean_sql(raw: &str) -> String {
    let fenced = strip_fences(raw);
    let no_blocks = strip_block_comments(fenced);
    let no_comments = strip_line_comments(&no_blocks);
    let collapsed = no_comments.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(';').trim().to_string()
}

/// Truncates to at most `max_chars` characters without cutting a word,
/// appending an ellipsis when anything was dropped.
pub fn enforce_char_budget(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let head = if text[cut..].starts_with(|c: char| c.is_whitespace()) {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(boundary) => &head[..boundary],
            None => head,
        }
    };
    format!("{}...", head.trim_end())
}

fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", role_label(turn.role), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn role_label(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
    }
}

fn render_schema_subset(subset: &[&SchemaTable]) -> String {
    if subset.is_empty() {
        return "No matching tables.".to_string();
    }
    let mut blocks = Vec::new();
    for table in subset {
        let mut lines = vec![format!("Table: {}", table.qualified_name()), "Columns:".to_string()];
        for column in &table.columns {
            lines.push(format!("  - {} ({})", column.name, column.data_type));
        }
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

fn result_preview(execution: &ExecutionResult, max_rows: usize) -> String {
    if execution.rows.is_empty() {
        return "No rows returned.".to_string();
    }
    let mut lines = vec![
        format!("Columns: {}", execution.columns().join(", ")),
        format!("Rows: {}", execution.row_count),
        String::new(),
    ];
    for row in execution.rows.iter().take(max_rows) {
        let rendered: Vec<String> = row.values().map(render_value).collect();
        lines.push(rendered.join(" | "));
    }
    if execution.rows.len() > max_rows {
        lines.push(format!("... ({} more rows)", execution.rows.len() - max_rows));
    }
    lines.join("\n")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn strip_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let body = &raw[open + 3..];
    let body = match body.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") => &body[3..],
        _ => body,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn strip_block_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(open) = rest.find("/*") {
        match rest[open + 2..].find("*/") {
            Some(close) => {
                out.push_str(&rest[..open]);
                out.push(' ');
                rest = &rest[open + 2 + close + 2..];
            }
            // Unterminated comment: leave the tail for the validator to refuse.
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn strip_line_comments(sql: &str) -> String {
    sql.lines()
        .map(|line| line.split_once("--").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n")
}
