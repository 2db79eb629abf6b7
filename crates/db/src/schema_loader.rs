use tabletalk_core::schema::{SchemaColumn, SchemaSnapshot, SchemaTable};

use crate::connection::DbPool;

/// Introspects the warehouse and builds an immutable snapshot of every user
/// table in the `main` schema. SQLite internal tables are skipped.
pub async fn load_snapshot(pool: &DbPool) -> Result<SchemaSnapshot, sqlx::Error> {
    let table_names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        let columns: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT cid, name, type FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(&name)
        .fetch_all(pool)
        .await?;

        let mut table = SchemaTable::new("main", &name);
        for (_cid, column_name, declared_type) in columns {
            let data_type = if declared_type.trim().is_empty() {
                // Typeless columns are legal in SQLite.
                "ANY".to_string()
            } else {
                declared_type
            };
            table = table.with_column(SchemaColumn::new(column_name, data_type));
        }
        tables.push(table);
    }

    Ok(SchemaSnapshot::from_tables(tables))
}
