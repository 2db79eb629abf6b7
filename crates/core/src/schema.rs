//! Warehouse schema snapshot shared across classification, feasibility,
//! generation, and validation.
//!
//! A snapshot is immutable once built. Components hold `Arc<SchemaSnapshot>`
//! clones, so a refresh swaps the pointer without touching in-flight runs.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// A single column in a warehouse table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A warehouse table plus its column definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            description: None,
            columns: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_column(mut self, column: SchemaColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// `schema.table`, the only form SQL candidates may reference.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// One-line rendering used in prompts and clarification suggestions.
    pub fn describe(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.qualified_name(), columns)
    }
}

#[derive(Deserialize)]
struct SnapshotDoc {
    tables: Vec<SchemaTable>,
}

/// Immutable view of every table a run is allowed to touch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    // Keyed by lowercased qualified name so lookups are case-insensitive.
    tables: BTreeMap<String, SchemaTable>,
}

impl SchemaSnapshot {
    pub fn from_tables(tables: Vec<SchemaTable>) -> Self {
        let tables = tables
            .into_iter()
            .map(|table| (table.qualified_name().to_ascii_lowercase(), table))
            .collect();
        Self { tables }
    }

    /// Parses the snapshot interchange document: `{"tables": [...]}`.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let doc: SnapshotDoc = serde_json::from_str(raw)?;
        Ok(Self::from_tables(doc.tables))
    }

    pub fn table(&self, qualified: &str) -> Option<&SchemaTable> {
        self.tables.get(&qualified.to_ascii_lowercase())
    }

    pub fn contains_table(&self, qualified: &str) -> bool {
        self.table(qualified).is_some()
    }

    pub fn tables(&self) -> impl Iterator<Item = &SchemaTable> {
        self.tables.values()
    }

    /// Qualified names in deterministic (sorted) order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(SchemaTable::qualified_name).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Process-wide cache holding the current snapshot.
///
/// Readers get an `Arc` clone; `install` replaces the snapshot for future
/// runs only.
#[derive(Debug, Default)]
pub struct SchemaCache {
    inner: RwLock<Arc<SchemaSnapshot>>,
}

impl SchemaCache {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn install(&self, snapshot: SchemaSnapshot) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(snapshot);
    }

    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        let guard = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }
}
