/// Schema Introspection Module
///
/// Types describing table structure as reported by a backend catalog, and the
/// conversions from the catalog rows each backend returns.

use crate::core::db::query::{Row, Value};
use crate::core::{DbError, Result};
use serde::Serialize;

/// Represents one column of a table, in physical column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Declared type name (e.g., "INT", "NCHAR", "TIMESTAMP")
    pub type_name: String,
    /// Length in bytes/characters, or numeric precision, when the catalog reports one
    pub length: Option<i64>,
    /// Extra attributes ("NOT NULL", "TAG", ...), empty when there are none
    pub extra: String,
}

impl ColumnSchema {
    /// Creates a ColumnSchema from a positional catalog row
    /// `(name, type, length, extra)`.
    ///
    /// Both the time-series `DESCRIBE` output and the relational catalog query
    /// are shaped this way.
    pub fn from_catalog_row(row: &Row) -> Result<Self> {
        let values = row.values();
        let name = match values.first() {
            Some(Value::Text(name)) => name.clone(),
            other => {
                return Err(DbError::Unsupported(format!(
                    "catalog row without a column name: {:?}",
                    other
                )))
            }
        };
        let type_name = values.get(1).map(text_of).unwrap_or_default();
        let length = values.get(2).and_then(Value::as_i64);
        let extra = values.get(3).map(text_of).unwrap_or_default();

        Ok(ColumnSchema {
            name,
            type_name,
            length,
            extra,
        })
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Converts catalog rows into schema entries, keeping their order.
pub fn columns_from_catalog(rows: &[Row]) -> Result<Vec<ColumnSchema>> {
    rows.iter().map(ColumnSchema::from_catalog_row).collect()
}

/// Helper function to extract table names from a catalog listing, whose first
/// column holds the name.
pub fn table_names(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.values().first())
        .map(|v| v.to_string())
        .collect()
}
