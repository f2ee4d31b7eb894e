/// Query Model Module
///
/// Value types that cross the client boundary: scalar values, result rows,
/// rows to insert, the query specification and the statement classifier used
/// by `execute_raw`.

use crate::core::{DbError, Result};
use crate::sql::Filter;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Wall-clock timestamp text. The fraction keeps as many digits (3, 6 or 9)
/// as the value carries and is left out when it is zero.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A scalar value read from or written to a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Wall-clock time with no zone attached
    Timestamp(NaiveDateTime),
    /// An instant with the offset it was reported at
    TimestampTz(DateTime<FixedOffset>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts a JSON scalar. Arrays and objects are kept as their JSON text.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        Value::TimestampTz(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// How rows are materialized for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// Ordered column-name to value mapping
    #[default]
    Dict,
    /// Positional values only
    Tuple,
}

/// One result row, an immutable snapshot of what the store returned.
///
/// Dict-shaped rows carry the ordered column names alongside the values;
/// tuple-shaped rows carry values only.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Option<Arc<[String]>>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a dict-shaped row. `columns` and `values` are paired by position.
    pub fn record(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Row {
            columns: Some(columns),
            values,
        }
    }

    /// Creates a tuple-shaped row.
    pub fn tuple(values: Vec<Value>) -> Self {
        Row {
            columns: None,
            values,
        }
    }

    /// Builds a dict-shaped row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).unzip();
        Row::record(columns.into(), values)
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_tuple(&self) -> bool {
        self.columns.is_none()
    }

    /// Looks a value up by column name. Always `None` for tuple-shaped rows.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let columns = self.columns.as_ref()?;
        columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// `(column, value)` pairs in column order; empty for tuple-shaped rows.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .flat_map(|cols| cols.iter().map(String::as_str))
            .zip(self.values.iter())
    }

    /// Re-shapes the row. Converting a tuple to dict is not possible and leaves it as is.
    pub fn into_shape(self, shape: ResultShape) -> Row {
        match shape {
            ResultShape::Dict => self,
            ResultShape::Tuple => Row::tuple(self.values),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.columns {
            Some(columns) => {
                let mut map = serializer.serialize_map(Some(columns.len()))?;
                for (column, value) in columns.iter().zip(self.values.iter()) {
                    map.serialize_entry(column, value)?;
                }
                map.end()
            }
            None => {
                let mut seq = serializer.serialize_seq(Some(self.values.len()))?;
                for value in &self.values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

/// A row handed to `insert`.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRow {
    /// Values in the table's full column order
    Positional(Vec<Value>),
    /// Explicit column list, any order
    Fields(Vec<(String, Value)>),
    /// Neither a list nor a mapping; skipped with a warning
    Scalar(Value),
}

impl InsertRow {
    pub fn fields<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        InsertRow::Fields(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn positional<V: Into<Value>, I: IntoIterator<Item = V>>(values: I) -> Self {
        InsertRow::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Arrays become positional rows, objects become field rows, anything else is a scalar.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Array(items) => {
                InsertRow::Positional(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => InsertRow::Fields(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            other => InsertRow::Scalar(Value::from_json(other)),
        }
    }
}

impl From<Row> for InsertRow {
    fn from(row: Row) -> Self {
        match row.columns {
            Some(columns) => InsertRow::Fields(columns.iter().cloned().zip(row.values).collect()),
            None => InsertRow::Positional(row.values),
        }
    }
}

/// Row-count policy of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitPolicy {
    /// First row only; the caller receives a single row
    One,
    /// No limiting clause
    #[default]
    All,
    /// At most N rows, N > 0
    Top(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Specification of a SELECT issued through `DatabaseClient::query`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub table: String,
    /// Empty means all columns
    pub columns: Vec<String>,
    pub limit: LimitPolicy,
    pub filter: Option<Filter>,
    pub order: Vec<(String, SortOrder)>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Query {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn columns<S: Into<String>, I: IntoIterator<Item = S>>(mut self, columns: I) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: LimitPolicy) -> Self {
        self.limit = limit;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order.push((column.into(), order));
        self
    }

    /// Ordering given as parallel column and direction lists, which must have equal length.
    pub fn order_by_lists(mut self, columns: &[&str], orders: &[SortOrder]) -> Result<Self> {
        if columns.len() != orders.len() {
            return Err(DbError::precondition(format!(
                "ordering has {} columns but {} directions",
                columns.len(),
                orders.len()
            )));
        }
        self.order.extend(
            columns
                .iter()
                .zip(orders.iter())
                .map(|(c, o)| (c.to_string(), *o)),
        );
        Ok(self)
    }
}

/// Result of `query`: a single row for `LimitPolicy::One`, a list otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    One(Option<Row>),
    Many(Vec<Row>),
}

impl Selection {
    pub fn from_rows(rows: Vec<Row>, limit: LimitPolicy) -> Self {
        match limit {
            LimitPolicy::One => Selection::One(rows.into_iter().next()),
            _ => Selection::Many(rows),
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Selection::One(row) => row.into_iter().collect(),
            Selection::Many(rows) => rows,
        }
    }
}

/// Result of `execute_raw`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Executed {
    Rows(Vec<Row>),
    /// Affected-row count, when the backend reports one
    Affected(Option<u64>),
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT statement
    Select,
    /// SHOW / DESCRIBE catalog commands
    Catalog,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE statement
    Create,
    /// DROP statement
    Drop,
    /// ALTER statement
    Alter,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let sql_upper = sql.trim_start().to_uppercase();

        if sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH") {
            StatementType::Select
        } else if sql_upper.starts_with("SHOW")
            || sql_upper.starts_with("DESCRIBE")
            || sql_upper.starts_with("DESC ")
        {
            StatementType::Catalog
        } else if sql_upper.starts_with("INSERT") {
            StatementType::Insert
        } else if sql_upper.starts_with("UPDATE") {
            StatementType::Update
        } else if sql_upper.starts_with("DELETE") {
            StatementType::Delete
        } else if sql_upper.starts_with("CREATE") {
            StatementType::Create
        } else if sql_upper.starts_with("DROP") {
            StatementType::Drop
        } else if sql_upper.starts_with("ALTER") {
            StatementType::Alter
        } else {
            StatementType::Other
        }
    }

    /// Whether the statement produces a row set.
    pub fn returns_rows(self) -> bool {
        matches!(self, StatementType::Select | StatementType::Catalog)
    }
}
