use crate::core::db::query::{InsertRow, LimitPolicy, Query, Value, TIMESTAMP_FORMAT};
use crate::core::{DbError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;

/// SQL Statement Construction
///
/// Every statement a client sends is rendered here. Values are always turned
/// into literals through [`SqlBuilder::literal`], which escapes embedded quotes;
/// table and column names are validated as plain identifiers. The only way to
/// pass backend-native text through unchanged is [`Filter::raw`] (or
/// `execute_raw` on a client).

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));
static CONNECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(AND|OR)\b").expect("connective pattern is valid"));

/// Millisecond wall-clock text accepted by the `DATETIME` types of the SQL engines.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// SQL flavour spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// File-backed engine reached over ODBC (Access/Jet SQL)
    Access,
    /// Client-server engine (Transact-SQL)
    TSql,
    /// Append-only time-series engine (TDengine SQL)
    Taos,
}

impl Dialect {
    /// `TOP n` before the column list, or `LIMIT n` at the end.
    pub fn uses_top(self) -> bool {
        matches!(self, Dialect::Access | Dialect::TSql)
    }

    fn bool_literal(self, b: bool) -> &'static str {
        match (self, b) {
            (Dialect::TSql, true) => "1",
            (Dialect::TSql, false) => "0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }

    /// Time-series keys are written back at full precision so that a
    /// reinsert or per-row delete hits the exact stored key. Instants keep
    /// their offset, since a bare literal is read in the session's zone.
    fn naive_timestamp(self, ts: &NaiveDateTime) -> String {
        match self {
            Dialect::Taos => self.quote_text(&ts.format(TIMESTAMP_FORMAT).to_string()),
            Dialect::Access | Dialect::TSql => self.quote_text(&ts.format(DATETIME_FORMAT).to_string()),
        }
    }

    fn zoned_timestamp(self, ts: &DateTime<FixedOffset>) -> String {
        match self {
            Dialect::Taos => self.quote_text(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
            Dialect::Access | Dialect::TSql => self.naive_timestamp(&ts.naive_local()),
        }
    }

    fn quote_text(self, s: &str) -> String {
        match self {
            Dialect::Taos => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Dialect::Access | Dialect::TSql => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// Checks that `name` is a plain identifier (letters, digits, underscore).
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DbError::precondition("identifier must not be empty"));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(DbError::precondition(format!("invalid identifier: {:?}", name)));
    }
    Ok(())
}

fn validate_column(name: &str) -> Result<()> {
    if name == "*" {
        return Ok(());
    }
    validate_identifier(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// WHERE-clause predicate.
///
/// Structured variants render their values through the escaping literal
/// renderer. [`Filter::Raw`] is passed through verbatim and must never carry
/// untrusted input.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    NotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Backend-native boolean expression, used as is
    Raw(String),
}

impl Filter {
    fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::compare(column, CompareOp::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::compare(column, CompareOp::Ge, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::compare(column, CompareOp::Le, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Filter::NotNull(column.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Escape hatch: a backend-native predicate passed through without checks.
    pub fn raw(predicate: impl Into<String>) -> Self {
        Filter::Raw(predicate.into())
    }

    /// Whether this predicate is exactly `key_column = <value>`.
    ///
    /// Raw predicates qualify when they start with `<key_column>=`.
    pub fn is_key_equality(&self, key_column: &str) -> bool {
        match self {
            Filter::Compare {
                column,
                op: CompareOp::Eq,
                ..
            } => column == key_column,
            Filter::Raw(text) => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                compact.starts_with(&format!("{}=", key_column)) && !CONNECTIVE.is_match(text)
            }
            _ => false,
        }
    }
}

/// Renders statements for one dialect, optionally qualifying table names with
/// a database name (`db.table`).
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    dialect: Dialect,
    database: Option<String>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        SqlBuilder {
            dialect,
            database: None,
        }
    }

    /// Builder whose table references are prefixed with `database.`.
    pub fn qualified(dialect: Dialect, database: impl Into<String>) -> Self {
        SqlBuilder {
            dialect,
            database: Some(database.into()),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Validated, possibly qualified table reference.
    pub fn table(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(DbError::precondition("table name must not be empty"));
        }
        validate_identifier(name)?;
        Ok(match &self.database {
            Some(db) => format!("{}.{}", db, name),
            None => name.to_string(),
        })
    }

    /// Renders a value as a SQL literal.
    pub fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.dialect.bool_literal(*b).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) if x.is_finite() => x.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::Text(s) => self.dialect.quote_text(s),
            Value::Timestamp(ts) => self.dialect.naive_timestamp(ts),
            Value::TimestampTz(ts) => self.dialect.zoned_timestamp(ts),
        }
    }

    fn literals(&self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.literal(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders a predicate. Nested compound predicates are parenthesised.
    pub fn predicate(&self, filter: &Filter) -> Result<String> {
        match filter {
            Filter::Compare { column, op, value } => {
                validate_identifier(column)?;
                match (op, value) {
                    (CompareOp::Eq, Value::Null) => Ok(format!("{} IS NULL", column)),
                    (CompareOp::Ne, Value::Null) => Ok(format!("{} IS NOT NULL", column)),
                    _ => Ok(format!("{} {} {}", column, op.symbol(), self.literal(value))),
                }
            }
            Filter::IsNull(column) => {
                validate_identifier(column)?;
                Ok(format!("{} IS NULL", column))
            }
            Filter::NotNull(column) => {
                validate_identifier(column)?;
                Ok(format!("{} IS NOT NULL", column))
            }
            Filter::And(parts) => self.join_predicates(parts, " AND "),
            Filter::Or(parts) => self.join_predicates(parts, " OR "),
            Filter::Raw(text) => {
                if text.trim().is_empty() {
                    return Err(DbError::precondition("raw predicate must not be empty"));
                }
                Ok(text.clone())
            }
        }
    }

    fn join_predicates(&self, parts: &[Filter], separator: &str) -> Result<String> {
        if parts.is_empty() {
            return Err(DbError::precondition("compound predicate has no terms"));
        }
        let rendered = parts
            .iter()
            .map(|part| {
                let text = self.predicate(part)?;
                Ok(match part {
                    Filter::And(_) | Filter::Or(_) | Filter::Raw(_) if parts.len() > 1 => {
                        format!("({})", text)
                    }
                    _ => text,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join(separator))
    }

    fn where_clause(&self, filter: Option<&Filter>) -> Result<String> {
        match filter {
            Some(f) => Ok(format!(" WHERE {}", self.predicate(f)?)),
            None => Ok(String::new()),
        }
    }

    /// `CREATE TABLE` from "name type constraints" column definitions.
    pub fn create_table(&self, table: &str, column_defs: &[&str]) -> Result<String> {
        let table = self.table(table)?;
        if column_defs.is_empty() {
            return Err(DbError::precondition("a table needs at least one column"));
        }
        if column_defs.iter().any(|d| d.trim().is_empty()) {
            return Err(DbError::precondition("column definition must not be empty"));
        }
        Ok(format!("CREATE TABLE {} ({})", table, column_defs.join(", ")))
    }

    pub fn drop_table(&self, table: &str) -> Result<String> {
        Ok(format!("DROP TABLE {}", self.table(table)?))
    }

    /// SELECT for a query specification, with the limiting clause placed per dialect.
    pub fn select(&self, query: &Query) -> Result<String> {
        let table = self.table(&query.table)?;
        for column in &query.columns {
            validate_column(column)?;
        }
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query.columns.join(", ")
        };

        let limit = match query.limit {
            LimitPolicy::All => None,
            LimitPolicy::One => Some(1),
            LimitPolicy::Top(0) => {
                return Err(DbError::precondition("top-N limit must be greater than zero"))
            }
            LimitPolicy::Top(n) => Some(n),
        };

        let mut sql = match (limit, self.dialect.uses_top()) {
            (Some(n), true) => format!("SELECT TOP {} {} FROM {}", n, columns, table),
            _ => format!("SELECT {} FROM {}", columns, table),
        };
        sql.push_str(&self.where_clause(query.filter.as_ref())?);

        if !query.order.is_empty() {
            let orders = query
                .order
                .iter()
                .map(|(column, order)| {
                    validate_identifier(column)?;
                    Ok(format!("{} {}", column, order.keyword()))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if let (Some(n), false) = (limit, self.dialect.uses_top()) {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        Ok(sql)
    }

    /// `SELECT *` over the rows matching `filter` (all rows when `None`).
    pub fn select_matching(&self, table: &str, filter: Option<&Filter>) -> Result<String> {
        Ok(format!(
            "SELECT * FROM {}{}",
            self.table(table)?,
            self.where_clause(filter)?
        ))
    }

    /// INSERT for one row; `None` when the row is neither positional nor a mapping.
    pub fn insert(&self, table: &str, row: &InsertRow) -> Result<Option<String>> {
        let table = self.table(table)?;
        match row {
            InsertRow::Positional(values) => {
                if values.is_empty() {
                    return Err(DbError::precondition("positional row has no values"));
                }
                Ok(Some(format!(
                    "INSERT INTO {} VALUES ({})",
                    table,
                    self.literals(values)
                )))
            }
            InsertRow::Fields(fields) => {
                if fields.is_empty() {
                    return Err(DbError::precondition("field row has no fields"));
                }
                let mut columns = Vec::with_capacity(fields.len());
                let mut values = Vec::with_capacity(fields.len());
                for (column, value) in fields {
                    validate_identifier(column)?;
                    columns.push(column.as_str());
                    values.push(self.literal(value));
                }
                Ok(Some(format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    columns.join(", "),
                    values.join(", ")
                )))
            }
            InsertRow::Scalar(_) => Ok(None),
        }
    }

    /// One multi-row INSERT (`VALUES (..) (..)`, the time-series bulk form).
    ///
    /// The column list is taken from the first row; fields missing from a later
    /// row are written as NULL and extra fields are rejected.
    pub fn insert_many(&self, table: &str, rows: &[Vec<(String, Value)>]) -> Result<String> {
        let table = self.table(table)?;
        let first = rows
            .first()
            .ok_or_else(|| DbError::precondition("bulk insert needs at least one row"))?;
        if first.is_empty() {
            return Err(DbError::precondition("field row has no fields"));
        }
        let columns: Vec<&str> = first.iter().map(|(c, _)| c.as_str()).collect();
        for column in &columns {
            validate_identifier(column)?;
        }

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some((extra, _)) = row.iter().find(|(c, _)| !columns.contains(&c.as_str())) {
                return Err(DbError::precondition(format!(
                    "bulk insert row has column {:?} absent from the first row",
                    extra
                )));
            }
            let values: Vec<String> = columns
                .iter()
                .map(|column| {
                    row.iter()
                        .find(|(c, _)| c == column)
                        .map(|(_, v)| self.literal(v))
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            groups.push(format!("({})", values.join(", ")));
        }

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            groups.join(" ")
        ))
    }

    pub fn update(&self, table: &str, fields: &[(String, Value)], filter: Option<&Filter>) -> Result<String> {
        let table = self.table(table)?;
        if fields.is_empty() {
            return Err(DbError::precondition("update needs at least one field"));
        }
        let assignments = fields
            .iter()
            .map(|(column, value)| {
                validate_identifier(column)?;
                Ok(format!("{} = {}", column, self.literal(value)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "UPDATE {} SET {}{}",
            table,
            assignments.join(", "),
            self.where_clause(filter)?
        ))
    }

    pub fn delete(&self, table: &str, filter: Option<&Filter>) -> Result<String> {
        Ok(format!(
            "DELETE FROM {}{}",
            self.table(table)?,
            self.where_clause(filter)?
        ))
    }
}
