/// # Test Utilities Module
///
/// In-process stand-ins for the vendor drivers, backed by an in-memory SQLite
/// database that is rewritten into each dialect's behaviour:
///
/// - `SELECT TOP n ...` becomes `... LIMIT n`
/// - catalog queries (`sys.tables`, `INFORMATION_SCHEMA.COLUMNS`, `SHOW TABLES`,
///   `DESCRIBE db.t`) are answered from `sqlite_master` and `pragma_table_info`
/// - time-series tables key on `ts`, and every insert replaces the row with the
///   same timestamp
/// - time-series `TIMESTAMP` columns come back as instants, in UTC over the
///   native transport and at the session offset over REST; RFC 3339 literals
///   are read at their own offset and stored as session wall-clock text
/// - multi-row `VALUES (..) (..)` gets its missing commas
///
/// Every statement a client sends is recorded so tests can assert on the
/// exact SQL text.

use crate::core::db::connection::{Backend, ConnectionConfig, Transport};
use crate::core::db::query::{StatementType, Value, TIMESTAMP_FORMAT};
use crate::core::{DbError, Result};
use crate::drivers::{
    ColumnDescription, Connector, Driver, NativeResult, NativeSession, RawResult, RestCursor, TaosConnector,
};
use crate::sql::Dialect;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

static TOP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^SELECT TOP (\d+) (.*)$").unwrap());
static COLUMNS_VIEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FROM INFORMATION_SCHEMA\.COLUMNS WHERE TABLE_NAME = '(\w+)'").unwrap());
static DESCRIBE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^DESCRIBE (?:\w+\.)?(\w+)$").unwrap());
static TS_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(ts TIMESTAMP").unwrap());
static VALUE_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)\s+\(").unwrap());
static ZONED_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2}))'").unwrap()
});

/// Offset of the emulated time-series session (the `Asia/Shanghai` default).
pub fn session_zone() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

/// A session wall-clock timestamp as the instant the time-series store reports.
pub fn session_instant(text: &str) -> Value {
    let naive = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).unwrap();
    Value::TimestampTz(session_zone().from_local_datetime(&naive).unwrap())
}

/// Rewrites RFC 3339 literals into the session wall-clock text the store keys on.
fn session_literals(sql: &str) -> String {
    ZONED_LITERAL
        .replace_all(sql, |caps: &regex::Captures<'_>| match DateTime::parse_from_rfc3339(&caps[1]) {
            Ok(ts) => format!(
                "'{}'",
                ts.with_timezone(&session_zone()).naive_local().format(TIMESTAMP_FORMAT)
            ),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

/// Turns the text of `TIMESTAMP` columns into instants reported at `zone`.
fn decode_timestamps(types: &[String], rows: &mut [Vec<Value>], zone: FixedOffset) {
    for row in rows.iter_mut() {
        for (value, type_name) in row.iter_mut().zip(types) {
            if !type_name.eq_ignore_ascii_case("TIMESTAMP") {
                continue;
            }
            let parsed = value
                .as_str()
                .and_then(|text| NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).ok())
                .and_then(|naive| session_zone().from_local_datetime(&naive).single());
            if let Some(ts) = parsed {
                *value = Value::TimestampTz(ts.with_timezone(&zone));
            }
        }
    }
}

const TABLE_LIST: &str = "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name";

/// Rewrites a statement of `dialect` into SQLite.
pub fn to_sqlite(dialect: Dialect, sql: &str) -> String {
    let sql = sql.trim();
    if let Some(caps) = TOP.captures(sql) {
        return format!("SELECT {} LIMIT {}", &caps[2], &caps[1]);
    }
    match dialect {
        Dialect::Access => sql.to_string(),
        Dialect::TSql => {
            if sql.eq_ignore_ascii_case("SELECT name FROM sys.tables") {
                return TABLE_LIST.to_string();
            }
            if let Some(caps) = COLUMNS_VIEW.captures(sql) {
                return format!(
                    "SELECT name, type, NULL, CASE WHEN \"notnull\" THEN 'NOT NULL' ELSE '' END \
                     FROM pragma_table_info('{}') ORDER BY cid",
                    &caps[1]
                );
            }
            sql.to_string()
        }
        Dialect::Taos => {
            let rewritten = session_literals(sql);
            let sql = rewritten.as_str();
            if sql.eq_ignore_ascii_case("SHOW TABLES") {
                return TABLE_LIST.to_string();
            }
            if let Some(caps) = DESCRIBE.captures(sql) {
                return format!(
                    "SELECT name, type, NULL, '' FROM pragma_table_info('{}') ORDER BY cid",
                    &caps[1]
                );
            }
            let upper = sql.to_uppercase();
            if upper.starts_with("CREATE TABLE") {
                return TS_KEY.replace(sql, "(ts TIMESTAMP PRIMARY KEY").into_owned();
            }
            if upper.starts_with("INSERT INTO") {
                let sql = format!("INSERT OR REPLACE INTO{}", &sql["INSERT INTO".len()..]);
                return VALUE_GROUPS.replace_all(&sql, "), (").into_owned();
            }
            sql.to_string()
        }
    }
}

fn sqlite_error(sql: &str, e: rusqlite::Error) -> DbError {
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _) => Some(i64::from(err.extended_code)),
        _ => None,
    };
    DbError::Statement {
        sql: sql.to_string(),
        code,
        message: e.to_string(),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(format!("{:?}", b)),
    }
}

/// Column names, declared types and rows of a SQLite query.
fn select(conn: &Connection, sql: &str) -> Result<(Vec<String>, Vec<String>, Vec<Vec<Value>>)> {
    let mut stmt = conn.prepare(sql).map_err(|e| sqlite_error(sql, e))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let types: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().unwrap_or("").to_string())
        .collect();
    let width = columns.len();

    let mut rows = stmt.query([]).map_err(|e| sqlite_error(sql, e))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| sqlite_error(sql, e))? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(from_sqlite(row.get_ref(idx).map_err(|e| sqlite_error(sql, e))?));
        }
        out.push(values);
    }
    Ok((columns, types, out))
}

/// A shared in-memory database plus the log of statements sent to it.
#[derive(Clone)]
pub struct Emulator {
    dialect: Dialect,
    conn: Arc<Mutex<Connection>>,
    log: Arc<Mutex<Vec<String>>>,
    reachable: bool,
}

impl Emulator {
    pub fn new(dialect: Dialect) -> Self {
        let conn = Connection::open_in_memory().expect("in-memory database opens");
        Emulator {
            dialect,
            conn: Arc::new(Mutex::new(conn)),
            log: Arc::new(Mutex::new(Vec::new())),
            reachable: true,
        }
    }

    /// An emulator whose connect attempts fail like an unreachable host.
    pub fn unreachable(dialect: Dialect) -> Self {
        Emulator {
            reachable: false,
            ..Emulator::new(dialect)
        }
    }

    /// Statements received so far, in dialect form.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.log.lock().unwrap().last().cloned()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Runs SQLite SQL directly, bypassing any client.
    pub fn seed(&self, sql: &str) {
        self.conn.lock().unwrap().execute_batch(sql).expect("seed statements run");
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(DbError::Connection {
                code: Some(10061),
                message: "connection refused".to_string(),
            })
        }
    }

    fn record(&self, sql: &str) -> String {
        self.log.lock().unwrap().push(sql.to_string());
        to_sqlite(self.dialect, sql)
    }

    fn query(&self, sql: &str) -> Result<(Vec<String>, Vec<String>, Vec<Vec<Value>>)> {
        let rewritten = self.record(sql);
        let conn = self.conn.lock().unwrap();
        select(&conn, &rewritten)
    }

    fn execute(&self, sql: &str, transactional: bool) -> Result<Option<u64>> {
        let rewritten = self.record(sql);
        let conn = self.conn.lock().unwrap();
        if transactional && conn.is_autocommit() {
            conn.execute_batch("BEGIN").map_err(|e| sqlite_error("BEGIN", e))?;
        }
        let affected = conn.execute(&rewritten, []).map_err(|e| sqlite_error(sql, e))?;
        Ok(Some(affected as u64))
    }

    fn finish(&self, statement: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if !conn.is_autocommit() {
            conn.execute_batch(statement).map_err(|e| sqlite_error(statement, e))?;
        }
        Ok(())
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(self.clone())
    }

    pub fn taos_connector(&self) -> Box<dyn TaosConnector> {
        Box::new(self.clone())
    }
}

impl Connector for Emulator {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        self.check_reachable()?;
        Ok(Box::new(EmulatedDriver {
            emulator: self.clone(),
            open: true,
        }))
    }
}

impl TaosConnector for Emulator {
    fn native(&self, _config: &ConnectionConfig) -> Result<Box<dyn NativeSession>> {
        self.check_reachable()?;
        Ok(Box::new(EmulatedNative {
            emulator: self.clone(),
        }))
    }

    fn rest(&self, _config: &ConnectionConfig) -> Result<Box<dyn RestCursor>> {
        self.check_reachable()?;
        Ok(Box::new(EmulatedRest {
            emulator: self.clone(),
            description: Vec::new(),
            rows: Vec::new(),
        }))
    }
}

/// Transactional driver over the emulator.
pub struct EmulatedDriver {
    emulator: Emulator,
    open: bool,
}

impl EmulatedDriver {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::connection("connection closed"))
        }
    }
}

impl Driver for EmulatedDriver {
    fn query(&mut self, sql: &str) -> Result<RawResult> {
        self.ensure_open()?;
        let (columns, _, rows) = self.emulator.query(sql)?;
        Ok(RawResult::new(columns, rows))
    }

    fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        self.ensure_open()?;
        self.emulator.execute(sql, true)
    }

    fn commit(&mut self) -> Result<()> {
        self.emulator.finish("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.emulator.finish("ROLLBACK")
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

/// Native time-series session over the emulator.
pub struct EmulatedNative {
    emulator: Emulator,
}

impl NativeSession for EmulatedNative {
    fn query(&mut self, sql: &str) -> Result<NativeResult> {
        let (columns, types, mut rows) = self.emulator.query(sql)?;
        decode_timestamps(&types, &mut rows, Utc.fix());
        Ok(NativeResult::new(columns, rows))
    }

    fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        self.emulator.execute(sql, false)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// REST time-series cursor over the emulator.
pub struct EmulatedRest {
    emulator: Emulator,
    description: Vec<ColumnDescription>,
    rows: Vec<Vec<Value>>,
}

impl RestCursor for EmulatedRest {
    fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        if StatementType::from_sql(sql).returns_rows() {
            let (columns, types, mut rows) = self.emulator.query(sql)?;
            decode_timestamps(&types, &mut rows, session_zone());
            self.description = columns
                .into_iter()
                .zip(types)
                .map(|(name, type_name)| ColumnDescription {
                    name,
                    type_name,
                    length: None,
                })
                .collect();
            self.rows = rows;
            return Ok(None);
        }
        let affected = self.emulator.execute(sql, false)?;
        self.description = vec![ColumnDescription {
            name: "affected_rows".to_string(),
            type_name: "INT".to_string(),
            length: Some(4),
        }];
        self.rows = vec![vec![Value::Int(affected.unwrap_or(0) as i64)]];
        Ok(affected)
    }

    fn description(&self) -> &[ColumnDescription] {
        &self.description
    }

    fn fetchall(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Configuration for a client under test. Time-series tests use database `main`,
/// the schema name SQLite gives the in-memory database.
pub fn test_config(backend: Backend) -> ConnectionConfig {
    match backend {
        Backend::FileStore => ConnectionConfig::new(Backend::FileStore, "plant_dsn"),
        Backend::Relational => ConnectionConfig::new(Backend::Relational, "plant")
            .host("localhost")
            .credentials("sa", "secret"),
        Backend::TimeSeries => ConnectionConfig::new(Backend::TimeSeries, "main").host("localhost"),
    }
}

pub fn rest_config() -> ConnectionConfig {
    test_config(Backend::TimeSeries).transport(Transport::Rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_top_to_limit() {
        assert_eq!(
            to_sqlite(Dialect::TSql, "SELECT TOP 3 id FROM t WHERE a = 1 ORDER BY id DESC"),
            "SELECT id FROM t WHERE a = 1 ORDER BY id DESC LIMIT 3"
        );
    }

    #[test]
    fn test_rewrites_time_series_statements() {
        assert_eq!(
            to_sqlite(Dialect::Taos, "CREATE TABLE main.t (ts TIMESTAMP, id INT)"),
            "CREATE TABLE main.t (ts TIMESTAMP PRIMARY KEY, id INT)"
        );
        assert_eq!(
            to_sqlite(Dialect::Taos, "INSERT INTO main.t (ts, id) VALUES ('t1', 1) ('t2', 2)"),
            "INSERT OR REPLACE INTO main.t (ts, id) VALUES ('t1', 1), ('t2', 2)"
        );
        assert!(to_sqlite(Dialect::Taos, "DESCRIBE main.t").contains("pragma_table_info('t')"));
    }

    #[test]
    fn test_zoned_literals_become_session_wall_clock() {
        assert_eq!(
            to_sqlite(Dialect::Taos, "DELETE FROM main.t WHERE ts = '2023-12-23T02:16:01.001001+00:00'"),
            "DELETE FROM main.t WHERE ts = '2023-12-23 10:16:01.001001'"
        );
        assert_eq!(
            to_sqlite(Dialect::Taos, "DELETE FROM main.t WHERE ts = '2023-12-23 10:16:01.001001'"),
            "DELETE FROM main.t WHERE ts = '2023-12-23 10:16:01.001001'"
        );
    }

    #[test]
    fn test_timestamp_columns_decode_per_transport() {
        let types = vec!["TIMESTAMP".to_string(), "INT".to_string()];
        let mut rows = vec![vec![Value::from("2023-12-23 10:16:01.001001"), Value::Int(1)]];
        decode_timestamps(&types, &mut rows, Utc.fix());

        assert_eq!(rows[0][0], session_instant("2023-12-23 10:16:01.001001"));
        assert_eq!(rows[0][0].to_string(), "2023-12-23T02:16:01.001001+00:00");
        assert_eq!(rows[0][1], Value::Int(1));
    }

    #[test]
    fn test_unreachable_emulator_refuses_connections() {
        let emulator = Emulator::unreachable(Dialect::TSql);
        let err = emulator.connect(&test_config(Backend::Relational)).err().unwrap();
        assert_eq!(err.code(), Some(10061));
    }
}
