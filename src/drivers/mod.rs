//! Vendor driver seam.
//!
//! Clients never talk to a vendor library directly. File-store and relational
//! clients drive a [`Driver`] (one connection plus one cursor of a
//! transactional SQL engine) opened by a [`Connector`]. The time-series client
//! holds one of two transport handles with deliberately different result
//! semantics: a [`NativeSession`] whose results come back as a [`NativeResult`]
//! with bulk fetch helpers, or a [`RestCursor`] exposing column metadata and
//! tuple rows only.

use crate::core::db::connection::ConnectionConfig;
use crate::core::db::query::{ResultShape, Row, Value};
use crate::core::{DbError, Result};
use std::sync::Arc;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "odbc")]
pub mod odbc;
#[cfg(feature = "taos-native")]
pub mod taos_native;
#[cfg(feature = "taos-rest")]
pub mod taos_rest;

/// Column names plus positional rows, as a SQL engine returns them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RawResult { columns, rows }
    }

    /// Materializes rows in the requested shape; dict rows share one column list.
    pub fn into_rows(self, shape: ResultShape) -> Vec<Row> {
        match shape {
            ResultShape::Dict => {
                let columns: Arc<[String]> = self.columns.into();
                self.rows
                    .into_iter()
                    .map(|values| Row::record(Arc::clone(&columns), values))
                    .collect()
            }
            ResultShape::Tuple => self.rows.into_iter().map(Row::tuple).collect(),
        }
    }
}

/// One live connection and cursor of a transactional SQL engine.
pub trait Driver {
    /// Runs a statement that yields rows.
    fn query(&mut self, sql: &str) -> Result<RawResult>;
    /// Runs a statement that yields no rows. Returns the affected-row count when known.
    fn execute(&mut self, sql: &str) -> Result<Option<u64>>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    /// Releases cursor then connection. Must be safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Opens a [`Driver`] for a configuration.
pub trait Connector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Driver>>;
}

/// Result object of the native time-series protocol.
///
/// The native driver hands back a complete result with its own helpers for
/// both materializations, so no manual shaping is needed on this path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeResult {
    fields: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl NativeResult {
    pub fn new(fields: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        NativeResult { fields, rows }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn fetch_all_into_dict(self) -> Vec<Row> {
        RawResult::new(self.fields, self.rows).into_rows(ResultShape::Dict)
    }

    pub fn fetch_all(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

/// Native binary-protocol connection to the time-series store.
pub trait NativeSession {
    fn query(&mut self, sql: &str) -> Result<NativeResult>;
    fn execute(&mut self, sql: &str) -> Result<Option<u64>>;
    fn close(&mut self) -> Result<()>;
}

/// Column metadata reported by a REST cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
    pub length: Option<i64>,
}

/// Cursor over the REST protocol of the time-series store.
///
/// Mirrors a DB-API cursor: after `execute`, `description` reports the columns
/// of the last result and `fetchall` drains its rows as tuples.
pub trait RestCursor {
    /// Runs a statement. Returns the affected-row count when the statement wrote rows.
    fn execute(&mut self, sql: &str) -> Result<Option<u64>>;
    fn description(&self) -> &[ColumnDescription];
    fn fetchall(&mut self) -> Vec<Vec<Value>>;
    fn close(&mut self) -> Result<()>;
}

/// Opens time-series transports.
pub trait TaosConnector {
    fn native(&self, config: &ConnectionConfig) -> Result<Box<dyn NativeSession>>;
    fn rest(&self, config: &ConnectionConfig) -> Result<Box<dyn RestCursor>>;
}

/// Connector used when the driver for a backend was not compiled in.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableConnector {
    feature: &'static str,
}

impl Connector for UnavailableConnector {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        Err(DbError::Unsupported(format!(
            "driver not compiled in; rebuild with feature `{}`",
            self.feature
        )))
    }
}

/// The compiled-in connector for file-backed stores.
pub fn file_store_connector() -> Box<dyn Connector> {
    #[cfg(feature = "odbc")]
    return Box::new(odbc::OdbcConnector);
    #[cfg(not(feature = "odbc"))]
    return Box::new(UnavailableConnector { feature: "odbc" });
}

/// The compiled-in connector for client-server stores.
pub fn relational_connector() -> Box<dyn Connector> {
    #[cfg(feature = "mssql")]
    return Box::new(mssql::TdsConnector);
    #[cfg(not(feature = "mssql"))]
    return Box::new(UnavailableConnector { feature: "mssql" });
}

/// Time-series connector backed by whichever transports were compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTaosConnector;

impl TaosConnector for DefaultTaosConnector {
    fn native(&self, config: &ConnectionConfig) -> Result<Box<dyn NativeSession>> {
        #[cfg(feature = "taos-native")]
        return taos_native::connect(config);
        #[cfg(not(feature = "taos-native"))]
        {
            let _ = config;
            Err(DbError::Unsupported(
                "native transport not compiled in; rebuild with feature `taos-native`".to_string(),
            ))
        }
    }

    fn rest(&self, config: &ConnectionConfig) -> Result<Box<dyn RestCursor>> {
        #[cfg(feature = "taos-rest")]
        return taos_rest::connect(config);
        #[cfg(not(feature = "taos-rest"))]
        {
            let _ = config;
            Err(DbError::Unsupported(
                "REST transport not compiled in; rebuild with feature `taos-rest`".to_string(),
            ))
        }
    }
}
