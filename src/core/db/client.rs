/// Client Contract Module
///
/// The uniform data-access contract shared by every backend, the outcome types
/// it reports through, and the constructor that picks a backend from a
/// configuration.
///
/// ## Outcomes
///
/// Only precondition violations (programmer errors such as an empty table name
/// or using a client before `connect`) are returned as `Err`. Every runtime
/// failure is logged and reported as [`Fetched::Failed`] or [`Outcome::Failed`],
/// so callers can tell "nothing there" apart from "it broke" and from "this
/// backend cannot do that".

use crate::backends::{FileStoreClient, RelationalClient, TimeSeriesClient};
use crate::core::db::connection::{Backend, ClientState, ConnectionConfig};
use crate::core::db::query::{Executed, InsertRow, Query, Selection, Value};
use crate::core::db::schema::ColumnSchema;
use crate::core::{DbError, Result};
use crate::sql::Filter;

/// Result of a read operation.
#[derive(Debug)]
pub enum Fetched<T> {
    /// Success; an empty collection is still success
    Rows(T),
    /// The backend has no such capability
    Unsupported,
    /// The operation failed; the cause has already been logged
    Failed(DbError),
}

impl<T> Fetched<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Fetched<U> {
        match self {
            Fetched::Rows(rows) => Fetched::Rows(f(rows)),
            Fetched::Unsupported => Fetched::Unsupported,
            Fetched::Failed(e) => Fetched::Failed(e),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Fetched::Unsupported)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Fetched::Failed(_))
    }

    /// The rows, if the operation succeeded.
    pub fn rows(self) -> Option<T> {
        match self {
            Fetched::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Converts to a `Result`, turning the capability gap into `DbError::Unsupported`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Fetched::Rows(rows) => Ok(rows),
            Fetched::Unsupported => Err(DbError::Unsupported(
                "operation not supported by this backend".to_string(),
            )),
            Fetched::Failed(e) => Err(e),
        }
    }
}

/// Result of a mutating operation.
#[derive(Debug)]
pub enum Outcome {
    /// Applied; `affected` is the row count when the backend reports one
    Done { affected: Option<u64> },
    /// Nothing matched or nothing was given, not an error
    Empty,
    /// Failed and rolled back; the cause has already been logged
    Failed(DbError),
}

impl Outcome {
    pub fn done(affected: Option<u64>) -> Self {
        Outcome::Done { affected }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn into_result(self) -> Result<Option<u64>> {
        match self {
            Outcome::Done { affected } => Ok(affected),
            Outcome::Empty => Ok(Some(0)),
            Outcome::Failed(e) => Err(e),
        }
    }
}

/// Uniform CRUD and introspection contract implemented by every backend.
///
/// A client owns one connection. It is not shared between threads; open one
/// client per logical session instead. Dropping a client closes it.
pub trait DatabaseClient {
    fn backend(&self) -> Backend;

    fn state(&self) -> ClientState;

    /// Establishes the connection. `Ok(false)` when the store cannot be reached
    /// or the configured transport is not available; `Err` only for an invalid
    /// configuration or when already connected.
    fn connect(&mut self) -> Result<bool>;

    /// Releases the connection. Safe to call any number of times.
    fn close(&mut self);

    /// Creates a table from "name type constraints" column definitions.
    fn create_table(&mut self, table: &str, column_defs: &[&str]) -> Result<Outcome>;

    fn delete_table(&mut self, table: &str) -> Result<Outcome>;

    fn list_tables(&mut self) -> Result<Fetched<Vec<String>>>;

    fn has_table(&mut self, table: &str) -> Result<Fetched<bool>> {
        if table.is_empty() {
            return Err(DbError::precondition("table name must not be empty"));
        }
        Ok(self
            .list_tables()?
            .map(|tables| tables.iter().any(|t| t.eq_ignore_ascii_case(table))))
    }

    fn describe_table(&mut self, table: &str) -> Result<Fetched<Vec<ColumnSchema>>>;

    /// Runs backend-native SQL verbatim.
    fn execute_raw(&mut self, sql: &str) -> Result<Fetched<Executed>>;

    fn query(&mut self, query: &Query) -> Result<Fetched<Selection>>;

    /// Inserts rows one by one in a single transaction.
    fn insert(&mut self, table: &str, rows: &[InsertRow]) -> Result<Outcome>;

    fn update(&mut self, table: &str, fields: &[(String, Value)], filter: Option<&Filter>) -> Result<Outcome>;

    /// Deletes matching rows, or every row when `filter` is `None`.
    fn delete(&mut self, table: &str, filter: Option<&Filter>) -> Result<Outcome>;
}

/// Creates an unconnected client for the configured backend, using the
/// compiled-in drivers.
pub fn open_client(config: &ConnectionConfig) -> Box<dyn DatabaseClient> {
    match config.backend {
        Backend::FileStore => Box::new(FileStoreClient::new(config.clone())),
        Backend::Relational => Box::new(RelationalClient::new(config.clone())),
        Backend::TimeSeries => Box::new(TimeSeriesClient::new(config.clone())),
    }
}
