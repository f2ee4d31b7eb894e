/// File-Store Client
///
/// Client for a file-backed SQL engine reached through an ODBC data source
/// (Jet/Access SQL). Statements use `TOP n` limiting. The engine offers no
/// catalog the client can rely on, so table listing and description report
/// `Fetched::Unsupported` instead of guessing.

use crate::core::db::client::{DatabaseClient, Fetched, Outcome};
use crate::core::db::connection::{Backend, ClientState, ConnectionConfig, SqlSession};
use crate::core::db::query::{Executed, InsertRow, Query, Selection, Value};
use crate::core::db::schema::ColumnSchema;
use crate::core::{DbError, Result};
use crate::drivers::{self, Connector};
use crate::sql::{Dialect, Filter, SqlBuilder};
use tracing::warn;

pub struct FileStoreClient {
    session: SqlSession,
}

impl FileStoreClient {
    /// Client using the compiled-in ODBC driver.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, drivers::file_store_connector())
    }

    pub fn with_connector(config: ConnectionConfig, connector: Box<dyn Connector>) -> Self {
        FileStoreClient {
            session: SqlSession::new(config, connector, SqlBuilder::new(Dialect::Access)),
        }
    }

    fn unsupported<T>(&self, operation: &str) -> Fetched<T> {
        warn!(
            "{} is not supported by the file-store backend (dsn {})",
            operation,
            self.session.config().database
        );
        Fetched::Unsupported
    }
}

impl DatabaseClient for FileStoreClient {
    fn backend(&self) -> Backend {
        Backend::FileStore
    }

    fn state(&self) -> ClientState {
        self.session.state()
    }

    fn connect(&mut self) -> Result<bool> {
        self.session.connect()
    }

    fn close(&mut self) {
        self.session.close()
    }

    fn create_table(&mut self, table: &str, column_defs: &[&str]) -> Result<Outcome> {
        self.session.create_table(table, column_defs)
    }

    fn delete_table(&mut self, table: &str) -> Result<Outcome> {
        self.session.delete_table(table)
    }

    fn list_tables(&mut self) -> Result<Fetched<Vec<String>>> {
        Ok(self.unsupported("list_tables"))
    }

    fn has_table(&mut self, table: &str) -> Result<Fetched<bool>> {
        if table.is_empty() {
            return Err(DbError::precondition("table name must not be empty"));
        }
        Ok(self.unsupported("has_table"))
    }

    fn describe_table(&mut self, table: &str) -> Result<Fetched<Vec<ColumnSchema>>> {
        if table.is_empty() {
            return Err(DbError::precondition("table name must not be empty"));
        }
        Ok(self.unsupported("describe_table"))
    }

    fn execute_raw(&mut self, sql: &str) -> Result<Fetched<Executed>> {
        self.session.execute_raw(sql)
    }

    fn query(&mut self, query: &Query) -> Result<Fetched<Selection>> {
        self.session.query(query)
    }

    fn insert(&mut self, table: &str, rows: &[InsertRow]) -> Result<Outcome> {
        self.session.insert(table, rows)
    }

    fn update(&mut self, table: &str, fields: &[(String, Value)], filter: Option<&Filter>) -> Result<Outcome> {
        self.session.update(table, fields, filter)
    }

    fn delete(&mut self, table: &str, filter: Option<&Filter>) -> Result<Outcome> {
        self.session.delete(table, filter)
    }
}
