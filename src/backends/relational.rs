/// Relational Client
///
/// Client for a client-server SQL engine speaking Transact-SQL. Statements use
/// `TOP n` limiting; tables and columns are introspected through the
/// `sys.tables` and `INFORMATION_SCHEMA.COLUMNS` catalog views.

use crate::core::db::client::{DatabaseClient, Fetched, Outcome};
use crate::core::db::connection::{log_failure, Backend, ClientState, ConnectionConfig, SqlSession};
use crate::core::db::query::{Executed, InsertRow, Query, ResultShape, Selection, Value};
use crate::core::db::schema::{columns_from_catalog, table_names, ColumnSchema};
use crate::core::{DbError, Result};
use crate::drivers::{self, Connector};
use crate::sql::{Dialect, Filter, SqlBuilder};

const LIST_TABLES: &str = "SELECT name FROM sys.tables";

pub struct RelationalClient {
    session: SqlSession,
}

impl RelationalClient {
    /// Client using the compiled-in TDS driver.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, drivers::relational_connector())
    }

    pub fn with_connector(config: ConnectionConfig, connector: Box<dyn Connector>) -> Self {
        RelationalClient {
            session: SqlSession::new(config, connector, SqlBuilder::new(Dialect::TSql)),
        }
    }

    /// Catalog query yielding `(name, type, length, extra)` per column in declaration order.
    fn describe_sql(&self, table: &str) -> Result<String> {
        let builder = self.session.builder();
        let name = builder.table(table)?;
        Ok(format!(
            "SELECT COLUMN_NAME, DATA_TYPE, \
             COALESCE(CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION), \
             CASE WHEN IS_NULLABLE = 'NO' THEN 'NOT NULL' ELSE '' END \
             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
            builder.literal(&Value::from(name))
        ))
    }
}

impl DatabaseClient for RelationalClient {
    fn backend(&self) -> Backend {
        Backend::Relational
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
        Ok(self
            .session
            .fetch(LIST_TABLES, ResultShape::Tuple)?
            .map(|rows| table_names(&rows)))
    }

    fn describe_table(&mut self, table: &str) -> Result<Fetched<Vec<ColumnSchema>>> {
        let sql = self.describe_sql(table)?;
        Ok(match self.session.fetch(&sql, ResultShape::Tuple)? {
            Fetched::Rows(rows) if rows.is_empty() => {
                // The catalog view lists no columns for a table that does not exist
                let e = DbError::statement(&sql, format!("table {} not found", table));
                log_failure("describe_table", &e);
                Fetched::Failed(e)
            }
            Fetched::Rows(rows) => match columns_from_catalog(&rows) {
                Ok(columns) => Fetched::Rows(columns),
                Err(e) => {
                    let e = e.with_sql(&sql);
                    log_failure("describe_table", &e);
                    Fetched::Failed(e)
                }
            },
            other => other.map(|_| Vec::new()),
        })
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
