/// Time-Series Client
///
/// Client for an append-only, timestamp-keyed store (TDengine SQL), reachable
/// through either the native binary protocol or the REST adapter.
///
/// ## Dialect
///
/// - Every table starts with a `ts TIMESTAMP` key column, prepended by `create_table`
/// - Table names are qualified with the database name (`db.table`)
/// - Limiting uses a trailing `LIMIT n`
/// - There is no UPDATE: `update` selects the matching rows, overlays the new
///   field values and reinserts each row under its own timestamp, which the
///   store treats as a replace
/// - DELETE only accepts a timestamp equality, so other predicates are
///   resolved to timestamps first and deleted row by row
///
/// ## Transports
///
/// The two transports return results differently. Native results come with
/// their own bulk fetch helpers; REST cursors only report column metadata and
/// tuples, so dict rows are assembled here by zipping the column names with
/// each tuple. Every path that reads or writes branches on the transport in
/// [`TimeSeriesClient::fetch`] and [`TimeSeriesClient::run`].
///
/// The store has no transactions. A failing statement is logged and reported,
/// but rows written earlier in the same call stay written.

use crate::core::db::client::{DatabaseClient, Fetched, Outcome};
use crate::core::db::connection::{log_failure, Backend, ClientState, ConnectionConfig, Transport};
use crate::core::db::query::{Executed, InsertRow, Query, ResultShape, Row, Selection, StatementType, Value};
use crate::core::db::schema::{columns_from_catalog, table_names, ColumnSchema};
use crate::core::{DbError, Result};
use crate::drivers::{DefaultTaosConnector, NativeSession, RestCursor, TaosConnector};
use crate::sql::{validate_identifier, Dialect, Filter, SqlBuilder};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the mandatory leading key column.
pub const TIMESTAMP_COLUMN: &str = "ts";

/// The live transport of a connected client.
enum Link {
    Native(Box<dyn NativeSession>),
    Rest(Box<dyn RestCursor>),
}

pub struct TimeSeriesClient {
    config: ConnectionConfig,
    connector: Box<dyn TaosConnector>,
    link: Option<Link>,
    state: ClientState,
    builder: SqlBuilder,
}

impl TimeSeriesClient {
    /// Client using the compiled-in transports.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Box::new(DefaultTaosConnector))
    }

    pub fn with_connector(config: ConnectionConfig, connector: Box<dyn TaosConnector>) -> Self {
        let builder = SqlBuilder::qualified(Dialect::Taos, config.database.clone());
        TimeSeriesClient {
            config,
            connector,
            link: None,
            state: ClientState::Unconnected,
            builder,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn link(&mut self) -> Result<&mut Link> {
        match (self.state, self.link.as_mut()) {
            (ClientState::Connected, Some(link)) => Ok(link),
            _ => Err(DbError::precondition("call connect() before using the client")),
        }
    }

    /// Runs a row-returning statement and shapes its rows for the caller.
    fn fetch(&mut self, sql: &str, shape: ResultShape) -> Result<Fetched<Vec<Row>>> {
        debug!("{}", sql);
        let result = match self.link()? {
            Link::Native(session) => session.query(sql).map(|result| match shape {
                ResultShape::Dict => result.fetch_all_into_dict(),
                ResultShape::Tuple => result.fetch_all().into_iter().map(Row::tuple).collect(),
            }),
            Link::Rest(cursor) => cursor.execute(sql).map(|_| {
                let rows = cursor.fetchall();
                match shape {
                    ResultShape::Dict => {
                        let columns: Arc<[String]> = cursor
                            .description()
                            .iter()
                            .map(|column| column.name.clone())
                            .collect::<Vec<_>>()
                            .into();
                        rows.into_iter()
                            .map(|values| Row::record(Arc::clone(&columns), values))
                            .collect()
                    }
                    ResultShape::Tuple => rows.into_iter().map(Row::tuple).collect(),
                }
            }),
        };

        match result {
            Ok(rows) => Ok(Fetched::Rows(rows)),
            Err(e) => {
                let e = e.with_sql(sql);
                log_failure("query", &e);
                Ok(Fetched::Failed(e))
            }
        }
    }

    /// Runs a statement that yields no rows.
    fn run(&mut self, sql: &str) -> Result<Outcome> {
        debug!("{}", sql);
        let result = match self.link()? {
            Link::Native(session) => session.execute(sql),
            Link::Rest(cursor) => cursor.execute(sql),
        };
        match result {
            Ok(affected) => Ok(Outcome::Done { affected }),
            Err(e) => {
                let e = e.with_sql(sql);
                log_failure("execute", &e);
                Ok(Outcome::Failed(e))
            }
        }
    }

    /// Rows matching `filter` as dict rows, whatever the configured shape.
    fn matching_rows(&mut self, table: &str, filter: Option<&Filter>) -> Result<Fetched<Vec<Row>>> {
        let sql = self.builder.select_matching(table, filter)?;
        self.fetch(&sql, ResultShape::Dict)
    }

    /// Inserts mapping rows with one multi-row statement.
    ///
    /// The column list comes from the first row; keys missing from later rows
    /// are written as NULL. Rows that are not mappings are skipped with a
    /// warning. The batch is a single statement, so it is stored or rejected
    /// as a whole.
    pub fn insert_many(&mut self, table: &str, rows: &[InsertRow]) -> Result<Outcome> {
        self.builder.table(table)?;
        self.link()?;

        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                InsertRow::Fields(fields) => batch.push(fields.clone()),
                other => warn!("Skipping row that is not a mapping in bulk insert: {:?}", other),
            }
        }
        if batch.is_empty() {
            return Ok(Outcome::Empty);
        }
        let sql = self.builder.insert_many(table, &batch)?;
        self.run(&sql)
    }

    fn reinsert(&mut self, table: &str, rows: Vec<Row>, fields: &[(String, Value)]) -> Result<Outcome> {
        let mut written = 0u64;
        for row in rows {
            let mut merged: Vec<(String, Value)> = row
                .fields()
                .map(|(column, value)| (column.to_string(), value.clone()))
                .collect();
            for (column, value) in fields {
                match merged.iter_mut().find(|(existing, _)| existing == column) {
                    Some(slot) => slot.1 = value.clone(),
                    None => merged.push((column.clone(), value.clone())),
                }
            }

            let sql = self
                .builder
                .insert(table, &InsertRow::Fields(merged))?
                .ok_or_else(|| DbError::precondition("reinsert row has no fields"))?;
            match self.run(&sql)? {
                Outcome::Failed(e) => return Ok(Outcome::Failed(e)),
                _ => written += 1,
            }
        }
        Ok(Outcome::done(Some(written)))
    }

    fn delete_by_timestamp(&mut self, table: &str, rows: Vec<Row>) -> Result<Outcome> {
        let mut deleted = 0u64;
        for row in rows {
            let ts = match row.get(TIMESTAMP_COLUMN) {
                Some(ts) => ts.clone(),
                None => {
                    let e = DbError::statement(
                        &format!("DELETE FROM {}", self.builder.table(table)?),
                        format!("matched row has no {} column", TIMESTAMP_COLUMN),
                    );
                    log_failure("delete", &e);
                    return Ok(Outcome::Failed(e));
                }
            };
            let sql = self
                .builder
                .delete(table, Some(&Filter::eq(TIMESTAMP_COLUMN, ts)))?;
            match self.run(&sql)? {
                Outcome::Failed(e) => return Ok(Outcome::Failed(e)),
                Outcome::Done { affected } => deleted += affected.unwrap_or(1),
                Outcome::Empty => {}
            }
        }
        Ok(Outcome::done(Some(deleted)))
    }
}

impl DatabaseClient for TimeSeriesClient {
    fn backend(&self) -> Backend {
        Backend::TimeSeries
    }

    fn state(&self) -> ClientState {
        self.state
    }

    fn connect(&mut self) -> Result<bool> {
        self.config.validate()?;
        if self.state == ClientState::Connected {
            return Err(DbError::precondition("client is already connected"));
        }

        info!("Connecting: {}", self.config.summary());
        let opened = match self.config.transport {
            Transport::Native => self.connector.native(&self.config).map(Link::Native),
            Transport::Rest => self.connector.rest(&self.config).map(Link::Rest),
        };
        match opened {
            Ok(link) => {
                self.link = Some(link);
                self.state = ClientState::Connected;
                info!(
                    "Connected to time-series database {} over {:?}",
                    self.config.database, self.config.transport
                );
                Ok(true)
            }
            Err(e) => {
                log_failure("connect", &e);
                self.state = ClientState::Unconnected;
                Ok(false)
            }
        }
    }

    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            let closed = match link {
                Link::Native(mut session) => session.close(),
                Link::Rest(mut cursor) => cursor.close(),
            };
            if let Err(e) = closed {
                warn!("Error while closing time-series connection: {}", e);
            }
            info!("Closed time-series database {}", self.config.database);
        }
        self.state = ClientState::Closed;
    }

    fn create_table(&mut self, table: &str, column_defs: &[&str]) -> Result<Outcome> {
        let mut defs = Vec::with_capacity(column_defs.len() + 1);
        defs.push("ts TIMESTAMP");
        defs.extend_from_slice(column_defs);
        let sql = self.builder.create_table(table, &defs)?;
        self.run(&sql)
    }

    fn delete_table(&mut self, table: &str) -> Result<Outcome> {
        let sql = self.builder.drop_table(table)?;
        self.run(&sql)
    }

    fn list_tables(&mut self) -> Result<Fetched<Vec<String>>> {
        Ok(self
            .fetch("SHOW TABLES", ResultShape::Tuple)?
            .map(|rows| table_names(&rows)))
    }

    fn describe_table(&mut self, table: &str) -> Result<Fetched<Vec<ColumnSchema>>> {
        let sql = format!("DESCRIBE {}", self.builder.table(table)?);
        Ok(match self.fetch(&sql, ResultShape::Tuple)? {
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
        if sql.trim().is_empty() {
            return Err(DbError::precondition("SQL statement must not be empty"));
        }
        self.link()?;
        if StatementType::from_sql(sql).returns_rows() {
            let shape = self.config.result_shape;
            return Ok(self.fetch(sql, shape)?.map(Executed::Rows));
        }
        Ok(match self.run(sql)? {
            Outcome::Done { affected } => Fetched::Rows(Executed::Affected(affected)),
            Outcome::Empty => Fetched::Rows(Executed::Affected(Some(0))),
            Outcome::Failed(e) => Fetched::Failed(e),
        })
    }

    fn query(&mut self, query: &Query) -> Result<Fetched<Selection>> {
        let mut query = query.clone();
        // Selected columns always lead with the timestamp
        if !query.columns.is_empty() && query.columns[0] != TIMESTAMP_COLUMN && query.columns[0] != "*" {
            query.columns.retain(|c| c != TIMESTAMP_COLUMN);
            query.columns.insert(0, TIMESTAMP_COLUMN.to_string());
        }
        let sql = self.builder.select(&query)?;
        self.link()?;
        let shape = self.config.result_shape;
        Ok(self
            .fetch(&sql, shape)?
            .map(|rows| Selection::from_rows(rows, query.limit)))
    }

    fn insert(&mut self, table: &str, rows: &[InsertRow]) -> Result<Outcome> {
        self.builder.table(table)?;
        self.link()?;

        let mut inserted = 0u64;
        for row in rows {
            let sql = match self.builder.insert(table, row)? {
                Some(sql) => sql,
                None => {
                    warn!("Skipping row that is neither a list nor a mapping: {:?}", row);
                    continue;
                }
            };
            match self.run(&sql)? {
                Outcome::Failed(e) => return Ok(Outcome::Failed(e)),
                _ => inserted += 1,
            }
        }

        if inserted == 0 {
            return Ok(Outcome::Empty);
        }
        Ok(Outcome::done(Some(inserted)))
    }

    fn update(&mut self, table: &str, fields: &[(String, Value)], filter: Option<&Filter>) -> Result<Outcome> {
        self.builder.table(table)?;
        if fields.is_empty() {
            return Err(DbError::precondition("update needs at least one field"));
        }
        for (column, _) in fields {
            validate_identifier(column)?;
            if column == TIMESTAMP_COLUMN {
                return Err(DbError::precondition("the timestamp key cannot be updated"));
            }
        }
        if filter.is_none() {
            warn!("Updating every row of {}: no filter given", table);
        }

        match self.matching_rows(table, filter)? {
            Fetched::Rows(rows) if rows.is_empty() => {
                info!("No rows in {} matched the update filter", table);
                Ok(Outcome::Empty)
            }
            Fetched::Rows(rows) => self.reinsert(table, rows, fields),
            Fetched::Failed(e) => Ok(Outcome::Failed(e)),
            Fetched::Unsupported => Ok(Outcome::Failed(DbError::Unsupported(
                "row selection unavailable".to_string(),
            ))),
        }
    }

    fn delete(&mut self, table: &str, filter: Option<&Filter>) -> Result<Outcome> {
        let filter = match filter {
            None => {
                let sql = self.builder.delete(table, None)?;
                return self.run(&sql);
            }
            Some(filter) => filter,
        };

        if filter.is_key_equality(TIMESTAMP_COLUMN) {
            let sql = self.builder.delete(table, Some(filter))?;
            return Ok(match self.run(&sql)? {
                Outcome::Done { affected: Some(0) } => Outcome::Empty,
                other => other,
            });
        }

        match self.matching_rows(table, Some(filter))? {
            Fetched::Rows(rows) if rows.is_empty() => Ok(Outcome::Empty),
            Fetched::Rows(rows) => self.delete_by_timestamp(table, rows),
            Fetched::Failed(e) => Ok(Outcome::Failed(e)),
            Fetched::Unsupported => Ok(Outcome::Failed(DbError::Unsupported(
                "row selection unavailable".to_string(),
            ))),
        }
    }
}

impl Drop for TimeSeriesClient {
    fn drop(&mut self) {
        self.close();
    }
}
