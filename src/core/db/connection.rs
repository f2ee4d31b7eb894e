/// Connection Management Module
///
/// This module provides the connection configuration value type, the client
/// lifecycle states, and `SqlSession`, the connection/transaction lifecycle
/// shared by the transactional backends (file-store and relational).

use crate::core::db::client::{Fetched, Outcome};
use crate::core::db::query::{Executed, InsertRow, Query, ResultShape, Row, Selection, StatementType, Value};
use crate::core::{DbError, Result};
use crate::drivers::{Connector, Driver};
use crate::sql::{Filter, SqlBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Which kind of store a configuration points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// File-backed SQL engine reached through an ODBC data source
    FileStore,
    /// Client-server SQL engine
    Relational,
    /// Append-only time-series store
    TimeSeries,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::FileStore => "file_store",
            Backend::Relational => "relational",
            Backend::TimeSeries => "time_series",
        };
        write!(f, "{}", name)
    }
}

/// Wire protocol used to reach the time-series store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Binary protocol through the native client library
    #[default]
    Native,
    /// HTTP protocol through the REST adapter
    Rest,
}

fn default_charset() -> String {
    "UTF8".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

/// How to reach a store. Immutable once handed to a client.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub backend: Backend,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Database name, or the data source name for the file store
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default)]
    pub transport: Transport,
    /// Client configuration directory (native time-series transport only)
    #[serde(default)]
    pub client_config_path: Option<PathBuf>,
    /// Session time zone (native time-series transport only)
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Request timeout (REST time-series transport only)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    #[serde(default)]
    pub result_shape: ResultShape,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("transport", &self.transport)
            .field("client_config_path", &self.client_config_path)
            .field("timezone", &self.timezone)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field("result_shape", &self.result_shape)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(backend: Backend, database: impl Into<String>) -> Self {
        ConnectionConfig {
            backend,
            host: String::new(),
            port: None,
            user: None,
            password: None,
            database: database.into(),
            charset: default_charset(),
            transport: Transport::default(),
            client_config_path: None,
            timezone: default_timezone(),
            http_timeout_seconds: default_http_timeout(),
            result_shape: ResultShape::default(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn result_shape(mut self, shape: ResultShape) -> Self {
        self.result_shape = shape;
        self
    }

    pub fn http_timeout_seconds(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    /// Port to dial, falling back to the backend's conventional port.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match (self.backend, self.transport) {
            (Backend::TimeSeries, Transport::Native) => 6030,
            (Backend::TimeSeries, Transport::Rest) => 6041,
            (Backend::Relational, _) => 1433,
            (Backend::FileStore, _) => 0,
        })
    }

    /// User name, falling back to the time-series superuser.
    pub fn effective_user(&self) -> String {
        match (&self.user, self.backend) {
            (Some(user), _) => user.clone(),
            (None, Backend::TimeSeries) => "root".to_string(),
            (None, _) => String::new(),
        }
    }

    pub fn effective_password(&self) -> String {
        match (&self.password, self.backend) {
            (Some(password), _) => password.clone(),
            (None, Backend::TimeSeries) => "taosdata".to_string(),
            (None, _) => String::new(),
        }
    }

    /// Checks the fields every backend needs before `connect`.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(DbError::precondition("database name must be specified"));
        }
        if self.backend != Backend::FileStore && self.host.trim().is_empty() {
            return Err(DbError::precondition(format!(
                "host must be specified for the {} backend",
                self.backend
            )));
        }
        Ok(())
    }

    /// One-line description for logs, without the password.
    pub fn summary(&self) -> String {
        match self.backend {
            Backend::FileStore => format!(
                "backend={}, dsn={}, user={}",
                self.backend,
                self.database,
                self.effective_user()
            ),
            Backend::Relational => format!(
                "backend={}, host={}, port={}, user={}, database={}, charset={}",
                self.backend,
                self.host,
                self.effective_port(),
                self.effective_user(),
                self.database,
                self.charset
            ),
            Backend::TimeSeries => format!(
                "backend={}, host={}, port={}, user={}, database={}, transport={:?}, timezone={}",
                self.backend,
                self.host,
                self.effective_port(),
                self.effective_user(),
                self.database,
                self.transport,
                self.timezone
            ),
        }
    }
}

/// Lifecycle of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// Constructed, or a connect attempt failed
    #[default]
    Unconnected,
    /// Owns a live connection and cursor
    Connected,
    /// Connection released; may be connected again
    Closed,
}

/// Logs a failure with the backend code when one was reported.
pub(crate) fn log_failure(context: &str, err: &DbError) {
    match err {
        DbError::Statement { sql, code, message } => {
            error!("{} failed (code {:?}): {} | sql: {}", context, code, message, sql)
        }
        DbError::Connection { code, message } => {
            error!("{} failed (code {:?}): {}", context, code, message)
        }
        other => error!("{} failed: {}", context, other),
    }
}

/// Connection and transaction lifecycle over a transactional [`Driver`].
///
/// Both the file-store and relational clients are thin wrappers around one of
/// these; only the dialect and the catalog support differ between them.
pub struct SqlSession {
    config: ConnectionConfig,
    connector: Box<dyn Connector>,
    driver: Option<Box<dyn Driver>>,
    state: ClientState,
    builder: SqlBuilder,
}

impl SqlSession {
    pub fn new(config: ConnectionConfig, connector: Box<dyn Connector>, builder: SqlBuilder) -> Self {
        SqlSession {
            config,
            connector,
            driver: None,
            state: ClientState::Unconnected,
            builder,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn builder(&self) -> &SqlBuilder {
        &self.builder
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Opens the connection. `Ok(false)` when the store cannot be reached.
    pub fn connect(&mut self) -> Result<bool> {
        self.config.validate()?;
        if self.state == ClientState::Connected {
            return Err(DbError::precondition("client is already connected"));
        }

        info!("Connecting: {}", self.config.summary());
        match self.connector.connect(&self.config) {
            Ok(driver) => {
                self.driver = Some(driver);
                self.state = ClientState::Connected;
                info!("Connected to {} database {}", self.config.backend, self.config.database);
                Ok(true)
            }
            Err(e) => {
                log_failure("connect", &e);
                self.state = ClientState::Unconnected;
                Ok(false)
            }
        }
    }

    /// Releases cursor and connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.close() {
                warn!("Error while closing {} connection: {}", self.config.backend, e);
            }
            info!("Closed {} database {}", self.config.backend, self.config.database);
        }
        self.state = ClientState::Closed;
    }

    fn driver(&mut self) -> Result<&mut Box<dyn Driver>> {
        match (self.state, self.driver.as_mut()) {
            (ClientState::Connected, Some(driver)) => Ok(driver),
            _ => Err(DbError::precondition("call connect() before using the client")),
        }
    }

    /// Rolls back after a failure; a failing rollback is only logged.
    fn rollback(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            if let Err(e) = driver.rollback() {
                warn!("Rollback failed: {}", e);
            }
        }
    }

    /// Runs a row-returning statement and shapes the rows.
    pub fn fetch(&mut self, sql: &str, shape: ResultShape) -> Result<Fetched<Vec<Row>>> {
        let driver = self.driver()?;
        debug!("{}", sql);
        match driver.query(sql) {
            Ok(raw) => Ok(Fetched::Rows(raw.into_rows(shape))),
            Err(e) => {
                let e = e.with_sql(sql);
                log_failure("query", &e);
                Ok(Fetched::Failed(e))
            }
        }
    }

    /// Runs one statement and commits; rolls back on failure.
    pub fn run(&mut self, sql: &str) -> Result<Outcome> {
        let driver = self.driver()?;
        debug!("{}", sql);
        let result = driver.execute(sql).and_then(|affected| {
            driver.commit()?;
            Ok(affected)
        });
        match result {
            Ok(affected) => Ok(Outcome::Done { affected }),
            Err(e) => {
                let e = e.with_sql(sql);
                log_failure("execute", &e);
                self.rollback();
                Ok(Outcome::Failed(e))
            }
        }
    }

    /// Like [`SqlSession::run`], reporting zero affected rows as `Outcome::Empty`.
    fn run_matching(&mut self, sql: &str) -> Result<Outcome> {
        Ok(match self.run(sql)? {
            Outcome::Done { affected: Some(0) } => Outcome::Empty,
            other => other,
        })
    }

    pub fn create_table(&mut self, table: &str, column_defs: &[&str]) -> Result<Outcome> {
        let sql = self.builder.create_table(table, column_defs)?;
        self.run(&sql)
    }

    pub fn delete_table(&mut self, table: &str) -> Result<Outcome> {
        let sql = self.builder.drop_table(table)?;
        self.run(&sql)
    }

    pub fn execute_raw(&mut self, sql: &str) -> Result<Fetched<Executed>> {
        if sql.trim().is_empty() {
            return Err(DbError::precondition("SQL statement must not be empty"));
        }
        self.driver()?;
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

    pub fn query(&mut self, query: &Query) -> Result<Fetched<Selection>> {
        let sql = self.builder.select(query)?;
        self.driver()?;
        let shape = self.config.result_shape;
        Ok(self
            .fetch(&sql, shape)?
            .map(|rows| Selection::from_rows(rows, query.limit)))
    }

    /// Inserts row by row inside one transaction; any failing row rolls back the batch.
    pub fn insert(&mut self, table: &str, rows: &[InsertRow]) -> Result<Outcome> {
        self.builder.table(table)?;
        self.driver()?;

        let mut inserted = 0u64;
        for row in rows {
            let sql = match self.builder.insert(table, row)? {
                Some(sql) => sql,
                None => {
                    warn!("Skipping row that is neither a list nor a mapping: {:?}", row);
                    continue;
                }
            };
            debug!("{}", sql);
            let driver = self.driver()?;
            if let Err(e) = driver.execute(&sql) {
                let e = e.with_sql(&sql);
                log_failure("insert", &e);
                self.rollback();
                return Ok(Outcome::Failed(e));
            }
            inserted += 1;
        }

        if inserted == 0 {
            return Ok(Outcome::Empty);
        }
        let driver = self.driver()?;
        if let Err(e) = driver.commit() {
            log_failure("commit", &e);
            self.rollback();
            return Ok(Outcome::Failed(e));
        }
        Ok(Outcome::Done {
            affected: Some(inserted),
        })
    }

    pub fn update(&mut self, table: &str, fields: &[(String, Value)], filter: Option<&Filter>) -> Result<Outcome> {
        let sql = self.builder.update(table, fields, filter)?;
        self.run_matching(&sql)
    }

    pub fn delete(&mut self, table: &str, filter: Option<&Filter>) -> Result<Outcome> {
        let sql = self.builder.delete(table, filter)?;
        self.run_matching(&sql)
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        self.close();
    }
}
