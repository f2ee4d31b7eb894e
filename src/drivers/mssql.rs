//! TDS driver for the relational backend.
//!
//! `tiberius` is async; each driver owns a private current-thread runtime and
//! blocks on it, so callers see the synchronous round trips of the contract.

use super::{Connector, Driver, RawResult};
use crate::core::db::connection::ConnectionConfig;
use crate::core::db::query::Value;
use crate::core::{DbError, Result};
use chrono::NaiveDateTime;
use std::borrow::Cow;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

impl From<tiberius::error::Error> for DbError {
    fn from(e: tiberius::error::Error) -> Self {
        let code = match &e {
            tiberius::error::Error::Server(token) => Some(i64::from(token.code())),
            _ => None,
        };
        DbError::Connection {
            code,
            message: e.to_string(),
        }
    }
}

/// Opens [`TdsDriver`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TdsConnector;

impl Connector for TdsConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        Ok(Box::new(TdsDriver::open(config)?))
    }
}

pub struct TdsDriver {
    runtime: Runtime,
    client: Option<TdsClient>,
    in_transaction: bool,
}

impl TdsDriver {
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::connection(format!("cannot start I/O runtime: {}", e)))?;

        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(config.effective_port());
        tds.database(&config.database);
        tds.authentication(AuthMethod::sql_server(
            config.effective_user(),
            config.effective_password(),
        ));
        tds.trust_cert();

        let client = runtime.block_on(async {
            let tcp = TcpStream::connect(tds.get_addr())
                .await
                .map_err(|e| DbError::connection(e.to_string()))?;
            tcp.set_nodelay(true)
                .map_err(|e| DbError::connection(e.to_string()))?;
            Ok::<_, DbError>(Client::connect(tds, tcp.compat_write()).await?)
        })?;

        Ok(TdsDriver {
            runtime,
            client: Some(client),
            in_transaction: false,
        })
    }

    fn client(&mut self) -> Result<(&Runtime, &mut TdsClient)> {
        match self.client.as_mut() {
            Some(client) => Ok((&self.runtime, client)),
            None => Err(DbError::connection("connection already closed")),
        }
    }

    /// Runs a statement through `sp_executesql` and returns the affected-row count.
    fn batch(&mut self, sql: &str) -> Result<u64> {
        let (runtime, client) = self.client()?;
        let result = runtime.block_on(client.execute(sql, &[]))?;
        Ok(result.total())
    }

    /// Transaction control must run as a plain batch; an open transaction
    /// may not outlive an `sp_executesql` call.
    fn control(&mut self, sql: &str) -> Result<()> {
        let (runtime, client) = self.client()?;
        runtime.block_on(async {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<_, DbError>(())
        })
    }
}

impl Driver for TdsDriver {
    fn query(&mut self, sql: &str) -> Result<RawResult> {
        let (runtime, client) = self.client()?;
        runtime.block_on(async {
            let mut stream = client.simple_query(sql).await?;
            let columns = stream
                .columns()
                .await?
                .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let rows = stream
                .into_first_result()
                .await?
                .into_iter()
                .map(|row| row.into_iter().map(from_column).collect())
                .collect();
            Ok::<_, DbError>(RawResult::new(columns, rows))
        })
    }

    fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        if !self.in_transaction {
            self.control("BEGIN TRANSACTION")?;
            self.in_transaction = true;
        }
        Ok(Some(self.batch(sql)?))
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.control("COMMIT TRANSACTION")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.control("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            debug!("Closing TDS connection");
            self.runtime.block_on(client.close())?;
        }
        Ok(())
    }
}

fn from_column(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.map(f64::from).into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::Bit(v) => v.into(),
        ColumnData::String(v) => v.map(Cow::into_owned).into(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into(),
        ColumnData::Numeric(v) => v.map(f64::from).into(),
        ColumnData::Binary(v) => v
            .map(|bytes| bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>())
            .into(),
        other => match NaiveDateTime::from_sql(&other) {
            Ok(Some(ts)) => Value::Timestamp(ts),
            Ok(None) => Value::Null,
            Err(_) => Value::Text(format!("{:?}", other)),
        },
    }
}
