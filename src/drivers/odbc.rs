//! ODBC driver for the file-store backend.
//!
//! The file store is addressed by data source name: `database` holds the DSN
//! configured in the ODBC driver manager. One process-wide ODBC environment is
//! created on first use and shared by every connection.

use super::{Connector, Driver, RawResult};
use crate::core::db::connection::ConnectionConfig;
use crate::core::db::query::Value;
use crate::core::{DbError, Result};
use odbc_api::buffers::TextRowSet;
use odbc_api::{Connection, ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use once_cell::sync::OnceCell;
use tracing::debug;

const BATCH_SIZE: usize = 256;
const MAX_TEXT_LEN: usize = 4096;

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

impl From<odbc_api::Error> for DbError {
    fn from(e: odbc_api::Error) -> Self {
        let code = match &e {
            odbc_api::Error::Diagnostics { record, .. } => Some(i64::from(record.native_error)),
            _ => None,
        };
        DbError::Connection {
            code,
            message: e.to_string(),
        }
    }
}

fn environment() -> Result<&'static Environment> {
    ENVIRONMENT.get_or_try_init(|| Environment::new().map_err(DbError::from))
}

/// Opens [`OdbcDriver`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdbcConnector;

impl Connector for OdbcConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
        Ok(Box::new(OdbcDriver::open(config)?))
    }
}

pub struct OdbcDriver {
    connection: Option<Connection<'static>>,
}

impl OdbcDriver {
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let connection_string = format!(
            "DSN={};UID={};PWD={}",
            config.database,
            config.effective_user(),
            config.effective_password()
        );
        let connection = environment()?
            .connect_with_connection_string(&connection_string, ConnectionOptions::default())?;
        connection.set_autocommit(false)?;
        Ok(OdbcDriver {
            connection: Some(connection),
        })
    }

    fn connection(&self) -> Result<&Connection<'static>> {
        self.connection
            .as_ref()
            .ok_or_else(|| DbError::connection("connection already closed"))
    }
}

impl Driver for OdbcDriver {
    fn query(&mut self, sql: &str) -> Result<RawResult> {
        let mut statement = self.connection()?.preallocate()?;
        let mut cursor = match statement.execute(sql, ())? {
            Some(cursor) => cursor,
            None => return Ok(RawResult::default()),
        };

        let columns: Vec<String> = cursor.column_names()?.collect::<std::result::Result<_, _>>()?;
        let mut types = Vec::with_capacity(columns.len());
        for idx in 1..=columns.len() {
            types.push(cursor.col_data_type(idx as u16)?);
        }

        let buffer = TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN))?;
        let mut row_set = cursor.bind_buffer(buffer)?;
        let mut rows = Vec::new();
        while let Some(batch) = row_set.fetch()? {
            for row in 0..batch.num_rows() {
                let values = (0..batch.num_cols())
                    .map(|col| decode_text(batch.at_as_str(col, row).ok().flatten(), types[col]))
                    .collect();
                rows.push(values);
            }
        }
        Ok(RawResult::new(columns, rows))
    }

    fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        let mut statement = self.connection()?.preallocate()?;
        statement.execute(sql, ())?;
        Ok(statement.row_count()?.map(|n| n as u64))
    }

    fn commit(&mut self) -> Result<()> {
        Ok(self.connection()?.commit()?)
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(self.connection()?.rollback()?)
    }

    fn close(&mut self) -> Result<()> {
        if self.connection.take().is_some() {
            debug!("Closed ODBC connection");
        }
        Ok(())
    }
}

/// Converts the text form of a cell back to a typed value using the column's SQL type.
fn decode_text(text: Option<&str>, data_type: DataType) -> Value {
    let text = match text {
        Some(text) => text,
        None => return Value::Null,
    };
    let parsed = match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
            text.trim().parse::<i64>().ok().map(Value::Int)
        }
        DataType::Real
        | DataType::Float { .. }
        | DataType::Double
        | DataType::Decimal { .. }
        | DataType::Numeric { .. } => text.trim().parse::<f64>().ok().map(Value::Float),
        DataType::Bit => Some(Value::Bool(text.trim() == "1")),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}
