//! REST transport for the time-series store.
//!
//! Statements are posted as plain text to the adapter's
//! `http://<host>:<port>/rest/sql/<database>` endpoint with basic
//! authentication. Successful responses carry `column_meta` (name, type,
//! length per column) and `data` (one array per row); failures carry a
//! non-zero `code` and a `desc`.

use super::{ColumnDescription, RestCursor};
use crate::core::db::connection::ConnectionConfig;
use crate::core::db::query::Value;
use crate::core::{DbError, Result};
use chrono::DateTime;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const AFFECTED_ROWS: &str = "affected_rows";

#[derive(Debug, Deserialize)]
struct RestResponse {
    code: i64,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    column_meta: Vec<(String, serde_json::Value, Option<i64>)>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

/// DB-API style cursor over the REST endpoint. Each `execute` is one HTTP request.
pub struct RestSession {
    http: Option<Client>,
    url: String,
    user: String,
    password: String,
    description: Vec<ColumnDescription>,
    rows: Vec<Vec<Value>>,
}

/// Opens a REST session and checks that the server accepts the credentials.
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn RestCursor>> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .build()
        .map_err(|e| DbError::connection(e.to_string()))?;
    let session = RestSession {
        http: Some(http),
        url: format!(
            "http://{}:{}/rest/sql/{}",
            config.host,
            config.effective_port(),
            config.database
        ),
        user: config.effective_user(),
        password: config.effective_password(),
        description: Vec::new(),
        rows: Vec::new(),
    };
    session.post("SELECT SERVER_VERSION()").map_err(|e| match e {
        DbError::Statement { code, message, .. } => DbError::Connection { code, message },
        other => other,
    })?;
    Ok(Box::new(session))
}

impl RestSession {
    fn post(&self, sql: &str) -> Result<RestResponse> {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| DbError::connection("session already closed"))?;
        debug!("POST {}", self.url);
        let response = http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .body(sql.to_string())
            .send()
            .map_err(|e| DbError::connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| DbError::connection(e.to_string()))?;
        let parsed: RestResponse = serde_json::from_str(&body).map_err(|e| DbError::Connection {
            code: Some(i64::from(status.as_u16())),
            message: format!("unexpected response ({}): {}", e, body),
        })?;

        if parsed.code != 0 {
            return Err(DbError::Statement {
                sql: sql.to_string(),
                code: Some(parsed.code),
                message: parsed.desc.unwrap_or_else(|| format!("HTTP {}", status)),
            });
        }
        Ok(parsed)
    }
}

impl RestCursor for RestSession {
    fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        let response = self.post(sql)?;

        self.description = response
            .column_meta
            .iter()
            .map(|(name, type_name, length)| ColumnDescription {
                name: name.clone(),
                type_name: match type_name {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                length: *length,
            })
            .collect();

        let timestamp_columns: Vec<bool> = self
            .description
            .iter()
            .map(|c| c.type_name.eq_ignore_ascii_case("TIMESTAMP"))
            .collect();
        self.rows = response
            .data
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(idx, cell)| decode_cell(cell, timestamp_columns.get(idx).copied().unwrap_or(false)))
                    .collect()
            })
            .collect();

        let is_write = self.description.len() == 1 && self.description[0].name == AFFECTED_ROWS;
        Ok(if is_write {
            self.rows
                .first()
                .and_then(|row| row.first())
                .and_then(Value::as_i64)
                .map(|n| n.max(0) as u64)
        } else {
            None
        })
    }

    fn description(&self) -> &[ColumnDescription] {
        &self.description
    }

    fn fetchall(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }

    fn close(&mut self) -> Result<()> {
        self.http = None;
        self.description.clear();
        self.rows.clear();
        Ok(())
    }
}

/// Timestamps arrive as RFC 3339 text and keep their full precision and offset.
fn decode_cell(cell: &serde_json::Value, is_timestamp: bool) -> Value {
    if is_timestamp {
        if let Some(text) = cell.as_str() {
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Value::TimestampTz(ts);
            }
        }
    }
    Value::from_json(cell)
}
