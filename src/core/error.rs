/// PlantDB Error Module
///
/// This module defines the error types shared by every database client.
/// Only `DbError::Precondition` ever escapes a client method; every other
/// variant is logged and folded into an outcome value at the client boundary.
use thiserror::Error;

/// Comprehensive error type for the data-access layer.
///
/// This enum covers all error scenarios that can occur within PlantDB:
/// - Caller mistakes (empty table name, client not connected, bad ordering)
/// - Transport and authentication failures while connecting
/// - Statement execution failures reported by the store
/// - Configuration loading and parsing
#[derive(Error, Debug)]
pub enum DbError {
    /// Programmer error; never retried and never turned into an outcome
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Cannot reach host, bad credentials or transport timeout
    #[error("Connection error{}: {message}", code_suffix(code))]
    Connection { code: Option<i64>, message: String },

    /// Statement rejected or failed inside the store
    #[error("Statement failed{}: {message} (sql: {sql})", code_suffix(code))]
    Statement {
        sql: String,
        code: Option<i64>,
        message: String,
    },

    /// Capability missing on this backend or transport
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing and serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DbError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        DbError::Precondition(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        DbError::Connection {
            code: None,
            message: msg.into(),
        }
    }

    /// Statement failure without a vendor error code.
    pub fn statement(sql: &str, msg: impl Into<String>) -> Self {
        DbError::Statement {
            sql: sql.to_string(),
            code: None,
            message: msg.into(),
        }
    }

    /// Vendor error code, when the backend reported one.
    pub fn code(&self) -> Option<i64> {
        match self {
            DbError::Connection { code, .. } | DbError::Statement { code, .. } => *code,
            _ => None,
        }
    }

    /// Attaches the offending statement to a driver error that was raised without it.
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            DbError::Connection { code, message } => DbError::Statement {
                sql: sql.to_string(),
                code,
                message,
            },
            DbError::Statement { code, message, .. } => DbError::Statement {
                sql: sql.to_string(),
                code,
                message,
            },
            other => other,
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, DbError::Precondition(_))
    }
}

fn code_suffix(code: &Option<i64>) -> String {
    match code {
        Some(c) => format!(" [{c}]"),
        None => String::new(),
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
