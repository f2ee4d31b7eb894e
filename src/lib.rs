// Core infrastructure modules
pub mod core;
pub mod drivers;
pub mod sql;

// Feature-specific modules
pub mod backends;
pub mod catalog;
pub mod config;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::core::db::{
    open_client, Backend, ClientState, ColumnSchema, ConnectionConfig, DatabaseClient, Executed, Fetched,
    InsertRow, LimitPolicy, Outcome, Query, ResultShape, Row, Selection, SortOrder, Transport, Value,
};
pub use crate::core::{DbError, Result};
pub use crate::sql::Filter;
