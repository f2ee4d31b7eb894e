/// Database Module
///
/// This module provides the data-access contract for PlantDB, organized into
/// focused submodules.
///
/// ## Architecture
///
/// The database layer is split into four concerns:
/// - **Client Contract** (`client.rs`): The `DatabaseClient` trait and its outcome types
/// - **Connection Management** (`connection.rs`): Configuration, lifecycle state and transactions
/// - **Schema Introspection** (`schema.rs`): Column metadata reported by backend catalogs
/// - **Query Model** (`query.rs`): Values, rows, query specifications and their results
///
/// ## Error Handling
///
/// Preconditions surface as `DbError::Precondition`; every other failure is
/// logged and reported through `Fetched` or `Outcome`.
pub mod client;
pub mod connection;
pub mod query;
pub mod schema;

pub use client::*;
pub use connection::*;
pub use query::*;
pub use schema::*;
