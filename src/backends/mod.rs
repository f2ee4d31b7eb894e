/// Backend Implementations
///
/// One `DatabaseClient` per store kind:
/// - **File store** (`file_store.rs`): file-backed SQL engine over ODBC, no catalog access
/// - **Relational** (`relational.rs`): client-server SQL engine with catalog views
/// - **Time series** (`time_series.rs`): append-only store over a native or REST transport

pub mod file_store;
pub mod relational;
pub mod time_series;

pub use file_store::FileStoreClient;
pub use relational::RelationalClient;
pub use time_series::TimeSeriesClient;
