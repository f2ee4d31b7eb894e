/// Core Module for PlantDB
///
/// This module contains the fundamental components of the data-access layer:
/// the error taxonomy and the database contract with its value types.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
