/// Core Module for unidb
///
/// This module contains the database-access layer and its error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
