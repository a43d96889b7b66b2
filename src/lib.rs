// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::core::db::{
    Arg, Connection, ConnectionTarget, DbColumn, DbColumns, DbType, DbTypeKind, Driver, InstantRow, InstantRows,
    QueryTemplate, Row, Rows, SqliteDriver, NULL,
};
pub use crate::core::{DbError, Result};
