/// Database Module
///
/// This module provides the database-access layer, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Driver Boundary** (`driver.rs`): the native cursor protocol as traits
/// - **SQLite Driver** (`sqlite.rs`): an embedded implementation of that protocol
/// - **Query Templates** (`template.rs`): `?` placeholders and argument formatting
/// - **Connection Management** (`connection.rs`): open/close, encoding, statement execution
/// - **Query Execution** (`query.rs`): streaming, zero-copy and buffered result materialization
/// - **Column Metadata** (`schema.rs`): native field descriptors to portable types
///
/// ## Error Handling
///
/// Must-succeed operations return `DbError`; best-effort operations return
/// `false` or `-1`.
pub mod connection;
pub mod driver;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod template;

pub use connection::*;
pub use driver::{field_flags, Driver, NativeField, NativeResult, NativeRow, NativeType};
pub use query::*;
pub use schema::*;
pub use sqlite::{SqliteDriver, SqliteResult};
pub use template::*;
