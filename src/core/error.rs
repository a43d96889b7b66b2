/// unidb Error Module
///
/// This module defines the error types for the database-access layer.
/// Must-succeed operations return these errors; best-effort operations
/// report failure through `false` or `-1` instead.
use thiserror::Error;

/// Error type for every fallible unidb operation.
///
/// This enum covers:
/// - Driver-reported failures (connect, query, insert id)
/// - Use of a closed connection
/// - Placeholder/argument mismatches caught by `try_format`
/// - Native type codes the metadata extractor does not know
/// - Configuration loading and parsing
#[derive(Error, Debug)]
pub enum DbError {
    /// Failure reported by the driver, carrying its native error text
    #[error("Database error: {0}")]
    Database(String),

    /// Operation attempted on a connection that was closed
    #[error("Database error: connection is closed")]
    NotConnected,

    /// Query template placeholder count does not match the argument count
    #[error("Query error: template has {expected} placeholder(s) but {given} argument(s) were supplied")]
    Placeholder { expected: usize, given: usize },

    /// Native column type code with no portable mapping
    #[error("Schema error: unmapped native type code {0}")]
    UnmappedType(u8),

    /// Malformed `host[:port]` connection descriptor
    #[error("Connection descriptor error: {0}")]
    Descriptor(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
