//! Error types for sift.

use thiserror::Error;

/// A bad field-attribute combination, detected while building an
/// [`EntityTypeIndex`](crate::index::EntityTypeIndex).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Tag matching reads a JSON array, so the field must be stored as JSON.
    #[error("Field '{field}' declares TagMatchTerm but is not persisted as JSON")]
    TagRequiresJson { field: String },

    /// Two fields map onto the same column.
    #[error("Fields '{first}' and '{second}' both map to column '{column}'")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },

    /// Column names are interpolated into SQL and must be plain identifiers.
    #[error("Field '{field}' maps to invalid column name '{column}'")]
    InvalidColumnName { field: String, column: String },

    /// Table and key column names must be plain identifiers.
    #[error("Invalid table or key column name: '{0}'")]
    InvalidTableName(String),
}

/// A failure of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Execution error: {0}")]
    Execution(String),
}

/// The main error type for sift operations.
#[derive(Debug, Error)]
pub enum SiftError {
    /// Registry build failure.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unreadable or malformed configuration file.
    #[error("Configuration file error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sift operations.
pub type SiftResult<T> = Result<T, SiftError>;
