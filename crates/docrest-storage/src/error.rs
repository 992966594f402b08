//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Document not found.
    #[error("document not found: {target}")]
    DocumentNotFound { target: String },

    /// Unknown field in an order-by clause.
    #[error("unknown item in order by clause: {field}")]
    InvalidOrderBy { field: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Transaction error.
    #[error("transaction error: {message}")]
    TransactionError { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl StorageError {
    /// Whether the error means the requested document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::DocumentNotFound { .. })
    }

    /// Whether the error is the caller's fault (malformed input).
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidOrderBy { .. } | StorageError::InvalidInput { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
