//! Storage error types.

use thiserror::Error;

/// Result type for key store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert, update, delete or query failed at the database layer.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A uniqueness constraint would be violated.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        StoreError::Persistence(e.to_string())
    }
}
