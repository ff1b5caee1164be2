//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// No connection could be checked out of the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid input or stored data (e.g., empty device name, id out of range).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
