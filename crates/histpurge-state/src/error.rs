//! Error types for histpurge-state

use thiserror::Error;

/// Errors returned by a [`JobStore`](crate::JobStore) implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No item exists at the given path
    #[error("item not found: {path}")]
    ItemNotFound { path: String },

    /// The item exists but is not of the kind the operation requires
    #[error("item {path} is a {actual}, expected {expected}")]
    WrongKind {
        path: String,
        actual: String,
        expected: String,
    },

    /// An item path could not be parsed
    #[error("invalid item path: {0:?}")]
    InvalidPath(String),

    /// Stored metadata could not be read or written
    #[error("corrupt metadata at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// The backend refused the request
    #[error("store rejected {operation} on {path}: {reason}")]
    Rejected {
        operation: String,
        path: String,
        reason: String,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn not_found(path: impl std::fmt::Display) -> Self {
        StorageError::ItemNotFound {
            path: path.to_string(),
        }
    }
}
