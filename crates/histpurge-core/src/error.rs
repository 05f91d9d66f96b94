//! Error taxonomy for the purge engine.
//!
//! Only failures that stop a purge before any work is done surface as
//! [`PurgeError`]. Per-run skips and per-node store failures are recorded in
//! the [`PurgeReport`](crate::PurgeReport) instead.

use histpurge_state::{ItemPath, StorageError};

/// Errors returned by purge entry points.
#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("access denied: not allowed to purge {0}")]
    AccessDenied(ItemPath),

    #[error("invalid access policy: {0}")]
    InvalidPolicy(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for PurgeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ItemNotFound { path } => PurgeError::ItemNotFound(path),
            StorageError::InvalidPath(path) => PurgeError::ItemNotFound(path),
            other => PurgeError::Storage(other),
        }
    }
}

/// Result type for purge operations.
pub type Result<T> = std::result::Result<T, PurgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_items_map_to_not_found() {
        let err: PurgeError = StorageError::ItemNotFound {
            path: "team/api".into(),
        }
        .into();
        assert!(matches!(err, PurgeError::ItemNotFound(ref p) if p == "team/api"));
        assert!(err.to_string().contains("item not found"));

        let err: PurgeError = StorageError::InvalidPath("a/../b".into()).into();
        assert!(matches!(err, PurgeError::ItemNotFound(_)));
    }

    #[test]
    fn other_storage_errors_are_wrapped() {
        let err: PurgeError = StorageError::Rejected {
            operation: "resolve".into(),
            path: "x".into(),
            reason: "offline".into(),
        }
        .into();
        assert!(matches!(err, PurgeError::Storage(_)));
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn access_denied_display() {
        let err = PurgeError::AccessDenied("team".parse().unwrap());
        assert_eq!(err.to_string(), "access denied: not allowed to purge team");
    }
}
