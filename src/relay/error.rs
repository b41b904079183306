// Typed errors returned by the message store

use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by [`MessageStore`](crate::relay::MessageStore) operations
/// and the storage backends underneath it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed input from the caller
    #[error("{0}")]
    InvalidRequest(String),

    /// The recipient has no messages
    #[error("No messages found for recipient: {0}")]
    NotFound(String),

    /// Durable storage could not be read or written
    #[error("Storage failure at {path:?}: {source}")]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted content does not decode into valid records
    #[error("Corrupt data in {path:?}: {reason}")]
    CorruptData { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidRequest(msg.into())
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::StorageFailure {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::CorruptData {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller caused this error (as opposed to the storage layer)
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::InvalidRequest(_) | StoreError::NotFound(_))
    }

    /// Message safe to hand back to a remote client
    pub fn user_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "Internal server error".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = StoreError::NotFound("Foo".to_string());
        assert_eq!(err.to_string(), "No messages found for recipient: Foo");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_errors_hide_details() {
        let err = StoreError::storage(
            "/var/lib/msgrelay/messages.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_client_error());
        assert_eq!(err.user_message(), "Internal server error");

        let err = StoreError::corrupt("messages.json", "expected object");
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("expected object"));
    }
}
