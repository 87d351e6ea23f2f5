//! Error types for the sync engine.

use edusync_protocol::CodecError;
use edusync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend could not be reached or rejected the request.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The local mirror failed.
    #[error("local storage error: {0}")]
    LocalStorage(#[from] StorageError),

    /// A tombstone named an entity type with no adapter.
    #[error("no adapter for entity type {entity_type}")]
    Dispatch {
        /// Wire name of the entity type.
        entity_type: String,
    },

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The current actor could not be determined.
    #[error("identity unavailable: {0}")]
    Identity(String),

    /// The durable job runner refused a request.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// A job task ended without reporting a result.
    #[error("job {job} aborted")]
    JobAborted {
        /// Job name.
        job: String,
    },

    /// A sync pass is running.
    #[error("sync already in progress")]
    InProgress,
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::LocalStorage(StorageError::Io(_)) => true,
            SyncError::JobAborted { .. } => true,
            _ => false,
        }
    }
}
