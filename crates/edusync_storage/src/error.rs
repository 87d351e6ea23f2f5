//! Error types for local store operations.

use edusync_protocol::CodecError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] CodecError),

    /// The store directory is locked by another process.
    #[error("store is locked by another process: {0}")]
    Locked(String),

    /// The store file is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}
