//! Error types for the reference backend.

use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur in the reference backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The page token does not belong to this query.
    #[error("invalid page token {0}")]
    InvalidPageToken(u64),

    /// The backend is not reachable.
    #[error("backend unavailable")]
    Unavailable,
}

impl BackendError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BackendError::InvalidRequest(_) | BackendError::InvalidPageToken(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(BackendError::InvalidRequest("bad".into()).is_client_error());
        assert!(BackendError::InvalidPageToken(9).is_client_error());
        assert!(!BackendError::Unavailable.is_client_error());
    }

    #[test]
    fn error_display() {
        assert_eq!(BackendError::Unavailable.to_string(), "backend unavailable");
        assert!(BackendError::InvalidPageToken(42).to_string().contains("42"));
    }
}
