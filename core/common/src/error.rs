//! Canonical error taxonomy for cloudbridge operations.
//!
//! Callers code against this one set of failures regardless of which
//! backend is active. Backend-specific error types never appear here.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Boxed cause carried by the backend and unexpected variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for facade operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No driver handle has been published yet.
    #[error("Cloud driver not initialized")]
    NotInitialized,

    /// Provider identifier is outside the supported set.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Access key or secret key is absent.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Bucket does not exist.
    #[error("Bucket not found: {0}")]
    NotFound(String),

    /// Object does not exist in the bucket.
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Local upload source is missing or not a regular file.
    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    /// Upload or download could not complete.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Backend or network failure.
    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),

    /// Failure that fits no other category.
    #[error("Unexpected error: {0}")]
    Unexpected(#[source] BoxError),
}

impl Error {
    /// Wrap a backend failure.
    pub fn backend(cause: impl Into<BoxError>) -> Self {
        Self::Backend(cause.into())
    }

    /// Wrap an unclassified failure.
    pub fn unexpected(cause: impl Into<BoxError>) -> Self {
        Self::Unexpected(cause.into())
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::UnsupportedProvider(_) => ErrorKind::UnsupportedProvider,
            Self::MissingCredentials(_) => ErrorKind::MissingCredentials,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::TransferFailed(_) => ErrorKind::TransferFailed,
            Self::Backend(_) => ErrorKind::BackendError,
            Self::Unexpected(_) => ErrorKind::UnexpectedError,
        }
    }

    /// True for failures detected before any backend call.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedProvider(_) | Self::MissingCredentials(_) | Self::SourceNotFound(_)
        )
    }
}

/// Stable, serializable name of an [`Error`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotInitialized,
    UnsupportedProvider,
    MissingCredentials,
    NotFound,
    ObjectNotFound,
    SourceNotFound,
    TransferFailed,
    BackendError,
    UnexpectedError,
}

impl ErrorKind {
    /// Get the kind name as it appears in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::UnsupportedProvider => "UnsupportedProvider",
            Self::MissingCredentials => "MissingCredentials",
            Self::NotFound => "NotFound",
            Self::ObjectNotFound => "ObjectNotFound",
            Self::SourceNotFound => "SourceNotFound",
            Self::TransferFailed => "TransferFailed",
            Self::BackendError => "BackendError",
            Self::UnexpectedError => "UnexpectedError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_kind_names_match_serialization() {
        let kinds = [
            ErrorKind::NotInitialized,
            ErrorKind::ObjectNotFound,
            ErrorKind::BackendError,
            ErrorKind::UnexpectedError,
        ];
        for kind in kinds {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
        }
    }

    #[test]
    fn test_backend_error_keeps_cause() {
        let err = Error::backend(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert!(err.to_string().contains("reset"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_object_not_found_message() {
        let err = Error::ObjectNotFound {
            bucket: "photos".to_string(),
            key: "2024/cat.jpg".to_string(),
        };
        assert_eq!(err.to_string(), "Object not found: photos/2024/cat.jpg");
    }

    #[test]
    fn test_caller_errors() {
        assert!(Error::UnsupportedProvider("ftp".into()).is_caller_error());
        assert!(Error::SourceNotFound("/tmp/x".into()).is_caller_error());
        assert!(!Error::NotInitialized.is_caller_error());
        assert!(!Error::TransferFailed("timeout".into()).is_caller_error());
    }
}
