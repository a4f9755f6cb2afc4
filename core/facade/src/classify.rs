//! Classification of backend failures into the canonical taxonomy.

use std::fmt;
use tracing::warn;

use cloudbridge_common::Error;
use cloudbridge_storage::BackendError;

/// Facade operation a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    ListBuckets,
    GetBucket,
    ListObjects,
    GetObject,
    Download,
    Upload,
    Delete,
}

impl Operation {
    /// Whether the operation moves object content.
    pub fn is_transfer(&self) -> bool {
        matches!(self, Operation::Download | Operation::Upload)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::ListBuckets => "list_buckets",
            Operation::GetBucket => "get_bucket",
            Operation::ListObjects => "list_objects",
            Operation::GetObject => "get_object",
            Operation::Download => "download",
            Operation::Upload => "upload",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a backend failure raised during `operation`.
pub fn classify(operation: Operation, err: BackendError) -> Error {
    let classified = match err {
        BackendError::ContainerDoesNotExist(name) => Error::NotFound(name),
        BackendError::ObjectDoesNotExist { container, key } => Error::ObjectNotFound {
            bucket: container,
            key,
        },
        BackendError::Io(io) if operation.is_transfer() => Error::TransferFailed(io.to_string()),
        BackendError::Io(io) => Error::backend(io),
        err @ BackendError::Unsupported { .. } => Error::backend(err),
        BackendError::Service(cause) => Error::Backend(cause),
        BackendError::Other(cause) => Error::Unexpected(cause),
    };

    warn!("{} failed: {}", operation, classified);
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudbridge_common::ErrorKind;
    use std::io;

    #[test]
    fn test_missing_container_is_not_found() {
        let err = classify(
            Operation::ListObjects,
            BackendError::ContainerDoesNotExist("ghost".to_string()),
        );
        assert!(matches!(err, Error::NotFound(ref name) if name == "ghost"));
    }

    #[test]
    fn test_missing_object() {
        let err = classify(Operation::Delete, BackendError::object_missing("b", "k"));
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
    }

    #[test]
    fn test_io_depends_on_operation() {
        let io_err = || BackendError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert_eq!(classify(Operation::Download, io_err()).kind(), ErrorKind::TransferFailed);
        assert_eq!(classify(Operation::Upload, io_err()).kind(), ErrorKind::TransferFailed);
        assert_eq!(classify(Operation::GetBucket, io_err()).kind(), ErrorKind::BackendError);
    }

    #[test]
    fn test_service_and_other() {
        let service = BackendError::service(io::Error::other("503 Slow Down"));
        assert_eq!(classify(Operation::ListBuckets, service).kind(), ErrorKind::BackendError);

        let other = BackendError::other("mystery");
        assert_eq!(classify(Operation::GetObject, other).kind(), ErrorKind::UnexpectedError);
    }

    #[test]
    fn test_unsupported_is_backend_error() {
        let err = classify(
            Operation::ListBuckets,
            BackendError::Unsupported {
                backend: "azure-blob",
                operation: "list_containers",
            },
        );
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert!(err.to_string().contains("list_containers"));
    }
}
