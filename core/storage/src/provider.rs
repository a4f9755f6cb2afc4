//! Backend capability contract.
//!
//! Every provider implementation exposes the same seven capabilities. The
//! facade is written against [`ObjectBackend`] only and never names a
//! concrete backend type.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use thiserror::Error;

use cloudbridge_common::BoxError;

/// Backend-specific metadata, forwarded uninterpreted.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// A bucket or container as reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub extra: Extra,
}

impl Container {
    /// Create a container entry with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// An object as reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub container: String,
    pub size: Option<u64>,
    /// Content hash (MD5 hex or ETag, depending on backend).
    pub hash: Option<String>,
    pub extra: Extra,
}

/// Result of one listing call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub objects: Vec<StoredObject>,
    pub common_prefixes: Vec<String>,
}

/// Failure raised by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Container does not exist.
    #[error("container does not exist: {0}")]
    ContainerDoesNotExist(String),

    /// Object does not exist.
    #[error("object does not exist: {container}/{key}")]
    ObjectDoesNotExist { container: String, key: String },

    /// Capability not offered by this backend.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Local or stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider service or transport failure.
    #[error("service error: {0}")]
    Service(#[source] BoxError),

    /// Anything the backend could not describe further.
    #[error("{0}")]
    Other(#[source] BoxError),
}

impl BackendError {
    /// Wrap a service or transport failure.
    pub fn service(cause: impl Into<BoxError>) -> Self {
        Self::Service(cause.into())
    }

    /// Wrap an undescribed failure.
    pub fn other(cause: impl Into<BoxError>) -> Self {
        Self::Other(cause.into())
    }

    /// Missing object.
    pub fn object_missing(container: &str, key: &str) -> Self {
        Self::ObjectDoesNotExist {
            container: container.to_string(),
            key: key.to_string(),
        }
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Byte stream type for download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = BackendResult<Bytes>> + Send>>;

/// Local file handed to [`ObjectBackend::upload_stream`].
#[derive(Debug)]
pub struct UploadSource {
    /// Open file positioned at its start.
    pub file: tokio::fs::File,
    /// Exact length in bytes.
    pub length: u64,
}

/// Storage backend capabilities.
///
/// All operations are async. Downloads and uploads stream their content;
/// implementations must not buffer whole objects unless the backend itself
/// is in-memory.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Get the backend name (e.g., "s3", "azure-blob", "memory").
    fn name(&self) -> &str;

    /// List every container visible to the credentials, in backend order.
    async fn list_containers(&self) -> BackendResult<Vec<Container>>;

    /// Get one container.
    ///
    /// # Errors
    /// - `ContainerDoesNotExist`
    async fn get_container(&self, name: &str) -> BackendResult<Container>;

    /// List objects in a container.
    ///
    /// With a delimiter, keys sharing a prefix up to the first delimiter after
    /// `prefix` are reported once in `common_prefixes`. Backend pagination is
    /// followed to exhaustion.
    ///
    /// # Errors
    /// - `ContainerDoesNotExist`
    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<Listing>;

    /// Get object metadata.
    ///
    /// # Errors
    /// - `ObjectDoesNotExist`
    async fn get_object(&self, container: &str, key: &str) -> BackendResult<StoredObject>;

    /// Open a download stream for an object.
    ///
    /// # Errors
    /// - `ObjectDoesNotExist`
    async fn download_stream(&self, container: &str, key: &str) -> BackendResult<ByteStream>;

    /// Stream a local file into an object, replacing any existing one.
    ///
    /// # Postconditions
    /// - Returns metadata of the stored object
    ///
    /// # Errors
    /// - `ContainerDoesNotExist`
    /// - `Io` if reading the source fails
    async fn upload_stream(
        &self,
        container: &str,
        key: &str,
        source: UploadSource,
    ) -> BackendResult<StoredObject>;

    /// Delete an object.
    ///
    /// # Errors
    /// - `ObjectDoesNotExist`
    async fn delete_object(&self, container: &str, key: &str) -> BackendResult<()>;
}
