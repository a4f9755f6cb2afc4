//! In-memory storage backend for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;

use crate::listing::group_by_delimiter;
use crate::provider::{
    BackendError, BackendResult, ByteStream, Container, Extra, Listing, ObjectBackend,
    StoredObject, UploadSource,
};

const CHUNK_SIZE: usize = 64 * 1024;

/// In-memory object entry.
#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    hash: String,
    modified: DateTime<Utc>,
}

/// In-memory container.
#[derive(Debug, Clone)]
struct Bucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, Entry>,
}

/// In-memory storage backend.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    buckets: Arc<RwLock<BTreeMap<String, Bucket>>>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every streamed chunk by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create a container. Existing containers are left untouched.
    pub async fn create_container(&self, name: &str) {
        self.buckets
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Bucket {
                created: Utc::now(),
                objects: BTreeMap::new(),
            });
    }

    /// Store an object directly, creating its container if needed.
    pub async fn put_object(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        self.create_container(container).await;
        let entry = Entry {
            hash: format!("{:x}", md5::compute(&data)),
            data,
            modified: Utc::now(),
        };
        if let Some(bucket) = self.buckets.write().await.get_mut(container) {
            bucket.objects.insert(key.to_string(), entry);
        }
    }

    /// Number of objects in a container, if it exists.
    pub async fn object_count(&self, container: &str) -> Option<usize> {
        self.buckets
            .read()
            .await
            .get(container)
            .map(|bucket| bucket.objects.len())
    }

    fn to_container(name: &str, bucket: &Bucket) -> Container {
        let mut extra = Extra::new();
        extra.insert("object_count".to_string(), bucket.objects.len().into());
        Container {
            name: name.to_string(),
            created: Some(bucket.created),
            size: Some(bucket.objects.values().map(|e| e.data.len() as u64).sum()),
            extra,
        }
    }

    fn to_object(container: &str, key: &str, entry: &Entry) -> StoredObject {
        let mut extra = Extra::new();
        extra.insert("last_modified".to_string(), entry.modified.to_rfc3339().into());
        StoredObject {
            key: key.to_string(),
            container: container.to_string(),
            size: Some(entry.data.len() as u64),
            hash: Some(entry.hash.clone()),
            extra,
        }
    }

    async fn entry(&self, container: &str, key: &str) -> BackendResult<Entry> {
        let buckets = self.buckets.read().await;
        let bucket = buckets
            .get(container)
            .ok_or_else(|| BackendError::ContainerDoesNotExist(container.to_string()))?;
        bucket
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::object_missing(container, key))
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_containers(&self) -> BackendResult<Vec<Container>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .map(|(name, bucket)| Self::to_container(name, bucket))
            .collect())
    }

    async fn get_container(&self, name: &str) -> BackendResult<Container> {
        let buckets = self.buckets.read().await;
        buckets
            .get(name)
            .map(|bucket| Self::to_container(name, bucket))
            .ok_or_else(|| BackendError::ContainerDoesNotExist(name.to_string()))
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<Listing> {
        let buckets = self.buckets.read().await;
        let bucket = buckets
            .get(container)
            .ok_or_else(|| BackendError::ContainerDoesNotExist(container.to_string()))?;

        let objects = bucket
            .objects
            .iter()
            .map(|(key, entry)| Self::to_object(container, key, entry));

        Ok(group_by_delimiter(objects, prefix, delimiter))
    }

    async fn get_object(&self, container: &str, key: &str) -> BackendResult<StoredObject> {
        let entry = self.entry(container, key).await?;
        Ok(Self::to_object(container, key, &entry))
    }

    async fn download_stream(&self, container: &str, key: &str) -> BackendResult<ByteStream> {
        let entry = self.entry(container, key).await?;
        let latency = self.latency;

        let chunks: Vec<Bytes> = (0..entry.data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| {
                let end = (start + CHUNK_SIZE).min(entry.data.len());
                entry.data.slice(start..end)
            })
            .collect();

        let stream = stream::iter(chunks).then(move |chunk| async move {
            if let Some(delay) = latency {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, BackendError>(chunk)
        });

        Ok(Box::pin(stream))
    }

    async fn upload_stream(
        &self,
        container: &str,
        key: &str,
        source: UploadSource,
    ) -> BackendResult<StoredObject> {
        if !self.buckets.read().await.contains_key(container) {
            return Err(BackendError::ContainerDoesNotExist(container.to_string()));
        }

        let mut reader = ReaderStream::with_capacity(source.file, CHUNK_SIZE);
        let mut context = md5::Context::new();
        let mut data = Vec::with_capacity(source.length as usize);

        while let Some(chunk) = reader.next().await {
            let chunk = chunk?;
            if let Some(delay) = self.latency {
                tokio::time::sleep(delay).await;
            }
            context.consume(&chunk);
            data.extend_from_slice(&chunk);
        }

        let entry = Entry {
            data: Bytes::from(data),
            hash: format!("{:x}", context.compute()),
            modified: Utc::now(),
        };
        let object = Self::to_object(container, key, &entry);

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .get_mut(container)
            .ok_or_else(|| BackendError::ContainerDoesNotExist(container.to_string()))?;
        bucket.objects.insert(key.to_string(), entry);

        Ok(object)
    }

    async fn delete_object(&self, container: &str, key: &str) -> BackendResult<()> {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .get_mut(container)
            .ok_or_else(|| BackendError::ContainerDoesNotExist(container.to_string()))?;

        match bucket.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(BackendError::object_missing(container, key)),
        }
    }
}
