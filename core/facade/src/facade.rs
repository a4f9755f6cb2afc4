//! Uniform object-storage operations over the active driver.

use futures::StreamExt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use cloudbridge_common::{Error, Result};
use cloudbridge_storage::{ObjectBackend, UploadSource};

use crate::classify::{classify, Operation};
use crate::driver::{DriverHandle, DriverManager};
use crate::dto::{BucketDescriptor, ListObjectsResult, ObjectDescriptor, TransferResult};
use crate::mapper;

/// Provider-agnostic storage operations.
///
/// Every call snapshots the current driver handle first and finishes
/// against that snapshot, even if the driver is re-initialized meanwhile.
#[derive(Clone)]
pub struct ObjectStorageFacade {
    driver: Arc<DriverManager>,
    transfer_timeout: Option<Duration>,
}

impl ObjectStorageFacade {
    /// Create a facade over `driver` with no default transfer deadline.
    pub fn new(driver: Arc<DriverManager>) -> Self {
        Self {
            driver,
            transfer_timeout: None,
        }
    }

    /// Apply `timeout` to `download` and `upload`.
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Get the driver manager.
    pub fn driver(&self) -> &Arc<DriverManager> {
        &self.driver
    }

    fn handle(&self) -> Result<Arc<DriverHandle>> {
        self.driver.current().ok_or(Error::NotInitialized)
    }

    /// List all buckets visible to the credentials, in backend order.
    pub async fn list_buckets(&self) -> Result<Vec<BucketDescriptor>> {
        let handle = self.handle()?;
        debug!("Listing buckets via {}", handle.backend().name());

        let containers = handle
            .backend()
            .list_containers()
            .await
            .map_err(|e| classify(Operation::ListBuckets, e))?;

        Ok(containers
            .into_iter()
            .map(|c| mapper::bucket(c, handle.provider(), handle.region()))
            .collect())
    }

    /// Get one bucket.
    ///
    /// # Errors
    /// - `NotFound` if the bucket does not exist
    pub async fn get_bucket(&self, name: &str) -> Result<BucketDescriptor> {
        let handle = self.handle()?;
        debug!("Getting bucket {}", name);

        let container = handle
            .backend()
            .get_container(name)
            .await
            .map_err(|e| classify(Operation::GetBucket, e))?;

        Ok(mapper::bucket(container, handle.provider(), handle.region()))
    }

    /// List objects in a bucket, following backend pagination to the end.
    ///
    /// With a delimiter, keys sharing a prefix up to the first delimiter
    /// after `prefix` are reported once in `common_prefixes`.
    ///
    /// # Errors
    /// - `NotFound` if the bucket does not exist
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsResult> {
        let handle = self.handle()?;
        debug!(
            "Listing {} (prefix {:?}, delimiter {:?})",
            bucket, prefix, delimiter
        );

        let listing = handle
            .backend()
            .list_objects(bucket, prefix, delimiter)
            .await
            .map_err(|e| classify(Operation::ListObjects, e))?;

        Ok(mapper::listing(listing))
    }

    /// Get object metadata.
    ///
    /// # Errors
    /// - `ObjectNotFound` if the object does not exist
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor> {
        let handle = self.handle()?;

        let object = handle
            .backend()
            .get_object(bucket, key)
            .await
            .map_err(|e| classify(Operation::GetObject, e))?;

        Ok(mapper::object(object))
    }

    /// Download an object to `dest` under the default transfer deadline.
    pub async fn download(
        &self,
        bucket: &str,
        key: &str,
        dest: impl AsRef<Path>,
    ) -> Result<TransferResult> {
        self.download_within(bucket, key, dest.as_ref(), self.transfer_timeout)
            .await
    }

    /// Download an object to `dest`, failing once `timeout` elapses.
    pub async fn download_with_timeout(
        &self,
        bucket: &str,
        key: &str,
        dest: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<TransferResult> {
        self.download_within(bucket, key, dest.as_ref(), Some(timeout))
            .await
    }

    /// Stream an object into a temporary sibling file, then move it over `dest`.
    ///
    /// Each download gets its own temporary file, so concurrent downloads
    /// to one destination never share partial data.
    ///
    /// # Postconditions
    /// - The parent directory of `dest` exists
    /// - `dest` is overwritten only when every byte arrived
    /// - No temporary file is left behind
    ///
    /// # Errors
    /// - `ObjectNotFound` if the object does not exist
    /// - `TransferFailed` on mid-stream, filesystem or deadline failures
    async fn download_within(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        timeout: Option<Duration>,
    ) -> Result<TransferResult> {
        let handle = self.handle()?;
        debug!("Downloading {}/{} to {}", bucket, key, dest.display());

        // The temporary file is removed when `part` drops, including when
        // the deadline cancels the transfer.
        let transfer = stream_to_file(handle.backend(), bucket, key, dest);
        let (part, bytes_transferred, content_hash) = within(timeout, transfer).await?;

        part.persist(dest)
            .map_err(|e| local_failure(dest, e.error))?;

        debug!("Downloaded {} bytes to {}", bytes_transferred, dest.display());
        Ok(TransferResult {
            bytes_transferred,
            content_hash,
            destination_or_key: dest.display().to_string(),
        })
    }

    /// Upload a local file under the default transfer deadline.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: impl AsRef<Path>,
    ) -> Result<ObjectDescriptor> {
        self.upload_within(bucket, key, source.as_ref(), self.transfer_timeout)
            .await
    }

    /// Upload a local file, failing once `timeout` elapses.
    pub async fn upload_with_timeout(
        &self,
        bucket: &str,
        key: &str,
        source: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<ObjectDescriptor> {
        self.upload_within(bucket, key, source.as_ref(), Some(timeout))
            .await
    }

    /// Returns the stored object as the backend reports it.
    ///
    /// # Errors
    /// - `SourceNotFound` before any backend call if `source` is not a file
    /// - `NotFound` if the bucket does not exist
    /// - `TransferFailed` on read or deadline failures
    async fn upload_within(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        timeout: Option<Duration>,
    ) -> Result<ObjectDescriptor> {
        let handle = self.handle()?;

        let length = match fs::metadata(source).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return Err(Error::SourceNotFound(source.display().to_string())),
        };
        let file = fs::File::open(source)
            .await
            .map_err(|_| Error::SourceNotFound(source.display().to_string()))?;

        debug!(
            "Uploading {} ({} bytes) to {}/{}",
            source.display(),
            length,
            bucket,
            key
        );

        let upload = async {
            handle
                .backend()
                .upload_stream(bucket, key, UploadSource { file, length })
                .await
                .map_err(|e| classify(Operation::Upload, e))
        };
        let mut stored = within(timeout, upload).await?;
        stored.size.get_or_insert(length);

        Ok(mapper::object(stored))
    }

    /// Delete an object.
    ///
    /// # Errors
    /// - `ObjectNotFound` if the object does not exist
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let handle = self.handle()?;
        debug!("Deleting {}/{}", bucket, key);

        handle
            .backend()
            .delete_object(bucket, key)
            .await
            .map_err(|e| classify(Operation::Delete, e))
    }
}

async fn within<T, F>(timeout: Option<Duration>, transfer: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, transfer)
            .await
            .unwrap_or_else(|_| Err(Error::TransferFailed(format!("timed out after {:?}", limit)))),
        None => transfer.await,
    }
}

async fn stream_to_file(
    backend: &dyn ObjectBackend,
    bucket: &str,
    key: &str,
    dest: &Path,
) -> Result<(TempPath, u64, String)> {
    let mut stream = backend
        .download_stream(bucket, key)
        .await
        .map_err(|e| classify(Operation::Download, e))?;

    let dir = match dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(dir)
        .await
        .map_err(|e| local_failure(dir, e))?;

    let (file, part) = part_file(dir, dest)
        .map_err(|e| local_failure(dir, e))?
        .into_parts();
    let mut file = fs::File::from_std(file);

    let mut context = md5::Context::new();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::TransferFailed(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| local_failure(&part, e))?;
        context.consume(&chunk);
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| local_failure(&part, e))?;

    Ok((part, written, format!("{:x}", context.compute())))
}

/// Create a uniquely named `.<name>.<random>.part` file in `dir`.
fn part_file(dir: &Path, dest: &Path) -> io::Result<NamedTempFile> {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!(".{}.", name);

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".part")
        .tempfile_in(dir)
}

fn local_failure(path: &Path, err: io::Error) -> Error {
    Error::TransferFailed(format!("{}: {}", path.display(), err))
}
