//! Azure Blob Storage backend.
//!
//! Object operations use `object_store`'s Azure client. That client is scoped
//! to one container, so account-level calls (container listing and
//! properties) go through a small Shared Key signed REST client. The access
//! key is the storage account name and the secret key is the account key.

mod auth;
mod client;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use cloudbridge_common::{ConnectionSettings, SecretString};

use crate::listing::group_by_delimiter;
use crate::provider::{
    BackendError, BackendResult, ByteStream, Container, Extra, Listing, ObjectBackend,
    StoredObject, UploadSource,
};

use client::BlobServiceClient;

const BACKEND_NAME: &str = "azure-blob";

/// Azure Blob Storage backend.
pub struct AzureBackend {
    account: String,
    access_key: SecretString,
    endpoint: Option<String>,
    service: BlobServiceClient,
}

impl AzureBackend {
    /// Create a backend for the account named by the access key.
    ///
    /// No request is made here.
    pub fn new(settings: &ConnectionSettings) -> BackendResult<Self> {
        let account = settings.credentials.access_key().to_string();
        let access_key = settings.credentials.secret_key().clone();
        let service = BlobServiceClient::new(
            &account,
            access_key.clone(),
            settings.endpoint.as_deref(),
        )?;

        Ok(Self {
            account,
            access_key,
            endpoint: settings.endpoint.clone(),
            service,
        })
    }

    /// Get the storage account name.
    pub fn account(&self) -> &str {
        &self.account
    }

    fn store(&self, container: &str) -> BackendResult<Arc<dyn ObjectStore>> {
        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(self.account.clone())
            .with_access_key(self.access_key.expose())
            .with_container_name(container);

        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint.clone()).with_allow_http(true);
        }

        let store = builder.build().map_err(BackendError::service)?;
        Ok(Arc::new(store))
    }

    /// Decide whether a failed listing means the container is absent.
    ///
    /// Listing failures arrive as generic errors, so ask the service.
    async fn listing_error(&self, container: &str, err: object_store::Error) -> BackendError {
        if let object_store::Error::NotFound { .. } = err {
            return BackendError::ContainerDoesNotExist(container.to_string());
        }
        match self.service.container_properties(container).await {
            Ok(None) => BackendError::ContainerDoesNotExist(container.to_string()),
            _ => BackendError::service(err),
        }
    }
}

fn to_object(container: &str, meta: ObjectMeta) -> StoredObject {
    let mut extra = Extra::new();
    extra.insert(
        "last_modified".to_string(),
        meta.last_modified.to_rfc3339().into(),
    );
    if let Some(etag) = &meta.e_tag {
        extra.insert("etag".to_string(), etag.as_str().into());
    }
    if let Some(version) = &meta.version {
        extra.insert("version".to_string(), version.as_str().into());
    }

    StoredObject {
        key: meta.location.to_string(),
        container: container.to_string(),
        size: Some(meta.size as u64),
        hash: meta.e_tag.map(|etag| etag.trim_matches('"').to_string()),
        extra,
    }
}

fn object_error(container: &str, key: &str, err: object_store::Error) -> BackendError {
    match err {
        object_store::Error::NotFound { .. } => BackendError::object_missing(container, key),
        other => BackendError::service(other),
    }
}

/// List `container` through `store` and group the result.
///
/// Store prefixes match whole path segments only, so the listing is
/// narrowed to the last complete segment of `prefix` and the rest is
/// filtered here.
async fn list_in(
    store: &dyn ObjectStore,
    container: &str,
    prefix: Option<&str>,
    delimiter: Option<&str>,
) -> object_store::Result<Listing> {
    let base = prefix.and_then(|p| p.rfind('/').map(|idx| ObjectPath::from(&p[..idx])));

    let metas: Vec<ObjectMeta> = store.list(base.as_ref()).try_collect().await?;
    let objects = metas.into_iter().map(|meta| to_object(container, meta));

    Ok(group_by_delimiter(objects, prefix, delimiter))
}

#[async_trait]
impl ObjectBackend for AzureBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn list_containers(&self) -> BackendResult<Vec<Container>> {
        self.service.list_containers().await
    }

    async fn get_container(&self, name: &str) -> BackendResult<Container> {
        let mut container = self
            .service
            .container_properties(name)
            .await?
            .ok_or_else(|| BackendError::ContainerDoesNotExist(name.to_string()))?;

        container
            .extra
            .insert("account".to_string(), self.account.as_str().into());
        Ok(container)
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<Listing> {
        let store = self.store(container)?;
        match list_in(store.as_ref(), container, prefix, delimiter).await {
            Ok(listing) => Ok(listing),
            Err(err) => Err(self.listing_error(container, err).await),
        }
    }

    async fn get_object(&self, container: &str, key: &str) -> BackendResult<StoredObject> {
        let store = self.store(container)?;
        let meta = store
            .head(&ObjectPath::from(key))
            .await
            .map_err(|err| object_error(container, key, err))?;

        Ok(to_object(container, meta))
    }

    async fn download_stream(&self, container: &str, key: &str) -> BackendResult<ByteStream> {
        let store = self.store(container)?;
        let result = store
            .get(&ObjectPath::from(key))
            .await
            .map_err(|err| object_error(container, key, err))?;

        let stream = result
            .into_stream()
            .map(|chunk| chunk.map_err(BackendError::service));

        Ok(Box::pin(stream))
    }

    async fn upload_stream(
        &self,
        container: &str,
        key: &str,
        source: UploadSource,
    ) -> BackendResult<StoredObject> {
        self.get_container(container).await?;

        let store = self.store(container)?;
        let path = ObjectPath::from(key);

        let mut file = source.file;
        let mut writer = BufWriter::new(Arc::clone(&store), path.clone());
        tokio::io::copy(&mut file, &mut writer).await?;
        writer.shutdown().await?;

        let meta = store
            .head(&path)
            .await
            .map_err(|err| object_error(container, key, err))?;

        Ok(to_object(container, meta))
    }

    async fn delete_object(&self, container: &str, key: &str) -> BackendResult<()> {
        let store = self.store(container)?;
        let path = ObjectPath::from(key);

        store
            .head(&path)
            .await
            .map_err(|err| object_error(container, key, err))?;
        store
            .delete(&path)
            .await
            .map_err(|err| object_error(container, key, err))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cloudbridge_common::{Credentials, Provider};
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    fn backend() -> AzureBackend {
        let credentials = Credentials::new("devaccount", "c2VjcmV0LWtleQ==", "westeurope").unwrap();
        AzureBackend::new(&ConnectionSettings::new(Provider::Azure, credentials)).unwrap()
    }

    async fn seeded_store() -> InMemory {
        let store = InMemory::new();
        for key in [
            "logs/2024/a.txt",
            "logs/2024/b.txt",
            "logs/app.log",
            "logsheet.csv",
            "data/x.bin",
        ] {
            store
                .put(&ObjectPath::from(key), PutPayload::from(Bytes::from_static(b"payload")))
                .await
                .unwrap();
        }
        store
    }

    fn keys(listing: &Listing) -> Vec<&str> {
        listing.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn test_account_from_access_key() {
        let backend = backend();
        assert_eq!(backend.account(), "devaccount");
        assert_eq!(backend.name(), "azure-blob");
    }

    #[test]
    fn test_store_builds_per_container() {
        assert!(backend().store("logs").is_ok());
    }

    #[tokio::test]
    async fn test_list_narrows_partial_segment_prefix() {
        let store = seeded_store().await;

        let listing = list_in(&store, "c", Some("logs/2"), None).await.unwrap();
        assert_eq!(keys(&listing), vec!["logs/2024/a.txt", "logs/2024/b.txt"]);

        let listing = list_in(&store, "c", Some("log"), None).await.unwrap();
        assert_eq!(
            keys(&listing),
            vec!["logs/2024/a.txt", "logs/2024/b.txt", "logs/app.log", "logsheet.csv"]
        );
    }

    #[tokio::test]
    async fn test_list_groups_by_delimiter() {
        let store = seeded_store().await;

        let listing = list_in(&store, "c", Some("logs/"), Some("/")).await.unwrap();
        assert_eq!(keys(&listing), vec!["logs/app.log"]);
        assert_eq!(listing.common_prefixes, vec!["logs/2024/".to_string()]);

        let root = list_in(&store, "c", None, Some("/")).await.unwrap();
        assert_eq!(keys(&root), vec!["logsheet.csv"]);
        assert_eq!(
            root.common_prefixes,
            vec!["data/".to_string(), "logs/".to_string()]
        );
        assert!(root.objects.iter().all(|o| o.container == "c"));
    }

    #[tokio::test]
    async fn test_missing_blob_is_object_missing() {
        let store = seeded_store().await;
        let err = store.head(&ObjectPath::from("logs/none.txt")).await.unwrap_err();

        assert!(matches!(
            object_error("c", "logs/none.txt", err),
            BackendError::ObjectDoesNotExist { ref key, .. } if key == "logs/none.txt"
        ));
    }

    #[tokio::test]
    async fn test_not_found_listing_is_container_missing() {
        let err = object_store::Error::NotFound {
            path: "logs".to_string(),
            source: "container gone".into(),
        };
        assert!(matches!(
            backend().listing_error("logs", err).await,
            BackendError::ContainerDoesNotExist(_)
        ));
    }

    #[test]
    fn test_etag_is_unquoted() {
        let meta = ObjectMeta {
            location: ObjectPath::from("a/b"),
            last_modified: chrono::Utc::now(),
            size: 12,
            e_tag: Some("\"0x8D9\"".to_string()),
            version: None,
        };
        let object = to_object("c", meta);
        assert_eq!(object.hash.as_deref(), Some("0x8D9"));
        assert_eq!(object.size, Some(12));
        assert_eq!(object.extra["etag"], "\"0x8D9\"");
    }
}
