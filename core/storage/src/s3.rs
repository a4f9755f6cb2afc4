//! S3 storage backend.
//!
//! Serves Amazon S3 directly and Google Cloud Storage through its XML
//! interoperability endpoint, which accepts HMAC keys and speaks the S3 API.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::{ByteStream as AwsByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::http::Response;
use chrono::{DateTime, Utc};
use futures::stream;
use std::io;
use tracing::debug;

use cloudbridge_common::ConnectionSettings;

use crate::provider::{
    BackendError, BackendResult, ByteStream, Container, Extra, Listing, ObjectBackend,
    StoredObject, UploadSource,
};

/// Cloud Storage XML API endpoint.
pub const GOOGLE_INTEROP_ENDPOINT: &str = "https://storage.googleapis.com";

const CREDENTIALS_SOURCE: &str = "cloudbridge";

/// S3 storage backend.
pub struct S3Backend {
    name: &'static str,
    client: Client,
    region: String,
}

impl S3Backend {
    /// Create a backend from static credentials.
    ///
    /// When `settings.endpoint` is set, requests go there with path-style
    /// addressing. No request is made here.
    pub fn new(name: &'static str, settings: &ConnectionSettings) -> Self {
        let credentials = &settings.credentials;
        let region = credentials.region().to_string();

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(AwsCredentials::new(
                credentials.access_key(),
                credentials.secret_key().expose(),
                None,
                None,
                CREDENTIALS_SOURCE,
            ));

        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::with_client(name, Client::from_conf(builder.build()), region)
    }

    /// Wrap an already configured client.
    pub fn with_client(name: &'static str, client: Client, region: impl Into<String>) -> Self {
        Self {
            name,
            client,
            region: region.into(),
        }
    }

    /// Get the signing region.
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn status<E>(err: &SdkError<E, Response>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

fn to_chrono(time: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// Strip the quotes S3 puts around ETags.
fn unquote(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn to_object(container: &str, object: &Object) -> Option<StoredObject> {
    let key = object.key()?;

    let mut extra = Extra::new();
    if let Some(etag) = object.e_tag() {
        extra.insert("etag".to_string(), etag.into());
    }
    if let Some(class) = object.storage_class() {
        extra.insert("storage_class".to_string(), class.as_str().into());
    }
    if let Some(modified) = object.last_modified().and_then(to_chrono) {
        extra.insert("last_modified".to_string(), modified.to_rfc3339().into());
    }

    Some(StoredObject {
        key: key.to_string(),
        container: container.to_string(),
        size: object.size().map(|size| size.max(0) as u64),
        hash: object.e_tag().map(unquote),
        extra,
    })
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn name(&self) -> &str {
        self.name
    }

    async fn list_containers(&self) -> BackendResult<Vec<Container>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(BackendError::service)?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                Some(Container {
                    name: bucket.name()?.to_string(),
                    created: bucket.creation_date().and_then(to_chrono),
                    size: None,
                    extra: Extra::new(),
                })
            })
            .collect())
    }

    async fn get_container(&self, name: &str) -> BackendResult<Container> {
        let output = self
            .client
            .head_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|err| {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if missing || status(&err) == Some(404) {
                    BackendError::ContainerDoesNotExist(name.to_string())
                } else {
                    BackendError::service(err)
                }
            })?;

        let mut extra = Extra::new();
        let region = output.bucket_region().unwrap_or(self.region.as_str());
        extra.insert("region".to_string(), region.into());

        Ok(Container {
            name: name.to_string(),
            created: None,
            size: None,
            extra,
        })
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> BackendResult<Listing> {
        let mut listing = Listing::default();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(container)
                .set_prefix(prefix.map(str::to_string))
                .set_delimiter(delimiter.filter(|d| !d.is_empty()).map(str::to_string))
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|err| {
                    let missing = err
                        .as_service_error()
                        .map(|e| e.is_no_such_bucket())
                        .unwrap_or(false);
                    if missing || status(&err) == Some(404) {
                        BackendError::ContainerDoesNotExist(container.to_string())
                    } else {
                        BackendError::service(err)
                    }
                })?;

            listing.objects.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| to_object(container, object)),
            );
            listing.common_prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    debug!("Following list continuation for bucket {}", container);
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }

        Ok(listing)
    }

    async fn get_object(&self, container: &str, key: &str) -> BackendResult<StoredObject> {
        let output = self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if missing || status(&err) == Some(404) {
                    BackendError::object_missing(container, key)
                } else {
                    BackendError::service(err)
                }
            })?;

        let mut extra = Extra::new();
        if let Some(etag) = output.e_tag() {
            extra.insert("etag".to_string(), etag.into());
        }
        if let Some(content_type) = output.content_type() {
            extra.insert("content_type".to_string(), content_type.into());
        }
        if let Some(modified) = output.last_modified().and_then(to_chrono) {
            extra.insert("last_modified".to_string(), modified.to_rfc3339().into());
        }
        if let Some(version) = output.version_id() {
            extra.insert("version_id".to_string(), version.into());
        }
        if let Some(metadata) = output.metadata() {
            for (name, value) in metadata {
                extra.insert(format!("meta_{}", name), value.as_str().into());
            }
        }

        Ok(StoredObject {
            key: key.to_string(),
            container: container.to_string(),
            size: output.content_length().map(|len| len.max(0) as u64),
            hash: output.e_tag().map(unquote),
            extra,
        })
    }

    async fn download_stream(&self, container: &str, key: &str) -> BackendResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if missing || status(&err) == Some(404) {
                    BackendError::object_missing(container, key)
                } else {
                    BackendError::service(err)
                }
            })?;

        let body = stream::unfold(output.body, |mut body| async move {
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), body)),
                Some(Err(err)) => Some((Err(BackendError::service(err)), body)),
                None => None,
            }
        });

        Ok(Box::pin(body))
    }

    async fn upload_stream(
        &self,
        container: &str,
        key: &str,
        source: UploadSource,
    ) -> BackendResult<StoredObject> {
        let body = AwsByteStream::read_from()
            .file(source.file)
            .build()
            .await
            .map_err(|err| BackendError::Io(io::Error::other(err)))?;

        let output = self
            .client
            .put_object()
            .bucket(container)
            .key(key)
            .content_length(source.length as i64)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                if status(&err) == Some(404) {
                    BackendError::ContainerDoesNotExist(container.to_string())
                } else {
                    BackendError::service(err)
                }
            })?;

        let mut extra = Extra::new();
        if let Some(etag) = output.e_tag() {
            extra.insert("etag".to_string(), etag.into());
        }
        if let Some(version) = output.version_id() {
            extra.insert("version_id".to_string(), version.into());
        }

        Ok(StoredObject {
            key: key.to_string(),
            container: container.to_string(),
            size: Some(source.length),
            hash: output.e_tag().map(unquote),
            extra,
        })
    }

    async fn delete_object(&self, container: &str, key: &str) -> BackendResult<()> {
        // DeleteObject succeeds for absent keys.
        self.get_object(container, key).await?;

        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(BackendError::service)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
    use aws_sdk_s3::operation::list_objects_v2::{ListObjectsV2Error, ListObjectsV2Output};
    use aws_sdk_s3::types::error::{NoSuchBucket, NotFound};
    use aws_sdk_s3::types::CommonPrefix;
    use aws_smithy_mocks_experimental::{mock, mock_client, RuleMode};
    use cloudbridge_common::{Credentials, Provider};

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new(
            Provider::Aws,
            Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI", "eu-central-1").unwrap(),
        )
    }

    #[test]
    fn test_new_backend() {
        let backend = S3Backend::new("s3", &settings());
        assert_eq!(backend.name(), "s3");
        assert_eq!(backend.region(), "eu-central-1");
    }

    #[test]
    fn test_new_backend_with_endpoint() {
        let settings = settings().with_endpoint(GOOGLE_INTEROP_ENDPOINT);
        let backend = S3Backend::new("gcs", &settings);
        assert_eq!(backend.name(), "gcs");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"9bb58f26192e4ba00f01e2e7b136bbd8\""), "9bb58f26192e4ba00f01e2e7b136bbd8");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn test_to_object() {
        let object = Object::builder()
            .key("reports/q1.csv")
            .size(2048)
            .e_tag("\"abc123\"")
            .build();

        let stored = to_object("finance", &object).unwrap();
        assert_eq!(stored.key, "reports/q1.csv");
        assert_eq!(stored.container, "finance");
        assert_eq!(stored.size, Some(2048));
        assert_eq!(stored.hash.as_deref(), Some("abc123"));
        assert_eq!(stored.extra["etag"], "\"abc123\"");
    }

    #[test]
    fn test_to_object_without_key() {
        let object = Object::builder().size(1).build();
        assert!(to_object("finance", &object).is_none());
    }

    fn mocked(client: Client) -> S3Backend {
        S3Backend::with_client("s3", client, "us-east-1")
    }

    #[tokio::test]
    async fn test_list_objects_follows_continuation() {
        let first_page = mock!(Client::list_objects_v2)
            .match_requests(|r| r.continuation_token().is_none())
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(Object::builder().key("logs/a.txt").size(3).build())
                    .common_prefixes(CommonPrefix::builder().prefix("logs/2024/").build())
                    .is_truncated(true)
                    .next_continuation_token("page-2")
                    .build()
            });
        let second_page = mock!(Client::list_objects_v2)
            .match_requests(|r| r.continuation_token() == Some("page-2"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(Object::builder().key("logs/b.txt").size(5).build())
                    .is_truncated(false)
                    .build()
            });
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, &[&first_page, &second_page]);

        let listing = mocked(client)
            .list_objects("photos", Some("logs/"), Some("/"))
            .await
            .unwrap();

        let keys: Vec<&str> = listing.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/a.txt", "logs/b.txt"]);
        assert_eq!(listing.common_prefixes, vec!["logs/2024/".to_string()]);
        assert_eq!(listing.objects[1].size, Some(5));
    }

    #[tokio::test]
    async fn test_list_missing_bucket() {
        let rule = mock!(Client::list_objects_v2)
            .then_error(|| ListObjectsV2Error::NoSuchBucket(NoSuchBucket::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&rule]);

        let err = mocked(client).list_objects("gone", None, None).await.unwrap_err();
        assert!(matches!(err, BackendError::ContainerDoesNotExist(ref name) if name == "gone"));
    }

    #[tokio::test]
    async fn test_head_not_found_is_object_missing() {
        let rule = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&rule]);

        let err = mocked(client).get_object("photos", "nope.jpg").await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::ObjectDoesNotExist { ref container, ref key }
                if container == "photos" && key == "nope.jpg"
        ));
    }

    #[tokio::test]
    async fn test_delete_absent_object_fails() {
        // Only HeadObject is mocked; a DeleteObject call would not match.
        let rule = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&rule]);

        let err = mocked(client).delete_object("photos", "nope.jpg").await.unwrap_err();
        assert!(matches!(err, BackendError::ObjectDoesNotExist { .. }));
    }

    #[tokio::test]
    async fn test_get_object_unquotes_etag() {
        let rule = mock!(Client::head_object)
            .match_requests(|r| r.bucket() == Some("photos") && r.key() == Some("a.jpg"))
            .then_output(|| {
                HeadObjectOutput::builder()
                    .e_tag("\"d41d8cd98f00b204e9800998ecf8427e\"")
                    .content_length(42)
                    .content_type("image/jpeg")
                    .build()
            });
        let client = mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&rule]);

        let object = mocked(client).get_object("photos", "a.jpg").await.unwrap();
        assert_eq!(object.hash.as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(object.size, Some(42));
        assert_eq!(object.extra["content_type"], "image/jpeg");
        assert_eq!(object.extra["etag"], "\"d41d8cd98f00b204e9800998ecf8427e\"");
    }
}
