//! Operation surface handed to a host tool framework.
//!
//! Each operation is a named tool with a JSON input schema. Invocation
//! always produces JSON: the canonical DTO on success, or
//! `{"error": <kind>, "message": <text>}` on failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use cloudbridge_common::Error;

use crate::config::DriverConfig;
use crate::facade::ObjectStorageFacade;

/// Directory that downloads without an explicit destination land in.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

const OBJECT_SCHEME: &str = "object://";
const DOWNLOAD_SCHEME: &str = "download://";

/// Failure of a tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool is disabled: {0}")]
    ToolDisabled(String),

    #[error(transparent)]
    Storage(#[from] Error),
}

impl ToolError {
    /// Stable kind name reported in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UnknownTool",
            ToolError::InvalidArguments { .. } => "InvalidArguments",
            ToolError::ToolDisabled(_) => "ToolDisabled",
            ToolError::Storage(e) => e.kind().as_str(),
        }
    }

    /// True when the request itself was wrong rather than the backend.
    pub fn is_caller_error(&self) -> bool {
        match self {
            ToolError::Storage(e) => e.is_caller_error(),
            _ => true,
        }
    }

    /// JSON error object.
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.kind(),
            "message": self.to_string(),
        })
    }
}

/// Catalog entry for one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialArgs {
    access_key: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InitializeArgs {
    provider: Option<String>,
    #[serde(default)]
    credentials: CredentialArgs,
    endpoint: Option<String>,
}

impl From<InitializeArgs> for DriverConfig {
    fn from(args: InitializeArgs) -> Self {
        DriverConfig {
            provider: args.provider,
            access_key: args.credentials.access_key,
            secret_key: args.credentials.secret_key,
            region: args.credentials.region,
            endpoint: args.endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketArgs {
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    bucket_name: String,
    prefix: Option<String>,
    delimiter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectArgs {
    bucket_name: String,
    object_name: String,
}

#[derive(Debug, Deserialize)]
struct DownloadArgs {
    bucket_name: String,
    object_name: String,
    destination_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadArgs {
    bucket_name: String,
    object_name: String,
    source_path: String,
}

/// Named tools over an [`ObjectStorageFacade`].
pub struct ToolSurface {
    facade: ObjectStorageFacade,
    delete_enabled: bool,
    download_dir: PathBuf,
    fallback: DriverConfig,
}

impl ToolSurface {
    /// Expose every tool, downloading into [`DEFAULT_DOWNLOAD_DIR`].
    pub fn new(facade: ObjectStorageFacade) -> Self {
        Self {
            facade,
            delete_enabled: true,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            fallback: DriverConfig::default(),
        }
    }

    /// Enable or disable `delete_object`.
    pub fn with_delete(mut self, enabled: bool) -> Self {
        self.delete_enabled = enabled;
        self
    }

    /// Set the directory for downloads without a destination.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Values `initialize_cloud_driver` falls back to for absent arguments.
    pub fn with_fallback_config(mut self, config: DriverConfig) -> Self {
        self.fallback = config;
        self
    }

    /// Get the facade.
    pub fn facade(&self) -> &ObjectStorageFacade {
        &self.facade
    }

    /// Describe the exposed tools.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        let bucket = json!({ "type": "string", "description": "Bucket name" });
        let providers: Vec<&str> = self
            .facade
            .driver()
            .registry()
            .providers()
            .into_iter()
            .map(|p| p.as_str())
            .collect();
        let object = json!({ "type": "string", "description": "Object key" });

        let mut tools = vec![
            ToolSpec {
                name: "initialize_cloud_driver",
                description: "Initialize the cloud driver with provider credentials",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "provider": { "type": "string", "enum": providers },
                        "credentials": {
                            "type": "object",
                            "properties": {
                                "access_key": { "type": "string" },
                                "secret_key": { "type": "string" },
                                "region": { "type": "string" }
                            }
                        },
                        "endpoint": { "type": "string" }
                    }
                }),
            },
            ToolSpec {
                name: "list_buckets",
                description: "List all buckets visible to the configured credentials",
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: "get_bucket_details",
                description: "Get details about a specific bucket",
                input_schema: json!({
                    "type": "object",
                    "properties": { "bucket_name": bucket },
                    "required": ["bucket_name"]
                }),
            },
            ToolSpec {
                name: "list_objects",
                description: "List all objects in a bucket",
                input_schema: json!({
                    "type": "object",
                    "properties": { "bucket_name": bucket },
                    "required": ["bucket_name"]
                }),
            },
            ToolSpec {
                name: "list_all_objects",
                description: "List objects in a bucket with an optional prefix and delimiter",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "bucket_name": bucket,
                        "prefix": { "type": "string" },
                        "delimiter": { "type": "string" }
                    },
                    "required": ["bucket_name"]
                }),
            },
            ToolSpec {
                name: "get_object",
                description: "Get metadata for an object",
                input_schema: json!({
                    "type": "object",
                    "properties": { "bucket_name": bucket, "object_name": object },
                    "required": ["bucket_name", "object_name"]
                }),
            },
            ToolSpec {
                name: "download_object",
                description: "Download an object to a local file",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "bucket_name": bucket,
                        "object_name": object,
                        "destination_path": { "type": "string" }
                    },
                    "required": ["bucket_name", "object_name"]
                }),
            },
            ToolSpec {
                name: "upload_object",
                description: "Upload a local file as an object",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "bucket_name": bucket,
                        "object_name": object,
                        "source_path": { "type": "string" }
                    },
                    "required": ["bucket_name", "object_name", "source_path"]
                }),
            },
        ];

        if self.delete_enabled {
            tools.push(ToolSpec {
                name: "delete_object",
                description: "Delete an object",
                input_schema: json!({
                    "type": "object",
                    "properties": { "bucket_name": bucket, "object_name": object },
                    "required": ["bucket_name", "object_name"]
                }),
            });
        }

        tools
    }

    /// Run a tool. Never fails; errors come back as JSON error objects.
    pub async fn invoke(&self, name: &str, args: Value) -> Value {
        debug!("Invoking tool {}", name);
        match self.dispatch(name, args).await {
            Ok(value) => value,
            Err(e) => {
                if e.is_caller_error() {
                    debug!("Tool {} rejected: {}", name, e);
                } else {
                    warn!("Tool {} failed: {}", name, e);
                }
                e.to_json()
            }
        }
    }

    /// Read `object://{bucket}/{key}` or `download://{bucket}/{key}`.
    pub async fn read_resource(&self, uri: &str) -> Value {
        match self.resource(uri).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Resource {} failed: {}", uri, e);
                e.to_json()
            }
        }
    }

    async fn resource(&self, uri: &str) -> std::result::Result<Value, ToolError> {
        if let Some(rest) = uri.strip_prefix(OBJECT_SCHEME) {
            let (bucket, key) = split_location(uri, rest)?;
            to_value(self.facade.get_object(bucket, key).await?)
        } else if let Some(rest) = uri.strip_prefix(DOWNLOAD_SCHEME) {
            let (bucket, key) = split_location(uri, rest)?;
            let dest = default_destination(&self.download_dir, key)?;
            to_value(self.facade.download(bucket, key, dest).await?)
        } else {
            Err(ToolError::InvalidArguments {
                tool: "resource".to_string(),
                reason: format!("unsupported resource uri: {}", uri),
            })
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> std::result::Result<Value, ToolError> {
        match name {
            "initialize_cloud_driver" => {
                let args: InitializeArgs = parse_args(name, args)?;
                let config = self.fallback.clone().overlay(args.into());
                let handle = self.facade.driver().initialize(config).await?;
                Ok(json!({
                    "status": "success",
                    "provider": handle.provider(),
                    "region": handle.region(),
                    "initialized_at": handle.initialized_at().to_rfc3339(),
                    "message": "Cloud driver initialized successfully",
                }))
            }
            "list_buckets" => to_value(self.facade.list_buckets().await?),
            "get_bucket_details" => {
                let args: BucketArgs = parse_args(name, args)?;
                to_value(self.facade.get_bucket(&args.bucket_name).await?)
            }
            "list_objects" => {
                let args: BucketArgs = parse_args(name, args)?;
                let listing = self.facade.list_objects(&args.bucket_name, None, None).await?;
                to_value(listing.objects)
            }
            "list_all_objects" => {
                let args: ListArgs = parse_args(name, args)?;
                to_value(
                    self.facade
                        .list_objects(
                            &args.bucket_name,
                            args.prefix.as_deref(),
                            args.delimiter.as_deref(),
                        )
                        .await?,
                )
            }
            "get_object" => {
                let args: ObjectArgs = parse_args(name, args)?;
                to_value(
                    self.facade
                        .get_object(&args.bucket_name, &args.object_name)
                        .await?,
                )
            }
            "download_object" => {
                let args: DownloadArgs = parse_args(name, args)?;
                let dest = match args.destination_path {
                    Some(path) => PathBuf::from(path),
                    None => default_destination(&self.download_dir, &args.object_name)?,
                };
                to_value(
                    self.facade
                        .download(&args.bucket_name, &args.object_name, dest)
                        .await?,
                )
            }
            "upload_object" => {
                let args: UploadArgs = parse_args(name, args)?;
                to_value(
                    self.facade
                        .upload(&args.bucket_name, &args.object_name, &args.source_path)
                        .await?,
                )
            }
            "delete_object" if !self.delete_enabled => {
                Err(ToolError::ToolDisabled(name.to_string()))
            }
            "delete_object" => {
                let args: ObjectArgs = parse_args(name, args)?;
                self.facade
                    .delete(&args.bucket_name, &args.object_name)
                    .await?;
                Ok(json!({
                    "status": "deleted",
                    "bucket_name": args.bucket_name,
                    "object_name": args.object_name,
                }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Local path for `object_name` under `download_dir`.
///
/// A leading `/` is ignored. Keys that would resolve outside `download_dir`
/// (`..`, `.` or drive prefixes) are refused.
///
/// # Errors
/// - `InvalidArguments` if the key has a component other than a plain name
pub fn default_destination(
    download_dir: &Path,
    object_name: &str,
) -> std::result::Result<PathBuf, ToolError> {
    let relative = Path::new(object_name.trim_start_matches('/'));
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));

    if !plain || relative.as_os_str().is_empty() {
        return Err(ToolError::InvalidArguments {
            tool: "download_object".to_string(),
            reason: format!("object name cannot be used as a local path: {}", object_name),
        });
    }

    Ok(download_dir.join(relative))
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> std::result::Result<T, ToolError> {
    // Hosts send `null` for argument-less calls.
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: Serialize>(value: T) -> std::result::Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::Storage(Error::unexpected(e)))
}

fn split_location<'a>(uri: &str, rest: &'a str) -> std::result::Result<(&'a str, &'a str), ToolError> {
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(ToolError::InvalidArguments {
            tool: "resource".to_string(),
            reason: format!("expected {{bucket}}/{{key}} in {}", uri),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverManager;
    use cloudbridge_common::Provider;
    use cloudbridge_storage::{MemoryBackend, ProviderDescriptor, ProviderRegistry};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn surface() -> (MemoryBackend, ToolSurface) {
        let backend = MemoryBackend::new();
        backend.put_object("docs", "guides/intro.md", "# Intro").await;
        backend.put_object("docs", "guides/setup.md", "# Setup").await;
        backend.put_object("docs", "README", "readme").await;

        let mut registry = ProviderRegistry::new();
        registry.register(ProviderDescriptor::shared(
            Provider::Aws,
            Arc::new(backend.clone()),
        ));
        let facade = ObjectStorageFacade::new(Arc::new(DriverManager::new(registry)));
        let surface = ToolSurface::new(facade);
        (backend, surface)
    }

    async fn initialized() -> (MemoryBackend, ToolSurface) {
        let (backend, surface) = surface().await;
        let reply = surface
            .invoke(
                "initialize_cloud_driver",
                json!({
                    "provider": "aws",
                    "credentials": { "access_key": "AKIA", "secret_key": "secret" }
                }),
            )
            .await;
        assert_eq!(reply["status"], "success");
        (backend, surface)
    }

    #[tokio::test]
    async fn test_initialize_reports_provider_and_region() {
        let (_, surface) = surface().await;
        let reply = surface
            .invoke(
                "initialize_cloud_driver",
                json!({
                    "provider": "AWS",
                    "credentials": { "access_key": "AKIA", "secret_key": "s", "region": "ap-south-1" }
                }),
            )
            .await;
        assert_eq!(reply["provider"], "aws");
        assert_eq!(reply["region"], "ap-south-1");
        assert!(reply["initialized_at"].is_string());
    }

    #[tokio::test]
    async fn test_initialize_schema_lists_registered_providers() {
        let (_, surface) = surface().await;
        let catalog = surface.catalog();
        let schema = &catalog[0].input_schema;
        assert_eq!(schema["properties"]["provider"]["enum"], json!(["aws"]));
    }

    #[tokio::test]
    async fn test_initialize_uses_fallback_config() {
        let (_, surface) = surface().await;
        let surface = surface.with_fallback_config(DriverConfig::explicit("aws", "AKIA", "secret"));

        let reply = surface.invoke("initialize_cloud_driver", Value::Null).await;
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["region"], "us-east-1");
    }

    #[tokio::test]
    async fn test_initialize_errors() {
        let (_, surface) = surface().await;

        let reply = surface
            .invoke("initialize_cloud_driver", json!({ "provider": "digitalocean" }))
            .await;
        assert_eq!(reply["error"], "UnsupportedProvider");

        let reply = surface
            .invoke(
                "initialize_cloud_driver",
                json!({ "provider": "aws", "credentials": { "access_key": "AKIA" } }),
            )
            .await;
        assert_eq!(reply["error"], "MissingCredentials");
    }

    #[tokio::test]
    async fn test_calls_before_initialize() {
        let (_, surface) = surface().await;
        let reply = surface.invoke("list_buckets", json!({})).await;
        assert_eq!(reply["error"], "NotInitialized");
        assert!(reply["message"].as_str().unwrap().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (_, surface) = initialized().await;

        let buckets = surface.invoke("list_buckets", json!({})).await;
        assert_eq!(buckets[0]["name"], "docs");
        assert_eq!(buckets[0]["provider"], "aws");

        let objects = surface
            .invoke("list_objects", json!({ "bucket_name": "docs" }))
            .await;
        assert_eq!(objects.as_array().unwrap().len(), 3);

        let grouped = surface
            .invoke(
                "list_all_objects",
                json!({ "bucket_name": "docs", "delimiter": "/" }),
            )
            .await;
        assert_eq!(grouped["common_prefixes"], json!(["guides/"]));
        assert_eq!(grouped["objects"][0]["name"], "README");

        let missing = surface
            .invoke("get_bucket_details", json!({ "bucket_name": "nope" }))
            .await;
        assert_eq!(missing["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_invalid_and_unknown() {
        let (_, surface) = initialized().await;

        let reply = surface.invoke("get_object", json!({ "bucket_name": "docs" })).await;
        assert_eq!(reply["error"], "InvalidArguments");

        let reply = surface.invoke("rename_object", json!({})).await;
        assert_eq!(reply["error"], "UnknownTool");
    }

    #[tokio::test]
    async fn test_transfer_tools() {
        let (_, surface) = initialized().await;
        let temp = TempDir::new().unwrap();
        let surface = surface.with_download_dir(temp.path().join("downloads"));

        let reply = surface
            .invoke(
                "download_object",
                json!({ "bucket_name": "docs", "object_name": "guides/intro.md" }),
            )
            .await;
        assert_eq!(reply["bytes_transferred"], 7);
        let local = temp.path().join("downloads").join("guides").join("intro.md");
        assert_eq!(std::fs::read(&local).unwrap(), b"# Intro");

        let reply = surface
            .invoke(
                "upload_object",
                json!({
                    "bucket_name": "docs",
                    "object_name": "copies/intro.md",
                    "source_path": local.display().to_string()
                }),
            )
            .await;
        assert_eq!(reply["name"], "copies/intro.md");
        assert_eq!(reply["bucket_name"], "docs");
        assert_eq!(reply["size"], 7);
        assert_eq!(
            reply["content_hash"],
            format!("{:x}", md5::compute(b"# Intro")).as_str()
        );

        let reply = surface
            .invoke(
                "upload_object",
                json!({
                    "bucket_name": "docs",
                    "object_name": "x",
                    "source_path": temp.path().join("absent").display().to_string()
                }),
            )
            .await;
        assert_eq!(reply["error"], "SourceNotFound");
    }

    #[tokio::test]
    async fn test_delete_toggle() {
        let (backend, surface) = initialized().await;
        let surface = surface.with_delete(false);

        assert!(surface.catalog().iter().all(|t| t.name != "delete_object"));
        let reply = surface
            .invoke(
                "delete_object",
                json!({ "bucket_name": "docs", "object_name": "README" }),
            )
            .await;
        assert_eq!(reply["error"], "ToolDisabled");
        assert_eq!(backend.object_count("docs").await, Some(3));

        let surface = surface.with_delete(true);
        assert!(surface.catalog().iter().any(|t| t.name == "delete_object"));
        let reply = surface
            .invoke(
                "delete_object",
                json!({ "bucket_name": "docs", "object_name": "README" }),
            )
            .await;
        assert_eq!(reply["status"], "deleted");
        assert_eq!(backend.object_count("docs").await, Some(2));
    }

    #[tokio::test]
    async fn test_resources() {
        let (_, surface) = initialized().await;
        let temp = TempDir::new().unwrap();
        let surface = surface.with_download_dir(temp.path());

        let meta = surface.read_resource("object://docs/README").await;
        assert_eq!(meta["size"], 6);
        assert_eq!(meta["bucket_name"], "docs");

        let transfer = surface.read_resource("download://docs/README").await;
        assert_eq!(transfer["bytes_transferred"], 6);
        assert!(temp.path().join("README").exists());

        let bad = surface.read_resource("object://docs").await;
        assert_eq!(bad["error"], "InvalidArguments");
        let bad = surface.read_resource("ftp://docs/README").await;
        assert_eq!(bad["error"], "InvalidArguments");
    }

    #[tokio::test]
    async fn test_download_refuses_escaping_keys() {
        let (backend, surface) = initialized().await;
        backend.put_object("docs", "../escaped.txt", "outside").await;
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("downloads");
        let surface = surface.with_download_dir(root.clone());

        let reply = surface.read_resource("download://docs/../escaped.txt").await;
        assert_eq!(reply["error"], "InvalidArguments");

        let reply = surface
            .invoke(
                "download_object",
                json!({ "bucket_name": "docs", "object_name": "../escaped.txt" }),
            )
            .await;
        assert_eq!(reply["error"], "InvalidArguments");

        assert!(!temp.path().join("escaped.txt").exists());
        assert!(!root.exists());
    }

    #[test]
    fn test_default_destination() {
        let dir = Path::new("/srv/downloads");
        assert_eq!(
            default_destination(dir, "/guides/intro.md").unwrap(),
            PathBuf::from("/srv/downloads/guides/intro.md")
        );
        for key in ["../x", "a/../../x", "./x", "", "/"] {
            assert!(
                matches!(
                    default_destination(dir, key),
                    Err(ToolError::InvalidArguments { .. })
                ),
                "accepted {:?}",
                key
            );
        }
    }

    #[test]
    fn test_caller_errors() {
        assert!(ToolError::UnknownTool("x".into()).is_caller_error());
        assert!(ToolError::Storage(Error::MissingCredentials("secret_key".into())).is_caller_error());
        assert!(!ToolError::Storage(Error::NotInitialized).is_caller_error());
    }
}
