//! Canonical data shapes returned by the facade regardless of backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use cloudbridge_common::Provider;

/// Opaque backend metadata restricted to primitive values.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    pub name: String,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub provider: Provider,
    pub region: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Metadata,
}

/// An object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub name: String,
    pub size: u64,
    pub content_hash: Option<String>,
    pub bucket_name: String,
    #[serde(default)]
    pub extra: Metadata,
}

/// One listing: objects plus the folder-like groups a delimiter produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListObjectsResult {
    pub objects: Vec<ObjectDescriptor>,
    pub common_prefixes: BTreeSet<String>,
}

/// Outcome of an upload or download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub bytes_transferred: u64,
    pub content_hash: String,
    /// Local destination for downloads, object key for uploads.
    pub destination_or_key: String,
}
