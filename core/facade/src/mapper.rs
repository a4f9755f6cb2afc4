//! Mapping from backend entities to canonical DTOs.
//!
//! Every function here is pure. Missing optional fields get a default
//! (size 0) or stay null; nothing fails because a field is absent.

use serde_json::Value;

use cloudbridge_common::Provider;
use cloudbridge_storage::{Container, Extra, Listing, StoredObject};

use crate::dto::{BucketDescriptor, ListObjectsResult, Metadata, ObjectDescriptor};

/// Map a backend container.
pub fn bucket(container: Container, provider: Provider, region: &str) -> BucketDescriptor {
    BucketDescriptor {
        name: container.name,
        size: container.size,
        created_at: container.created,
        provider,
        region: region.to_string(),
        extra: metadata(container.extra),
    }
}

/// Map a backend object.
pub fn object(object: StoredObject) -> ObjectDescriptor {
    ObjectDescriptor {
        name: object.key,
        size: object.size.unwrap_or(0),
        content_hash: object.hash.filter(|h| !h.is_empty()),
        bucket_name: object.container,
        extra: metadata(object.extra),
    }
}

/// Map a backend listing, keeping object order.
pub fn listing(listing: Listing) -> ListObjectsResult {
    ListObjectsResult {
        objects: listing.objects.into_iter().map(object).collect(),
        common_prefixes: listing.common_prefixes.into_iter().collect(),
    }
}

/// Forward metadata verbatim; structured values become their JSON text.
pub fn metadata(extra: Extra) -> Metadata {
    extra
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
                primitive => primitive,
            };
            (key, value)
        })
        .collect()
}
