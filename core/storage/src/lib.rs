//! Storage backend abstraction for cloudbridge.
//!
//! This crate provides the capability contract every backend implements
//! (Amazon S3, Azure Blob Storage, Google Cloud Storage, in-memory) and a
//! provider registry that maps provider identifiers to backends.
//!
//! # Design Principles
//! - Provider isolation: no provider-specific types leave a backend
//! - Async operations: all I/O operations are async
//! - Streaming support: transfers are handled via streams
//! - Raw failures: backends report [`BackendError`]; classification into
//!   the canonical taxonomy happens above this crate

pub mod azure;
pub mod listing;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod s3;

pub use azure::AzureBackend;
pub use listing::group_by_delimiter;
pub use memory::MemoryBackend;
pub use provider::{
    BackendError, BackendResult, ByteStream, Container, Extra, Listing, ObjectBackend,
    StoredObject, UploadSource,
};
pub use registry::{create_default_registry, BackendFactory, ProviderDescriptor, ProviderRegistry};
pub use s3::S3Backend;
