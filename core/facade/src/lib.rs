//! Provider-agnostic object-storage facade.
//!
//! This crate owns the driver lifecycle and turns backend capabilities into
//! one uniform operation set:
//! - [`DriverManager`] builds and publishes the single active backend handle
//! - [`ObjectStorageFacade`] lists, inspects, transfers and deletes objects
//! - [`ToolSurface`] exposes those operations as named JSON tools
//!
//! Backend failures are classified into [`cloudbridge_common::Error`] before
//! they leave this crate.

pub mod classify;
pub mod config;
pub mod driver;
pub mod dto;
pub mod facade;
pub mod mapper;
pub mod tools;

pub use classify::{classify, Operation};
pub use config::{DriverConfig, DEFAULT_PROVIDER};
pub use driver::{DriverHandle, DriverManager, DriverState};
pub use dto::{BucketDescriptor, ListObjectsResult, Metadata, ObjectDescriptor, TransferResult};
pub use facade::ObjectStorageFacade;
pub use tools::{default_destination, ToolError, ToolSpec, ToolSurface, DEFAULT_DOWNLOAD_DIR};
