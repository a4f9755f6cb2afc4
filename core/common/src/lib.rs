//! Common utilities and types shared across the cloudbridge crates.
//!
//! This crate holds the canonical error taxonomy every facade call returns,
//! and the small value types (provider, credentials) that configure a
//! backend connection.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, ErrorKind, Result};
pub use types::{ConnectionSettings, Credentials, Provider, SecretString, DEFAULT_REGION};
