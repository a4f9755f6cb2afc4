//! Common types used throughout cloudbridge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::{Error, Result};

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Supported cloud storage providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon S3.
    Aws,
    /// Azure Blob Storage.
    Azure,
    /// Google Cloud Storage.
    Google,
}

impl Provider {
    /// Every supported provider.
    pub const ALL: [Provider; 3] = [Provider::Aws, Provider::Azure, Provider::Google];

    /// Get the provider identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Google => "google",
        }
    }

    /// Parse a provider identifier.
    ///
    /// Matching ignores case and surrounding whitespace.
    ///
    /// # Errors
    /// - `UnsupportedProvider` if the identifier is not in the supported set
    pub fn parse(id: &str) -> Result<Self> {
        let normalized = id.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| Error::UnsupportedProvider(id.to_string()))
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret string that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED; {} bytes])", self.0.len())
    }
}

/// Credentials for one backend account.
#[derive(Debug, Clone)]
pub struct Credentials {
    access_key: String,
    secret_key: SecretString,
    region: String,
}

impl Credentials {
    /// Create credentials from their parts.
    ///
    /// # Preconditions
    /// - `access_key` and `secret_key` must both be present and non-empty
    ///
    /// # Postconditions
    /// - Region falls back to [`DEFAULT_REGION`] when absent or empty
    ///
    /// # Errors
    /// - `MissingCredentials` naming the absent part(s)
    pub fn from_parts(
        access_key: Option<String>,
        secret_key: Option<String>,
        region: Option<String>,
    ) -> Result<Self> {
        let access_key = access_key.filter(|v| !v.is_empty());
        let secret_key = secret_key.filter(|v| !v.is_empty());

        let (access_key, secret_key) = match (access_key, secret_key) {
            (Some(access), Some(secret)) => (access, secret),
            (None, None) => {
                return Err(Error::MissingCredentials(
                    "access key and secret key are required".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::MissingCredentials(
                    "access key is missing".to_string(),
                ))
            }
            (Some(_), None) => {
                return Err(Error::MissingCredentials(
                    "secret key is missing".to_string(),
                ))
            }
        };

        Ok(Self {
            access_key,
            secret_key: SecretString::new(secret_key),
            region: region
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        })
    }

    /// Create complete credentials.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self> {
        Self::from_parts(
            Some(access_key.into()),
            Some(secret_key.into()),
            Some(region.into()),
        )
    }

    /// Get the access key.
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Get the secret key.
    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    /// Get the region.
    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Everything needed to build one backend connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Target provider.
    pub provider: Provider,
    /// Account credentials.
    pub credentials: Credentials,
    /// Endpoint override (S3-compatible services, emulators).
    pub endpoint: Option<String>,
}

impl ConnectionSettings {
    /// Create settings with the provider's default endpoint.
    pub fn new(provider: Provider, credentials: Credentials) -> Self {
        Self {
            provider,
            credentials,
            endpoint: None,
        }
    }

    /// Set an endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}
