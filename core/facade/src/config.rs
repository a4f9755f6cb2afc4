//! Driver configuration.
//!
//! Values come from the process environment or from explicit input;
//! explicit values win. Empty strings count as absent.

use serde::Deserialize;
use std::fmt;

use cloudbridge_common::{ConnectionSettings, Credentials, Provider, Result};

/// Environment variable naming the provider.
pub const ENV_PROVIDER: &str = "CLOUD_PROVIDER";
/// Environment variable holding the access key.
pub const ENV_ACCESS_KEY: &str = "CLOUD_ACCESS_KEY";
/// Environment variable holding the secret key.
pub const ENV_SECRET_KEY: &str = "CLOUD_SECRET_KEY";
/// Environment variable holding the region.
pub const ENV_REGION: &str = "CLOUD_REGION";
/// Environment variable holding an endpoint override.
pub const ENV_ENDPOINT: &str = "CLOUD_ENDPOINT";

/// Provider used when none is configured.
pub const DEFAULT_PROVIDER: &str = "aws";

/// Unvalidated driver configuration.
#[derive(Clone, Default, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl DriverConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            provider: lookup(ENV_PROVIDER),
            access_key: lookup(ENV_ACCESS_KEY),
            secret_key: lookup(ENV_SECRET_KEY),
            region: lookup(ENV_REGION),
            endpoint: lookup(ENV_ENDPOINT),
        }
        .normalized()
    }

    /// Configuration for a provider with complete credentials.
    pub fn explicit(
        provider: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            provider: Some(provider.into()),
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            ..Default::default()
        }
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Layer `explicit` over `self`; present explicit values win.
    pub fn overlay(self, explicit: DriverConfig) -> Self {
        let explicit = explicit.normalized();
        Self {
            provider: explicit.provider.or(self.provider),
            access_key: explicit.access_key.or(self.access_key),
            secret_key: explicit.secret_key.or(self.secret_key),
            region: explicit.region.or(self.region),
            endpoint: explicit.endpoint.or(self.endpoint),
        }
        .normalized()
    }

    /// Validate into connection settings.
    ///
    /// # Postconditions
    /// - Provider defaults to [`DEFAULT_PROVIDER`], region to `us-east-1`
    ///
    /// # Errors
    /// - `UnsupportedProvider` if the provider is outside the supported set
    /// - `MissingCredentials` if the access or secret key is absent
    pub fn resolve(&self) -> Result<ConnectionSettings> {
        let provider = Provider::parse(self.provider.as_deref().unwrap_or(DEFAULT_PROVIDER))?;
        let credentials = Credentials::from_parts(
            self.access_key.clone(),
            self.secret_key.clone(),
            self.region.clone(),
        )?;

        Ok(ConnectionSettings {
            provider,
            credentials,
            endpoint: self.endpoint.clone(),
        })
    }

    fn normalized(self) -> Self {
        fn present(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            provider: present(self.provider),
            access_key: present(self.access_key),
            secret_key: present(self.secret_key),
            region: present(self.region),
            endpoint: present(self.endpoint),
        }
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("provider", &self.provider)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudbridge_common::{Error, DEFAULT_REGION};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = DriverConfig::from_lookup(lookup(&[
            (ENV_ACCESS_KEY, "AKIA"),
            (ENV_SECRET_KEY, "secret"),
        ]));
        let settings = config.resolve().unwrap();
        assert_eq!(settings.provider, Provider::Aws);
        assert_eq!(settings.credentials.region(), DEFAULT_REGION);
        assert!(settings.endpoint.is_none());
    }

    #[test]
    fn test_empty_values_are_absent() {
        let config = DriverConfig::from_lookup(lookup(&[
            (ENV_PROVIDER, ""),
            (ENV_ACCESS_KEY, "AKIA"),
            (ENV_SECRET_KEY, "  "),
        ]));
        assert!(config.provider.is_none());
        assert!(matches!(config.resolve(), Err(Error::MissingCredentials(_))));
    }

    #[test]
    fn test_explicit_overrides_env() {
        let env = DriverConfig::from_lookup(lookup(&[
            (ENV_PROVIDER, "aws"),
            (ENV_ACCESS_KEY, "env-key"),
            (ENV_SECRET_KEY, "env-secret"),
            (ENV_REGION, "eu-west-1"),
        ]));
        let explicit = DriverConfig {
            provider: Some("google".to_string()),
            access_key: Some("GOOG1E".to_string()),
            region: Some(String::new()),
            ..Default::default()
        };

        let settings = env.overlay(explicit).resolve().unwrap();
        assert_eq!(settings.provider, Provider::Google);
        assert_eq!(settings.credentials.access_key(), "GOOG1E");
        assert_eq!(settings.credentials.secret_key().expose(), "env-secret");
        assert_eq!(settings.credentials.region(), "eu-west-1");
    }

    #[test]
    fn test_unsupported_provider() {
        let config = DriverConfig::explicit("digitalocean", "k", "s");
        assert!(matches!(config.resolve(), Err(Error::UnsupportedProvider(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = DriverConfig::explicit("aws", "AKIA", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
