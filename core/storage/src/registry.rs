//! Provider registry: maps each supported provider to the backend that
//! serves it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cloudbridge_common::{ConnectionSettings, Error, Provider, Result};

use crate::azure::AzureBackend;
use crate::provider::{BackendResult, ObjectBackend};
use crate::s3::{S3Backend, GOOGLE_INTEROP_ENDPOINT};

/// Factory function type for creating backends.
pub type BackendFactory =
    Box<dyn Fn(&ConnectionSettings) -> BackendResult<Arc<dyn ObjectBackend>> + Send + Sync>;

/// Capability descriptor for one provider.
pub struct ProviderDescriptor {
    provider: Provider,
    backend: &'static str,
    default_endpoint: Option<&'static str>,
    factory: BackendFactory,
}

impl ProviderDescriptor {
    /// Create a descriptor.
    pub fn new(provider: Provider, backend: &'static str, factory: BackendFactory) -> Self {
        Self {
            provider,
            backend,
            default_endpoint: None,
            factory,
        }
    }

    /// Descriptor whose factory always hands out the same backend instance.
    pub fn shared(provider: Provider, backend: Arc<dyn ObjectBackend>) -> Self {
        Self::new(
            provider,
            "shared",
            Box::new(move |_: &ConnectionSettings| -> BackendResult<Arc<dyn ObjectBackend>> {
                Ok(Arc::clone(&backend))
            }),
        )
    }

    /// Set the endpoint used when the settings carry none.
    pub fn with_default_endpoint(mut self, endpoint: &'static str) -> Self {
        self.default_endpoint = Some(endpoint);
        self
    }

    /// Provider this descriptor serves.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Backend implementation name.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Endpoint used when none is configured.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        self.default_endpoint
    }

    /// Build a backend for the given settings.
    ///
    /// # Postconditions
    /// - The factory sees the default endpoint if the settings have none
    pub fn connect(&self, settings: &ConnectionSettings) -> BackendResult<Arc<dyn ObjectBackend>> {
        match (&settings.endpoint, self.default_endpoint) {
            (None, Some(endpoint)) => {
                let settings = settings.clone().with_endpoint(endpoint);
                (self.factory)(&settings)
            }
            _ => (self.factory)(settings),
        }
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("provider", &self.provider)
            .field("backend", &self.backend)
            .field("default_endpoint", &self.default_endpoint)
            .finish_non_exhaustive()
    }
}

/// Registry of provider descriptors.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    descriptors: BTreeMap<Provider, ProviderDescriptor>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, returning the one it replaces.
    pub fn register(&mut self, descriptor: ProviderDescriptor) -> Option<ProviderDescriptor> {
        self.descriptors.insert(descriptor.provider, descriptor)
    }

    /// Look up the descriptor for a provider.
    ///
    /// # Errors
    /// - `UnsupportedProvider` if nothing is registered for it
    pub fn descriptor(&self, provider: Provider) -> Result<&ProviderDescriptor> {
        self.descriptors
            .get(&provider)
            .ok_or_else(|| Error::UnsupportedProvider(provider.to_string()))
    }

    /// Get list of registered providers.
    pub fn providers(&self) -> Vec<Provider> {
        self.descriptors.keys().copied().collect()
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, provider: Provider) -> bool {
        self.descriptors.contains_key(&provider)
    }
}

/// Create a registry with the default backends.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry.register(ProviderDescriptor::new(Provider::Aws, "s3", Box::new(connect_s3)));
    registry.register(ProviderDescriptor::new(
        Provider::Azure,
        "azure-blob",
        Box::new(connect_azure),
    ));
    registry.register(
        ProviderDescriptor::new(Provider::Google, "gcs-interop", Box::new(connect_gcs))
            .with_default_endpoint(GOOGLE_INTEROP_ENDPOINT),
    );

    registry
}

fn connect_s3(settings: &ConnectionSettings) -> BackendResult<Arc<dyn ObjectBackend>> {
    Ok(Arc::new(S3Backend::new("s3", settings)))
}

fn connect_azure(settings: &ConnectionSettings) -> BackendResult<Arc<dyn ObjectBackend>> {
    Ok(Arc::new(AzureBackend::new(settings)?))
}

fn connect_gcs(settings: &ConnectionSettings) -> BackendResult<Arc<dyn ObjectBackend>> {
    Ok(Arc::new(S3Backend::new("gcs-interop", settings)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use cloudbridge_common::Credentials;
    use std::sync::Mutex;

    fn settings(provider: Provider) -> ConnectionSettings {
        ConnectionSettings::new(provider, Credentials::new("key", "c2VjcmV0", "us-east-1").unwrap())
    }

    #[test]
    fn test_default_registry_covers_all_providers() {
        let registry = create_default_registry();
        assert_eq!(registry.providers(), Provider::ALL.to_vec());
        assert_eq!(registry.descriptor(Provider::Aws).unwrap().backend(), "s3");
        assert_eq!(
            registry.descriptor(Provider::Google).unwrap().default_endpoint(),
            Some(GOOGLE_INTEROP_ENDPOINT)
        );
    }

    #[test]
    fn test_unregistered_provider_fails() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider(Provider::Azure));
        assert!(matches!(
            registry.descriptor(Provider::Azure),
            Err(Error::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = create_default_registry();
        let previous = registry.register(ProviderDescriptor::shared(
            Provider::Aws,
            Arc::new(MemoryBackend::new()),
        ));

        assert_eq!(previous.unwrap().backend(), "s3");
        let backend = registry
            .descriptor(Provider::Aws)
            .unwrap()
            .connect(&settings(Provider::Aws))
            .unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_connect_applies_default_endpoint() {
        let seen = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let descriptor = ProviderDescriptor::new(
            Provider::Google,
            "capture",
            Box::new(
                move |settings: &ConnectionSettings| -> BackendResult<Arc<dyn ObjectBackend>> {
                    *captured.lock().unwrap() = settings.endpoint.clone();
                    Ok(Arc::new(MemoryBackend::new()))
                },
            ),
        )
        .with_default_endpoint("https://example.test");

        descriptor.connect(&settings(Provider::Google)).unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("https://example.test"));

        let explicit = settings(Provider::Google).with_endpoint("http://localhost:4443");
        descriptor.connect(&explicit).unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("http://localhost:4443"));
    }
}
