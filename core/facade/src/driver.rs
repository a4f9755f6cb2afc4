//! Driver lifecycle: owns the single active backend connection.
//!
//! The published handle is replaced wholesale on re-initialization. Readers
//! take a cheap `Arc` snapshot and keep using it even if a newer handle is
//! published while their call is in flight.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use cloudbridge_common::{Provider, Result};
use cloudbridge_storage::{create_default_registry, ObjectBackend, ProviderRegistry};

use crate::classify::{classify, Operation};
use crate::config::DriverConfig;

/// Lifecycle state of a [`DriverManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    /// No handle has ever been published.
    Uninitialized,
    /// An initialization is in flight.
    Initializing,
    /// A handle is published.
    Ready,
}

/// The live, authenticated connection to one backend.
pub struct DriverHandle {
    provider: Provider,
    region: String,
    generation: u64,
    initialized_at: DateTime<Utc>,
    backend: Arc<dyn ObjectBackend>,
}

impl DriverHandle {
    /// Provider this handle talks to.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Configured region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Monotonic counter, bumped by every successful initialize.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the handle was published.
    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }

    /// Backend capabilities.
    pub fn backend(&self) -> &dyn ObjectBackend {
        self.backend.as_ref()
    }
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("provider", &self.provider)
            .field("region", &self.region)
            .field("generation", &self.generation)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Owner of the active driver handle.
pub struct DriverManager {
    registry: ProviderRegistry,
    current: RwLock<Option<Arc<DriverHandle>>>,
    init_lock: Mutex<()>,
    pending: AtomicUsize,
    generation: AtomicU64,
}

impl DriverManager {
    /// Create a manager with no handle.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            current: RwLock::new(None),
            init_lock: Mutex::new(()),
            pending: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Create a manager over the default backends.
    pub fn with_default_registry() -> Self {
        Self::new(create_default_registry())
    }

    /// Get the provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Build a handle from `config` and publish it.
    ///
    /// # Preconditions
    /// - Provider must be registered
    /// - Access key and secret key must both be present
    ///
    /// # Postconditions
    /// - The new handle replaces any previous one in a single step
    /// - On failure the previous handle stays published
    ///
    /// # Errors
    /// - `UnsupportedProvider`, `MissingCredentials` before any backend is built
    /// - Classified backend errors if construction fails
    pub async fn initialize(&self, config: DriverConfig) -> Result<Arc<DriverHandle>> {
        let _pending = Pending::enter(&self.pending);
        let _guard = self.init_lock.lock().await;

        let settings = config.resolve().inspect_err(|e| {
            error!("Rejected driver configuration: {}", e);
        })?;
        let descriptor = self.registry.descriptor(settings.provider)?;

        info!(
            "Attempting to initialize cloud driver for {} in {}",
            settings.provider,
            settings.credentials.region()
        );

        let backend = descriptor
            .connect(&settings)
            .map_err(|e| classify(Operation::Connect, e))?;

        let handle = Arc::new(DriverHandle {
            provider: settings.provider,
            region: settings.credentials.region().to_string(),
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            initialized_at: Utc::now(),
            backend,
        });

        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&handle));

        if let Some(previous) = previous {
            debug!(
                "Replaced driver generation {} ({})",
                previous.generation, previous.provider
            );
        }
        info!(
            "Successfully initialized cloud driver for {} (backend {})",
            handle.provider,
            handle.backend.name()
        );

        Ok(handle)
    }

    /// Snapshot of the published handle.
    pub fn current(&self) -> Option<Arc<DriverHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current lifecycle state.
    ///
    /// `Initializing` covers every call to [`initialize`](Self::initialize)
    /// from entry to return, including time spent waiting for another one.
    pub fn state(&self) -> DriverState {
        if self.pending.load(Ordering::SeqCst) > 0 {
            DriverState::Initializing
        } else if self.current().is_some() {
            DriverState::Ready
        } else {
            DriverState::Uninitialized
        }
    }
}

/// Counts an in-flight initialize until dropped, even on panic or cancellation.
struct Pending<'a>(&'a AtomicUsize);

impl<'a> Pending<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::with_default_registry()
    }
}
