//! # dirsync-adapters
//!
//! [`DirectoryAdapter`] implementations for the supported directories and
//! the HTTP client they share.
//!
//! Each adapter module is split in two: the module itself talks to the
//! remote API through an [`ApiClient`], its `mapper` submodule holds the
//! raw payload types and pure functions that turn them into canonical
//! attributes.
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_adapters::{AdapterRegistry, ClientConfig};
//!
//! let registry = AdapterRegistry::with_defaults(&ClientConfig::default())?;
//! let adapter = registry.get(provider.adapter).expect("registered");
//! let snapshot = adapter.gather(&provider, &FetchPool::new(4)).await?;
//! ```

pub mod client;
pub mod entra;
pub mod google;
pub mod jumpcloud;
pub mod mapping;
pub mod mock;
pub mod okta;

use std::collections::HashMap;
use std::sync::Arc;

use dirsync_core::{AdapterType, DirectoryAdapter, Provider};
use serde::de::DeserializeOwned;

pub use client::{ApiClient, ApiError, Auth, ClientConfig, ErrorBody, Items, ListRequest, Pagination};
pub use entra::{EntraAdapter, EntraConfig};
pub use google::{GoogleAdapter, GoogleConfig};
pub use jumpcloud::{JumpCloudAdapter, JumpCloudConfig};
pub use mock::{MockAdapter, MockConfig};
pub use okta::{OktaAdapter, OktaConfig};

/// Adapters keyed by the provider's stored adapter type.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<AdapterType, Arc<dyn DirectoryAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in adapter.
    ///
    /// Each remote adapter gets its own [`ApiClient`], so providers of the
    /// same type share one rate ceiling.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn with_defaults(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut registry = Self::new();
        registry.register(Arc::new(OktaAdapter::new(ApiClient::new(config)?)));
        registry.register(Arc::new(JumpCloudAdapter::new(ApiClient::new(config)?)));
        registry.register(Arc::new(GoogleAdapter::new(ApiClient::new(config)?)));
        registry.register(Arc::new(EntraAdapter::new(ApiClient::new(config)?)));
        registry.register(Arc::new(MockAdapter::new()));
        Ok(registry)
    }

    /// Adds or replaces the adapter for its type.
    pub fn register(&mut self, adapter: Arc<dyn DirectoryAdapter>) {
        self.adapters.insert(adapter.adapter_type(), adapter);
    }

    #[must_use]
    pub fn get(&self, adapter: AdapterType) -> Option<Arc<dyn DirectoryAdapter>> {
        self.adapters.get(&adapter).cloned()
    }

    /// Registered adapter types, in scheduling order.
    #[must_use]
    pub fn adapter_types(&self) -> Vec<AdapterType> {
        AdapterType::ALL
            .into_iter()
            .filter(|adapter| self.adapters.contains_key(adapter))
            .collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapter_types())
            .finish()
    }
}

/// Parses a provider's `adapter_config`.
pub(crate) fn adapter_config<T: DeserializeOwned>(provider: &Provider) -> Result<T, ApiError> {
    serde_json::from_value(provider.adapter_config.clone()).map_err(|e| {
        ApiError::invalid_config(format!(
            "{} provider {} has invalid settings: {e}",
            provider.adapter, provider.id
        ))
    })
}
