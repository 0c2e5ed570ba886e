//! Lookup from provider to adapter.

use std::collections::HashMap;
use std::sync::Arc;

use lvgen_models::Provider;
use tracing::{info, warn};

use crate::adapter::ProviderAdapter;
use crate::luma::LumaAdapter;
use crate::replicate::ReplicateAdapter;
use crate::runway::RunwayAdapter;

/// Adapters available to this process.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every adapter whose credentials are present in the environment.
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        match ReplicateAdapter::from_env() {
            Ok(a) => registry.register(Arc::new(a)),
            Err(e) => warn!("Replicate adapter disabled: {}", e),
        }
        match RunwayAdapter::from_env() {
            Ok(a) => registry.register(Arc::new(a)),
            Err(e) => warn!("Runway adapter disabled: {}", e),
        }
        match LumaAdapter::from_env() {
            Ok(a) => registry.register(Arc::new(a)),
            Err(e) => warn!("Luma adapter disabled: {}", e),
        }

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let provider = adapter.provider();
        info!(provider = %provider, "Registered provider adapter");
        self.adapters.insert(provider, adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.adapters.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}
