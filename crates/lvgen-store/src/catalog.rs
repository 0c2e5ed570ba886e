//! Service catalog.

use std::collections::HashMap;
use std::path::Path;

use lvgen_models::{MediaKind, Service};
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Id → [`Service`] lookup used to price and route tasks.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: HashMap<String, Service>,
}

impl ServiceCatalog {
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: services.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// Services backed by the bundled adapters.
    pub fn builtin() -> Self {
        Self::new([
            Service::new("replicate-minimax-video", "minimax-video-01", "replicate", MediaKind::Video, 4)
                .with_description("MiniMax text/image to video"),
            Service::new("replicate-kling", "kling-v1.6-standard", "replicate", MediaKind::Video, 5)
                .with_description("Kling 1.6 standard video"),
            Service::new("replicate-flux-schnell", "flux-schnell", "replicate", MediaKind::Image, 1)
                .with_description("FLUX schnell image"),
            Service::new("replicate-musicgen", "musicgen", "replicate", MediaKind::Audio, 2)
                .with_description("MusicGen audio"),
            Service::new("runway-gen3a-turbo", "gen3a_turbo", "runway", MediaKind::Video, 5)
                .with_description("Runway Gen-3 Alpha Turbo image to video"),
            Service::new("runway-gen4-turbo", "gen4_turbo", "runway", MediaKind::Video, 6)
                .with_description("Runway Gen-4 Turbo image to video"),
            Service::new("luma-ray-2", "ray-2", "luma", MediaKind::Video, 6)
                .with_description("Luma Ray 2 video"),
            Service::new("luma-ray-flash-2", "ray-flash-2", "luma", MediaKind::Video, 3)
                .with_description("Luma Ray Flash 2 video"),
        ])
    }

    /// Parse a JSON array of services.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let services: Vec<Service> = serde_json::from_str(json)
            .map_err(|e| StoreError::invalid_catalog(e.to_string()))?;

        let mut catalog = Self::default();
        for service in services {
            if service.id.trim().is_empty() {
                return Err(StoreError::invalid_catalog("service with empty id"));
            }
            if catalog.services.contains_key(&service.id) {
                return Err(StoreError::invalid_catalog(format!(
                    "duplicate service id '{}'",
                    service.id
                )));
            }
            catalog.insert(service);
        }
        Ok(catalog)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&raw)
    }

    /// `SERVICE_CATALOG_PATH` when set, else [`ServiceCatalog::builtin`].
    pub async fn from_env() -> StoreResult<Self> {
        match std::env::var("SERVICE_CATALOG_PATH") {
            Ok(path) => {
                let catalog = Self::from_file(&path).await?;
                info!(path = %path, services = catalog.len(), "Loaded service catalog");
                Ok(catalog)
            }
            Err(_) => Ok(Self::builtin()),
        }
    }

    pub fn insert(&mut self, service: Service) {
        self.services.insert(service.id.clone(), service);
    }

    pub fn get(&self, id: &str) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }
}
