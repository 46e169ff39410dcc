//! Track descriptors and provider dispatch

use crate::error::{CacheError, Result};
use bridge_traits::stream::{SourceUrl, StreamProvider, StreamSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A track as the caches see it: a stable id plus where its audio lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub source: StreamSource,
}

impl TrackDescriptor {
    pub fn new(id: impl Into<String>, source: StreamSource) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }

    /// API track keyed by its upstream id
    pub fn api(track_id: impl Into<String>) -> Self {
        let track_id = track_id.into();
        Self {
            source: StreamSource::api(track_id.clone()),
            id: track_id,
        }
    }

    /// Storage object keyed by its path
    pub fn storage(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            source: StreamSource::storage(path.clone()),
            id: path,
        }
    }
}

/// Ordered set of stream providers.
///
/// A source goes to the first provider whose `supports` accepts it.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn StreamProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn StreamProvider>) {
        debug!(provider = provider.name(), "Registered stream provider");
        self.providers.push(provider);
    }

    pub fn provider_for(&self, source: &StreamSource) -> Result<&Arc<dyn StreamProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.supports(source))
            .ok_or_else(|| CacheError::NoProvider {
                descriptor: source.to_string(),
            })
    }

    /// Ask the matching provider for a fetchable URL
    pub async fn resolve(&self, source: &StreamSource) -> Result<SourceUrl> {
        let provider = self.provider_for(source)?;
        debug!(provider = provider.name(), source = %source, "Resolving source URL");
        Ok(provider.resolve_source(source).await?)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
