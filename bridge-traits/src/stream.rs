//! Stream Provider Abstraction
//!
//! The seam between the caches and the upstream services that know how to
//! turn a track reference into a playable URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Where a track's audio lives upstream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamSource {
    /// Track served by the interactive music API
    Api { track_id: String },
    /// Object in cloud storage addressed by its path
    Storage { path: String },
}

impl StreamSource {
    pub fn api(track_id: impl Into<String>) -> Self {
        Self::Api {
            track_id: track_id.into(),
        }
    }

    pub fn storage(path: impl Into<String>) -> Self {
        Self::Storage { path: path.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Api { .. } => "api",
            Self::Storage { .. } => "storage",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { track_id } => write!(f, "api:{}", track_id),
            Self::Storage { path } => write!(f, "storage:{}", path),
        }
    }
}

/// A URL handed out by a provider plus the headers needed to fetch it
#[derive(Clone, PartialEq, Eq)]
pub struct SourceUrl {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl SourceUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

// Header values usually carry credentials.
impl fmt::Debug for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.headers.keys().collect();
        names.sort();
        f.debug_struct("SourceUrl")
            .field("url", &self.url)
            .field("headers", &names)
            .finish()
    }
}

/// Upstream provider that turns a [`StreamSource`] into a fetchable URL
///
/// Implementations authorize their own upstream calls. Errors are reported
/// as [`BridgeError`](crate::BridgeError) so the caches can wrap them without
/// knowing the provider.
///
/// # Example
///
/// ```ignore
/// async fn url_for(provider: &dyn StreamProvider, source: &StreamSource) -> Result<String> {
///     Ok(provider.resolve_source(source).await?.url)
/// }
/// ```
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Short stable name used in logs
    fn name(&self) -> &str;

    /// Whether this provider can resolve the given source
    fn supports(&self, source: &StreamSource) -> bool;

    /// Resolve a direct or redirecting URL for the source
    async fn resolve_source(&self, source: &StreamSource) -> Result<SourceUrl>;
}
