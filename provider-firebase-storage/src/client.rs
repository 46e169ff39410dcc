//! Storage path to download URL

use crate::config::FirebaseStorageConfig;
use crate::error::{FirebaseStorageError, Result};
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpMethod, HttpRequest};
use bridge_traits::stream::{SourceUrl, StreamProvider, StreamSource};
use core_auth::AuthorizedClient;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const NOT_FOUND: u16 = 404;
pub const PROVIDER_NAME: &str = "firebase-storage";

/// Subset of the object metadata document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub name: String,
    pub bucket: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Decimal string
    #[serde(default)]
    pub size: Option<String>,
    /// Comma separated; the first one is used
    #[serde(default)]
    pub download_tokens: Option<String>,
}

impl StorageObject {
    pub fn first_download_token(&self) -> Option<&str> {
        self.download_tokens
            .as_deref()?
            .split(',')
            .map(str::trim)
            .find(|token| !token.is_empty())
    }
}

#[derive(Clone)]
pub struct FirebaseStorageClient {
    client: AuthorizedClient,
    config: FirebaseStorageConfig,
}

impl FirebaseStorageClient {
    pub fn new(client: AuthorizedClient, config: FirebaseStorageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FirebaseStorageConfig {
        &self.config
    }

    #[instrument(skip(self))]
    pub async fn object_metadata(&self, path: &str) -> Result<StorageObject> {
        let request = HttpRequest::new(HttpMethod::Get, self.config.object_url(path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self.client.execute(request).await?;
        match response.status {
            _ if response.is_success() => response
                .json()
                .map_err(|e| FirebaseStorageError::ParseError(e.to_string())),
            NOT_FOUND => Err(FirebaseStorageError::ObjectNotFound {
                path: path.to_string(),
            }),
            status => Err(FirebaseStorageError::ApiError {
                status_code: status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }),
        }
    }

    /// Time-limited public URL for the object at `path`
    pub async fn download_url(&self, path: &str) -> Result<String> {
        let object = self.object_metadata(path).await?;
        let token = object.first_download_token().ok_or_else(|| {
            FirebaseStorageError::MissingDownloadToken {
                path: path.to_string(),
            }
        })?;

        debug!(path, "Built storage download URL");
        Ok(format!(
            "{}?alt=media&token={}",
            self.config.object_url(path),
            urlencoding::encode(token)
        ))
    }
}

/// Serves [`StreamSource::Storage`] sources. Download URLs carry their own
/// token, so no headers are returned.
pub struct FirebaseStorageProvider {
    client: FirebaseStorageClient,
}

impl FirebaseStorageProvider {
    pub fn new(client: FirebaseStorageClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirebaseStorageClient {
        &self.client
    }
}

#[async_trait]
impl StreamProvider for FirebaseStorageProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, source: &StreamSource) -> bool {
        matches!(source, StreamSource::Storage { .. })
    }

    #[instrument(skip(self), fields(source = %source))]
    async fn resolve_source(&self, source: &StreamSource) -> BridgeResult<SourceUrl> {
        match source {
            StreamSource::Storage { path } => Ok(SourceUrl::new(self.client.download_url(path).await?)),
            other => Err(FirebaseStorageError::UnsupportedSource(other.to_string()).into()),
        }
    }
}
