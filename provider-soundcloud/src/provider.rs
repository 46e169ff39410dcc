//! [`StreamProvider`] for SoundCloud API tracks

use crate::client::SoundCloudClient;
use crate::endpoints::PROVIDER_NAME;
use crate::error::{Result, SoundCloudError};
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::stream::{SourceUrl, StreamProvider, StreamSource};
use tracing::{debug, instrument};

/// Serves [`StreamSource::Api`] sources.
///
/// The returned URL usually redirects to the CDN and needs the same
/// authorization header as the API itself.
pub struct SoundCloudStreamProvider {
    client: SoundCloudClient,
}

impl SoundCloudStreamProvider {
    pub fn new(client: SoundCloudClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SoundCloudClient {
        &self.client
    }

    async fn resolve_track(&self, track_id: &str) -> Result<SourceUrl> {
        let info = self.client.stream_info(track_id).await?;
        let url = info
            .playable_url()
            .ok_or_else(|| SoundCloudError::NoStreamUrl {
                track_id: track_id.to_string(),
            })?
            .to_string();

        let header = self.client.authorized().authorization_header().await?;
        debug!(track_id, "Resolved SoundCloud stream");
        Ok(SourceUrl::new(url).with_header("Authorization", header))
    }
}

#[async_trait]
impl StreamProvider for SoundCloudStreamProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, source: &StreamSource) -> bool {
        matches!(source, StreamSource::Api { .. })
    }

    #[instrument(skip(self), fields(source = %source))]
    async fn resolve_source(&self, source: &StreamSource) -> BridgeResult<SourceUrl> {
        match source {
            StreamSource::Api { track_id } => Ok(self.resolve_track(track_id).await?),
            other => Err(SoundCloudError::UnsupportedSource(other.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client_with, json_response, MockHttpClient};
    use bridge_traits::error::BridgeError;

    #[tokio::test]
    async fn test_resolves_progressive_url_with_header() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(json_response(
                200,
                r#"{"http_mp3_128_url":"https://api.example/redir/T1","hls_mp3_128_url":"https://api.example/T1.m3u8"}"#,
            ))
        });
        let provider = SoundCloudStreamProvider::new(client_with(mock));

        let source = provider
            .resolve_source(&StreamSource::api("T1"))
            .await
            .unwrap();

        assert_eq!(source.url, "https://api.example/redir/T1");
        assert_eq!(
            source.headers.get("Authorization").map(String::as_str),
            Some("OAuth tok")
        );
    }

    #[tokio::test]
    async fn test_missing_stream_urls_fail() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .returning(|_| Ok(json_response(200, r#"{"preview_mp3_128_url":"https://p"}"#)));
        let provider = SoundCloudStreamProvider::new(client_with(mock));

        let err = provider
            .resolve_source(&StreamSource::api("T1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no playable stream"));
    }

    #[tokio::test]
    async fn test_storage_sources_are_unsupported() {
        let provider = SoundCloudStreamProvider::new(client_with(MockHttpClient::new()));
        let source = StreamSource::storage("songs/a.mp3");

        assert!(!provider.supports(&source));
        assert!(matches!(
            provider.resolve_source(&source).await,
            Err(BridgeError::NotAvailable(_))
        ));
    }
}
