//! Redirect probe
//!
//! Discovers the final CDN URL behind a redirector without downloading the
//! body: one `HEAD` with redirect following disabled, reading `Location`
//! straight from the 3xx response. Hosts that refuse `HEAD` get a one-byte
//! ranged `GET` instead.

use crate::error::{CacheError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::stream::SourceUrl;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const METHOD_NOT_ALLOWED: u16 = 405;
const NOT_IMPLEMENTED: u16 = 501;

pub struct RedirectProbe {
    http_client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl RedirectProbe {
    pub fn new(http_client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }

    /// Return the URL playback should use for `source`.
    ///
    /// - 3xx: the `Location` target, resolved against the request URL
    /// - 2xx: the request URL itself
    /// - anything else: [`CacheError::InvalidRedirectTarget`]
    #[instrument(skip(self, source), fields(host = %host_of(&source.url)))]
    pub async fn resolve(&self, source: &SourceUrl) -> Result<String> {
        let base = Url::parse(&source.url).map_err(|_| CacheError::InvalidRedirectTarget {
            url: source.url.clone(),
            status: None,
        })?;

        let mut response = self.send(HttpMethod::Head, source).await?;

        if matches!(response.status, METHOD_NOT_ALLOWED | NOT_IMPLEMENTED) {
            debug!(status = response.status, "HEAD refused, probing with ranged GET");
            response = self.send(HttpMethod::Get, source).await?;
        }

        if response.is_redirect() {
            let location = response
                .header("location")
                .ok_or_else(|| CacheError::InvalidRedirectTarget {
                    url: source.url.clone(),
                    status: Some(response.status),
                })?;

            let target = base
                .join(location)
                .map_err(|_| CacheError::InvalidRedirectTarget {
                    url: source.url.clone(),
                    status: Some(response.status),
                })?;

            debug!(status = response.status, "Captured redirect target");
            return Ok(target.to_string());
        }

        if response.is_success() {
            debug!(status = response.status, "URL is already final");
            return Ok(source.url.clone());
        }

        Err(CacheError::InvalidRedirectTarget {
            url: source.url.clone(),
            status: Some(response.status),
        })
    }

    async fn send(&self, method: HttpMethod, source: &SourceUrl) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(method, source.url.clone())
            .headers(source.headers.clone())
            .timeout(self.timeout)
            .without_redirects();
        if method == HttpMethod::Get {
            request = request.header("Range", "bytes=0-0");
        }

        tokio::time::timeout(self.timeout, self.http_client.execute(request))
            .await
            .map_err(|_| CacheError::Timeout {
                operation: "redirect probe".to_string(),
            })?
            .map_err(CacheError::from)
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(&self, url: String) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    fn response(status: u16, location: Option<&str>) -> HttpResponse {
        let mut headers = HashMap::new();
        if let Some(location) = location {
            headers.insert("Location".to_string(), location.to_string());
        }
        HttpResponse {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    fn probe(mock: MockHttpClient) -> RedirectProbe {
        RedirectProbe::new(Arc::new(mock), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_redirect_is_captured_not_followed() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Head
                    && !request.follow_redirects
                    && request.headers.get("Authorization").map(String::as_str) == Some("OAuth t")
            })
            .times(1)
            .returning(|_| Ok(response(302, Some("https://cdn.example/final/T1?sig=abc"))));

        let source = SourceUrl::new("https://cdn.example/redir/T1").with_header("Authorization", "OAuth t");
        let url = probe(mock).resolve(&source).await.unwrap();

        assert_eq!(url, "https://cdn.example/final/T1?sig=abc");
    }

    #[tokio::test]
    async fn test_relative_location() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .returning(|_| Ok(response(307, Some("/final/T1"))));

        let url = probe(mock)
            .resolve(&SourceUrl::new("https://cdn.example/redir/T1"))
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example/final/T1");
    }

    #[tokio::test]
    async fn test_direct_url_is_kept() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().returning(|_| Ok(response(200, None)));

        let url = probe(mock)
            .resolve(&SourceUrl::new("https://cdn.example/a.mp3"))
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example/a.mp3");
    }

    #[tokio::test]
    async fn test_head_refused_falls_back_to_ranged_get() {
        let mut mock = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Head)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(405, None)));
        mock.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Get
                    && request.headers.get("Range").map(String::as_str) == Some("bytes=0-0")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(302, Some("https://cdn.example/final"))));

        let url = probe(mock)
            .resolve(&SourceUrl::new("https://cdn.example/redir"))
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example/final");
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_invalid() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().returning(|_| Ok(response(302, None)));

        assert!(matches!(
            probe(mock).resolve(&SourceUrl::new("https://cdn.example/redir")).await,
            Err(CacheError::InvalidRedirectTarget { status: Some(302), .. })
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_invalid() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().returning(|_| Ok(response(404, None)));

        assert!(matches!(
            probe(mock).resolve(&SourceUrl::new("https://cdn.example/gone")).await,
            Err(CacheError::InvalidRedirectTarget { status: Some(404), .. })
        ));
    }

    #[tokio::test]
    async fn test_unparsable_source_url() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(0);

        assert!(matches!(
            probe(mock).resolve(&SourceUrl::new("not a url")).await,
            Err(CacheError::InvalidRedirectTarget { status: None, .. })
        ));
    }
}
