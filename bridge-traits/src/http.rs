//! HTTP Client Abstraction
//!
//! Provides async HTTP operations with retry, timeouts and a redirect-probe mode.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
    /// When `false` the client must hand back 3xx responses untouched
    /// instead of following them.
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            follow_redirects: true,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in headers {
            self.headers.insert(key.into(), value.into());
        }
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Disable transparent redirect following for this request.
    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status is a redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.use_exponential_backoff {
            let factor = 2u32.saturating_pow(retry.saturating_sub(1));
            (self.base_delay * factor).min(self.max_delay)
        } else {
            self.base_delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

/// Async HTTP client trait
///
/// Abstracts HTTP so the core never talks to a concrete client. Implementations
/// should handle connection pooling, TLS and retry of transient failures
/// (5xx / 429 / transport errors) according to the [`RetryPolicy`].
///
/// Requests built with [`HttpRequest::without_redirects`] must not follow
/// redirects: the 3xx response, including its `Location` header, is returned
/// as-is. The stream resolution cache relies on this to discover final CDN
/// URLs without downloading them.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod};
///
/// async fn probe(client: &dyn HttpClient, url: &str) -> Result<Option<String>> {
///     let request = HttpRequest::new(HttpMethod::Head, url).without_redirects();
///     let response = client.execute(request).await?;
///     Ok(response.header("location").map(str::to_string))
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - Request times out
    /// - Maximum retries exceeded
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute an HTTP request with custom retry policy
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Download a resource as a stream of bytes
    ///
    /// Used for media files that should not be buffered in memory.
    async fn download_stream(
        &self,
        url: String,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    /// Download a resource described by a full request, headers included
    ///
    /// The default streams header-less `GET`s through
    /// [`download_stream`](Self::download_stream) and buffers anything else
    /// through [`execute`](Self::execute). Clients that can stream arbitrary
    /// requests should override it.
    ///
    /// # Errors
    ///
    /// Transport failures, and any non-2xx status as
    /// [`BridgeError::OperationFailed`].
    async fn download_stream_with(
        &self,
        request: HttpRequest,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        if request.headers.is_empty() && request.method == HttpMethod::Get {
            return self.download_stream(request.url).await;
        }

        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP error: {}",
                response.status
            )));
        }
        Ok(Box::new(std::io::Cursor::new(response.body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "https://example.com")
            .header("User-Agent", "test")
            .header("Authorization", "OAuth secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert!(request.headers.contains_key("Authorization"));
        assert!(request.follow_redirects);
    }

    #[test]
    fn test_without_redirects() {
        let request = HttpRequest::new(HttpMethod::Head, "https://cdn.example/redir")
            .headers([("Authorization", "OAuth abc")])
            .without_redirects();

        assert!(!request.follow_redirects);
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"OAuth abc".to_string())
        );
    }

    #[test]
    fn test_http_response_status_checks() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from("test"),
        };

        assert!(response.is_success());
        assert!(!response.is_redirect());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert(
            "location".to_string(),
            "https://cdn.example/final".to_string(),
        );
        let response = HttpResponse {
            status: 302,
            headers,
            body: Bytes::new(),
        };

        assert!(response.is_redirect());
        assert_eq!(response.header("Location"), Some("https://cdn.example/final"));
        assert_eq!(response.header("content-type"), None);
    }

    struct ScriptedClient {
        status: u16,
        streamed: std::sync::atomic::AtomicUsize,
        last_headers: parking_lot::Mutex<HashMap<String, String>>,
    }

    impl ScriptedClient {
        fn new(status: u16) -> Self {
            Self {
                status,
                streamed: Default::default(),
                last_headers: Default::default(),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            *self.last_headers.lock() = request.headers;
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body: Bytes::from("buffered"),
            })
        }

        async fn download_stream(
            &self,
            _url: String,
        ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            self.streamed
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Box::new(std::io::Cursor::new(b"streamed".to_vec())))
        }
    }

    async fn read_all(mut reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>) -> Vec<u8> {
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_download_with_headers_goes_through_execute() {
        let client = ScriptedClient::new(200);
        let request = HttpRequest::new(HttpMethod::Get, "https://cdn.example/a")
            .header("Authorization", "OAuth abc");

        let body = read_all(client.download_stream_with(request).await.unwrap()).await;

        assert_eq!(body, b"buffered");
        assert_eq!(
            client.last_headers.lock().get("Authorization").map(String::as_str),
            Some("OAuth abc")
        );
        assert_eq!(client.streamed.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plain_download_streams() {
        let client = ScriptedClient::new(200);
        let request = HttpRequest::new(HttpMethod::Get, "https://cdn.example/a");

        let body = read_all(client.download_stream_with(request).await.unwrap()).await;

        assert_eq!(body, b"streamed");
        assert_eq!(client.streamed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_with_error_status_fails() {
        let client = ScriptedClient::new(401);
        let request = HttpRequest::new(HttpMethod::Get, "https://cdn.example/a")
            .header("Authorization", "OAuth stale");

        assert!(matches!(
            client.download_stream_with(request).await,
            Err(BridgeError::OperationFailed(message)) if message.contains("401")
        ));
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
