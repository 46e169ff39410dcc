//! Authorized HTTP requests with one retry after a 401
//!
//! [`AuthorizedClient`] attaches the current token to a request. If the
//! upstream answers 401 it invalidates exactly the token it sent, obtains a
//! new one and replays the request once. A second 401 is reported as
//! [`AuthError::AuthenticationFailed`]; any other response is returned as-is.

use crate::authority::TokenAuthority;
use crate::error::{AuthError, Result};
use crate::types::AuthScheme;
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use std::sync::Arc;
use tracing::{debug, warn};

const UNAUTHORIZED: u16 = 401;

/// Anything that can hand out a token and drop a rejected one.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;

    /// Drop `stale` if it is still current. Returns whether anything changed.
    async fn invalidate_token(&self, stale: &str) -> bool;

    fn scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }
}

#[async_trait]
impl AccessTokenSource for TokenAuthority {
    async fn access_token(&self) -> Result<String> {
        self.ensure_valid_token().await
    }

    async fn invalidate_token(&self, stale: &str) -> bool {
        TokenAuthority::invalidate_token(self, stale).await
    }

    fn scheme(&self) -> AuthScheme {
        TokenAuthority::scheme(self)
    }
}

#[derive(Clone)]
pub struct AuthorizedClient {
    tokens: Arc<dyn AccessTokenSource>,
    http_client: Arc<dyn HttpClient>,
}

impl AuthorizedClient {
    pub fn new(tokens: Arc<dyn AccessTokenSource>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            tokens,
            http_client,
        }
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http_client
    }

    /// Header value for requests made outside this client, e.g. by the player
    pub async fn authorization_header(&self) -> Result<String> {
        let token = self.tokens.access_token().await?;
        Ok(self.tokens.scheme().header_value(&token))
    }

    /// Send `request` with an `Authorization` header.
    ///
    /// # Errors
    ///
    /// - token errors from the source, unchanged
    /// - [`AuthError::NetworkError`] when the transport fails
    /// - [`AuthError::AuthenticationFailed`] when the replayed request is
    ///   rejected as well
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.tokens.access_token().await?;
        let response = self.send(request.clone(), &token).await?;

        if response.status != UNAUTHORIZED {
            return Ok(response);
        }

        warn!(url = %request.url, "Upstream rejected access token, retrying once");
        if !self.tokens.invalidate_token(&token).await {
            debug!("Token was already replaced by another request");
        }

        let token = self.tokens.access_token().await?;
        let response = self.send(request, &token).await?;

        if response.status == UNAUTHORIZED {
            warn!("Upstream rejected the renewed access token");
            return Err(AuthError::AuthenticationFailed {
                reason: "upstream rejected a freshly issued token".to_string(),
            });
        }

        Ok(response)
    }

    async fn send(&self, request: HttpRequest, token: &str) -> Result<HttpResponse> {
        let request = request.header("Authorization", self.tokens.scheme().header_value(token));
        self.http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpMethod;
    use bytes::Bytes;
    use mockall::mock;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(&self, url: String) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    /// Issues `tok-1`, `tok-2`, ... and records invalidations.
    #[derive(Default)]
    struct CountingSource {
        current: Mutex<u32>,
        invalidated: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccessTokenSource for CountingSource {
        async fn access_token(&self) -> Result<String> {
            let mut current = self.current.lock();
            if *current == 0 {
                *current = 1;
            }
            Ok(format!("tok-{}", *current))
        }

        async fn invalidate_token(&self, stale: &str) -> bool {
            self.invalidated.lock().push(stale.to_string());
            let mut current = self.current.lock();
            if format!("tok-{}", *current) == stale {
                *current += 1;
                true
            } else {
                false
            }
        }
    }

    fn status(code: u16) -> HttpResponse {
        HttpResponse {
            status: code,
            headers: HashMap::new(),
            body: Bytes::from_static(b"{}"),
        }
    }

    fn auth_header_is(expected: &'static str) -> impl Fn(&HttpRequest) -> bool + Send + 'static {
        move |request| request.headers.get("Authorization").map(String::as_str) == Some(expected)
    }

    fn request() -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, "https://api.example.com/me")
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(auth_header_is("Bearer tok-1"))
            .times(1)
            .returning(|_| Ok(status(200)));

        let source = Arc::new(CountingSource::default());
        let client = AuthorizedClient::new(source.clone(), Arc::new(mock));

        assert_eq!(client.execute(request()).await.unwrap().status, 200);
        assert!(source.invalidated.lock().is_empty());
    }

    #[tokio::test]
    async fn test_single_401_is_retried_with_new_token() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(auth_header_is("Bearer tok-1"))
            .times(1)
            .returning(|_| Ok(status(401)));
        mock.expect_execute()
            .withf(auth_header_is("Bearer tok-2"))
            .times(1)
            .returning(|_| Ok(status(200)));

        let source = Arc::new(CountingSource::default());
        let client = AuthorizedClient::new(source.clone(), Arc::new(mock));

        assert_eq!(client.execute(request()).await.unwrap().status, 200);
        assert_eq!(*source.invalidated.lock(), vec!["tok-1".to_string()]);
    }

    #[tokio::test]
    async fn test_second_401_fails_authentication() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(2).returning(|_| Ok(status(401)));

        let client = AuthorizedClient::new(Arc::new(CountingSource::default()), Arc::new(mock));

        assert!(matches!(
            client.execute(request()).await,
            Err(AuthError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_authorization_header_uses_scheme() {
        let client = AuthorizedClient::new(
            Arc::new(CountingSource::default()),
            Arc::new(MockHttpClient::new()),
        );

        assert_eq!(client.authorization_header().await.unwrap(), "Bearer tok-1");
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| Ok(status(403)));

        let client = AuthorizedClient::new(Arc::new(CountingSource::default()), Arc::new(mock));

        assert_eq!(client.execute(request()).await.unwrap().status, 403);
    }
}
