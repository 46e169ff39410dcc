//! OAuth 2.0 token endpoint client with PKCE support
//!
//! Implements the three grants the token authority needs (RFC 6749 and
//! RFC 7636):
//! - `client_credentials` with HTTP Basic client authentication
//! - `authorization_code` with an S256 PKCE verifier
//! - `refresh_token`
//!
//! # Security
//!
//! - The code verifier is 64 characters from the RFC 7636 unreserved set
//! - The state parameter is a random UUID and is checked before any exchange
//! - Tokens, codes and verifiers never appear in logs or `Debug` output

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

const PKCE_VERIFIER_LENGTH: usize = 64;
const PKCE_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// OAuth 2.0 client configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Required for the client credentials grant
    pub client_secret: Option<String>,
    /// Required for the authorization code grant
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    /// Authorization endpoint, only needed for interactive sign-in
    pub authorize_url: Option<String>,
    pub token_url: String,
    /// Provider specific query parameters appended to the authorization URL
    pub extra_authorize_params: Vec<(String, String)>,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            scopes: Vec::new(),
            authorize_url: None,
            token_url: token_url.into(),
            extra_authorize_params: Vec::new(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_authorize_params.push((key.into(), value.into()));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config("client_id must not be empty".to_string()));
        }

        Url::parse(&self.token_url)
            .map_err(|e| AuthError::Config(format!("Invalid token URL: {}", e)))?;

        if let Some(ref authorize_url) = self.authorize_url {
            Url::parse(authorize_url)
                .map_err(|e| AuthError::Config(format!("Invalid authorize URL: {}", e)))?;
        }

        Ok(())
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// State of one interactive authorization attempt.
///
/// Lives from the moment the authorization URL is built until the callback
/// is consumed. Only the challenge ever leaves the process before the code
/// exchange.
#[derive(Clone)]
pub struct PkceSession {
    code_verifier: String,
    state: String,
}

impl PkceSession {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..PKCE_VERIFIER_LENGTH)
            .map(|_| PKCE_CHARSET[rng.gen_range(0..PKCE_CHARSET.len())] as char)
            .collect();

        Self {
            code_verifier,
            state: Uuid::new_v4().to_string(),
        }
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn code_challenge(&self) -> String {
        let digest = Sha256::digest(self.code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Reject a callback whose state was not issued by this session
    pub fn verify_state(&self, returned: &str) -> Result<()> {
        if returned != self.state {
            warn!("OAuth state mismatch on authorization callback");
            return Err(AuthError::StateMismatch {
                expected: self.state.clone(),
                actual: returned.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PkceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceSession")
            .field("code_verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Parameters delivered to the redirect URI.
#[derive(Clone)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl CallbackParams {
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: state.into(),
        }
    }

    /// Parse the URL the provider redirected to.
    ///
    /// An `error` parameter becomes [`AuthError::AuthorizationDenied`]; a
    /// callback lacking `code` or `state` is an [`AuthError::InvalidCallback`].
    pub fn from_redirect_url(redirect: &str) -> Result<Self> {
        let url = Url::parse(redirect)
            .map_err(|e| AuthError::InvalidCallback(format!("unparsable redirect: {}", e)))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            let message = match error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Err(AuthError::AuthorizationDenied(message));
        }

        match (code, state) {
            (Some(code), Some(state)) if !code.is_empty() => Ok(Self { code, state }),
            (_, None) => Err(AuthError::InvalidCallback("missing state".to_string())),
            _ => Err(AuthError::InvalidCallback("missing code".to_string())),
        }
    }
}

impl fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Token endpoint success body
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Grant sent to the token endpoint
#[derive(Clone)]
pub enum GrantRequest {
    ClientCredentials,
    AuthorizationCode { code: String, code_verifier: String },
    RefreshToken { refresh_token: String },
}

impl GrantRequest {
    fn grant_type(&self) -> &'static str {
        match self {
            GrantRequest::ClientCredentials => "client_credentials",
            GrantRequest::AuthorizationCode { .. } => "authorization_code",
            GrantRequest::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Client for the authorization and token endpoints.
pub struct OAuthClient {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    retry_policy: RetryPolicy,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the URL the user must visit to authorize this client.
    #[instrument(skip(self, session), fields(client_id = %self.config.client_id))]
    pub fn authorize_url(&self, session: &PkceSession) -> Result<String> {
        let authorize_url = self.config.authorize_url.as_deref().ok_or_else(|| {
            AuthError::Config("authorize_url is required for interactive sign-in".to_string())
        })?;
        let redirect_uri = self.redirect_uri()?;

        let mut url = Url::parse(authorize_url)
            .map_err(|e| AuthError::Config(format!("Invalid authorize URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("code_challenge", &session.code_challenge());
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("state", session.state());
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            for (key, value) in &self.config.extra_authorize_params {
                query.append_pair(key, value);
            }
        }

        debug!("Built authorization URL");
        Ok(url.to_string())
    }

    pub async fn client_credentials(&self) -> Result<TokenResponse> {
        self.request_token(&GrantRequest::ClientCredentials).await
    }

    /// Exchange an authorization code after checking the callback state.
    pub async fn exchange_code(
        &self,
        callback: &CallbackParams,
        session: &PkceSession,
    ) -> Result<TokenResponse> {
        session.verify_state(&callback.state)?;
        self.request_token(&GrantRequest::AuthorizationCode {
            code: callback.code.clone(),
            code_verifier: session.code_verifier().to_string(),
        })
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.request_token(&GrantRequest::RefreshToken {
            refresh_token: refresh_token.to_string(),
        })
        .await
    }

    /// POST a grant to the token endpoint.
    ///
    /// 5xx responses and transport failures are retried with exponential
    /// backoff up to the retry policy's attempt count. 4xx responses are final
    /// and surface as [`AuthError::GrantRejected`].
    #[instrument(skip(self, grant), fields(grant_type = grant.grant_type()))]
    pub async fn request_token(&self, grant: &GrantRequest) -> Result<TokenResponse> {
        let (body, basic_auth) = self.encode_grant(grant)?;
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
                .header("Content-Type", "application/x-www-form-urlencoded")
                .header("Accept", "application/json; charset=utf-8")
                .body(body.clone());
            if let Some(ref header) = basic_auth {
                request = request.header("Authorization", header.clone());
            }

            let outcome = self
                .http_client
                .execute_with_retry(request, RetryPolicy::none())
                .await;

            let last_error = match outcome {
                Ok(response) if response.is_success() => {
                    let token: TokenResponse = response.json().map_err(|e| {
                        AuthError::Other(format!("Failed to parse token response: {}", e))
                    })?;

                    info!(
                        expires_in = token.expires_in,
                        has_refresh_token = token.refresh_token.is_some(),
                        "Token grant succeeded"
                    );
                    return Ok(token);
                }
                Ok(response) if response.is_client_error() => {
                    let error_body = response
                        .text()
                        .unwrap_or_else(|_| "Unable to read error response".to_string());

                    warn!(
                        status = response.status,
                        error = %error_body,
                        "Token endpoint rejected grant"
                    );

                    return Err(AuthError::GrantRejected {
                        status: response.status,
                        body: error_body,
                    });
                }
                Ok(response) => format!("token endpoint returned {}", response.status),
                Err(e) => e.to_string(),
            };

            if attempts >= max_attempts {
                warn!(attempts, error = %last_error, "Token grant failed");
                return Err(AuthError::NetworkError(format!(
                    "Token grant failed after {} attempts: {}",
                    attempts, last_error
                )));
            }

            let delay = self.retry_policy.delay_for(attempts);
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %last_error, "Retrying token grant");
            tokio::time::sleep(delay).await;
        }
    }

    fn redirect_uri(&self) -> Result<&str> {
        self.config.redirect_uri.as_deref().ok_or_else(|| {
            AuthError::Config("redirect_uri is required for the authorization code grant".to_string())
        })
    }

    fn encode_grant(&self, grant: &GrantRequest) -> Result<(Bytes, Option<String>)> {
        let mut params: Vec<(&str, &str)> = vec![("grant_type", grant.grant_type())];
        let mut basic_auth = None;

        match grant {
            GrantRequest::ClientCredentials => match self.config.client_secret {
                Some(ref secret) => {
                    let raw = format!("{}:{}", self.config.client_id, secret);
                    basic_auth = Some(format!("Basic {}", STANDARD.encode(raw)));
                }
                None => params.push(("client_id", &self.config.client_id)),
            },
            GrantRequest::AuthorizationCode {
                code,
                code_verifier,
            } => {
                params.push(("client_id", &self.config.client_id));
                if let Some(ref secret) = self.config.client_secret {
                    params.push(("client_secret", secret));
                }
                params.push(("redirect_uri", self.redirect_uri()?));
                params.push(("code_verifier", code_verifier));
                params.push(("code", code));
            }
            GrantRequest::RefreshToken { refresh_token } => {
                params.push(("client_id", &self.config.client_id));
                if let Some(ref secret) = self.config.client_secret {
                    params.push(("client_secret", secret));
                }
                params.push(("refresh_token", refresh_token));
            }
        }

        let encoded = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        Ok((Bytes::from(encoded), basic_auth))
    }
}
