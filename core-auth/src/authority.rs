//! # Token Authority
//!
//! Owns the credentials of one upstream client and hands out access tokens.
//!
//! ## State machine
//!
//! ```text
//! Unauthenticated ──grant──> Authenticating ──ok──> Authenticated
//!        ^                                              │ now >= expires_at - skew
//!        │ refresh rejected (user mode)                 v
//!        └──────────────────────── Refreshing <──── Expiring
//! ```
//!
//! All grant activity runs under one async mutex, so concurrent callers that
//! find the token stale wait for the in-flight grant and then reuse its
//! result: at most one request reaches the token endpoint at a time.
//!
//! In app mode ([`GrantKind::ClientCredentials`]) a failed refresh falls back
//! to a fresh client credentials grant. In user mode
//! ([`GrantKind::AuthorizationCode`]) a rejected refresh token clears the
//! persisted session and the user has to sign in again, while a transport
//! failure keeps the refresh token for a later attempt.
//!
//! A refresh attempted inside the skew window that fails for any other
//! reason leaves the current token in use until it actually expires.

use crate::error::{AuthError, Result};
use crate::oauth::{CallbackParams, OAuthClient, PkceSession, TokenResponse};
use crate::token_store::TokenStore;
use crate::types::{AuthScheme, AuthState, GrantKind, TokenState};
use async_trait::async_trait;
use bridge_traits::storage::CredentialStore;
use bridge_traits::time::Clock;
use chrono::Duration as ChronoDuration;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Refresh this long before the recorded expiry.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;
/// Upper bound for one grant, retries included.
pub const DEFAULT_GRANT_TIMEOUT: Duration = Duration::from_secs(30);

/// Host hook that shows the authorization page and waits for the redirect.
///
/// Without one, user-mode authorities cannot start a sign-in from
/// [`TokenAuthority::ensure_valid_token`] and fail with
/// [`AuthError::InteractiveAuthorizationRequired`]; the host then drives
/// [`TokenAuthority::start_interactive_authorization`] itself.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn authorize(&self, authorize_url: &str) -> Result<CallbackParams>;
}

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Label used in logs and events
    pub provider: String,
    pub grant_kind: GrantKind,
    pub scheme: AuthScheme,
    pub refresh_skew: ChronoDuration,
    pub grant_timeout: Duration,
    /// Prefix of the credential store keys
    pub key_prefix: String,
}

impl AuthorityConfig {
    pub fn new(provider: impl Into<String>, grant_kind: GrantKind) -> Self {
        let provider = provider.into();
        let mode = match grant_kind {
            GrantKind::ClientCredentials => "app",
            GrantKind::AuthorizationCode => "user",
        };
        Self {
            key_prefix: format!("{}_{}", provider, mode),
            provider,
            grant_kind,
            scheme: AuthScheme::Bearer,
            refresh_skew: ChronoDuration::seconds(DEFAULT_REFRESH_SKEW_SECS),
            grant_timeout: DEFAULT_GRANT_TIMEOUT,
        }
    }

    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_refresh_skew(mut self, skew: ChronoDuration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn with_grant_timeout(mut self, timeout: Duration) -> Self {
        self.grant_timeout = timeout;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(AuthError::Config("provider label must not be empty".to_string()));
        }
        if self.key_prefix.trim().is_empty() {
            return Err(AuthError::Config("key prefix must not be empty".to_string()));
        }
        if self.refresh_skew < ChronoDuration::zero() {
            return Err(AuthError::Config("refresh skew must not be negative".to_string()));
        }
        if self.grant_timeout.is_zero() {
            return Err(AuthError::Config("grant timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Resets the in-flight phase when a grant finishes or is cancelled.
struct PhaseReset<'a>(&'a RwLock<Option<AuthState>>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        *self.0.write() = None;
    }
}

pub struct TokenAuthority {
    config: AuthorityConfig,
    oauth: OAuthClient,
    store: TokenStore,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    prompt: Option<Arc<dyn AuthorizationPrompt>>,
    /// `None` until persisted credentials have been loaded
    state: Mutex<Option<TokenState>>,
    /// Copy of the last committed state for lock-free reads
    snapshot: RwLock<TokenState>,
    in_flight: RwLock<Option<AuthState>>,
    pending_session: SyncMutex<Option<PkceSession>>,
}

impl TokenAuthority {
    pub fn new(
        config: AuthorityConfig,
        oauth: OAuthClient,
        credential_store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        oauth.config().validate()?;

        let store = TokenStore::new(credential_store, config.key_prefix.clone());
        let empty = TokenState::empty(config.grant_kind);

        Ok(Self {
            config,
            oauth,
            store,
            clock,
            event_bus,
            prompt: None,
            state: Mutex::new(None),
            snapshot: RwLock::new(empty),
            in_flight: RwLock::new(None),
            pending_session: SyncMutex::new(None),
        })
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    pub fn grant_kind(&self) -> GrantKind {
        self.config.grant_kind
    }

    pub fn scheme(&self) -> AuthScheme {
        self.config.scheme
    }

    /// Load persisted credentials so that [`Self::auth_state`] reflects them
    /// before the first token request.
    pub async fn restore_session(&self) -> AuthState {
        let mut guard = self.state.lock().await;
        self.loaded_state(&mut guard).await;
        drop(guard);
        self.auth_state()
    }

    /// Return an access token that is valid for at least the refresh skew,
    /// running whichever grant is needed to get one.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InteractiveAuthorizationRequired`] in user mode when no
    ///   refresh token exists and no [`AuthorizationPrompt`] is installed
    /// - [`AuthError::AuthenticationFailed`] for every other failure
    #[instrument(skip(self), fields(provider = %self.config.provider, grant = %self.config.grant_kind))]
    pub async fn ensure_valid_token(&self) -> Result<String> {
        let mut guard = self.state.lock().await;
        let state = self.loaded_state(&mut guard).await;

        let now = self.clock.now();
        if let Some(token) = state.usable_token(now, self.config.refresh_skew) {
            debug!("Reusing cached access token");
            return Ok(token.to_string());
        }

        let current = state.is_valid_at(now).then(|| state.clone());

        let _phase = PhaseReset(&self.in_flight);
        let result = match state.refresh_token.clone() {
            Some(refresh_token) => match self.refresh_grant(state, &refresh_token).await {
                Ok(token) => Ok(token),
                Err(e) => self.recover_from_refresh_failure(state, e).await,
            },
            None => self.initial_grant(state).await,
        };

        let result = match (result, current) {
            (Err(e), Some(previous))
                if previous.is_valid_at(self.clock.now()) && !self.session_revoked(&previous, state) =>
            {
                self.keep_current_token(state, previous, e)
            }
            (result, _) => result,
        };

        self.publish(state);

        result.map_err(|e| {
            warn!(error = %e, "Could not obtain access token");
            self.emit(AuthEvent::AuthError {
                provider: self.config.provider.clone(),
                message: e.to_string(),
                recoverable: e.is_transient(),
            });
            into_authentication_failure(e)
        })
    }

    /// `Authorization` header value for the current token
    pub async fn authorization_header(&self) -> Result<String> {
        let token = self.ensure_valid_token().await?;
        Ok(self.config.scheme.header_value(&token))
    }

    /// Drop the access token so the next request runs a new grant.
    ///
    /// The refresh token survives, so in user mode the next grant is a
    /// silent refresh rather than a new sign-in.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn invalidate(&self) {
        let mut guard = self.state.lock().await;
        let state = self.loaded_state(&mut guard).await;
        self.invalidate_locked(state).await;
    }

    /// Invalidate only if `stale` is still the current access token.
    ///
    /// Requests that were rejected with a token another caller already
    /// replaced must not throw the replacement away. Returns whether the
    /// state changed.
    pub async fn invalidate_token(&self, stale: &str) -> bool {
        let mut guard = self.state.lock().await;
        let state = self.loaded_state(&mut guard).await;

        if state.access_token.as_deref() != Some(stale) {
            debug!(provider = %self.config.provider, "Rejected token was already replaced");
            return false;
        }

        self.invalidate_locked(state).await;
        true
    }

    /// Forget every credential, in memory and in the store
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn sign_out(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        *guard = Some(TokenState::empty(self.config.grant_kind));
        self.pending_session.lock().take();

        if let Some(ref state) = *guard {
            self.publish(state);
        }

        self.store.clear().await?;

        info!("Signed out");
        self.emit(AuthEvent::SignedOut {
            provider: self.config.provider.clone(),
        });
        Ok(())
    }

    /// Begin a host-driven sign-in and return the URL to open.
    ///
    /// Starting again replaces any unfinished session.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub fn start_interactive_authorization(&self) -> Result<String> {
        if !self.config.grant_kind.is_interactive() {
            return Err(AuthError::Config(
                "interactive sign-in needs an authorization_code authority".to_string(),
            ));
        }

        let session = PkceSession::new();
        let url = self.oauth.authorize_url(&session)?;

        if self.pending_session.lock().replace(session).is_some() {
            debug!("Replaced unfinished authorization session");
        }

        self.emit(AuthEvent::SigningIn {
            provider: self.config.provider.clone(),
            grant: self.config.grant_kind.to_string(),
        });

        Ok(url)
    }

    /// Finish a host-driven sign-in with the parameters from the redirect.
    ///
    /// The pending session is consumed whatever the outcome.
    #[instrument(skip(self, callback), fields(provider = %self.config.provider))]
    pub async fn complete_interactive_authorization(&self, callback: CallbackParams) -> Result<()> {
        let session = self
            .pending_session
            .lock()
            .take()
            .ok_or(AuthError::NoInteractiveSession)?;

        session.verify_state(&callback.state)?;

        let mut guard = self.state.lock().await;
        let state = self.loaded_state(&mut guard).await;

        let _phase = PhaseReset(&self.in_flight);
        self.set_phase(AuthState::Authenticating);

        match self
            .with_timeout("authorization_code grant", self.oauth.exchange_code(&callback, &session))
            .await
        {
            Ok(response) => {
                self.apply(state, response).await;
                self.publish(state);
                info!("Interactive sign-in completed");
                self.emit(AuthEvent::SignedIn {
                    provider: self.config.provider.clone(),
                    grant: self.config.grant_kind.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Authorization code exchange failed");
                self.emit(AuthEvent::AuthError {
                    provider: self.config.provider.clone(),
                    message: e.to_string(),
                    recoverable: e.is_transient(),
                });
                Err(e)
            }
        }
    }

    /// Parse the redirect URL and finish the sign-in.
    pub async fn complete_from_redirect_url(&self, redirect: &str) -> Result<()> {
        match CallbackParams::from_redirect_url(redirect) {
            Ok(callback) => self.complete_interactive_authorization(callback).await,
            Err(e) => {
                self.pending_session.lock().take();
                Err(e)
            }
        }
    }

    pub fn has_pending_authorization(&self) -> bool {
        self.pending_session.lock().is_some()
    }

    pub fn auth_state(&self) -> AuthState {
        if let Some(phase) = *self.in_flight.read() {
            return phase;
        }

        let snapshot = self.snapshot.read();
        let now = self.clock.now();

        if snapshot.is_fresh_at(now, self.config.refresh_skew) {
            AuthState::Authenticated
        } else if snapshot.is_valid_at(now) {
            AuthState::Expiring
        } else {
            AuthState::Unauthenticated
        }
    }

    /// Last committed credentials. Tokens are redacted in `Debug` output.
    pub fn current_token_state(&self) -> TokenState {
        self.snapshot.read().clone()
    }

    async fn loaded_state<'a>(&self, guard: &'a mut Option<TokenState>) -> &'a mut TokenState {
        if guard.is_none() {
            let loaded = match self.store.load(self.config.grant_kind).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(provider = %self.config.provider, error = %e, "Could not load persisted credentials");
                    TokenState::empty(self.config.grant_kind)
                }
            };
            self.publish(&loaded);
            *guard = Some(loaded);
        }

        guard.get_or_insert_with(|| TokenState::empty(self.config.grant_kind))
    }

    async fn initial_grant(&self, state: &mut TokenState) -> Result<String> {
        match self.config.grant_kind {
            GrantKind::ClientCredentials => self.client_credentials_grant(state).await,
            GrantKind::AuthorizationCode => self.interactive_grant(state).await,
        }
    }

    async fn client_credentials_grant(&self, state: &mut TokenState) -> Result<String> {
        self.set_phase(AuthState::Authenticating);
        self.emit(AuthEvent::SigningIn {
            provider: self.config.provider.clone(),
            grant: GrantKind::ClientCredentials.to_string(),
        });

        let response = self
            .with_timeout("client_credentials grant", self.oauth.client_credentials())
            .await?;
        let token = self.apply(state, response).await;

        info!("Obtained client credentials token");
        self.emit(AuthEvent::SignedIn {
            provider: self.config.provider.clone(),
            grant: GrantKind::ClientCredentials.to_string(),
        });
        Ok(token)
    }

    async fn interactive_grant(&self, state: &mut TokenState) -> Result<String> {
        let prompt = self
            .prompt
            .clone()
            .ok_or(AuthError::InteractiveAuthorizationRequired)?;

        self.set_phase(AuthState::Authenticating);
        self.emit(AuthEvent::SigningIn {
            provider: self.config.provider.clone(),
            grant: GrantKind::AuthorizationCode.to_string(),
        });

        let session = PkceSession::new();
        let url = self.oauth.authorize_url(&session)?;
        let callback = prompt.authorize(&url).await?;

        let response = self
            .with_timeout("authorization_code grant", self.oauth.exchange_code(&callback, &session))
            .await?;
        let token = self.apply(state, response).await;

        info!("Interactive sign-in completed");
        self.emit(AuthEvent::SignedIn {
            provider: self.config.provider.clone(),
            grant: GrantKind::AuthorizationCode.to_string(),
        });
        Ok(token)
    }

    async fn refresh_grant(&self, state: &mut TokenState, refresh_token: &str) -> Result<String> {
        self.set_phase(AuthState::Refreshing);
        self.emit(AuthEvent::TokenRefreshing {
            provider: self.config.provider.clone(),
        });

        let response = self
            .with_timeout("refresh_token grant", self.oauth.refresh(refresh_token))
            .await?;
        let token = self.apply(state, response).await;

        let expires_at = state.expires_at.map(|t| t.timestamp()).unwrap_or_default();
        info!(expires_at, "Refreshed access token");
        self.emit(AuthEvent::TokenRefreshed {
            provider: self.config.provider.clone(),
            expires_at,
        });
        Ok(token)
    }

    async fn recover_from_refresh_failure(
        &self,
        state: &mut TokenState,
        error: AuthError,
    ) -> Result<String> {
        match self.config.grant_kind {
            GrantKind::ClientCredentials => {
                warn!(error = %error, "Refresh failed, requesting new client credentials token");
                state.clear_access();
                state.refresh_token = None;
                self.client_credentials_grant(state).await
            }
            GrantKind::AuthorizationCode => match error {
                AuthError::GrantRejected { status, .. } => {
                    warn!(status, "Refresh token rejected, clearing session");
                    *state = TokenState::empty(self.config.grant_kind);
                    if let Err(e) = self.store.clear().await {
                        warn!(error = %e, "Failed to clear rejected credentials");
                    }
                    Err(AuthError::AuthenticationFailed {
                        reason: format!("refresh token rejected ({}), sign-in required", status),
                    })
                }
                other => {
                    warn!(error = %other, "Refresh failed, keeping refresh token");
                    Err(other)
                }
            },
        }
    }

    /// A user-mode refresh token rejected by the provider ends the session,
    /// even while the access token has time left.
    fn session_revoked(&self, previous: &TokenState, state: &TokenState) -> bool {
        self.config.grant_kind.is_interactive()
            && previous.refresh_token.is_some()
            && state.refresh_token.is_none()
    }

    /// An early refresh failed but the current token has not expired yet
    fn keep_current_token(
        &self,
        state: &mut TokenState,
        previous: TokenState,
        error: AuthError,
    ) -> Result<String> {
        warn!(error = %error, "Early refresh failed, using current token until it expires");
        self.emit(AuthEvent::AuthError {
            provider: self.config.provider.clone(),
            message: error.to_string(),
            recoverable: true,
        });

        state.access_token = previous.access_token;
        state.expires_at = previous.expires_at;
        state.access_token.clone().ok_or(error)
    }

    /// Commit a grant response and persist it. Returns the new access token.
    ///
    /// A persistence failure does not fail the grant: the token is usable for
    /// this process and an `AuthError` event reports the problem.
    async fn apply(&self, state: &mut TokenState, response: TokenResponse) -> String {
        let expires_at = self.clock.now() + ChronoDuration::seconds(response.expires_in.max(0));
        let refresh_token = response.refresh_token.or_else(|| state.refresh_token.take());

        *state = TokenState {
            access_token: Some(response.access_token.clone()),
            refresh_token,
            expires_at: Some(expires_at),
            grant_kind: self.config.grant_kind,
        };

        if let Err(e) = self.store.save(state).await {
            warn!(provider = %self.config.provider, error = %e, "Failed to persist credentials");
            self.emit(AuthEvent::AuthError {
                provider: self.config.provider.clone(),
                message: e.to_string(),
                recoverable: true,
            });
        }

        self.publish(state);
        response.access_token
    }

    async fn invalidate_locked(&self, state: &mut TokenState) {
        state.clear_access();
        self.publish(state);

        if let Err(e) = self.store.clear_access().await {
            warn!(provider = %self.config.provider, error = %e, "Failed to clear persisted access token");
        }

        info!(provider = %self.config.provider, "Access token invalidated");
        self.emit(AuthEvent::TokenInvalidated {
            provider: self.config.provider.clone(),
        });
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.grant_timeout, future)
            .await
            .map_err(|_| AuthError::Timeout {
                operation: operation.to_string(),
            })?
    }

    fn publish(&self, state: &TokenState) {
        *self.snapshot.write() = state.clone();
    }

    fn set_phase(&self, phase: AuthState) {
        *self.in_flight.write() = Some(phase);
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

fn into_authentication_failure(error: AuthError) -> AuthError {
    match error {
        AuthError::AuthenticationFailed { .. }
        | AuthError::InteractiveAuthorizationRequired
        | AuthError::AuthorizationDenied(_)
        | AuthError::StateMismatch { .. }
        | AuthError::InvalidCallback(_)
        | AuthError::Config(_) => error,
        other => AuthError::AuthenticationFailed {
            reason: other.to_string(),
        },
    }
}
