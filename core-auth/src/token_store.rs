//! Credential persistence for one token authority
//!
//! Each field of a [`TokenState`] lives under its own key in the
//! [`CredentialStore`], prefixed so that several authorities can share one
//! store: `<prefix>_access_token`, `<prefix>_refresh_token`,
//! `<prefix>_expires_at` (unix seconds) and `<prefix>_grant_kind`.
//!
//! Token values are never logged.

use crate::error::{AuthError, Result};
use crate::types::{GrantKind, TokenState};
use bridge_traits::error::BridgeError;
use bridge_traits::storage::CredentialStore;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const EXPIRES_AT: &str = "expires_at";
const GRANT_KIND: &str = "grant_kind";

#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn CredentialStore>,
    prefix: String,
}

impl TokenStore {
    pub fn new(store: Arc<dyn CredentialStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, field: &str) -> String {
        format!("{}_{}", self.prefix, field)
    }

    /// Load persisted credentials.
    ///
    /// Returns an empty state when nothing is stored, when the stored grant
    /// kind differs from `grant_kind`, or when nothing usable survives
    /// validation. An access token without a parsable expiry is dropped and
    /// the refresh token kept.
    pub async fn load(&self, grant_kind: GrantKind) -> Result<TokenState> {
        if let Some(stored_kind) = self.get(GRANT_KIND).await? {
            if GrantKind::parse(&stored_kind) != Some(grant_kind) {
                warn!(
                    prefix = %self.prefix,
                    stored = %stored_kind,
                    expected = %grant_kind,
                    "Ignoring credentials persisted for another grant kind"
                );
                return Ok(TokenState::empty(grant_kind));
            }
        }

        let mut access_token = self.get(ACCESS_TOKEN).await?;
        let refresh_token = self.get(REFRESH_TOKEN).await?;
        let expires_at = self
            .get(EXPIRES_AT)
            .await?
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        if access_token.is_some() && expires_at.is_none() {
            warn!(prefix = %self.prefix, "Discarding persisted access token without a valid expiry");
            access_token = None;
        }

        let state = TokenState {
            expires_at: access_token.as_ref().and(expires_at),
            access_token,
            refresh_token,
            grant_kind,
        };

        debug!(
            prefix = %self.prefix,
            has_access_token = state.access_token.is_some(),
            has_refresh_token = state.refresh_token.is_some(),
            "Loaded persisted credentials"
        );

        Ok(state)
    }

    /// Persist every field, deleting the keys of absent ones
    pub async fn save(&self, state: &TokenState) -> Result<()> {
        match (&state.access_token, state.expires_at) {
            (Some(token), Some(expires_at)) => {
                self.set(ACCESS_TOKEN, token).await?;
                self.set(EXPIRES_AT, &expires_at.timestamp().to_string()).await?;
            }
            _ => self.clear_access().await?,
        }

        match state.refresh_token {
            Some(ref token) => self.set(REFRESH_TOKEN, token).await?,
            None => self.delete(REFRESH_TOKEN).await?,
        }

        self.set(GRANT_KIND, state.grant_kind.as_str()).await?;

        debug!(prefix = %self.prefix, "Persisted credentials");
        Ok(())
    }

    /// Remove the access token and expiry only
    pub async fn clear_access(&self) -> Result<()> {
        self.delete(ACCESS_TOKEN).await?;
        self.delete(EXPIRES_AT).await
    }

    /// Remove everything stored under this prefix
    pub async fn clear(&self) -> Result<()> {
        for field in [ACCESS_TOKEN, REFRESH_TOKEN, EXPIRES_AT, GRANT_KIND] {
            self.delete(field).await?;
        }
        debug!(prefix = %self.prefix, "Cleared persisted credentials");
        Ok(())
    }

    async fn get(&self, field: &str) -> Result<Option<String>> {
        self.store
            .get_secret(&self.key(field))
            .await
            .map_err(storage_error)
    }

    async fn set(&self, field: &str, value: &str) -> Result<()> {
        self.store
            .set_secret(&self.key(field), value)
            .await
            .map_err(storage_error)
    }

    async fn delete(&self, field: &str) -> Result<()> {
        self.store
            .delete_secret(&self.key(field))
            .await
            .map_err(storage_error)
    }
}

fn storage_error(e: BridgeError) -> AuthError {
    AuthError::SecureStorageUnavailable(e.to_string())
}
