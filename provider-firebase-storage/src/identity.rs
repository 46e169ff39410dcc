//! Identity token seam
//!
//! Firebase Storage accepts the signed-in user's identity token as a bearer.
//! How that token is obtained belongs to the host, which implements
//! [`IdentityTokenSource`].

use async_trait::async_trait;
use core_auth::{AccessTokenSource, AuthScheme};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait IdentityTokenSource: Send + Sync {
    /// Current identity token, renewed by the host if needed
    async fn id_token(&self) -> core_auth::Result<String>;

    /// Called after the storage API rejected the token
    async fn invalidate(&self) {}
}

/// Presents an [`IdentityTokenSource`] as an [`AccessTokenSource`] so the
/// usual 401 handling applies.
pub struct IdentityTokens {
    source: Arc<dyn IdentityTokenSource>,
}

impl IdentityTokens {
    pub fn new(source: Arc<dyn IdentityTokenSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AccessTokenSource for IdentityTokens {
    async fn access_token(&self) -> core_auth::Result<String> {
        self.source.id_token().await
    }

    async fn invalidate_token(&self, _stale: &str) -> bool {
        debug!("Invalidating identity token");
        self.source.invalidate().await;
        true
    }

    fn scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }
}
