//! # Authentication Module
//!
//! Token authority for upstream music APIs.
//!
//! ## Overview
//!
//! A [`TokenAuthority`] owns the credentials of one OAuth 2.0 client and
//! guarantees that callers only ever see a token that is valid for at least
//! the refresh skew. It supports:
//!
//! - app mode: client credentials grant, refreshed or re-granted silently
//! - user mode: authorization code grant with PKCE, kept alive by refresh
//! - single-flight grants: concurrent callers share one token request
//! - persistence through the host [`CredentialStore`](bridge_traits::CredentialStore)
//! - an [`AuthorizedClient`] that replays a request once after a 401
//!
//! Lifecycle changes are published on the core event bus as
//! [`AuthEvent`](core_runtime::events::AuthEvent)s.

pub mod authority;
pub mod authorized;
pub mod error;
pub mod oauth;
pub mod token_store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use authority::{AuthorityConfig, AuthorizationPrompt, TokenAuthority};
pub use authorized::{AccessTokenSource, AuthorizedClient};
pub use error::{AuthError, Result};
pub use oauth::{CallbackParams, GrantRequest, OAuthClient, OAuthConfig, PkceSession, TokenResponse};
pub use token_store::TokenStore;
pub use types::{AuthScheme, AuthState, GrantKind, TokenState};
