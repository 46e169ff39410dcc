use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which grant backs a token authority.
///
/// `ClientCredentials` is the app mode: tokens identify the application and
/// can always be re-acquired without a user. `AuthorizationCode` is the user
/// mode: the first token needs an interactive PKCE authorization, after which
/// the refresh token keeps the session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    ClientCredentials,
    AuthorizationCode,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::ClientCredentials => "client_credentials",
            GrantKind::AuthorizationCode => "authorization_code",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_credentials" => Some(GrantKind::ClientCredentials),
            "authorization_code" => Some(GrantKind::AuthorizationCode),
            _ => None,
        }
    }

    /// Whether a fresh grant needs a user in the loop
    pub fn is_interactive(&self) -> bool {
        matches!(self, GrantKind::AuthorizationCode)
    }
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheme used when attaching a token to the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthScheme {
    #[default]
    Bearer,
    /// `OAuth <token>`, still expected by some older music APIs
    OAuth,
}

impl AuthScheme {
    pub fn header_value(&self, token: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {}", token),
            AuthScheme::OAuth => format!("OAuth {}", token),
        }
    }
}

/// Current credentials of one authority.
///
/// `access_token` and `expires_at` are set or cleared together. A state with
/// only a refresh token is legal: it is what remains after an invalidation.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub grant_kind: GrantKind,
}

impl TokenState {
    pub fn empty(grant_kind: GrantKind) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            expires_at: None,
            grant_kind,
        }
    }

    /// A token exists and has not expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }

    /// Valid and outside the refresh window
    pub fn is_fresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at - skew,
            _ => false,
        }
    }

    /// A refresh token exists and the access token is missing or inside the
    /// refresh window.
    pub fn should_refresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.refresh_token.is_some() && !self.is_fresh_at(now, skew)
    }

    /// Access token usable right now without another grant
    pub fn usable_token(&self, now: DateTime<Utc>, skew: Duration) -> Option<&str> {
        if self.is_fresh_at(now, skew) {
            self.access_token.as_deref()
        } else {
            None
        }
    }

    /// Drop the access token and its expiry, keeping the refresh token
    pub fn clear_access(&mut self) {
        self.access_token = None;
        self.expires_at = None;
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("grant_kind", &self.grant_kind)
            .finish()
    }
}

/// Lifecycle of a token authority as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    /// No usable credentials
    Unauthenticated,
    /// First grant in flight (client credentials or code exchange)
    Authenticating,
    /// Token is fresh
    Authenticated,
    /// Token still valid but inside the refresh window
    Expiring,
    /// Refresh grant in flight
    Refreshing,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Expiring)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticating => "authenticating",
            AuthState::Authenticated => "authenticated",
            AuthState::Expiring => "expiring",
            AuthState::Refreshing => "refreshing",
        };
        f.write_str(label)
    }
}
