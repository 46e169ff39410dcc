use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// No usable token could be obtained
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// The token endpoint answered with a 4xx
    #[error("Token endpoint rejected the grant ({status}): {body}")]
    GrantRejected { status: u16, body: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("OAuth state mismatch (expected {expected}, got {actual})")]
    StateMismatch { expected: String, actual: String },

    #[error("No interactive authorization in progress")]
    NoInteractiveSession,

    #[error("Interactive authorization required")]
    InteractiveAuthorizationRequired,

    #[error("Authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("Invalid authorization callback: {0}")]
    InvalidCallback(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Failures that may succeed on a later attempt without user action
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::NetworkError(_) | AuthError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
