//! Error types for the SoundCloud provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoundCloudError {
    /// Token acquisition failed or the API rejected a renewed token
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("SoundCloud API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The streams endpoint returned neither a progressive nor an HLS URL
    #[error("Track {track_id} has no playable stream")]
    NoStreamUrl { track_id: String },

    #[error("Unsupported stream source: {0}")]
    UnsupportedSource(String),
}

pub type Result<T> = std::result::Result<T, SoundCloudError>;

impl From<SoundCloudError> for BridgeError {
    fn from(error: SoundCloudError) -> Self {
        match error {
            SoundCloudError::Auth(AuthError::Timeout { operation }) => {
                BridgeError::Timeout(operation)
            }
            SoundCloudError::UnsupportedSource(source) => {
                BridgeError::NotAvailable(format!("SoundCloud cannot serve {}", source))
            }
            other => BridgeError::OperationFailed(format!("SoundCloud: {}", other)),
        }
    }
}
