//! Error types for the Firebase Storage provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirebaseStorageError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Firebase Storage error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Object not found: {path}")]
    ObjectNotFound { path: String },

    /// Object metadata carried no download token, so no public URL exists
    #[error("Object {path} has no download token")]
    MissingDownloadToken { path: String },

    #[error("Failed to parse object metadata: {0}")]
    ParseError(String),

    #[error("Unsupported stream source: {0}")]
    UnsupportedSource(String),

    #[error("Invalid Firebase Storage configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FirebaseStorageError>;

impl From<FirebaseStorageError> for BridgeError {
    fn from(error: FirebaseStorageError) -> Self {
        match error {
            FirebaseStorageError::Auth(AuthError::Timeout { operation }) => {
                BridgeError::Timeout(operation)
            }
            FirebaseStorageError::UnsupportedSource(source) => {
                BridgeError::NotAvailable(format!("Firebase Storage cannot serve {}", source))
            }
            other => BridgeError::OperationFailed(format!("Firebase Storage: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let bridge: BridgeError = FirebaseStorageError::ObjectNotFound {
            path: "songs/a.mp3".to_string(),
        }
        .into();

        assert!(
            matches!(bridge, BridgeError::OperationFailed(ref m) if m.contains("songs/a.mp3"))
        );
    }
}
