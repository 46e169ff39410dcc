use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// The operation needs a provider the service was built without
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("SoundCloud error: {0}")]
    SoundCloud(#[from] provider_soundcloud::SoundCloudError),

    #[error("Firebase Storage error: {0}")]
    FirebaseStorage(#[from] provider_firebase_storage::FirebaseStorageError),
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::InitializationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
