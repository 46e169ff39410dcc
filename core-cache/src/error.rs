//! # Cache Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The redirect probe got no usable target
    #[error("Invalid redirect target for {url} (status {status:?})")]
    InvalidRedirectTarget { url: String, status: Option<u16> },

    /// Provider lookup or redirect resolution failed for one track
    #[error("Stream resolution failed for track {track_id}: {source}")]
    StreamResolutionFailed {
        track_id: String,
        #[source]
        source: BoxError,
    },

    #[error("Download failed for track {track_id}: {reason}")]
    DownloadFailed { track_id: String, reason: String },

    /// Sidecar index could not be read; recovered as an empty index
    #[error("Cache index corrupted: {0}")]
    CacheCorruption(String),

    #[error("No provider registered for source {descriptor}")]
    NoProvider { descriptor: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl CacheError {
    pub fn resolution_failed(track_id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CacheError::StreamResolutionFailed {
            track_id: track_id.into(),
            source: source.into(),
        }
    }

    pub fn download_failed(track_id: impl Into<String>, reason: impl ToString) -> Self {
        CacheError::DownloadFailed {
            track_id: track_id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
