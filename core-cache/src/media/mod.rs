//! Local media cache: audio files on disk plus a versioned sidecar index

pub mod config;
pub mod index;
pub mod manager;

pub use config::MediaCacheConfig;
pub use index::{IndexFile, MediaIndex, INDEX_FILE_NAME, INDEX_FORMAT};
pub use manager::{safe_file_name, DesiredTrack, MediaCache, ReconcileReport};
