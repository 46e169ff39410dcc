//! Media cache configuration

use crate::error::{CacheError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`MediaCache`](super::MediaCache).
#[derive(Debug, Clone)]
pub struct MediaCacheConfig {
    /// Directory under the host cache directory (default: `mp3-cache`)
    pub directory_name: String,

    /// Extension of cached audio files, without the dot (default: `mp3`)
    pub file_extension: String,

    /// Number of downloads running at once during reconcile (default: 3)
    pub max_concurrent_downloads: usize,

    /// Upper bound for one download, body included (default: 300s)
    pub download_timeout: Duration,

    /// Upper bound for the provider URL lookup before a download (default: 30s)
    pub resolve_timeout: Duration,

    /// Overrides `<cache dir>/<directory_name>` when set
    pub root: Option<PathBuf>,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            directory_name: "mp3-cache".to_string(),
            file_extension: "mp3".to_string(),
            max_concurrent_downloads: 3,
            download_timeout: Duration::from_secs(300),
            resolve_timeout: Duration::from_secs(30),
            root: None,
        }
    }
}

impl MediaCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory_name(mut self, name: impl Into<String>) -> Self {
        self.directory_name = name.into();
        self
    }

    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.is_none() && self.directory_name.trim().is_empty() {
            return Err(CacheError::Config(
                "directory_name cannot be empty".to_string(),
            ));
        }

        if self.directory_name.contains(['/', '\\']) {
            return Err(CacheError::Config(
                "directory_name must be a single path component".to_string(),
            ));
        }

        let extension = self.file_extension.trim();
        if extension.is_empty() || extension.contains('.') || extension == "part" {
            return Err(CacheError::Config(format!(
                "file_extension '{}' is not usable",
                self.file_extension
            )));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(CacheError::Config(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }

        if self.download_timeout.is_zero() || self.resolve_timeout.is_zero() {
            return Err(CacheError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
