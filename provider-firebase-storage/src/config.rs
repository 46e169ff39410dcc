//! Bucket configuration

use crate::error::{FirebaseStorageError, Result};
use url::Url;

pub const FIREBASE_STORAGE_BASE: &str = "https://firebasestorage.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseStorageConfig {
    /// e.g. `my-app.firebasestorage.app`
    pub bucket: String,
    pub base_url: String,
}

impl FirebaseStorageConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            base_url: FIREBASE_STORAGE_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(FirebaseStorageError::Config(
                "bucket must not be empty".to_string(),
            ));
        }
        Url::parse(&self.base_url)
            .map_err(|e| FirebaseStorageError::Config(format!("invalid base URL: {}", e)))?;
        Ok(())
    }

    /// Metadata endpoint for the object at `path`
    pub fn object_url(&self, path: &str) -> String {
        format!(
            "{}/v0/b/{}/o/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(path)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_path() {
        let config = FirebaseStorageConfig::new("demo.firebasestorage.app");
        assert_eq!(
            config.object_url("songs/My Song.mp3"),
            "https://firebasestorage.googleapis.com/v0/b/demo.firebasestorage.app/o/songs%2FMy%20Song.mp3"
        );
    }

    #[test]
    fn test_validation() {
        assert!(FirebaseStorageConfig::new("b").validate().is_ok());
        assert!(FirebaseStorageConfig::new(" ").validate().is_err());
        assert!(FirebaseStorageConfig::new("b")
            .with_base_url("not a url")
            .validate()
            .is_err());
    }
}
