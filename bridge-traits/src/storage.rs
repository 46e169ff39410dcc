//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for file I/O and secure credential storage.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts the handful of file operations the media cache needs. Writes
/// that must be crash-safe go through `write_file` on a temporary path
/// followed by `rename`, which implementations must make atomic on the same
/// volume.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn persist(fs: &dyn FileSystemAccess, dir: &Path, data: Bytes) -> Result<()> {
///     let tmp = dir.join("index.json.tmp");
///     fs.write_file(&tmp, data).await?;
///     fs.rename(&tmp, &dir.join("index.json")).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    ///
    /// This directory is suitable for files that can be deleted by the
    /// system when storage is low.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating or truncating it
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Atomically move `from` to `to`, replacing any existing file
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming writes
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;
}

/// Secure credential storage trait
///
/// A string-keyed secret store. Backed by the OS keychain on desktop
/// (Keychain, DPAPI, Secret Service).
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Use platform-provided secure storage when available
/// - Never log or expose stored values
///
/// Writes to a single key are last-writer-wins. A missing key is not an
/// error: `get_secret` returns `Ok(None)` and `delete_secret` succeeds.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::CredentialStore;
///
/// async fn store_token(store: &dyn CredentialStore, token: &str) -> Result<()> {
///     store.set_secret("soundcloud.access_token", token).await
/// }
/// ```
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store a secret value, replacing any previous one
    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Delete a secret. Deleting an absent key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without handing it back
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        inner: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
            self.inner.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> Result<Option<String>> {
            Ok(self.inner.lock().get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> Result<()> {
            self.inner.lock().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_has_secret_default() {
        let store = MemoryStore::default();
        assert!(!store.has_secret("token").await.unwrap());

        store.set_secret("token", "abc").await.unwrap();
        assert!(store.has_secret("token").await.unwrap());

        store.delete_secret("token").await.unwrap();
        store.delete_secret("token").await.unwrap();
        assert_eq!(store.get_secret("token").await.unwrap(), None);
    }

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            modified_at: Some(1234567900),
            is_directory: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }
}
