//! Sidecar index mapping track ids to cached versions
//!
//! The index is the single source of truth for which version of a track is on
//! disk. It lives next to the audio files as `index.json`:
//!
//! ```json
//! { "format": 1, "entries": { "songs/a.mp3": 3, "songs/b.mp3": 1 } }
//! ```
//!
//! Every save writes `index.json.tmp` first and renames it over the live file,
//! so a crash mid-write leaves either the old or the new document.

use crate::error::{CacheError, Result};
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const INDEX_FORMAT: u32 = 1;
pub const INDEX_FILE_NAME: &str = "index.json";
const INDEX_TEMP_FILE_NAME: &str = "index.json.tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIndex {
    format: u32,
    #[serde(default)]
    entries: BTreeMap<String, i64>,
}

impl Default for MediaIndex {
    fn default() -> Self {
        Self {
            format: INDEX_FORMAT,
            entries: BTreeMap::new(),
        }
    }
}

impl MediaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self, track_id: &str) -> Option<i64> {
        self.entries.get(track_id).copied()
    }

    pub fn insert(&mut self, track_id: impl Into<String>, version: i64) {
        self.entries.insert(track_id.into(), version);
    }

    pub fn remove(&mut self, track_id: &str) -> Option<i64> {
        self.entries.remove(track_id)
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.entries.contains_key(track_id)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Parse a sidecar document.
    ///
    /// # Errors
    ///
    /// [`CacheError::CacheCorruption`] for malformed JSON or an unknown format.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let index: MediaIndex = serde_json::from_slice(data)
            .map_err(|e| CacheError::CacheCorruption(format!("invalid index JSON: {}", e)))?;

        if index.format != INDEX_FORMAT {
            return Err(CacheError::CacheCorruption(format!(
                "unsupported index format {}",
                index.format
            )));
        }

        Ok(index)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec_pretty(self)
            .map(Bytes::from)
            .map_err(|e| CacheError::CacheCorruption(format!("failed to encode index: {}", e)))
    }
}

/// Location of the sidecar inside a cache root
pub struct IndexFile {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    temp_path: PathBuf,
}

impl IndexFile {
    pub fn new(fs: Arc<dyn FileSystemAccess>, root: &Path) -> Self {
        Self {
            fs,
            path: root.join(INDEX_FILE_NAME),
            temp_path: root.join(INDEX_TEMP_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the index. A missing file is an empty index.
    ///
    /// # Errors
    ///
    /// [`CacheError::CacheCorruption`] when the file exists but cannot be read
    /// or parsed. Callers recover by starting from an empty index.
    pub async fn load(&self) -> Result<MediaIndex> {
        if !self.fs.exists(&self.path).await? {
            debug!("No index file yet");
            return Ok(MediaIndex::new());
        }

        let data = self
            .fs
            .read_file(&self.path)
            .await
            .map_err(|e| CacheError::CacheCorruption(format!("unreadable index: {}", e)))?;

        MediaIndex::from_slice(&data)
    }

    /// Atomically replace the index on disk
    pub async fn save(&self, index: &MediaIndex) -> Result<()> {
        let data = index.to_bytes()?;
        self.fs.write_file(&self.temp_path, data).await?;
        self.fs.rename(&self.temp_path, &self.path).await?;
        debug!(entries = index.len(), "Persisted media index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut index = MediaIndex::new();
        index.insert("songs/a.mp3", 3);

        let value: serde_json::Value = serde_json::from_slice(&index.to_bytes().unwrap()).unwrap();
        assert_eq!(value["format"], 1);
        assert_eq!(value["entries"]["songs/a.mp3"], 3);
    }

    #[test]
    fn test_parse_valid_document() {
        let index = MediaIndex::from_slice(br#"{"format":1,"entries":{"x":7}}"#).unwrap();
        assert_eq!(index.version("x"), Some(7));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_missing_entries_is_empty() {
        let index = MediaIndex::from_slice(br#"{"format":1}"#).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_corrupt_documents_are_rejected() {
        assert!(matches!(
            MediaIndex::from_slice(b"{not json"),
            Err(CacheError::CacheCorruption(_))
        ));
        assert!(matches!(
            MediaIndex::from_slice(br#"{"format":2,"entries":{}}"#),
            Err(CacheError::CacheCorruption(_))
        ));
        assert!(matches!(
            MediaIndex::from_slice(br#"{"format":1,"entries":{"x":"one"}}"#),
            Err(CacheError::CacheCorruption(_))
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut index = MediaIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);

        assert_eq!(index.remove("a"), Some(1));
        assert_eq!(index.remove("a"), None);
        assert_eq!(index.track_ids().collect::<Vec<_>>(), vec!["b"]);

        index.clear();
        assert!(index.is_empty());
    }
}
