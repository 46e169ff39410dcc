//! # Local Media Cache
//!
//! Keeps one audio file per desired track under a dedicated cache root,
//! together with a sidecar index recording which upstream version each file
//! holds.
//!
//! - [`MediaCache::reconcile`] prunes everything outside the desired set,
//!   then downloads missing or outdated tracks with bounded concurrency
//! - Downloads stream into a hidden `.part` file and are renamed into place
//!   only once complete
//! - The index is committed once per finished download, so an interrupted
//!   reconcile keeps all progress made so far

use crate::error::{CacheError, Result};
use crate::media::config::MediaCacheConfig;
use crate::media::index::{IndexFile, MediaIndex};
use crate::source::{ProviderRegistry, TrackDescriptor};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::stream::StreamSource;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const PART_EXTENSION: &str = "part";

/// A track the cache should hold, at a given upstream version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredTrack {
    pub id: String,
    pub version: i64,
    pub source: StreamSource,
}

impl DesiredTrack {
    pub fn new(descriptor: TrackDescriptor, version: i64) -> Self {
        Self {
            id: descriptor.id,
            version,
            source: descriptor.source,
        }
    }

    /// Storage object keyed by its path
    pub fn storage(path: impl Into<String>, version: i64) -> Self {
        Self::new(TrackDescriptor::storage(path), version)
    }

    /// API track keyed by its upstream id
    pub fn api(track_id: impl Into<String>, version: i64) -> Self {
        Self::new(TrackDescriptor::api(track_id), version)
    }

    pub fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor::new(self.id.clone(), self.source.clone())
    }
}

/// What one reconcile pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Index entries and orphan files removed
    pub pruned: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub up_to_date: usize,
}

/// File name for a track id.
///
/// The id is percent-encoded (everything outside `A-Z a-z 0-9 - _ . ~`,
/// including `%` itself) and the extension is always appended, so distinct
/// ids never share a file.
pub fn safe_file_name(track_id: &str, extension: &str) -> String {
    format!("{}.{}", urlencoding::encode(track_id), extension)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

pub struct MediaCache {
    config: MediaCacheConfig,
    fs: Arc<dyn FileSystemAccess>,
    http_client: Arc<dyn HttpClient>,
    registry: Arc<ProviderRegistry>,
    event_bus: EventBus,
    root: PathBuf,
    index_file: IndexFile,
    /// Single writer for the sidecar; never held across a download
    index: Mutex<MediaIndex>,
    /// Serialises reconcile and clear_all
    maintenance: Mutex<()>,
    download_semaphore: Arc<Semaphore>,
}

impl MediaCache {
    /// Create the cache root if needed and load the sidecar index.
    ///
    /// A corrupt index is logged, reported as [`CacheEvent::IndexRecovered`]
    /// and replaced by an empty one; the next reconcile downloads everything
    /// again.
    ///
    /// # Errors
    ///
    /// [`CacheError::Config`] for an invalid configuration and
    /// [`CacheError::Bridge`] when the root cannot be created.
    #[instrument(skip_all)]
    pub async fn open(
        config: MediaCacheConfig,
        fs: Arc<dyn FileSystemAccess>,
        http_client: Arc<dyn HttpClient>,
        registry: Arc<ProviderRegistry>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        let root = match &config.root {
            Some(root) => root.clone(),
            None => fs.get_cache_directory().await?.join(&config.directory_name),
        };
        fs.create_dir_all(&root).await?;

        let index_file = IndexFile::new(fs.clone(), &root);
        let index = match index_file.load().await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Media index unreadable, starting empty");
                let _ = event_bus.emit(CoreEvent::Cache(CacheEvent::IndexRecovered {
                    reason: e.to_string(),
                }));
                MediaIndex::new()
            }
        };

        info!(root = ?root, entries = index.len(), "Media cache opened");

        let download_semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads));
        Ok(Self {
            config,
            fs,
            http_client,
            registry,
            event_bus,
            root,
            index_file,
            index: Mutex::new(index),
            maintenance: Mutex::new(()),
            download_semaphore,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &MediaCacheConfig {
        &self.config
    }

    /// Where the file for `track_id` lives, whether or not it is cached
    pub fn file_path(&self, track_id: &str) -> PathBuf {
        self.root
            .join(safe_file_name(track_id, &self.config.file_extension))
    }

    /// Local path of a cached track, or `None` on a cache miss
    pub async fn cached_path(&self, track_id: &str) -> Result<Option<PathBuf>> {
        if self.index.lock().await.version(track_id).is_none() {
            return Ok(None);
        }

        let path = self.file_path(track_id);
        if self.fs.exists(&path).await? {
            Ok(Some(path))
        } else {
            debug!(track_id, "Index entry without file");
            Ok(None)
        }
    }

    /// True iff the file exists and the index records exactly `version`
    pub async fn is_cached(&self, track_id: &str, version: i64) -> Result<bool> {
        if self.index.lock().await.version(track_id) != Some(version) {
            return Ok(false);
        }
        Ok(self.fs.exists(&self.file_path(track_id)).await?)
    }

    /// Version recorded for `track_id`, if any
    pub async fn cached_version(&self, track_id: &str) -> Option<i64> {
        self.index.lock().await.version(track_id)
    }

    /// Bring the cache in line with `desired`.
    ///
    /// Per-track download failures are counted in the report and retried on
    /// the next call. Duplicate ids keep the last occurrence.
    ///
    /// # Errors
    ///
    /// Only for failures that affect the whole cache: the root cannot be
    /// listed or the index cannot be written after pruning.
    #[instrument(skip(self, desired), fields(desired = desired.len()))]
    pub async fn reconcile(&self, desired: &[DesiredTrack]) -> Result<ReconcileReport> {
        let _maintenance = self.maintenance.lock().await;

        let wanted: HashMap<&str, &DesiredTrack> = desired
            .iter()
            .map(|track| (track.id.as_str(), track))
            .collect();

        info!(unique = wanted.len(), "Reconciling media cache");
        let _ = self
            .event_bus
            .emit(CoreEvent::Cache(CacheEvent::ReconcileStarted {
                desired: wanted.len(),
            }));

        self.fs.create_dir_all(&self.root).await?;
        let pruned = self.prune(&wanted).await?;

        let mut pending = Vec::new();
        let mut up_to_date = 0;
        for track in wanted.values() {
            if self.is_cached(&track.id, track.version).await? {
                up_to_date += 1;
            } else {
                pending.push(*track);
            }
        }

        debug!(pending = pending.len(), up_to_date, "Sync phase");
        let outcomes = join_all(pending.iter().map(|track| self.download(track))).await;
        let downloaded = outcomes.iter().filter(|ok| **ok).count();

        let report = ReconcileReport {
            pruned,
            downloaded,
            failed: outcomes.len() - downloaded,
            up_to_date,
        };

        info!(
            pruned = report.pruned,
            downloaded = report.downloaded,
            failed = report.failed,
            up_to_date = report.up_to_date,
            "Reconcile finished"
        );
        let _ = self
            .event_bus
            .emit(CoreEvent::Cache(CacheEvent::ReconcileCompleted {
                pruned: report.pruned,
                downloaded: report.downloaded,
                failed: report.failed,
                up_to_date: report.up_to_date,
            }));

        Ok(report)
    }

    /// Delete every cached audio file and stray partial download, then
    /// persist an empty index. Other files in the root are left alone.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<usize> {
        let _maintenance = self.maintenance.lock().await;

        let mut removed = 0;
        if self.fs.exists(&self.root).await? {
            for path in self.fs.list_directory(&self.root).await? {
                if has_extension(&path, &self.config.file_extension) {
                    self.remove_file(&path).await?;
                    removed += 1;
                } else if has_extension(&path, PART_EXTENSION) {
                    self.remove_file(&path).await?;
                }
            }
        }

        let mut index = self.index.lock().await;
        index.clear();
        self.index_file.save(&index).await?;
        drop(index);

        info!(removed, "Media cache cleared");
        let _ = self
            .event_bus
            .emit(CoreEvent::Cache(CacheEvent::Cleared { removed }));

        Ok(removed)
    }

    /// Drop index entries outside the desired set, then sweep orphan files.
    async fn prune(&self, wanted: &HashMap<&str, &DesiredTrack>) -> Result<usize> {
        let mut pruned = 0;

        {
            let mut index = self.index.lock().await;
            let stale: Vec<String> = index
                .track_ids()
                .filter(|id| !wanted.contains_key(id))
                .map(str::to_owned)
                .collect();

            for track_id in &stale {
                let path = self.file_path(track_id);
                if let Err(e) = self.remove_if_exists(&path).await {
                    warn!(track_id = %track_id, error = %e, "Failed to delete pruned file");
                }
                index.remove(track_id);
                pruned += 1;

                debug!(track_id = %track_id, "Pruned track");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Cache(CacheEvent::TrackEvicted {
                        track_id: track_id.clone(),
                    }));
            }

            if !stale.is_empty() {
                self.index_file.save(&index).await?;
            }
        }

        let keep: HashSet<String> = wanted
            .keys()
            .map(|id| safe_file_name(id, &self.config.file_extension))
            .collect();

        for path in self.fs.list_directory(&self.root).await? {
            let Some(name) = file_name_of(&path) else {
                continue;
            };

            if has_extension(&path, PART_EXTENSION) {
                debug!(file = name, "Removing leftover partial download");
                if let Err(e) = self.remove_if_exists(&path).await {
                    warn!(file = name, error = %e, "Failed to delete partial download");
                }
                continue;
            }

            if name.starts_with('.')
                || !has_extension(&path, &self.config.file_extension)
                || keep.contains(name)
            {
                continue;
            }

            match self.remove_if_exists(&path).await {
                Ok(()) => {
                    debug!(file = name, "Removed orphan cache file");
                    pruned += 1;
                }
                Err(e) => warn!(file = name, error = %e, "Failed to delete orphan file"),
            }
        }

        Ok(pruned)
    }

    /// Download one track and commit it. Returns whether it succeeded.
    async fn download(&self, track: &DesiredTrack) -> bool {
        let Ok(_permit) = self.download_semaphore.acquire().await else {
            error!(track_id = %track.id, "Download semaphore closed");
            return false;
        };

        let destination = self.file_path(&track.id);
        let temp_path = self.temp_path_for(&destination);

        let result = match tokio::time::timeout(
            self.config.download_timeout,
            self.fetch_to_disk(track, &temp_path, &destination),
        )
        .await
        {
            Ok(Ok(bytes)) => self.commit(track).await.map(|()| bytes),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CacheError::download_failed(
                &track.id,
                format!("timed out after {:?}", self.config.download_timeout),
            )),
        };

        match result {
            Ok(bytes) => {
                info!(track_id = %track.id, version = track.version, bytes, "Track cached");
                let _ = self.event_bus.emit(CoreEvent::Cache(CacheEvent::TrackCached {
                    track_id: track.id.clone(),
                    version: track.version,
                }));
                true
            }
            Err(e) => {
                warn!(track_id = %track.id, error = %e, "Track download failed");
                if let Err(cleanup) = self.remove_if_exists(&temp_path).await {
                    debug!(error = %cleanup, "Failed to remove partial download");
                }
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Cache(CacheEvent::DownloadFailed {
                        track_id: track.id.clone(),
                        message: e.to_string(),
                    }));
                false
            }
        }
    }

    async fn fetch_to_disk(
        &self,
        track: &DesiredTrack,
        temp_path: &Path,
        destination: &Path,
    ) -> Result<u64> {
        let source_url = tokio::time::timeout(
            self.config.resolve_timeout,
            self.registry.resolve(&track.source),
        )
        .await
        .map_err(|_| CacheError::download_failed(&track.id, "provider lookup timed out"))?
        .map_err(|e| CacheError::download_failed(&track.id, e))?;

        let request =
            HttpRequest::new(HttpMethod::Get, source_url.url).headers(source_url.headers);
        let mut reader = self
            .http_client
            .download_stream_with(request)
            .await
            .map_err(|e| CacheError::download_failed(&track.id, e))?;

        let mut writer = self.fs.open_write_stream(temp_path).await?;
        let written = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| CacheError::download_failed(&track.id, e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| CacheError::download_failed(&track.id, e))?;
        drop(writer);

        if written == 0 {
            return Err(CacheError::download_failed(&track.id, "empty response body"));
        }

        self.fs.rename(temp_path, destination).await?;
        Ok(written)
    }

    /// Record the new version and persist the index
    async fn commit(&self, track: &DesiredTrack) -> Result<()> {
        let mut index = self.index.lock().await;
        let previous = index.version(&track.id);
        index.insert(track.id.clone(), track.version);

        if let Err(e) = self.index_file.save(&index).await {
            match previous {
                Some(version) => index.insert(track.id.clone(), version),
                None => {
                    index.remove(&track.id);
                }
            }
            return Err(CacheError::download_failed(
                &track.id,
                format!("index commit failed: {}", e),
            ));
        }

        Ok(())
    }

    fn temp_path_for(&self, destination: &Path) -> PathBuf {
        let name = file_name_of(destination).unwrap_or("track");
        self.root
            .join(format!(".{}.{}.{}", name, Uuid::new_v4(), PART_EXTENSION))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        self.fs.delete_file(path).await?;
        Ok(())
    }

    async fn remove_if_exists(&self, path: &Path) -> Result<()> {
        if self.fs.exists(path).await? {
            self.remove_file(path).await?;
        }
        Ok(())
    }
}
