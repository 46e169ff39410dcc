//! # Stream Resolution Cache
//!
//! Maps a track id to a playable, redirect-resolved URL plus the headers the
//! playback engine must send with it.
//!
//! ## Lifecycle of an entry
//!
//! 1. The track's provider returns a direct or redirecting URL
//! 2. [`RedirectProbe`] captures the first redirect target without fetching
//!    the body
//! 3. `{url, headers, expires_at = now + ttl}` is stored under the track id
//!
//! Expired entries are evicted lazily on lookup; there is no background
//! sweep. A new entry always replaces the previous one for the same id, and
//! failed resolutions never leave an entry behind.

use crate::error::{CacheError, Result};
use crate::probe::RedirectProbe;
use crate::source::{ProviderRegistry, TrackDescriptor};
use bridge_traits::http::HttpClient;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, StreamEvent};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Conservative relative to the upstream signed URL lifetime
pub const DEFAULT_STREAM_TTL: Duration = Duration::from_secs(50 * 60);
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 4;
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StreamCacheConfig {
    pub ttl: Duration,
    /// Upper bound on resolutions running at once during preload
    pub preload_concurrency: usize,
    /// Applies to the provider lookup and to the redirect probe separately
    pub resolve_timeout: Duration,
}

impl Default for StreamCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_STREAM_TTL,
            preload_concurrency: DEFAULT_PRELOAD_CONCURRENCY,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

impl StreamCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_preload_concurrency(mut self, concurrency: usize) -> Self {
        self.preload_concurrency = concurrency;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(CacheError::Config("ttl must be greater than 0".to_string()));
        }
        if self.preload_concurrency == 0 {
            return Err(CacheError::Config(
                "preload_concurrency must be at least 1".to_string(),
            ));
        }
        if self.resolve_timeout.is_zero() {
            return Err(CacheError::Config(
                "resolve_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Playable URL for one track
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    pub track_id: String,
    /// Final URL after the first redirect
    pub url: String,
    /// Headers the player must send, usually authorization
    pub headers: HashMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

impl ResolvedStream {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for ResolvedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut header_names: Vec<&String> = self.headers.keys().collect();
        header_names.sort();
        f.debug_struct("ResolvedStream")
            .field("track_id", &self.track_id)
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of a best-effort batch resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    pub requested: usize,
    pub resolved: usize,
    pub failed: usize,
}

pub struct StreamResolutionCache {
    config: StreamCacheConfig,
    registry: Arc<ProviderRegistry>,
    probe: RedirectProbe,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    entries: RwLock<HashMap<String, ResolvedStream>>,
}

impl StreamResolutionCache {
    pub fn new(
        config: StreamCacheConfig,
        registry: Arc<ProviderRegistry>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let probe = RedirectProbe::new(http_client, config.resolve_timeout);

        Ok(Self {
            config,
            registry,
            probe,
            clock,
            event_bus,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StreamCacheConfig {
        &self.config
    }

    /// Cached entry if still fresh, otherwise a new resolution.
    ///
    /// # Errors
    ///
    /// [`CacheError::StreamResolutionFailed`] wrapping the provider or probe
    /// failure. Nothing is cached in that case.
    #[instrument(skip(self, track), fields(track_id = %track.id))]
    pub async fn get_stream_details(&self, track: &TrackDescriptor) -> Result<ResolvedStream> {
        let now = self.clock.now();
        {
            let mut entries = self.entries.write();
            match entries.get(&track.id) {
                Some(entry) if !entry.is_expired_at(now) => {
                    debug!("Stream cache hit");
                    return Ok(entry.clone());
                }
                Some(_) => {
                    entries.remove(&track.id);
                    debug!("Evicted expired stream entry");
                }
                None => {}
            }
        }

        self.resolve_and_cache(track).await
    }

    /// Resolve through the provider and the redirect probe, then store.
    #[instrument(skip(self, track), fields(track_id = %track.id, source = track.source.kind()))]
    pub async fn resolve_and_cache(&self, track: &TrackDescriptor) -> Result<ResolvedStream> {
        match self.resolve(track).await {
            Ok(entry) => {
                self.entries.write().insert(track.id.clone(), entry.clone());

                info!(expires_at = %entry.expires_at, "Resolved stream URL");
                let _ = self.event_bus.emit(CoreEvent::Stream(StreamEvent::Resolved {
                    track_id: track.id.clone(),
                    expires_at: entry.expires_at.timestamp(),
                }));
                Ok(entry)
            }
            Err(e) => {
                warn!(error = %e, "Stream resolution failed");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Stream(StreamEvent::ResolutionFailed {
                        track_id: track.id.clone(),
                        message: e.to_string(),
                    }));
                Err(e)
            }
        }
    }

    /// Resolve many tracks with bounded parallelism.
    ///
    /// Per-track failures are logged and counted, never returned.
    #[instrument(skip(self, tracks), fields(requested = tracks.len()))]
    pub async fn preload(&self, tracks: &[TrackDescriptor]) -> PreloadReport {
        let outcomes: Vec<bool> = stream::iter(tracks)
            .map(|track| async move { self.resolve_and_cache(track).await.is_ok() })
            .buffer_unordered(self.config.preload_concurrency)
            .collect()
            .await;

        let resolved = outcomes.iter().filter(|ok| **ok).count();
        let report = PreloadReport {
            requested: tracks.len(),
            resolved,
            failed: tracks.len() - resolved,
        };

        info!(resolved = report.resolved, failed = report.failed, "Preload finished");
        let _ = self
            .event_bus
            .emit(CoreEvent::Stream(StreamEvent::PreloadCompleted {
                requested: report.requested,
                resolved: report.resolved,
                failed: report.failed,
            }));

        report
    }

    /// Preload only the tracks whose entry is missing or expired
    pub async fn refresh_expired(&self, tracks: &[TrackDescriptor]) -> PreloadReport {
        let now = self.clock.now();
        let stale: Vec<TrackDescriptor> = {
            let entries = self.entries.read();
            tracks
                .iter()
                .filter(|track| {
                    entries
                        .get(&track.id)
                        .map_or(true, |entry| entry.is_expired_at(now))
                })
                .cloned()
                .collect()
        };

        if stale.is_empty() {
            debug!("No stream entries need refreshing");
            return PreloadReport::default();
        }

        self.preload(&stale).await
    }

    /// Drop one entry, e.g. after the player got a 403 from the CDN
    pub fn invalidate(&self, track_id: &str) -> bool {
        self.entries.write().remove(track_id).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Entry as stored, expired or not, without evicting it
    pub fn peek(&self, track_id: &str) -> Option<ResolvedStream> {
        self.entries.read().get(track_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    async fn resolve(&self, track: &TrackDescriptor) -> Result<ResolvedStream> {
        let source_url = match tokio::time::timeout(
            self.config.resolve_timeout,
            self.registry.resolve(&track.source),
        )
        .await
        {
            Ok(Ok(source_url)) => source_url,
            Ok(Err(e)) => return Err(CacheError::resolution_failed(&track.id, e)),
            Err(_) => {
                return Err(CacheError::resolution_failed(
                    &track.id,
                    CacheError::Timeout {
                        operation: "provider lookup".to_string(),
                    },
                ))
            }
        };

        let url = self
            .probe
            .resolve(&source_url)
            .await
            .map_err(|e| CacheError::resolution_failed(&track.id, e))?;

        let ttl = chrono::Duration::from_std(self.config.ttl)
            .map_err(|e| CacheError::Config(format!("ttl out of range: {}", e)))?;

        Ok(ResolvedStream {
            track_id: track.id.clone(),
            url,
            headers: source_url.headers,
            expires_at: self.clock.now() + ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::stream::{SourceUrl, StreamProvider, StreamSource};
    use bridge_traits::time::ManualClock;
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every source with `https://cdn.example/redir/<id>` and counts
    /// calls; ids starting with `bad` fail.
    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl StreamProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn supports(&self, _source: &StreamSource) -> bool {
            true
        }

        async fn resolve_source(&self, source: &StreamSource) -> BridgeResult<SourceUrl> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let id = match source {
                StreamSource::Api { track_id } => track_id.clone(),
                StreamSource::Storage { path } => path.clone(),
            };
            if id.starts_with("bad") {
                return Err(BridgeError::OperationFailed("upstream 500".to_string()));
            }
            Ok(SourceUrl::new(format!("https://cdn.example/redir/{}", id))
                .with_header("Authorization", "OAuth t"))
        }
    }

    /// Redirects `/redir/<id>` to `/final/<id>?sig=abc`
    struct RedirectingCdn;

    #[async_trait]
    impl HttpClient for RedirectingCdn {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            let location = request.url.replace("/redir/", "/final/") + "?sig=abc";
            let mut headers = HashMap::new();
            headers.insert("location".to_string(), location);
            Ok(HttpResponse {
                status: 302,
                headers,
                body: Bytes::new(),
            })
        }

        async fn download_stream(
            &self,
            _url: String,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            Err(BridgeError::NotAvailable("probe only".to_string()))
        }
    }

    struct Fixture {
        provider: Arc<CountingProvider>,
        clock: Arc<ManualClock>,
        cache: StreamResolutionCache,
    }

    fn fixture(config: StreamCacheConfig) -> Fixture {
        let provider = Arc::new(CountingProvider::default());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let registry = Arc::new(ProviderRegistry::new().with_provider(provider.clone()));
        let cache = StreamResolutionCache::new(
            config,
            registry,
            Arc::new(RedirectingCdn),
            clock.clone(),
            EventBus::new(32),
        )
        .unwrap();

        Fixture {
            provider,
            clock,
            cache,
        }
    }

    #[tokio::test]
    async fn test_caches_final_url_with_headers() {
        let f = fixture(StreamCacheConfig::default());
        let entry = f
            .cache
            .get_stream_details(&TrackDescriptor::api("T1"))
            .await
            .unwrap();

        assert_eq!(entry.url, "https://cdn.example/final/T1?sig=abc");
        assert_eq!(entry.headers.get("Authorization").map(String::as_str), Some("OAuth t"));
        assert_eq!(
            entry.expires_at,
            Utc.timestamp_opt(1_700_000_000 + 50 * 60, 0).unwrap()
        );

        f.cache
            .get_stream_details(&TrackDescriptor::api("T1"))
            .await
            .unwrap();
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_re_resolved() {
        let f = fixture(StreamCacheConfig::default());
        let track = TrackDescriptor::api("T1");
        let first = f.cache.get_stream_details(&track).await.unwrap();

        f.clock.set(first.expires_at);
        let second = f.cache.get_stream_details(&track).await.unwrap();

        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 2);
        assert!(second.expires_at > first.expires_at);
        assert!(!second.is_expired_at(f.clock.now()));
    }

    #[tokio::test]
    async fn test_failure_is_wrapped_and_not_cached() {
        let f = fixture(StreamCacheConfig::default());

        let err = f
            .cache
            .get_stream_details(&TrackDescriptor::api("bad-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CacheError::StreamResolutionFailed { ref track_id, .. } if track_id == "bad-1"
        ));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_preload_isolates_failures_and_bounds_concurrency() {
        let f = fixture(StreamCacheConfig::default().with_preload_concurrency(2));
        let tracks: Vec<TrackDescriptor> = ["a", "b", "bad-c", "d", "e", "bad-f"]
            .iter()
            .map(|id| TrackDescriptor::api(*id))
            .collect();

        let report = f.cache.preload(&tracks).await;

        assert_eq!(
            report,
            PreloadReport {
                requested: 6,
                resolved: 4,
                failed: 2
            }
        );
        assert_eq!(f.cache.len(), 4);
        assert!(f.provider.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_refresh_expired_only_touches_stale_entries() {
        let f = fixture(StreamCacheConfig::default().with_ttl(Duration::from_secs(60)));
        let fresh = TrackDescriptor::api("fresh");
        let old = TrackDescriptor::api("old");
        let missing = TrackDescriptor::storage("songs/missing.mp3");

        f.cache.get_stream_details(&old).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(61));
        f.cache.get_stream_details(&fresh).await.unwrap();
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 2);

        let report = f
            .cache
            .refresh_expired(&[fresh.clone(), old.clone(), missing.clone()])
            .await;

        assert_eq!(report.requested, 2);
        assert_eq!(report.resolved, 2);
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 4);
        assert!(f.cache.peek("songs/missing.mp3").is_some());

        assert_eq!(f.cache.refresh_expired(&[fresh, old, missing]).await, PreloadReport::default());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let f = fixture(StreamCacheConfig::default());
        f.cache.preload(&[TrackDescriptor::api("a"), TrackDescriptor::api("b")]).await;

        assert!(f.cache.invalidate("a"));
        assert!(!f.cache.invalidate("a"));
        assert_eq!(f.cache.len(), 1);

        f.cache.clear();
        assert!(f.cache.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(StreamCacheConfig::default().validate().is_ok());
        assert!(StreamCacheConfig::default()
            .with_preload_concurrency(0)
            .validate()
            .is_err());
        assert!(StreamCacheConfig::default()
            .with_ttl(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_debug_hides_header_values() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "OAuth secret".to_string());
        let entry = ResolvedStream {
            track_id: "T1".to_string(),
            url: "https://cdn.example/final".to_string(),
            headers,
            expires_at: Utc.timestamp_opt(0, 0).unwrap(),
        };

        assert!(!format!("{:?}", entry).contains("secret"));
    }
}
