//! # Core Cache
//!
//! The two caches that sit between the player and the upstream providers.
//!
//! ## Stream Resolution Cache
//!
//! [`StreamResolutionCache`] turns a [`TrackDescriptor`] into a playable URL
//! with headers. The provider answer is passed through a [`RedirectProbe`] so
//! the cached URL is the CDN target rather than the redirector, and every
//! entry carries an expiry.
//!
//! ## Local Media Cache
//!
//! [`MediaCache`] mirrors a desired set of tracks to disk. `reconcile` prunes
//! what is no longer wanted and downloads what is missing or outdated, while
//! a sidecar [`MediaIndex`] records the version of each file.
//!
//! ## Providers
//!
//! Both caches dispatch through a [`ProviderRegistry`] of
//! [`StreamProvider`](bridge_traits::stream::StreamProvider) implementations.
//!
//! ```ignore
//! let registry = Arc::new(ProviderRegistry::new().with_provider(storage_provider));
//! let streams = StreamResolutionCache::new(
//!     StreamCacheConfig::default(),
//!     registry.clone(),
//!     config.http_client.clone(),
//!     config.clock.clone(),
//!     event_bus.clone(),
//! )?;
//! let details = streams.get_stream_details(&TrackDescriptor::storage("songs/a.mp3")).await?;
//! ```

pub mod error;
pub mod media;
pub mod probe;
pub mod source;
pub mod stream;

pub use error::{BoxError, CacheError, Result};
pub use media::{DesiredTrack, MediaCache, MediaCacheConfig, MediaIndex, ReconcileReport};
pub use probe::RedirectProbe;
pub use source::{ProviderRegistry, TrackDescriptor};
pub use stream::{PreloadReport, ResolvedStream, StreamCacheConfig, StreamResolutionCache};
