//! Core service façade and bootstrap helpers.
//!
//! [`CoreService`] is built once per process from the host bridges in a
//! [`CoreConfig`] and a set of [`ServiceSettings`]. It owns exactly one token
//! authority per configured provider, one provider registry, one stream
//! resolution cache and one media cache, and hands out shared references to
//! them. Desktop hosts can enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`] to use the default adapters.
//!
//! ```ignore
//! let settings = ServiceSettings::new()
//!     .with_soundcloud(SoundCloudSettings::app(client_id, client_secret))
//!     .with_firebase(FirebaseSettings::new("my-app.firebasestorage.app", identity));
//! let core = bootstrap_desktop(settings).await?;
//!
//! let stream = core.stream_details(&TrackDescriptor::api("12345")).await?;
//! core.reconcile(&[DesiredTrack::storage("songs/a.mp3", 3)]).await?;
//! ```

pub mod error;
pub mod settings;

pub use error::{CoreError, Result};
pub use settings::{FirebaseSettings, ServiceSettings, SoundCloudSettings};

pub use core_auth::{AuthState, GrantKind, TokenAuthority};
pub use core_cache::{
    DesiredTrack, MediaCache, PreloadReport, ReconcileReport, ResolvedStream,
    StreamResolutionCache, TrackDescriptor,
};
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventBus, EventStream};

use core_auth::{AuthorizedClient, OAuthClient};
use core_cache::ProviderRegistry;
use provider_firebase_storage::{
    FirebaseStorageClient, FirebaseStorageConfig, FirebaseStorageProvider, IdentityTokens,
};
use provider_soundcloud::{SoundCloudClient, SoundCloudStreamProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: CoreConfig,
    event_bus: EventBus,
    soundcloud_authority: Option<Arc<TokenAuthority>>,
    soundcloud: Option<SoundCloudClient>,
    registry: Arc<ProviderRegistry>,
    streams: Arc<StreamResolutionCache>,
    media: Arc<MediaCache>,
}

impl CoreService {
    /// Wire every component from explicit bridges and settings.
    ///
    /// # Errors
    ///
    /// Invalid component configuration, or a media cache root that cannot be
    /// created.
    #[instrument(skip_all)]
    pub async fn new(config: CoreConfig, settings: ServiceSettings) -> Result<Self> {
        config.validate()?;
        let event_bus = EventBus::new(config.event_buffer_size);
        let mut registry = ProviderRegistry::new();

        let mut soundcloud_authority = None;
        let mut soundcloud = None;
        if let Some(sc) = &settings.soundcloud {
            let oauth = OAuthClient::new(
                provider_soundcloud::oauth_config(
                    sc.client_id.clone(),
                    sc.client_secret.clone(),
                    sc.redirect_uri.clone(),
                ),
                config.http_client.clone(),
            );
            let mut authority = TokenAuthority::new(
                provider_soundcloud::authority_config(sc.grant_kind),
                oauth,
                config.credential_store.clone(),
                config.clock.clone(),
                event_bus.clone(),
            )?;
            if let Some(prompt) = &sc.prompt {
                authority = authority.with_prompt(prompt.clone());
            }
            let authority = Arc::new(authority);

            let mut client = SoundCloudClient::new(AuthorizedClient::new(
                authority.clone(),
                config.http_client.clone(),
            ));
            if let Some(base) = &sc.api_base_url {
                client = client.with_base_url(base.clone());
            }

            registry.register(Arc::new(SoundCloudStreamProvider::new(client.clone())));
            soundcloud_authority = Some(authority);
            soundcloud = Some(client);
        }

        if let Some(fb) = &settings.firebase {
            let mut storage_config = FirebaseStorageConfig::new(fb.bucket.clone());
            if let Some(base) = &fb.base_url {
                storage_config = storage_config.with_base_url(base.clone());
            }
            let tokens = Arc::new(IdentityTokens::new(fb.identity.clone()));
            let client = FirebaseStorageClient::new(
                AuthorizedClient::new(tokens, config.http_client.clone()),
                storage_config,
            )?;
            registry.register(Arc::new(FirebaseStorageProvider::new(client)));
        }

        let registry = Arc::new(registry);
        let streams = Arc::new(StreamResolutionCache::new(
            settings.stream_cache.clone(),
            registry.clone(),
            config.http_client.clone(),
            config.clock.clone(),
            event_bus.clone(),
        )?);
        let media = Arc::new(
            MediaCache::open(
                settings.media_cache.clone(),
                config.file_system.clone(),
                config.http_client.clone(),
                registry.clone(),
                event_bus.clone(),
            )
            .await?,
        );

        info!(providers = ?registry.provider_names(), "Core service ready");

        Ok(Self {
            config,
            event_bus,
            soundcloud_authority,
            soundcloud,
            registry,
            streams,
            media,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn events(&self) -> EventStream {
        self.event_bus.stream()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn streams(&self) -> &Arc<StreamResolutionCache> {
        &self.streams
    }

    pub fn media(&self) -> &Arc<MediaCache> {
        &self.media
    }

    pub fn soundcloud(&self) -> Result<&SoundCloudClient> {
        self.soundcloud
            .as_ref()
            .ok_or_else(|| CoreError::NotConfigured("SoundCloud".to_string()))
    }

    pub fn soundcloud_authority(&self) -> Result<&Arc<TokenAuthority>> {
        self.soundcloud_authority
            .as_ref()
            .ok_or_else(|| CoreError::NotConfigured("SoundCloud".to_string()))
    }

    /// Load persisted SoundCloud credentials, if any
    pub async fn restore_session(&self) -> Result<AuthState> {
        Ok(self.soundcloud_authority()?.restore_session().await)
    }

    /// URL for the user to open when signing in interactively
    pub fn start_sign_in(&self) -> Result<String> {
        Ok(self
            .soundcloud_authority()?
            .start_interactive_authorization()?)
    }

    /// Finish a sign-in from the redirect the browser landed on
    pub async fn complete_sign_in(&self, redirect_url: &str) -> Result<()> {
        self.soundcloud_authority()?
            .complete_from_redirect_url(redirect_url)
            .await?;
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.soundcloud_authority()?.sign_out().await?;
        self.streams.clear();
        Ok(())
    }

    /// Playable URL and headers for one track
    pub async fn stream_details(&self, track: &TrackDescriptor) -> Result<ResolvedStream> {
        Ok(self.streams.get_stream_details(track).await?)
    }

    pub async fn preload(&self, tracks: &[TrackDescriptor]) -> PreloadReport {
        self.streams.preload(tracks).await
    }

    pub async fn refresh_expired(&self, tracks: &[TrackDescriptor]) -> PreloadReport {
        self.streams.refresh_expired(tracks).await
    }

    pub async fn reconcile(&self, desired: &[DesiredTrack]) -> Result<ReconcileReport> {
        Ok(self.media.reconcile(desired).await?)
    }

    pub async fn cached_path(&self, track_id: &str) -> Result<Option<PathBuf>> {
        Ok(self.media.cached_path(track_id).await?)
    }

    pub async fn clear_media_cache(&self) -> Result<usize> {
        Ok(self.media.clear_all().await?)
    }
}

/// Build a service on the desktop adapters from `bridge-desktop`.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(settings: ServiceSettings) -> Result<CoreService> {
    let config = CoreConfig::builder().build()?;
    CoreService::new(config, settings).await
}
