//! Provider and component settings for [`CoreService`](crate::CoreService)

use core_auth::{AuthorizationPrompt, GrantKind};
use core_cache::{MediaCacheConfig, StreamCacheConfig};
use provider_firebase_storage::IdentityTokenSource;
use std::fmt;
use std::sync::Arc;

/// SoundCloud client registration
#[derive(Clone)]
pub struct SoundCloudSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Required for the user mode
    pub redirect_uri: Option<String>,
    pub grant_kind: GrantKind,
    /// Overrides the public API base, mainly for tests
    pub api_base_url: Option<String>,
    /// Lets user-mode token requests start a sign-in on their own
    pub prompt: Option<Arc<dyn AuthorizationPrompt>>,
}

impl SoundCloudSettings {
    /// App mode: client credentials, no user involved
    pub fn app(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            grant_kind: GrantKind::ClientCredentials,
            api_base_url: None,
            prompt: None,
        }
    }

    /// User mode: PKCE sign-in, then refresh tokens
    pub fn user(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            redirect_uri: Some(redirect_uri.into()),
            grant_kind: GrantKind::AuthorizationCode,
            ..Self::app(client_id, client_secret)
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

impl fmt::Debug for SoundCloudSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundCloudSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("grant_kind", &self.grant_kind)
            .field("api_base_url", &self.api_base_url)
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct FirebaseSettings {
    pub bucket: String,
    pub base_url: Option<String>,
    pub identity: Arc<dyn IdentityTokenSource>,
}

impl FirebaseSettings {
    pub fn new(bucket: impl Into<String>, identity: Arc<dyn IdentityTokenSource>) -> Self {
        Self {
            bucket: bucket.into(),
            base_url: None,
            identity,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

impl fmt::Debug for FirebaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseSettings")
            .field("bucket", &self.bucket)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Everything [`CoreService::new`](crate::CoreService::new) needs beyond the
/// host bridges.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub soundcloud: Option<SoundCloudSettings>,
    pub firebase: Option<FirebaseSettings>,
    pub stream_cache: StreamCacheConfig,
    pub media_cache: MediaCacheConfig,
}

impl ServiceSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_soundcloud(mut self, settings: SoundCloudSettings) -> Self {
        self.soundcloud = Some(settings);
        self
    }

    pub fn with_firebase(mut self, settings: FirebaseSettings) -> Self {
        self.firebase = Some(settings);
        self
    }

    pub fn with_stream_cache(mut self, config: StreamCacheConfig) -> Self {
        self.stream_cache = config;
        self
    }

    pub fn with_media_cache(mut self, config: MediaCacheConfig) -> Self {
        self.media_cache = config;
        self
    }
}
