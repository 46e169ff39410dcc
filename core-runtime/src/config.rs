//! # Core Configuration
//!
//! Dependency injection for the host capabilities the core needs.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries one shared instance of every bridge (HTTP, file
//! system, credential store, clock) plus runtime-wide knobs. It is built once
//! at startup with [`CoreConfig::builder`] and handed to each component.
//!
//! With the `desktop-shims` feature, missing bridges fall back to the
//! `bridge-desktop` adapters. Without it the builder fails fast with
//! [`Error::CapabilityMissing`] naming the missing capability.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(MyHttpClient::new()))
//!     .file_system(Arc::new(MyFileSystem::new()))
//!     .credential_store(Arc::new(MyKeychain::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, CredentialStore, FileSystemAccess, HttpClient, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout applied to upstream calls that do not set their own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime-wide configuration and injected capabilities
#[derive(Clone)]
pub struct CoreConfig {
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub credential_store: Arc<dyn CredentialStore>,
    pub clock: Arc<dyn Clock>,
    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
    /// Finite timeout for upstream calls
    pub request_timeout: Duration,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("credential_store", &"CredentialStore { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default adapter. \
             Other hosts: inject a platform implementation through CoreConfig::builder().",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(request_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(request_timeout)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_request_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "token grants and stream resolution"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "the local media cache"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_credential_store() -> Result<Arc<dyn CredentialStore>> {
    Ok(Arc::new(bridge_desktop::KeyringCredentialStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_credential_store() -> Result<Arc<dyn CredentialStore>> {
    Err(capability_missing("CredentialStore", "credential persistence"))
}

/// Builder for [`CoreConfig`]
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    request_timeout: Option<Duration>,
}

impl CoreConfigBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a bridge is absent and no desktop
    ///   default is compiled in
    /// - [`Error::Config`] when validation fails
    pub fn build(self) -> Result<CoreConfig> {
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let credential_store = match self.credential_store {
            Some(store) => store,
            None => provide_default_credential_store()?,
        };

        let config = CoreConfig {
            http_client,
            file_system,
            credential_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            request_timeout,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{FileMetadata, HttpRequest, HttpResponse};
    use bytes::Bytes;
    use std::path::{Path, PathBuf};

    struct NullHttp;

    #[async_trait]
    impl HttpClient for NullHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 204,
                headers: Default::default(),
                body: Bytes::new(),
            })
        }

        async fn download_stream(
            &self,
            _url: String,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            Ok(Box::new(std::io::Cursor::new(Vec::new())))
        }
    }

    struct NullStore;

    #[async_trait]
    impl CredentialStore for NullStore {
        async fn set_secret(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullFs;

    #[async_trait]
    impl FileSystemAccess for NullFs {
        async fn get_cache_directory(&self) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from("/tmp"))
        }
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Ok(FileMetadata {
                size: 0,
                modified_at: None,
                is_directory: false,
            })
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn read_file(&self, _path: &Path) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }
        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        async fn open_write_stream(
            &self,
            _path: &Path,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
            Ok(Box::new(tokio::io::sink()))
        }
    }

    fn full_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(NullHttp))
            .file_system(Arc::new(NullFs))
            .credential_store(Arc::new(NullStore))
    }

    #[test]
    fn test_builder_with_injected_bridges() {
        let config = full_builder().build().unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(format!("{:?}", config).contains("CoreConfig"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = full_builder()
            .event_buffer_size(8)
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.event_buffer_size, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = full_builder().event_buffer_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Event buffer size"));

        let err = full_builder()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Request timeout"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_credential_store_fails_fast() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(NullHttp))
            .file_system(Arc::new(NullFs))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, message }) => {
                assert_eq!(capability, "CredentialStore");
                assert!(message.contains("credential persistence"));
            }
            other => panic!("expected CapabilityMissing, got {:?}", other),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_http_client_fails_fast() {
        let result = CoreConfig::builder()
            .file_system(Arc::new(NullFs))
            .credential_store(Arc::new(NullStore))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "HttpClient"
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_missing_bridges() {
        let config = CoreConfig::builder().build();
        assert!(config.is_ok());
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_default_http_client_uses_request_timeout() {
        let config = CoreConfig::builder()
            .request_timeout(Duration::from_secs(90))
            .build()
            .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(90));

        let err = CoreConfig::builder()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
