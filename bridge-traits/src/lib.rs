//! # Host Bridge Traits
//!
//! Platform abstraction traits that every host must provide to the core.
//!
//! ## Overview
//!
//! This crate defines the contract between the credential/cache core and the
//! platform-specific adapters. Each trait is a capability the core needs but
//! that is implemented differently per platform (desktop, mobile).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry, timeouts and a
//!   redirect-probe mode (redirect following disabled per request)
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for the media cache
//!
//! ### Security
//! - [`CredentialStore`](storage::CredentialStore) - Durable key to secret-string storage
//!   (Keychain / Credential Manager / Secret Service)
//!
//! ### Streaming sources
//! - [`StreamProvider`](stream::StreamProvider) - Turns a track's upstream
//!   [`StreamSource`](stream::StreamSource) into a playable URL plus headers
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::Error;
//!
//! let store = builder.credential_store.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "CredentialStore".to_string(),
//!     message: "No credential store provided. Desktop: enable 'desktop-shims'.".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations should
//! convert platform errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across tasks.

pub mod error;
pub mod http;
pub mod storage;
pub mod stream;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{CredentialStore, FileMetadata, FileSystemAccess};
pub use stream::{SourceUrl, StreamProvider, StreamSource};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
