//! # SoundCloud Provider
//!
//! Interactive music API backing [`StreamSource::Api`](bridge_traits::stream::StreamSource)
//! tracks.
//!
//! ## Overview
//!
//! - [`SoundCloudClient`]: track streams, track lookup, search and `/me`
//! - [`SoundCloudStreamProvider`]: `StreamProvider` returning the progressive
//!   MP3 URL (HLS as fallback) plus the `Authorization` header
//! - [`endpoints`]: API base, OAuth endpoints and authority presets using the
//!   `OAuth <token>` header scheme

pub mod client;
pub mod endpoints;
pub mod error;
pub mod provider;
pub mod types;

pub use client::SoundCloudClient;
pub use endpoints::{authority_config, oauth_config};
pub use error::{Result, SoundCloudError};
pub use provider::SoundCloudStreamProvider;
pub use types::{SoundCloudTrack, SoundCloudUser, StreamInfo};
