//! SoundCloud API client
//!
//! Every call goes through [`AuthorizedClient`], so a rejected token is
//! renewed and the request replayed once before an error surfaces.

use crate::endpoints::SOUNDCLOUD_API_BASE;
use crate::error::{Result, SoundCloudError};
use crate::types::{SearchResponse, SoundCloudTrack, SoundCloudUser, StreamInfo};
use bridge_traits::http::{HttpMethod, HttpRequest};
use core_auth::AuthorizedClient;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const NOT_FOUND: u16 = 404;
const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Clone)]
pub struct SoundCloudClient {
    client: AuthorizedClient,
    base_url: String,
}

impl SoundCloudClient {
    pub fn new(client: AuthorizedClient) -> Self {
        Self {
            client,
            base_url: SOUNDCLOUD_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn authorized(&self) -> &AuthorizedClient {
        &self.client
    }

    /// Signed playback URLs for one track
    #[instrument(skip(self))]
    pub async fn stream_info(&self, track_id: &str) -> Result<StreamInfo> {
        let url = format!(
            "{}/tracks/{}/streams",
            self.base_url,
            urlencoding::encode(track_id)
        );
        self.get_json(url, &format!("streams for track {}", track_id))
            .await
    }

    /// The signed-in user; fails for app-mode tokens
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<SoundCloudUser> {
        self.get_json(format!("{}/me", self.base_url), "current user")
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_track(&self, track_id: &str) -> Result<SoundCloudTrack> {
        let url = format!("{}/tracks/{}", self.base_url, urlencoding::encode(track_id));
        self.get_json(url, &format!("track {}", track_id)).await
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SoundCloudTrack>> {
        let url = format!(
            "{}/tracks?q={}&limit={}&linked_partitioning=true",
            self.base_url,
            urlencoding::encode(query),
            limit
        );
        let response: SearchResponse = self.get_json(url, "track search").await?;
        debug!(count = response.collection.len(), "Search returned tracks");
        Ok(response.collection)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, resource: &str) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, url)
            .header("Accept", "application/json; charset=utf-8")
            .timeout(REQUEST_TIMEOUT);

        let response = self.client.execute(request).await?;
        debug!(status = response.status, "SoundCloud response");

        match response.status {
            status if response.is_success() => response.json().map_err(|e| {
                warn!(status, "Undecodable SoundCloud response");
                SoundCloudError::ParseError(e.to_string())
            }),
            NOT_FOUND => Err(SoundCloudError::NotFound {
                resource: resource.to_string(),
            }),
            TOO_MANY_REQUESTS => Err(SoundCloudError::RateLimited),
            status => Err(SoundCloudError::ApiError {
                status_code: status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }),
        }
    }
}
