//! SoundCloud API response types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundCloudUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub permalink_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundCloudTrack {
    pub id: u64,
    pub title: String,
    /// Milliseconds
    pub duration: u64,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    pub permalink_url: String,
    pub user: SoundCloudUser,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub playback_count: Option<u64>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// `GET /tracks/{id}/streams`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub http_mp3_128_url: Option<String>,
    #[serde(default)]
    pub hls_mp3_128_url: Option<String>,
    #[serde(default)]
    pub preview_mp3_128_url: Option<String>,
}

impl StreamInfo {
    /// Progressive MP3 if offered, otherwise HLS
    pub fn playable_url(&self) -> Option<&str> {
        self.http_mp3_128_url
            .as_deref()
            .or(self.hls_mp3_128_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub collection: Vec<SoundCloudTrack>,
    #[serde(default)]
    pub next_href: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playable_url_prefers_progressive() {
        let info: StreamInfo = serde_json::from_str(
            r#"{"http_mp3_128_url":"https://cf.example/a.mp3","hls_mp3_128_url":"https://cf.example/a.m3u8"}"#,
        )
        .unwrap();
        assert_eq!(info.playable_url(), Some("https://cf.example/a.mp3"));
    }

    #[test]
    fn test_playable_url_falls_back_to_hls() {
        let info = StreamInfo {
            hls_mp3_128_url: Some("https://cf.example/a.m3u8".to_string()),
            ..Default::default()
        };
        assert_eq!(info.playable_url(), Some("https://cf.example/a.m3u8"));
        assert_eq!(StreamInfo::default().playable_url(), None);
    }

    #[test]
    fn test_track_parses_with_optional_fields_missing() {
        let track: SoundCloudTrack = serde_json::from_str(
            r#"{
                "id": 42,
                "title": "Night Drive",
                "duration": 215000,
                "permalink_url": "https://soundcloud.com/a/night-drive",
                "user": {"id": 7, "username": "a", "permalink_url": "https://soundcloud.com/a"}
            }"#,
        )
        .unwrap();

        assert_eq!(track.id, 42);
        assert_eq!(track.user.username, "a");
        assert!(track.genre.is_none());
    }
}
