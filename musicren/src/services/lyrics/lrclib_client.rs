//! LRCLIB API client
//!
//! `/api/get` answers exact signature matches (artist, title, album,
//! duration); `/api/search` is used when the exact lookup finds nothing.

use super::{LyricsCandidate, LyricsError, LyricsProvider, LyricsQuery};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const LRCLIB_BASE_URL: &str = "https://lrclib.net/api";

/// LRCLIB track record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LrclibTrack {
    pub id: Option<u64>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    #[serde(default)]
    pub instrumental: bool,
    pub plain_lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

impl From<LrclibTrack> for LyricsCandidate {
    fn from(track: LrclibTrack) -> Self {
        Self {
            artist: track.artist_name.unwrap_or_default(),
            title: track.track_name.unwrap_or_default(),
            duration: track
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(Duration::from_secs_f64),
            instrumental: track.instrumental,
            synced: track.synced_lyrics.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// LRCLIB lyrics provider
pub struct LrclibClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    pub fn new() -> Result<Self, LyricsError> {
        Self::with_base_url(LRCLIB_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, LyricsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(musicren_common::config::get_user_agent())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LyricsError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Exact match lookup; `Ok(None)` on 404
    pub async fn get(&self, query: &LyricsQuery) -> Result<Option<LrclibTrack>, LyricsError> {
        let mut url = format!(
            "{}/get?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(&query.artist),
            urlencoding::encode(&query.title)
        );
        if let Some(album) = query.album.as_deref() {
            url.push_str(&format!("&album_name={}", urlencoding::encode(album)));
        }
        if let Some(duration) = query.duration {
            url.push_str(&format!("&duration={}", duration.as_secs_f64().round() as u64));
        }

        let Some(response) = self.send(&url).await? else {
            return Ok(None);
        };
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| LyricsError::ParseError(e.to_string()))
    }

    /// Keyword search
    pub async fn search_tracks(&self, query: &LyricsQuery) -> Result<Vec<LrclibTrack>, LyricsError> {
        let url = format!(
            "{}/search?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(&query.artist),
            urlencoding::encode(&query.title)
        );

        let Some(response) = self.send(&url).await? else {
            return Ok(Vec::new());
        };
        response
            .json()
            .await
            .map_err(|e| LyricsError::ParseError(e.to_string()))
    }

    async fn send(&self, url: &str) -> Result<Option<reqwest::Response>, LyricsError> {
        tracing::debug!(url = %url, "Querying LRCLIB");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| LyricsError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LyricsError::ApiError(status.as_u16(), error_text));
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl LyricsProvider for LrclibClient {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn search(&self, query: &LyricsQuery) -> Result<Vec<LyricsCandidate>, LyricsError> {
        if let Some(track) = self.get(query).await? {
            if track.synced_lyrics.is_some() || track.instrumental {
                return Ok(vec![track.into()]);
            }
        }

        let tracks = self.search_tracks(query).await?;
        Ok(tracks.into_iter().map(LyricsCandidate::from).collect())
    }
}
