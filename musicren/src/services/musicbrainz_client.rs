//! MusicBrainz API client
//!
//! Registry lookup of a recording by MBID, flattened into a
//! [`RegistryRecord`] for the release the file most likely belongs to.

use crate::models::RegistryRecord;
use crate::utils::retry::Transient;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";

/// MusicBrainz client errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Recording not found: {0}")]
    RecordingNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Transient for RegistryError {
    fn is_transient(&self) -> bool {
        match self {
            RegistryError::NetworkError(_) | RegistryError::RateLimitExceeded => true,
            RegistryError::ApiError(status, _) => *status == 429 || *status >= 500,
            RegistryError::RecordingNotFound(_) | RegistryError::ParseError(_) => false,
        }
    }
}

/// Full-record lookup for an identified recording
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    /// Look up a recording, preferring `release_hint` when it is one of its releases
    async fn lookup(
        &self,
        recording_id: &str,
        release_hint: Option<&str>,
    ) -> Result<RegistryRecord, RegistryError>;
}

/// MusicBrainz Recording response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBRecording {
    /// Recording MBID (MusicBrainz ID)
    pub id: String,
    pub title: String,
    /// Recording length in milliseconds
    pub length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MBArtistCredit>,
    pub releases: Option<Vec<MBRelease>>,
    #[serde(default)]
    pub genres: Vec<MBGenre>,
}

/// MusicBrainz artist credit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBArtistCredit {
    /// Display name (may differ from artist.name for collaborations)
    pub name: String,
    #[serde(default)]
    pub joinphrase: String,
}

/// MusicBrainz release
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBRelease {
    /// Release MBID (MusicBrainz ID)
    pub id: String,
    pub title: String,
    /// Release date: YYYY, YYYY-MM or YYYY-MM-DD
    pub date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MBArtistCredit>,
    #[serde(default)]
    pub media: Vec<MBMedium>,
}

/// One disc of a release
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBMedium {
    pub position: Option<u32>,
    #[serde(rename = "track-count")]
    pub track_count: Option<u32>,
    /// Only the tracks of the looked-up recording
    #[serde(default)]
    pub tracks: Vec<MBTrack>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBTrack {
    pub position: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MBGenre {
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

/// MusicBrainz API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    /// 1 request per second (MusicBrainz policy)
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl MusicBrainzClient {
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_base_url(MUSICBRAINZ_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, RegistryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(musicren_common::config::get_user_agent())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RegistryError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: RateLimiter::direct(Quota::per_second(NonZeroU32::MIN)),
        })
    }

    /// Lookup recording by MBID
    pub async fn lookup_recording(&self, mbid: &str) -> Result<MBRecording, RegistryError> {
        self.rate_limiter.until_ready().await;

        let url = format!(
            "{}/recording/{}?inc=artist-credits+releases+genres+media&fmt=json",
            self.base_url, mbid
        );

        tracing::debug!(mbid = %mbid, url = %url, "Querying MusicBrainz API");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Err(RegistryError::RecordingNotFound(mbid.to_string()));
        }

        if status == 503 {
            return Err(RegistryError::RateLimitExceeded);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RegistryError::ApiError(status.as_u16(), error_text));
        }

        let recording: MBRecording = response
            .json()
            .await
            .map_err(|e| RegistryError::ParseError(e.to_string()))?;

        tracing::debug!(
            mbid = %mbid,
            title = %recording.title,
            releases = recording.releases.as_ref().map(|r| r.len()).unwrap_or(0),
            "Retrieved recording from MusicBrainz"
        );

        Ok(recording)
    }
}

#[async_trait]
impl MetadataRegistry for MusicBrainzClient {
    async fn lookup(
        &self,
        recording_id: &str,
        release_hint: Option<&str>,
    ) -> Result<RegistryRecord, RegistryError> {
        let recording = self.lookup_recording(recording_id).await?;
        Ok(to_record(&recording, release_hint))
    }
}

fn credit_string(credits: &[MBArtistCredit]) -> Option<String> {
    let joined: String = credits
        .iter()
        .map(|c| format!("{}{}", c.name, c.joinphrase))
        .collect();
    let joined = joined.trim();
    (!joined.is_empty()).then(|| joined.to_string())
}

/// Release the file belongs to: the hinted one if listed, else the earliest dated
fn choose_release<'a>(releases: &'a [MBRelease], hint: Option<&str>) -> Option<&'a MBRelease> {
    if let Some(hinted) = hint.and_then(|id| releases.iter().find(|r| r.id == id)) {
        return Some(hinted);
    }

    releases
        .iter()
        .filter(|r| r.date.as_deref().is_some_and(|d| !d.is_empty()))
        .min_by(|a, b| a.date.cmp(&b.date))
        .or_else(|| releases.first())
}

/// Flatten a recording response into a registry record
pub fn to_record(recording: &MBRecording, release_hint: Option<&str>) -> RegistryRecord {
    let releases = recording.releases.as_deref().unwrap_or_default();
    let release = choose_release(releases, release_hint);

    // Medium that contains this recording
    let medium = release.and_then(|r| r.media.iter().find(|m| !m.tracks.is_empty()));

    let genre = recording
        .genres
        .iter()
        .max_by(|a, b| a.count.cmp(&b.count).then_with(|| b.name.cmp(&a.name)))
        .map(|g| g.name.clone());

    RegistryRecord {
        recording_id: recording.id.clone(),
        release_id: release.map(|r| r.id.clone()),
        title: Some(recording.title.clone()).filter(|t| !t.trim().is_empty()),
        artist: credit_string(&recording.artist_credit),
        album: release.map(|r| r.title.clone()),
        album_artist: release.and_then(|r| credit_string(&r.artist_credit)),
        date: release.and_then(|r| r.date.clone()).filter(|d| !d.is_empty()),
        genre,
        track_number: medium.and_then(|m| m.tracks.first()).and_then(|t| t.position),
        track_total: medium.and_then(|m| m.track_count),
        disc_number: medium.and_then(|m| m.position),
        disc_total: release
            .map(|r| r.media.len() as u32)
            .filter(|&count| count > 0),
    }
}
