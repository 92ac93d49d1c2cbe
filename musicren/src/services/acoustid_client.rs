//! AcoustID API client
//!
//! Fingerprint lookup returning MusicBrainz recording candidates with
//! their release groups and releases.

use crate::models::FingerprintMatch;
use crate::utils::retry::Transient;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const ACOUSTID_BASE_URL: &str = "https://api.acoustid.org/v2/lookup";
const LOOKUP_META: &str = "recordings releasegroups releases";

/// Public application key, used when the user configured none
pub const DEFAULT_API_KEY: &str = "8XaBELgH";

/// AcoustID client errors
#[derive(Debug, Error)]
pub enum AcoustIDError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid API key")]
    InvalidApiKey,
}

impl Transient for AcoustIDError {
    fn is_transient(&self) -> bool {
        match self {
            AcoustIDError::NetworkError(_) => true,
            AcoustIDError::ApiError(status, _) => *status == 429 || *status >= 500,
            AcoustIDError::ParseError(_) | AcoustIDError::InvalidApiKey => false,
        }
    }
}

/// AcoustID lookup response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<AcoustIDResult>,
    pub error: Option<AcoustIDErrorBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDErrorBody {
    pub code: Option<u32>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDResult {
    pub id: String, // AcoustID
    pub score: f64, // Match confidence (0.0 to 1.0)
    pub recordings: Option<Vec<AcoustIDRecording>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDRecording {
    pub id: String, // MusicBrainz Recording MBID
    pub title: Option<String>,
    pub artists: Option<Vec<AcoustIDArtist>>,
    pub duration: Option<f64>, // Seconds
    pub releasegroups: Option<Vec<AcoustIDReleaseGroup>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDArtist {
    pub id: String, // MusicBrainz Artist MBID
    pub name: String,
    pub joinphrase: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDReleaseGroup {
    pub id: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<String>,
    pub releases: Option<Vec<AcoustIDRelease>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcoustIDRelease {
    pub id: String, // MusicBrainz Release MBID
    pub title: Option<String>,
    pub country: Option<String>,
    pub date: Option<AcoustIDDate>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct AcoustIDDate {
    pub year: Option<u32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl AcoustIDDate {
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, depending on precision
    pub fn to_iso(self) -> Option<String> {
        let year = self.year?;
        Some(match (self.month, self.day) {
            (Some(m), Some(d)) => format!("{:04}-{:02}-{:02}", year, m, d),
            (Some(m), None) => format!("{:04}-{:02}", year, m),
            _ => format!("{:04}", year),
        })
    }
}

/// AcoustID API client
pub struct AcoustIDClient {
    http_client: reqwest::Client,
    base_url: String,
    /// Rate limiter: 3 requests per second (AcoustID policy)
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
    api_key: String,
}

impl AcoustIDClient {
    pub fn new(api_key: String) -> Result<Self, AcoustIDError> {
        Self::with_base_url(api_key, ACOUSTID_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, AcoustIDError> {
        let http_client = reqwest::Client::builder()
            .user_agent(musicren_common::config::get_user_agent())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AcoustIDError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: RateLimiter::direct(Quota::per_second(NonZeroU32::MIN.saturating_add(2))),
            api_key,
        })
    }

    /// Lookup recordings by Chromaprint fingerprint
    pub async fn lookup(
        &self,
        fingerprint: &str,
        duration_seconds: u64,
    ) -> Result<AcoustIDResponse, AcoustIDError> {
        self.rate_limiter.until_ready().await;

        let duration = duration_seconds.to_string();
        let params = [
            ("client", self.api_key.as_str()),
            ("meta", LOOKUP_META),
            ("duration", duration.as_str()),
            ("fingerprint", fingerprint),
        ];

        tracing::debug!(
            duration_seconds = duration_seconds,
            "Querying AcoustID API"
        );

        let response = self
            .http_client
            .post(&self.base_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AcoustIDError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 401 {
            return Err(AcoustIDError::InvalidApiKey);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AcoustIDError::NetworkError(e.to_string()))?;

        let acoustid_response: AcoustIDResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(AcoustIDError::ApiError(status.as_u16(), body));
            }
            Err(e) => return Err(AcoustIDError::ParseError(e.to_string())),
        };

        if acoustid_response.status != "ok" {
            let error = acoustid_response.error.unwrap_or(AcoustIDErrorBody {
                code: None,
                message: "unknown error".to_string(),
            });
            // Error code 4 is "invalid API key"
            if error.code == Some(4) {
                return Err(AcoustIDError::InvalidApiKey);
            }
            return Err(AcoustIDError::ApiError(status.as_u16(), error.message));
        }

        if let Some(top_result) = acoustid_response.results.first() {
            tracing::debug!(
                acoustid = %top_result.id,
                score = top_result.score,
                recordings = top_result.recordings.as_ref().map(|r| r.len()).unwrap_or(0),
                "AcoustID lookup successful"
            );
        }

        Ok(acoustid_response)
    }
}

/// Flatten a lookup response into ranked matches
///
/// Keeps recordings whose result score is at least `min_confidence`,
/// ordered by descending score with one entry per recording id.
pub fn ranked_matches(response: &AcoustIDResponse, min_confidence: f64) -> Vec<FingerprintMatch> {
    let mut matches: Vec<FingerprintMatch> = Vec::new();

    for result in &response.results {
        if result.score < min_confidence {
            continue;
        }
        for recording in result.recordings.iter().flatten() {
            if matches.iter().any(|m| m.recording_id == recording.id) {
                continue;
            }
            matches.push(to_match(recording, result.score));
        }
    }

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

fn to_match(recording: &AcoustIDRecording, score: f64) -> FingerprintMatch {
    let artist = recording.artists.as_ref().filter(|a| !a.is_empty()).map(|artists| {
        artists
            .iter()
            .map(|a| format!("{}{}", a.name, a.joinphrase.as_deref().unwrap_or("")))
            .collect::<String>()
    });

    let group = recording.releasegroups.as_ref().and_then(|g| g.first());

    // Earliest dated release of the first release group
    let earliest = group.and_then(|g| {
        g.releases
            .iter()
            .flatten()
            .filter_map(|r| r.date.and_then(|d| d.to_iso()).map(|date| (date, r)))
            .min_by(|a, b| a.0.cmp(&b.0))
    });

    let release_id = earliest
        .as_ref()
        .map(|(_, r)| r.id.clone())
        .or_else(|| group.and_then(|g| g.releases.as_ref()?.first().map(|r| r.id.clone())));

    FingerprintMatch {
        recording_id: recording.id.clone(),
        release_id,
        artist,
        title: recording.title.clone(),
        album: group.and_then(|g| g.title.clone()),
        date: earliest.map(|(date, _)| date),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> AcoustIDResponse {
        serde_json::from_str(
            r#"{
                "status": "ok",
                "results": [
                    {
                        "id": "acoustid-low",
                        "score": 0.31,
                        "recordings": [{"id": "rec-low", "title": "Other"}]
                    },
                    {
                        "id": "acoustid-high",
                        "score": 0.92,
                        "recordings": [{
                            "id": "rec-1",
                            "title": "Under Pressure",
                            "artists": [
                                {"id": "a1", "name": "Queen", "joinphrase": " & "},
                                {"id": "a2", "name": "David Bowie"}
                            ],
                            "releasegroups": [{
                                "id": "rg-1",
                                "title": "Hot Space",
                                "type": "Album",
                                "releases": [
                                    {"id": "rel-late", "date": {"year": 1991, "month": 3}},
                                    {"id": "rel-early", "date": {"year": 1982, "month": 5, "day": 21}},
                                    {"id": "rel-undated"}
                                ]
                            }]
                        }]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_client_creation() {
        assert!(AcoustIDClient::new("test_key".to_string()).is_ok());
    }

    #[test]
    fn test_ranked_matches_filters_and_orders() {
        let matches = ranked_matches(&sample_response(), 0.5);
        assert_eq!(matches.len(), 1);

        let best = &matches[0];
        assert_eq!(best.recording_id, "rec-1");
        assert_eq!(best.artist.as_deref(), Some("Queen & David Bowie"));
        assert_eq!(best.title.as_deref(), Some("Under Pressure"));
        assert_eq!(best.album.as_deref(), Some("Hot Space"));
        assert_eq!(best.release_id.as_deref(), Some("rel-early"));
        assert_eq!(best.date.as_deref(), Some("1982-05-21"));
        assert!((best.score - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_low_threshold_keeps_all_sorted() {
        let matches = ranked_matches(&sample_response(), 0.0);
        let ids: Vec<&str> = matches.iter().map(|m| m.recording_id.as_str()).collect();
        assert_eq!(ids, vec!["rec-1", "rec-low"]);
    }

    #[test]
    fn test_empty_results() {
        let response: AcoustIDResponse =
            serde_json::from_str(r#"{"status": "ok", "results": []}"#).unwrap();
        assert!(ranked_matches(&response, 0.5).is_empty());
    }

    #[test]
    fn test_error_classification() {
        assert!(AcoustIDError::NetworkError("timeout".into()).is_transient());
        assert!(AcoustIDError::ApiError(503, String::new()).is_transient());
        assert!(!AcoustIDError::ApiError(400, String::new()).is_transient());
        assert!(!AcoustIDError::InvalidApiKey.is_transient());
    }
}
