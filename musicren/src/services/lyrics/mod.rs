//! Lyrics resolution
//!
//! Providers are queried in order until one yields a synchronised match.
//! Unsynchronised and instrumental results never count as a match. Lyrics
//! are track-specific, so nothing is cached between files.

mod lrc;
mod lrclib_client;

pub use lrc::parse_lrc;
pub use lrclib_client::{LrclibClient, LrclibTrack};

use crate::models::{CanonicalMetadata, LyricsAsset};
use crate::utils::retry::{with_backoff, Transient};
use async_trait::async_trait;
use musicren_common::config::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Candidates scoring below this are discarded
pub const MIN_LYRICS_SCORE: f64 = 0.5;

/// Durations closer than this earn the agreement bonus
const DURATION_TOLERANCE: Duration = Duration::from_secs(2);

/// Lyrics provider errors
#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Transient for LyricsError {
    fn is_transient(&self) -> bool {
        match self {
            LyricsError::NetworkError(_) => true,
            LyricsError::ApiError(status, _) => *status == 429 || *status >= 500,
            LyricsError::ParseError(_) => false,
        }
    }
}

/// Track identity to search lyrics for
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsQuery {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub duration: Option<Duration>,
}

impl LyricsQuery {
    /// `None` when artist or title is still a placeholder
    pub fn from_metadata(metadata: &CanonicalMetadata, duration: Option<Duration>) -> Option<Self> {
        if metadata.is_incomplete() {
            return None;
        }
        Some(Self {
            artist: metadata.artist().to_string(),
            title: metadata.title().to_string(),
            album: metadata.album().map(str::to_string),
            duration,
        })
    }
}

/// One search result from a provider
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsCandidate {
    pub artist: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub instrumental: bool,
    /// LRC text, when the provider has timed lyrics
    pub synced: Option<String>,
}

/// Source of synchronised lyrics
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &LyricsQuery) -> Result<Vec<LyricsCandidate>, LyricsError>;
}

/// Lyrics resolver
pub struct LyricsResolver {
    providers: Vec<Arc<dyn LyricsProvider>>,
    retry: RetryConfig,
}

impl LyricsResolver {
    pub fn new(providers: Vec<Arc<dyn LyricsProvider>>, retry: RetryConfig) -> Self {
        Self { providers, retry }
    }

    pub fn default_providers() -> Result<Vec<Arc<dyn LyricsProvider>>, LyricsError> {
        let lrclib: Arc<dyn LyricsProvider> = Arc::new(LrclibClient::new()?);
        Ok(vec![lrclib])
    }

    /// Best synchronised lyrics for a track
    ///
    /// `Err` only when a provider failed after retries and no other provider
    /// produced a match.
    pub async fn resolve(&self, query: &LyricsQuery) -> Result<Option<LyricsAsset>, LyricsError> {
        let mut last_error = None;

        for provider in &self.providers {
            let operation = format!("lyrics_{}", provider.name());
            let candidates = match with_backoff(&operation, &self.retry, || provider.search(query)).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        artist = %query.artist,
                        title = %query.title,
                        error = %e,
                        "Lyrics provider unavailable"
                    );
                    last_error = Some(e);
                    continue;
                }
            };

            if let Some(asset) = best_synced(query, candidates, provider.name()) {
                tracing::debug!(
                    provider = provider.name(),
                    title = %query.title,
                    lines = asset.lines.len(),
                    confidence = asset.confidence,
                    "Synced lyrics found"
                );
                return Ok(Some(asset));
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                tracing::debug!(artist = %query.artist, title = %query.title, "No synced lyrics");
                Ok(None)
            }
        }
    }
}

fn best_synced(
    query: &LyricsQuery,
    candidates: Vec<LyricsCandidate>,
    provider: &str,
) -> Option<LyricsAsset> {
    candidates
        .into_iter()
        .filter(|c| !c.instrumental)
        .filter_map(|c| {
            let score = score_candidate(query, &c);
            let lines = parse_lrc(c.synced.as_deref()?);
            (score >= MIN_LYRICS_SCORE && !lines.is_empty()).then_some((score, lines))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(confidence, lines)| LyricsAsset {
            lines,
            provider: provider.to_string(),
            confidence,
        })
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// 1.0 for an exact artist + title match, otherwise weighted similarity
/// with a bonus when the durations agree
pub fn score_candidate(query: &LyricsQuery, candidate: &LyricsCandidate) -> f64 {
    let (artist, title) = (normalize(&query.artist), normalize(&query.title));
    let (c_artist, c_title) = (normalize(&candidate.artist), normalize(&candidate.title));

    if artist == c_artist && title == c_title {
        return 1.0;
    }

    let similarity = (strsim::jaro_winkler(&artist, &c_artist) + strsim::jaro_winkler(&title, &c_title)) / 2.0;

    let duration_bonus = match (query.duration, candidate.duration) {
        (Some(a), Some(b)) if a.max(b) - a.min(b) <= DURATION_TOLERANCE => 0.1,
        _ => 0.0,
    };

    (similarity * 0.9 + duration_bonus).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SYNCED: &str = "[00:01.00]Is this the real life?\n[00:05.50]Is this just fantasy?";

    fn query() -> LyricsQuery {
        LyricsQuery {
            artist: "Queen".to_string(),
            title: "Bohemian Rhapsody".to_string(),
            album: None,
            duration: Some(Duration::from_secs(354)),
        }
    }

    fn candidate(artist: &str, title: &str, synced: Option<&str>) -> LyricsCandidate {
        LyricsCandidate {
            artist: artist.to_string(),
            title: title.to_string(),
            duration: Some(Duration::from_secs(355)),
            instrumental: false,
            synced: synced.map(str::to_string),
        }
    }

    struct FakeProvider {
        result: fn() -> Result<Vec<LyricsCandidate>, LyricsError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LyricsProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, _query: &LyricsQuery) -> Result<Vec<LyricsCandidate>, LyricsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn resolver_with(result: fn() -> Result<Vec<LyricsCandidate>, LyricsError>) -> (LyricsResolver, Arc<FakeProvider>) {
        let provider = Arc::new(FakeProvider {
            result,
            calls: AtomicUsize::new(0),
        });
        let dyn_provider: Arc<dyn LyricsProvider> = provider.clone();
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        (LyricsResolver::new(vec![dyn_provider], retry), provider)
    }

    #[test]
    fn test_exact_match_scores_one() {
        let c = candidate(" queen", "BOHEMIAN RHAPSODY", Some(SYNCED));
        assert_eq!(score_candidate(&query(), &c), 1.0);
    }

    #[test]
    fn test_close_match_gets_duration_bonus() {
        let close = candidate("Queen", "Bohemian Rhapsody (Remastered 2011)", Some(SYNCED));
        let score = score_candidate(&query(), &close);
        assert!(score > MIN_LYRICS_SCORE && score < 1.0);

        let unrelated = candidate("Zzyzx", "Qwerty", Some(SYNCED));
        assert!(score_candidate(&query(), &unrelated) < MIN_LYRICS_SCORE);
    }

    #[tokio::test]
    async fn test_synced_result_selected() {
        let (resolver, _) = resolver_with(|| {
            Ok(vec![
                candidate("Queen", "Bohemian Rhapsody", None),
                candidate("Queen", "Bohemian Rhapsody", Some(SYNCED)),
            ])
        });

        let asset = resolver.resolve(&query()).await.unwrap().unwrap();
        assert_eq!(asset.lines.len(), 2);
        assert_eq!(asset.provider, "fake");
        assert_eq!(asset.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_unsynced_and_instrumental_are_not_found() {
        let (resolver, _) = resolver_with(|| {
            let mut instrumental = candidate("Queen", "Bohemian Rhapsody", Some(SYNCED));
            instrumental.instrumental = true;
            Ok(vec![candidate("Queen", "Bohemian Rhapsody", None), instrumental])
        });

        assert!(resolver.resolve(&query()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeout_retried_then_reported() {
        let (resolver, provider) =
            resolver_with(|| Err(LyricsError::NetworkError("timed out".to_string())));

        assert!(resolver.resolve(&query()).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
