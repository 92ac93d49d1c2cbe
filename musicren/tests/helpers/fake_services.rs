//! In-memory stand-ins for the external services
//!
//! Each fake counts its calls so tests can assert how often the network
//! would have been contacted.

use async_trait::async_trait;
use musicren::error::PipelineError;
use musicren::models::{AudioFile, FingerprintMatch, RegistryRecord};
use musicren::services::{
    ArtworkError, ArtworkProvider, ArtworkQuery, IdentifyError, LyricsCandidate, LyricsError,
    LyricsProvider, LyricsQuery, MetadataRegistry, RecordingIdentifier, RegistryError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Identifier answering from a table keyed by file name
#[derive(Default)]
pub struct FakeIdentifier {
    pub matches: HashMap<String, FingerprintMatch>,
    /// When set, `check_dependency` reports fpcalc as missing
    pub missing: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeIdentifier {
    pub fn with_match(mut self, file_name: &str, m: FingerprintMatch) -> Self {
        self.matches.insert(file_name.to_string(), m);
        self
    }

    pub fn missing_fpcalc() -> Self {
        Self {
            missing: Some("fpcalc not found in PATH".to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordingIdentifier for FakeIdentifier {
    fn check_dependency(&self) -> Result<(), PipelineError> {
        match &self.missing {
            Some(msg) => Err(PipelineError::DependencyMissing(msg.clone())),
            None => Ok(()),
        }
    }

    async fn identify(&self, file: &AudioFile) -> Result<Vec<FingerprintMatch>, IdentifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.matches.get(&name).cloned().into_iter().collect())
    }
}

pub fn fingerprint_match(recording_id: &str, release_id: &str, score: f64) -> FingerprintMatch {
    FingerprintMatch {
        recording_id: recording_id.to_string(),
        release_id: Some(release_id.to_string()),
        artist: Some("Daft Punk".to_string()),
        title: Some("One More Time".to_string()),
        album: Some("Discovery".to_string()),
        date: Some("2001-03-12".to_string()),
        score,
    }
}

/// Registry answering from a table keyed by recording id
#[derive(Default)]
pub struct FakeRegistry {
    pub records: HashMap<String, RegistryRecord>,
    pub calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn with_record(mut self, record: RegistryRecord) -> Self {
        self.records.insert(record.recording_id.clone(), record);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataRegistry for FakeRegistry {
    async fn lookup(
        &self,
        recording_id: &str,
        _release_hint: Option<&str>,
    ) -> Result<RegistryRecord, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .get(recording_id)
            .cloned()
            .ok_or_else(|| RegistryError::RecordingNotFound(recording_id.to_string()))
    }
}

pub fn registry_record(recording_id: &str, release_id: &str) -> RegistryRecord {
    RegistryRecord {
        recording_id: recording_id.to_string(),
        release_id: Some(release_id.to_string()),
        title: Some("One More Time".to_string()),
        artist: Some("Daft Punk".to_string()),
        album: Some("Discovery".to_string()),
        album_artist: Some("Daft Punk".to_string()),
        date: Some("2001-03-12".to_string()),
        genre: Some("House".to_string()),
        track_number: Some(1),
        track_total: Some(14),
        disc_number: Some(1),
        disc_total: Some(1),
    }
}

/// Artwork provider returning fixed bytes after a short delay
pub struct FakeArtwork {
    pub bytes: Vec<u8>,
    pub calls: AtomicUsize,
}

impl FakeArtwork {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtworkProvider for FakeArtwork {
    fn name(&self) -> &'static str {
        "fake-artwork"
    }

    async fn fetch(&self, _query: &ArtworkQuery) -> Result<Option<Vec<u8>>, ArtworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Long enough for concurrent files of one release to overlap
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Some(self.bytes.clone()))
    }
}

/// Lyrics provider echoing the query as a two-line synced result; queries
/// for `failing_title` time out
#[derive(Default)]
pub struct FakeLyrics {
    pub failing_title: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeLyrics {
    pub fn failing_for(title: &str) -> Self {
        Self {
            failing_title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LyricsProvider for FakeLyrics {
    fn name(&self) -> &'static str {
        "fake-lyrics"
    }

    async fn search(&self, query: &LyricsQuery) -> Result<Vec<LyricsCandidate>, LyricsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_title.as_deref() == Some(query.title.as_str()) {
            return Err(LyricsError::NetworkError("operation timed out".to_string()));
        }
        Ok(vec![LyricsCandidate {
            artist: query.artist.clone(),
            title: query.title.clone(),
            duration: query.duration,
            instrumental: false,
            synced: Some(format!(
                "[00:01.00]{} by {}\n[00:04.50]second line",
                query.title, query.artist
            )),
        }])
    }
}
