//! Identification results and reconciled metadata

use serde::{Deserialize, Serialize};

/// Artist/title value used when no source supplies one
pub const UNKNOWN: &str = "Unknown";

/// Source of a canonical field (for provenance tracking)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Registry,     // confidence: 0.9 (authoritative database)
    Fingerprint,  // confidence: match score
    ExistingTags, // confidence: 0.5 (user-editable)
    Placeholder,  // confidence: 0.0
}

impl FieldSource {
    /// Default confidence for this source
    ///
    /// Fingerprint fields use the match score instead; this value is only
    /// the fallback when no score is known.
    pub fn default_confidence(self) -> f64 {
        match self {
            Self::Registry => 0.9,
            Self::Fingerprint => 0.8,
            Self::ExistingTags => 0.5,
            Self::Placeholder => 0.0,
        }
    }
}

/// Metadata field with source provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataField<T> {
    pub value: T,
    pub confidence: f64,
    pub source: FieldSource,
}

impl<T> MetadataField<T> {
    pub fn new(value: T, source: FieldSource) -> Self {
        Self {
            value,
            confidence: source.default_confidence(),
            source,
        }
    }

    pub fn with_confidence(value: T, source: FieldSource, confidence: f64) -> Self {
        Self {
            value,
            confidence,
            source,
        }
    }
}

/// One candidate returned by the fingerprint identification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintMatch {
    /// MusicBrainz recording MBID
    pub recording_id: String,
    /// MusicBrainz release MBID, when the service reported releases
    pub release_id: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Release group title
    pub album: Option<String>,
    /// Earliest release date of the release group
    pub date: Option<String>,
    /// Match confidence (0.0 to 1.0)
    pub score: f64,
}

/// Full record returned by the metadata registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub recording_id: String,
    pub release_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
}

/// Reconciled metadata for one file
///
/// `artist` and `title` are never empty: missing values fall back to
/// [`UNKNOWN`] with [`FieldSource::Placeholder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    pub artist: MetadataField<String>,
    pub title: MetadataField<String>,
    pub album: Option<MetadataField<String>>,
    pub album_artist: Option<MetadataField<String>>,
    pub date: Option<MetadataField<String>>,
    pub genre: Option<MetadataField<String>>,
    pub composer: Option<MetadataField<String>>,
    pub track_number: Option<MetadataField<u32>>,
    pub track_total: Option<MetadataField<u32>>,
    pub disc_number: Option<MetadataField<u32>>,
    pub disc_total: Option<MetadataField<u32>>,
    pub recording_id: Option<MetadataField<String>>,
    pub release_id: Option<MetadataField<String>>,
    /// Average confidence of the populated fields
    pub confidence: f64,
}

impl CanonicalMetadata {
    pub fn artist(&self) -> &str {
        &self.artist.value
    }

    pub fn title(&self) -> &str {
        &self.title.value
    }

    pub fn album(&self) -> Option<&str> {
        self.album.as_ref().map(|f| f.value.as_str())
    }

    pub fn release_id(&self) -> Option<&str> {
        self.release_id.as_ref().map(|f| f.value.as_str())
    }

    pub fn track_number(&self) -> Option<u32> {
        self.track_number.as_ref().map(|f| f.value)
    }

    /// True when artist or title is a placeholder
    pub fn is_incomplete(&self) -> bool {
        self.artist.source == FieldSource::Placeholder
            || self.title.source == FieldSource::Placeholder
    }

    /// True when any field came from identification (fingerprint or registry)
    pub fn is_identified(&self) -> bool {
        let from_identification =
            |s: FieldSource| matches!(s, FieldSource::Fingerprint | FieldSource::Registry);
        from_identification(self.artist.source)
            || from_identification(self.title.source)
            || self
                .recording_id
                .as_ref()
                .is_some_and(|f| from_identification(f.source))
    }
}
