//! Metadata reconciliation
//!
//! Merges existing tags, a fingerprint match and a registry record into one
//! [`CanonicalMetadata`]. Every field is taken from the first source that has
//! it, in this fixed order:
//!
//! 1. Registry record
//! 2. Fingerprint match (only when its score reaches the threshold)
//! 3. Existing tags
//! 4. Placeholder ([`UNKNOWN`] for artist and title, empty otherwise)
//!
//! The order is total, so the same inputs always produce the same record.

use crate::models::{
    CanonicalMetadata, FieldSource, FingerprintMatch, MetadataField, RegistryRecord, TagSnapshot,
    UNKNOWN,
};

/// Default minimum fingerprint score
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Metadata reconciler
#[derive(Debug, Clone)]
pub struct MetadataReconciler {
    /// Fingerprint matches scoring below this are ignored
    min_confidence: f64,
}

impl Default for MetadataReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl MetadataReconciler {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Build canonical metadata for one file
    pub fn reconcile(
        &self,
        existing: &TagSnapshot,
        fingerprint: Option<&FingerprintMatch>,
        registry: Option<&RegistryRecord>,
    ) -> CanonicalMetadata {
        let fingerprint = fingerprint.filter(|m| {
            let accepted = m.score >= self.min_confidence;
            if !accepted {
                tracing::debug!(
                    recording_id = %m.recording_id,
                    score = m.score,
                    threshold = self.min_confidence,
                    "Fingerprint match below threshold, ignored"
                );
            }
            accepted
        });

        let sources = Sources {
            registry,
            fingerprint,
            existing,
        };

        let artist = sources
            .text(|r| r.artist.as_deref(), |m| m.artist.as_deref(), |t| t.artist.as_deref())
            .unwrap_or_else(|| MetadataField::new(UNKNOWN.to_string(), FieldSource::Placeholder));
        let title = sources
            .text(|r| r.title.as_deref(), |m| m.title.as_deref(), |t| t.title.as_deref())
            .unwrap_or_else(|| MetadataField::new(UNKNOWN.to_string(), FieldSource::Placeholder));

        let mut metadata = CanonicalMetadata {
            artist,
            title,
            album: sources.text(|r| r.album.as_deref(), |m| m.album.as_deref(), |t| t.album.as_deref()),
            album_artist: sources.text(
                |r| r.album_artist.as_deref(),
                |_| None,
                |t| t.album_artist.as_deref(),
            ),
            date: sources.text(|r| r.date.as_deref(), |m| m.date.as_deref(), |t| t.date.as_deref()),
            genre: sources.text(|r| r.genre.as_deref(), |_| None, |t| t.genre.as_deref()),
            composer: sources.text(|_| None, |_| None, |t| t.composer.as_deref()),
            track_number: sources.number(|r| r.track_number, |t| t.track_number),
            track_total: sources.number(|r| r.track_total, |t| t.track_total),
            disc_number: sources.number(|r| r.disc_number, |t| t.disc_number),
            disc_total: sources.number(|r| r.disc_total, |t| t.disc_total),
            recording_id: sources.text(
                |r| Some(r.recording_id.as_str()),
                |m| Some(m.recording_id.as_str()),
                |t| t.recording_id.as_deref(),
            ),
            release_id: sources.text(
                |r| r.release_id.as_deref(),
                |m| m.release_id.as_deref(),
                |t| t.release_id.as_deref(),
            ),
            confidence: 0.0,
        };
        metadata.confidence = overall_confidence(&metadata);

        tracing::debug!(
            artist = %metadata.artist.value,
            artist_source = ?metadata.artist.source,
            title = %metadata.title.value,
            title_source = ?metadata.title.source,
            confidence = metadata.confidence,
            "Metadata reconciled"
        );

        metadata
    }
}

struct Sources<'a> {
    registry: Option<&'a RegistryRecord>,
    fingerprint: Option<&'a FingerprintMatch>,
    existing: &'a TagSnapshot,
}

impl<'a> Sources<'a> {
    /// First non-blank text value in priority order
    fn text(
        &self,
        from_registry: impl Fn(&'a RegistryRecord) -> Option<&'a str>,
        from_fingerprint: impl Fn(&'a FingerprintMatch) -> Option<&'a str>,
        from_tags: impl Fn(&'a TagSnapshot) -> Option<&'a str>,
    ) -> Option<MetadataField<String>> {
        let usable = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

        if let Some(value) = usable(self.registry.and_then(&from_registry)) {
            return Some(MetadataField::new(value, FieldSource::Registry));
        }
        if let Some(m) = self.fingerprint {
            if let Some(value) = usable(from_fingerprint(m)) {
                return Some(MetadataField::with_confidence(value, FieldSource::Fingerprint, m.score));
            }
        }
        usable(from_tags(self.existing)).map(|value| MetadataField::new(value, FieldSource::ExistingTags))
    }

    /// Numeric fields: the fingerprint service does not report positions
    fn number(
        &self,
        from_registry: impl Fn(&RegistryRecord) -> Option<u32>,
        from_tags: impl Fn(&TagSnapshot) -> Option<u32>,
    ) -> Option<MetadataField<u32>> {
        self.registry
            .and_then(from_registry)
            .filter(|&n| n > 0)
            .map(|n| MetadataField::new(n, FieldSource::Registry))
            .or_else(|| {
                from_tags(self.existing)
                    .filter(|&n| n > 0)
                    .map(|n| MetadataField::new(n, FieldSource::ExistingTags))
            })
    }
}

/// Average confidence of the populated fields
fn overall_confidence(m: &CanonicalMetadata) -> f64 {
    let text_fields = [
        &m.album,
        &m.album_artist,
        &m.date,
        &m.genre,
        &m.composer,
        &m.recording_id,
        &m.release_id,
    ];
    let number_fields = [&m.track_number, &m.track_total, &m.disc_number, &m.disc_total];

    let confidences: Vec<f64> = [m.artist.confidence, m.title.confidence]
        .into_iter()
        .chain(text_fields.iter().filter_map(|f| f.as_ref().map(|f| f.confidence)))
        .chain(number_fields.iter().filter_map(|f| f.as_ref().map(|f| f.confidence)))
        .collect();

    confidences.iter().sum::<f64>() / confidences.len() as f64
}
