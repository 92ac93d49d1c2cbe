//! Pipeline components
//!
//! Leaves first: tag codec and scanner, identification (fpcalc + AcoustID)
//! and registry lookup, reconciliation, artwork and lyrics resolution,
//! renaming.

pub mod acoustid_client;
pub mod artwork;
pub mod file_scanner;
pub mod fingerprint_identifier;
pub mod fingerprinter;
pub mod lyrics;
pub mod metadata_reconciler;
pub mod musicbrainz_client;
pub mod rename_engine;
pub mod tag_codec;

pub use acoustid_client::{AcoustIDClient, AcoustIDError};
pub use artwork::{ArtworkCache, ArtworkError, ArtworkProvider, ArtworkQuery, ArtworkResolver};
pub use file_scanner::{FileScanner, ScanError};
pub use fingerprint_identifier::{FingerprintIdentifier, IdentifyError, RecordingIdentifier};
pub use fingerprinter::{FingerprintError, Fingerprinter};
pub use lyrics::{LyricsCandidate, LyricsError, LyricsProvider, LyricsQuery, LyricsResolver};
pub use metadata_reconciler::MetadataReconciler;
pub use musicbrainz_client::{MetadataRegistry, MusicBrainzClient, RegistryError};
pub use rename_engine::{NameTemplate, RenameEngine, RenameError};
pub use tag_codec::{TagCodec, TagError, WriteOutcome};
