//! Data models shared by the pipeline stages
//!
//! - Files discovered on disk and their existing tags
//! - Identification results and reconciled metadata with provenance
//! - Artwork, lyrics and rename plans produced for each file

pub mod assets;
pub mod audio_file;
pub mod metadata;
pub mod rename_plan;

pub use assets::{ArtworkAsset, LyricLine, LyricsAsset};
pub use audio_file::{AudioFile, AudioFormat, TagSnapshot};
pub use metadata::{
    CanonicalMetadata, FieldSource, FingerprintMatch, MetadataField, RegistryRecord, UNKNOWN,
};
pub use rename_plan::{CollisionStrategy, RenamePlan, RenameRecord};
