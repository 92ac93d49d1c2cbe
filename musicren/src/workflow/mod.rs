//! Batch workflow
//!
//! Drives every scanned file through the per-file pipeline:
//! 1. Read existing tags
//! 2. Identify (fingerprint + AcoustID), then look the recording up in MusicBrainz
//! 3. Reconcile all sources into canonical metadata
//! 4. Resolve artwork and synchronised lyrics
//! 5. Write tags, artwork and lyrics back into the file
//! 6. Rename
//!
//! Files run concurrently; a failure in one file is recorded in the
//! [`BatchReport`] and never stops the others.

pub mod pipeline;
pub mod report;

pub use pipeline::{Pipeline, PipelineConfig};
pub use report::{BatchReport, BatchSummary, ExitStatus, FileOutcome, FileReport};

use serde::{Deserialize, Serialize};

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ReadTags,
    Identify,
    Reconcile,
    Artwork,
    Lyrics,
    WriteTags,
    Rename,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ReadTags => "read tags",
            Stage::Identify => "identify",
            Stage::Reconcile => "reconcile",
            Stage::Artwork => "artwork",
            Stage::Lyrics => "lyrics",
            Stage::WriteTags => "write tags",
            Stage::Rename => "rename",
        };
        f.write_str(name)
    }
}

/// Progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Scan finished
    BatchStarted {
        /// Files found under the root
        total_files: usize,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    /// File processing started
    FileStarted {
        /// Path to audio file being processed
        file_path: String,
    },

    /// Stage finished for one file
    StageCompleted {
        file_path: String,
        stage: Stage,
    },

    /// File processing finished
    FileFinished {
        file_path: String,
        outcome: FileOutcome,
        /// Files finished so far, including this one
        processed: usize,
        total_files: usize,
    },
}
