//! Batch report
//!
//! Per-file outcomes, run-level counters and the rename journal. The report
//! serialises to JSON (`--json`) and a saved report can be fed back to
//! `--undo`.

use crate::error::{ErrorKind, PipelineError};
use crate::models::RenameRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Moved to a new name (planned only, in dry-run mode)
    Renamed { from: PathBuf, to: PathBuf },

    /// Name already correct
    Unchanged,

    /// Artwork-only mode embedded a cover
    CoverEmbedded,

    /// Left untouched; `kind` is `None` for expected skips such as a file
    /// that already has a cover
    Skipped {
        kind: Option<ErrorKind>,
        reason: String,
    },

    /// Processing failed; the file is unmodified
    Failed { kind: ErrorKind, reason: String },
}

impl FileOutcome {
    /// Classify a pipeline error as a skip or a failure
    pub fn from_error(err: &PipelineError) -> Self {
        if err.is_skip() {
            FileOutcome::Skipped {
                kind: Some(err.kind()),
                reason: err.to_string(),
            }
        } else {
            FileOutcome::Failed {
                kind: err.kind(),
                reason: err.to_string(),
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// Per-file result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    /// Path the file had when the run started
    pub path: PathBuf,
    pub outcome: FileOutcome,
    #[serde(default)]
    pub identified: bool,
    #[serde(default)]
    pub tags_written: bool,
    #[serde(default)]
    pub artwork_embedded: bool,
    #[serde(default)]
    pub lyrics_embedded: bool,
}

impl FileReport {
    pub fn new(path: PathBuf, outcome: FileOutcome) -> Self {
        Self {
            path,
            outcome,
            identified: false,
            tags_written: false,
            artwork_embedded: false,
            lyrics_embedded: false,
        }
    }
}

/// Counters over all files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub renamed: usize,
    pub unchanged: usize,
    pub covers_embedded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub identified: usize,
    pub tags_written: usize,
    pub artwork_embedded: usize,
    pub lyrics_embedded: usize,
}

impl BatchSummary {
    fn tally(files: &[FileReport]) -> Self {
        let mut summary = BatchSummary {
            total: files.len(),
            ..Default::default()
        };
        for file in files {
            match file.outcome {
                FileOutcome::Renamed { .. } => summary.renamed += 1,
                FileOutcome::Unchanged => summary.unchanged += 1,
                FileOutcome::CoverEmbedded => summary.covers_embedded += 1,
                FileOutcome::Skipped { .. } => summary.skipped += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
            summary.identified += usize::from(file.identified);
            summary.tags_written += usize::from(file.tags_written);
            summary.artwork_embedded += usize::from(file.artwork_embedded);
            summary.lyrics_embedded += usize::from(file.lyrics_embedded);
        }
        summary
    }
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every file processed
    Success,
    /// Some files skipped or failed
    PartialSuccess,
    /// A requested feature could not run because an executable is missing
    DependencyMissing,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::PartialSuccess => 1,
            ExitStatus::DependencyMissing => 2,
        }
    }
}

/// Result of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub root: PathBuf,
    pub dry_run: bool,
    pub artwork_only: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
    #[serde(default)]
    pub summary: BatchSummary,
    /// Renames performed, in the order they happened
    #[serde(default)]
    pub journal: Vec<RenameRecord>,
    /// Set when identification was requested but could not run
    #[serde(default)]
    pub dependency_missing: Option<String>,
    /// Run-level problems that did not fail any single file
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BatchReport {
    pub fn new(root: PathBuf, dry_run: bool, artwork_only: bool) -> Self {
        Self {
            root,
            dry_run,
            artwork_only,
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
            summary: BatchSummary::default(),
            journal: Vec::new(),
            dependency_missing: None,
            warnings: Vec::new(),
        }
    }

    /// Sort files by path, tally counters and stamp the finish time
    pub fn finish(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        self.summary = BatchSummary::tally(&self.files);
        self.finished_at = Some(Utc::now());
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.dependency_missing.is_some() {
            return ExitStatus::DependencyMissing;
        }
        let incomplete = self.files.iter().any(|f| match &f.outcome {
            FileOutcome::Failed { .. } => true,
            FileOutcome::Skipped { kind, .. } => kind.is_some(),
            _ => false,
        });
        if incomplete {
            ExitStatus::PartialSuccess
        } else {
            ExitStatus::Success
        }
    }

    /// Outcome recorded for a file, looked up by its original path
    pub fn outcome_for(&self, path: &std::path::Path) -> Option<&FileOutcome> {
        self.files.iter().find(|f| f.path == path).map(|f| &f.outcome)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default();

        writeln!(f, "Processed {} files in {:.1}s{}", s.total, elapsed, if self.dry_run { " (dry run)" } else { "" })?;

        if self.artwork_only {
            writeln!(f, "  covers embedded: {}", s.covers_embedded)?;
        } else {
            writeln!(f, "  renamed:   {}", s.renamed)?;
            writeln!(f, "  unchanged: {}", s.unchanged)?;
        }
        writeln!(f, "  skipped:   {}", s.skipped)?;
        for file in &self.files {
            if let FileOutcome::Skipped { reason, .. } = &file.outcome {
                writeln!(f, "    {}: {}", file.path.display(), reason)?;
            }
        }
        writeln!(f, "  failed:    {}", s.failed)?;
        for file in &self.files {
            if let FileOutcome::Failed { reason, .. } = &file.outcome {
                writeln!(f, "    {}: {}", file.path.display(), reason)?;
            }
        }

        if !self.artwork_only {
            writeln!(
                f,
                "Identified {}, tags written {}, artwork embedded {}, lyrics embedded {}",
                s.identified, s.tags_written, s.artwork_embedded, s.lyrics_embedded
            )?;
        }
        if let Some(missing) = &self.dependency_missing {
            writeln!(f, "Identification disabled: {}", missing)?;
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}
