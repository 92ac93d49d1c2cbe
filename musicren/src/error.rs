//! Error types for musicren
//!
//! Component errors convert into [`PipelineError`], whose variants are the
//! kinds surfaced in the batch report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-file and run-level pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required external executable is not installed
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    /// Timeout, rate limit or service error after retries
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Extension not recognised or container unreadable
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Tags could not be written; the file was left unmodified
    #[error("Tag write error: {0}")]
    TagWriteError(String),

    /// Every disambiguated target name was already taken
    #[error("Rename collision: {0}")]
    RenameCollision(String),

    /// Filesystem error outside tag writing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch was cancelled before this file was dispatched
    #[error("Cancelled")]
    Cancelled,

    /// musicren-common error
    #[error("Common error: {0}")]
    Common(#[from] musicren_common::Error),
}

/// Error kind as it appears in the batch report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DependencyMissing,
    NetworkError,
    UnsupportedFormat,
    TagWriteError,
    RenameCollision,
    Io,
    Cancelled,
    Internal,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DependencyMissing(_) => ErrorKind::DependencyMissing,
            Self::NetworkError(_) => ErrorKind::NetworkError,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::TagWriteError(_) => ErrorKind::TagWriteError,
            Self::RenameCollision(_) => ErrorKind::RenameCollision,
            Self::Io(_) => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Common(_) => ErrorKind::Internal,
        }
    }

    /// Skips leave the file untouched and are expected; failures are not
    pub fn is_skip(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedFormat | ErrorKind::RenameCollision | ErrorKind::Cancelled
        )
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
