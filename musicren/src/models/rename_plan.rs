//! Rename plans computed right before a move

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a target-name collision was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "n")]
pub enum CollisionStrategy {
    /// Target was free (or is the source itself)
    None,
    /// `" (n)"` appended to the base name
    Disambiguated(u32),
    /// Every disambiguator up to the cap was taken
    Skipped,
}

/// Planned move of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamePlan {
    pub original: PathBuf,
    pub target: PathBuf,
    pub strategy: CollisionStrategy,
}

impl RenamePlan {
    /// True when applying the plan would not touch the filesystem
    pub fn is_noop(&self) -> bool {
        self.strategy == CollisionStrategy::Skipped || self.original == self.target
    }
}

/// Completed move, kept in the batch journal so it can be undone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRecord {
    pub from: PathBuf,
    pub to: PathBuf,
}
