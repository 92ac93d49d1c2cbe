//! Audio file scanner
//!
//! Recursive discovery of `.mp3`, `.flac` and `.m4a` files with
//! magic-byte verification of the container.
//!
//! Scanning is lazy: [`FileScanner::scan`] returns an iterator that walks
//! the tree as it is consumed. Every call starts a fresh walk, so the
//! results always reflect the filesystem at the time of iteration.

use crate::error::PipelineError;
use crate::models::{AudioFile, AudioFormat};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Audio file scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

impl From<ScanError> for PipelineError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PathNotFound(_) => {
                PipelineError::Common(musicren_common::Error::NotFound(err.to_string()))
            }
            ScanError::NotADirectory(_) => {
                PipelineError::Common(musicren_common::Error::InvalidInput(err.to_string()))
            }
            ScanError::FileAccessError(..) => PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                err.to_string(),
            )),
        }
    }
}

/// Audio file scanner
#[derive(Debug, Clone)]
pub struct FileScanner {
    ignore_patterns: Vec<String>,
    max_depth: Option<usize>,
    verify_magic: bool,
}

impl FileScanner {
    /// Create new file scanner with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, AppleDouble
    /// resource forks and our own staged tag-write copies.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "._".to_string(),
                ".musicren-".to_string(),
            ],
            max_depth: None,
            verify_magic: true,
        }
    }

    /// Limit recursion depth (1 = only files directly under the root)
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Trust extensions without reading file headers
    pub fn without_magic_check(mut self) -> Self {
        self.verify_magic = false;
        self
    }

    /// Scan directory for audio files
    ///
    /// Entries that cannot be read (permissions, broken links, symlink
    /// loops) are logged and skipped; they never abort the walk.
    pub fn scan(&self, root_path: &Path) -> Result<impl Iterator<Item = AudioFile>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let root = root_path
            .canonicalize()
            .map_err(|e| ScanError::FileAccessError(root_path.to_path_buf(), e.to_string()))?;

        let ignore_patterns = self.ignore_patterns.clone();
        let verify_magic = self.verify_magic;

        let walker = WalkDir::new(root)
            .follow_links(true)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| should_process_entry(e, &ignore_patterns));

        Ok(walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    // Continue scanning, don't abort
                    tracing::warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| match classify(entry.path(), verify_magic) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("Skipping unreadable file: {}", e);
                    None
                }
            }))
    }

    /// Scan and collect into a vector
    pub fn scan_all(&self, root_path: &Path) -> Result<Vec<AudioFile>, ScanError> {
        let files: Vec<AudioFile> = self.scan(root_path)?.collect();
        tracing::debug!(
            root = %root_path.display(),
            files = files.len(),
            "Scan complete"
        );
        Ok(files)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if entry should be processed
fn should_process_entry(entry: &DirEntry, ignore_patterns: &[String]) -> bool {
    if entry.depth() == 0 {
        return true;
    }

    let file_name = entry.file_name().to_string_lossy();
    !ignore_patterns
        .iter()
        .any(|pattern| file_name.starts_with(pattern.as_str()))
}

/// Build an [`AudioFile`] for a supported extension
///
/// Returns `Ok(None)` for other extensions. When the header does not match
/// any supported container the file is still returned, with
/// [`AudioFormat::Unknown`], so it shows up in the report.
fn classify(path: &Path, verify_magic: bool) -> Result<Option<AudioFile>, ScanError> {
    let Some(by_extension) = path
        .extension()
        .and_then(|ext| AudioFormat::from_extension(&ext.to_string_lossy()))
    else {
        return Ok(None);
    };

    let size = std::fs::metadata(path)
        .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?
        .len();

    let format = if verify_magic {
        detect_format(path)?.unwrap_or(AudioFormat::Unknown)
    } else {
        by_extension
    };

    if format != by_extension {
        tracing::debug!(
            file = %path.display(),
            extension = %by_extension,
            detected = %format,
            "Container does not match extension"
        );
    }

    Ok(Some(AudioFile::new(path.to_path_buf(), format, size)))
}

/// Verify file type using magic bytes
fn detect_format(path: &Path) -> Result<Option<AudioFormat>, ScanError> {
    let mut file = File::open(path)
        .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

    let mut buffer = [0u8; 12];
    let bytes_read = file
        .read(&mut buffer)
        .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

    if bytes_read < 4 {
        return Ok(None); // Too small to be audio
    }

    Ok(AudioFormat::from_magic(&buffer[..bytes_read]))
}
