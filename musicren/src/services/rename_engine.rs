//! Rename engine
//!
//! Builds a target file name from canonical metadata, resolves collisions
//! with `" (n)"` disambiguators and moves the file.
//!
//! Targets handed out by [`RenameEngine::plan`] stay reserved for the
//! lifetime of the engine, so files planned concurrently never receive the
//! same name. Moves never overwrite an existing file.

use crate::error::PipelineError;
use crate::models::{AudioFile, CanonicalMetadata, CollisionStrategy, RenamePlan, RenameRecord};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// `{artist} - {title}` followed by the original extension
pub const DEFAULT_TEMPLATE: &str = "{artist} - {title}{ext}";

/// Highest disambiguator tried before the file is skipped
pub const MAX_DISAMBIGUATOR: u32 = 999;

/// Longest file name most filesystems accept, in bytes
const MAX_NAME_BYTES: usize = 255;

const FALLBACK_BASE: &str = "audio_file";

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Rename errors
#[derive(Debug, Error)]
pub enum RenameError {
    #[error("Invalid naming template: {0}")]
    InvalidTemplate(String),

    #[error("No free name for {0} after 999 disambiguators")]
    CollisionsExhausted(PathBuf),

    #[error("Target already exists: {0}")]
    TargetExists(PathBuf),

    #[error("Source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("Copy of {0} did not match the source")]
    VerificationFailed(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<RenameError> for PipelineError {
    fn from(err: RenameError) -> Self {
        match err {
            RenameError::CollisionsExhausted(_) | RenameError::TargetExists(_) => {
                PipelineError::RenameCollision(err.to_string())
            }
            RenameError::Io(e) => PipelineError::Io(e),
            other => PipelineError::Io(io::Error::other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Artist,
    Title,
    Album,
    Track,
}

/// Parsed naming template
///
/// Placeholders: `{artist}`, `{title}`, `{album}`, `{track}` and `{ext}`.
/// `{ext}` may only appear at the end; a template without it still keeps
/// the original extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    segments: Vec<Segment>,
}

impl NameTemplate {
    pub fn parse(template: &str) -> Result<Self, RenameError> {
        let body = template.strip_suffix("{ext}").unwrap_or(template);
        let mut segments = Vec::new();
        let mut rest = body;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| RenameError::InvalidTemplate(format!("unclosed '{{' in {:?}", template)))?;

            segments.push(match &rest[open + 1..close] {
                "artist" => Segment::Artist,
                "title" => Segment::Title,
                "album" => Segment::Album,
                "track" => Segment::Track,
                "ext" => {
                    return Err(RenameError::InvalidTemplate(
                        "{ext} must be at the end".to_string(),
                    ))
                }
                other => {
                    return Err(RenameError::InvalidTemplate(format!(
                        "unknown placeholder {{{}}}",
                        other
                    )))
                }
            });
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        if !segments.iter().any(|s| !matches!(s, Segment::Literal(_))) {
            return Err(RenameError::InvalidTemplate(format!(
                "{:?} has no placeholders",
                template
            )));
        }

        Ok(Self { segments })
    }

    /// File name without extension, before sanitization
    pub fn render(&self, metadata: &CanonicalMetadata) -> String {
        let mut out = String::new();
        let mut skip_separator = false;

        for segment in &self.segments {
            let value = match segment {
                Segment::Literal(text) => {
                    let text = if skip_separator {
                        text.trim_start_matches([' ', '-', '_', '.'])
                    } else {
                        text.as_str()
                    };
                    skip_separator = false;
                    out.push_str(text);
                    continue;
                }
                Segment::Artist => metadata.artist().to_string(),
                Segment::Title => metadata.title().to_string(),
                Segment::Album => metadata.album().unwrap_or_default().to_string(),
                Segment::Track => metadata
                    .track_number()
                    .map(|n| format!("{:02}", n))
                    .unwrap_or_default(),
            };
            skip_separator = value.is_empty() && matches!(segment, Segment::Track);
            // Path separators inside a value must not create directories
            out.push_str(&value.replace(['/', '\\'], "-"));
        }

        out
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        // DEFAULT_TEMPLATE is well-formed
        Self {
            segments: vec![
                Segment::Artist,
                Segment::Literal(" - ".to_string()),
                Segment::Title,
            ],
        }
    }
}

/// Make a base name safe on every supported filesystem
///
/// `ext` is the dotted extension that will be appended; the base is
/// shortened so that base + `reserve` + ext fits in 255 bytes.
pub fn sanitize_base(raw: &str, ext: &str, reserve: usize) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' => '-',
            '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut base = replaced.trim_matches(['.', ' ']).to_string();
    if base.is_empty() {
        base = FALLBACK_BASE.to_string();
    }

    let stem = base.split('.').next().unwrap_or_default().trim_end();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        base.insert(0, '_');
    }

    let budget = MAX_NAME_BYTES.saturating_sub(ext.len() + reserve);
    if base.len() > budget {
        let mut cut = budget;
        while !base.is_char_boundary(cut) {
            cut -= 1;
        }
        base.truncate(cut);
        let trimmed = base.trim_end_matches(['.', ' ']).len();
        base.truncate(trimmed);
        if base.is_empty() {
            base = FALLBACK_BASE.to_string();
        }
    }

    base
}

/// Rename engine for one batch
#[derive(Debug)]
pub struct RenameEngine {
    template: NameTemplate,
    dry_run: bool,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl RenameEngine {
    pub fn new(template: NameTemplate, dry_run: bool) -> Self {
        Self {
            template,
            dry_run,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Compute where a file should go
    pub fn plan(&self, metadata: &CanonicalMetadata, file: &AudioFile) -> RenamePlan {
        let ext = file.dotted_extension();
        let dir = parent_dir(file.path());
        let raw = self.template.render(metadata);
        self.choose_target(file.path(), &dir, &raw, &ext)
    }

    /// Move the file to the planned target
    ///
    /// Returns the final path. A no-op plan succeeds without touching the
    /// filesystem, as does every plan in dry-run mode.
    pub fn apply(&self, plan: &RenamePlan) -> Result<PathBuf, RenameError> {
        if plan.strategy == CollisionStrategy::Skipped {
            return Err(RenameError::CollisionsExhausted(plan.target.clone()));
        }
        if plan.original == plan.target {
            return Ok(plan.target.clone());
        }
        if self.dry_run {
            tracing::info!(
                from = %plan.original.display(),
                to = %plan.target.display(),
                "Dry run: would rename"
            );
            return Ok(plan.target.clone());
        }

        move_file(&plan.original, &plan.target)?;

        tracing::info!(
            from = %plan.original.display(),
            to = %plan.target.display(),
            strategy = ?plan.strategy,
            "Renamed"
        );

        Ok(plan.target.clone())
    }

    /// Move renamed files back to their previous names
    ///
    /// Entries are processed in reverse order. A previous name that has since
    /// been taken is disambiguated like any other collision.
    pub fn undo(&self, journal: &[RenameRecord]) -> Vec<Result<RenameRecord, RenameError>> {
        journal
            .iter()
            .rev()
            .map(|record| {
                if !record.to.exists() {
                    return Err(RenameError::SourceMissing(record.to.clone()));
                }
                let dir = parent_dir(&record.from);
                let raw = record
                    .from
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let ext = record
                    .from
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();

                let plan = self.choose_target(&record.to, &dir, &raw, &ext);
                let restored = self.apply(&plan)?;
                Ok(RenameRecord {
                    from: record.to.clone(),
                    to: restored,
                })
            })
            .collect()
    }

    fn choose_target(&self, source: &Path, dir: &Path, raw: &str, ext: &str) -> RenamePlan {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());

        let base = sanitize_base(raw, ext, 0);
        let preferred = dir.join(format!("{}{}", base, ext));

        let mut candidates = std::iter::once((preferred.clone(), CollisionStrategy::None)).chain(
            (1..=MAX_DISAMBIGUATOR).map(|n| {
                let suffix = format!(" ({})", n);
                let base = sanitize_base(raw, ext, suffix.len());
                (
                    dir.join(format!("{}{}{}", base, suffix, ext)),
                    CollisionStrategy::Disambiguated(n),
                )
            }),
        );

        let chosen = candidates.find(|(candidate, _)| {
            if is_same_file(candidate, source) {
                return true;
            }
            !reserved.contains(candidate) && !candidate.exists()
        });

        match chosen {
            Some((target, strategy)) => {
                reserved.insert(target.clone());

                tracing::debug!(
                    file = %source.display(),
                    target = %target.display(),
                    strategy = ?strategy,
                    "Rename planned"
                );

                RenamePlan {
                    original: source.to_path_buf(),
                    target,
                    strategy,
                }
            }
            None => {
                tracing::warn!(
                    file = %source.display(),
                    target = %preferred.display(),
                    "All disambiguated names taken"
                );
                RenamePlan {
                    original: source.to_path_buf(),
                    target: preferred,
                    strategy: CollisionStrategy::Skipped,
                }
            }
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// True when both paths name the same existing file
fn is_same_file(a: &Path, b: &Path) -> bool {
    a == b || same_inode(a, b)
}

#[cfg(unix)]
fn same_inode(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_inode(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

/// Move `source` to `target` without ever replacing an existing file
///
/// The target is claimed with a hard link, which fails atomically when the
/// name is taken, and the source name is unlinked afterwards. Filesystems
/// without hard links and cross-device moves go through the verified copy.
fn move_file(source: &Path, target: &Path) -> Result<(), RenameError> {
    if !source.exists() {
        return Err(RenameError::SourceMissing(source.to_path_buf()));
    }
    if is_same_file(source, target) {
        // Case-only rename of one file on a case-insensitive filesystem
        return std::fs::rename(source, target).map_err(RenameError::Io);
    }

    match std::fs::hard_link(source, target) {
        Ok(()) => {
            std::fs::remove_file(source)?;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(RenameError::TargetExists(target.to_path_buf()))
        }
        Err(e) if is_cross_device(&e) || is_link_unsupported(&e) => {
            tracing::debug!(
                from = %source.display(),
                to = %target.display(),
                error = %e,
                "Hard link unavailable, copying"
            );
            move_across_devices(source, target)
        }
        Err(e) => Err(RenameError::Io(e)),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    const EXDEV: i32 = 18;
    #[cfg(windows)]
    const EXDEV: i32 = 17; // ERROR_NOT_SAME_DEVICE
    #[cfg(not(any(unix, windows)))]
    const EXDEV: i32 = -1;

    err.raw_os_error() == Some(EXDEV)
}

/// FAT-family filesystems refuse links with EPERM or ENOTSUP
fn is_link_unsupported(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

/// Copy to a temporary sibling of `target`, verify, publish, then delete the source
///
/// The source is only removed once the published copy has the same length
/// and SHA-256 digest.
pub(crate) fn move_across_devices(source: &Path, target: &Path) -> Result<(), RenameError> {
    let dir = parent_dir(target);
    let mut staged = tempfile::Builder::new().prefix(".musicren-").tempfile_in(&dir)?;

    let mut input = File::open(source)?;
    io::copy(&mut input, staged.as_file_mut())?;
    staged.as_file().sync_all()?;

    let source_len = std::fs::metadata(source)?.len();
    let staged_len = staged.as_file().metadata()?.len();
    if source_len != staged_len || sha256_file(source)? != sha256_file(staged.path())? {
        return Err(RenameError::VerificationFailed(source.to_path_buf()));
    }

    staged.persist_noclobber(target).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            RenameError::TargetExists(target.to_path_buf())
        } else {
            RenameError::Io(e.error)
        }
    })?;

    std::fs::remove_file(source)?;
    Ok(())
}

fn sha256_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}
