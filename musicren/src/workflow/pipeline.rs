//! Pipeline orchestrator
//!
//! Runs the per-file pipeline over every file found under a root directory.
//!
//! # Architecture
//! - Up to `workers` files in flight via `futures::stream::buffer_unordered`
//! - Within a file, stages run strictly in order: read tags, identify,
//!   reconcile, artwork, lyrics, write tags, rename
//! - Blocking tag and filesystem work runs on `spawn_blocking`
//!
//! # Error Handling
//! - Per-file error isolation: every failure ends up in that file's
//!   [`FileReport`] and the batch continues
//! - Service failures degrade to "no data from this source"
//! - A missing fpcalc or a rejected AcoustID key turns identification off for
//!   the rest of the run; files are still renamed from their existing tags
//! - Cancellation stops dispatch immediately; files already in flight stop
//!   before their tag write, or finish if they are past it

use super::report::{BatchReport, FileOutcome, FileReport};
use super::{PipelineEvent, Stage};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    ArtworkAsset, AudioFile, AudioFormat, CanonicalMetadata, FingerprintMatch, LyricsAsset,
    RegistryRecord, RenameRecord, TagSnapshot,
};
use crate::services::artwork::{ArtworkCache, ArtworkProvider, ArtworkQuery, ArtworkResolver};
use crate::services::file_scanner::FileScanner;
use crate::services::fingerprint_identifier::{IdentifyError, RecordingIdentifier};
use crate::services::lyrics::{parse_lrc, LyricsProvider, LyricsQuery, LyricsResolver};
use crate::services::metadata_reconciler::{MetadataReconciler, DEFAULT_MIN_CONFIDENCE};
use crate::services::musicbrainz_client::MetadataRegistry;
use crate::services::rename_engine::{NameTemplate, RenameEngine};
use crate::services::tag_codec::{self, WriteOutcome};
use crate::utils::retry::with_backoff;
use futures::stream::{self, StreamExt};
use musicren_common::config::RetryConfig;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Files processed concurrently unless configured otherwise
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on concurrent files
pub const MAX_WORKERS: usize = 8;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fingerprint files and look them up in AcoustID / MusicBrainz
    pub identify: bool,
    /// Search and embed synchronised lyrics
    pub lyrics: bool,
    /// Only embed missing covers; no identification, lyrics or rename
    pub artwork_only: bool,
    /// Embed artwork for files identification did not recognise, and let
    /// lyrics use existing tags when identification found nothing
    pub embed_unidentified: bool,
    /// Compute everything, write nothing
    pub dry_run: bool,
    pub template: NameTemplate,
    /// Concurrent files (clamped to 1..=8)
    pub workers: usize,
    /// Minimum fingerprint score accepted (0.0-1.0)
    pub min_confidence: f64,
    /// Maximum directory recursion depth (unbounded when `None`)
    pub max_depth: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identify: false,
            lyrics: false,
            artwork_only: false,
            embed_unidentified: false,
            dry_run: false,
            template: NameTemplate::default(),
            workers: DEFAULT_WORKERS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_depth: None,
        }
    }
}

impl PipelineConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }
}

/// Batch pipeline
///
/// External services are injected; a pipeline built with
/// [`Pipeline::new`] alone never touches the network.
pub struct Pipeline {
    config: PipelineConfig,
    identifier: Option<Arc<dyn RecordingIdentifier>>,
    registry: Option<Arc<dyn MetadataRegistry>>,
    artwork_providers: Vec<Arc<dyn ArtworkProvider>>,
    lyrics_providers: Vec<Arc<dyn LyricsProvider>>,
    retry: RetryConfig,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Create new pipeline with configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            identifier: None,
            registry: None,
            artwork_providers: Vec::new(),
            lyrics_providers: Vec::new(),
            retry: RetryConfig::default(),
            event_tx: None,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: Arc<dyn RecordingIdentifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn MetadataRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Providers in fallback order
    pub fn with_artwork_providers(mut self, providers: Vec<Arc<dyn ArtworkProvider>>) -> Self {
        self.artwork_providers = providers;
        self
    }

    /// Providers in fallback order
    pub fn with_lyrics_providers(mut self, providers: Vec<Arc<dyn LyricsProvider>>) -> Self {
        self.lyrics_providers = providers;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Send progress events to `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every audio file under `root`
    ///
    /// Only a root that cannot be scanned is an error; everything that goes
    /// wrong for a single file is recorded in the report.
    pub async fn run(&self, root: &Path) -> PipelineResult<BatchReport> {
        let config = &self.config;
        let mut report = BatchReport::new(root.to_path_buf(), config.dry_run, config.artwork_only);

        let scanner = FileScanner::new().with_max_depth(config.max_depth);
        let scan_root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || scanner.scan_all(&scan_root))
            .await
            .map_err(join_error)??;

        let total_files = files.len();
        info!(
            root = %root.display(),
            files = total_files,
            workers = config.worker_count(),
            dry_run = config.dry_run,
            artwork_only = config.artwork_only,
            "Batch started"
        );
        self.emit(PipelineEvent::BatchStarted {
            total_files,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;

        let identifier = if config.identify && !config.artwork_only {
            self.active_identifier(&mut report)
        } else {
            None
        };

        let batch = Batch {
            pipeline: self,
            identifier,
            identification_live: AtomicBool::new(true),
            reconciler: MetadataReconciler::new(config.min_confidence),
            artwork: ArtworkResolver::new(
                self.artwork_providers.clone(),
                Arc::new(ArtworkCache::new()),
                self.retry,
            ),
            lyrics: LyricsResolver::new(self.lyrics_providers.clone(), self.retry),
            engine: Arc::new(RenameEngine::new(config.template.clone(), config.dry_run)),
            processed: AtomicUsize::new(0),
            total_files,
            warnings: Mutex::new(Vec::new()),
            dependency_missing: Mutex::new(None),
        };

        let batch_ref = &batch;
        let results: Vec<FileReport> = stream::iter(files)
            .map(|file| async move {
                // Dispatch stops as soon as the batch is cancelled
                if batch_ref.pipeline.cancel_token.is_cancelled() {
                    let outcome = FileOutcome::from_error(&PipelineError::Cancelled);
                    return batch_ref.finish_file(FileReport::new(file.path, outcome)).await;
                }
                batch_ref.process(file).await
            })
            .buffer_unordered(config.worker_count())
            .collect()
            .await;

        if !config.dry_run {
            report.journal = results
                .iter()
                .filter_map(|f| match &f.outcome {
                    FileOutcome::Renamed { from, to } => Some(RenameRecord {
                        from: from.clone(),
                        to: to.clone(),
                    }),
                    _ => None,
                })
                .collect();
        }
        report.files = results;

        if let Some(missing) = batch.dependency_missing.into_inner().unwrap_or_else(|e| e.into_inner()) {
            report.dependency_missing.get_or_insert(missing);
        }
        report
            .warnings
            .extend(batch.warnings.into_inner().unwrap_or_else(|e| e.into_inner()));
        if self.cancel_token.is_cancelled() {
            report
                .warnings
                .push("Batch cancelled before every file was processed".to_string());
        }

        report.finish();
        info!(
            renamed = report.summary.renamed,
            unchanged = report.summary.unchanged,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            "Batch complete"
        );

        Ok(report)
    }

    /// Identifier to use for this run, after the one-time dependency check
    fn active_identifier(&self, report: &mut BatchReport) -> Option<Arc<dyn RecordingIdentifier>> {
        let Some(identifier) = self.identifier.clone() else {
            warn!("Identification requested but no identifier configured");
            report
                .warnings
                .push("Identification requested but no identifier configured".to_string());
            return None;
        };

        match identifier.check_dependency() {
            Ok(()) => Some(identifier),
            Err(e) => {
                warn!(error = %e, "Identification disabled, renaming from existing tags");
                report.dependency_missing = Some(e.to_string());
                None
            }
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// State shared by the files of one run
struct Batch<'a> {
    pipeline: &'a Pipeline,
    identifier: Option<Arc<dyn RecordingIdentifier>>,
    identification_live: AtomicBool,
    reconciler: MetadataReconciler,
    artwork: ArtworkResolver,
    lyrics: LyricsResolver,
    engine: Arc<RenameEngine>,
    processed: AtomicUsize,
    total_files: usize,
    warnings: Mutex<Vec<String>>,
    dependency_missing: Mutex<Option<String>>,
}

impl Batch<'_> {
    fn config(&self) -> &PipelineConfig {
        &self.pipeline.config
    }

    async fn process(&self, file: AudioFile) -> FileReport {
        self.pipeline
            .emit(PipelineEvent::FileStarted {
                file_path: file.path.display().to_string(),
            })
            .await;

        let mut report = FileReport::new(file.path.clone(), FileOutcome::Unchanged);
        let result = if self.config().artwork_only {
            self.embed_cover_only(file, &mut report).await
        } else {
            self.enrich_and_rename(file, &mut report).await
        };
        report.outcome = result.unwrap_or_else(|e| FileOutcome::from_error(&e));

        self.finish_file(report).await
    }

    async fn finish_file(&self, report: FileReport) -> FileReport {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;

        match &report.outcome {
            FileOutcome::Failed { reason, .. } => {
                warn!(file = %report.path.display(), reason = %reason, "File failed");
            }
            FileOutcome::Skipped { reason, .. } => {
                debug!(file = %report.path.display(), reason = %reason, "File skipped");
            }
            outcome => {
                debug!(file = %report.path.display(), outcome = ?outcome, "File finished");
            }
        }

        if processed % 10 == 0 || processed == self.total_files {
            info!(
                progress = format!("{}/{}", processed, self.total_files),
                "Pipeline progress update"
            );
        }

        self.pipeline
            .emit(PipelineEvent::FileFinished {
                file_path: report.path.display().to_string(),
                outcome: report.outcome.clone(),
                processed,
                total_files: self.total_files,
            })
            .await;

        report
    }

    async fn stage(&self, file: &AudioFile, stage: Stage) {
        debug!(file = %file.path.display(), stage = %stage, "Stage completed");
        self.pipeline
            .emit(PipelineEvent::StageCompleted {
                file_path: file.path.display().to_string(),
                stage,
            })
            .await;
    }

    fn check_cancelled(&self) -> PipelineResult<()> {
        if self.pipeline.cancel_token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    async fn enrich_and_rename(
        &self,
        file: AudioFile,
        report: &mut FileReport,
    ) -> PipelineResult<FileOutcome> {
        let file = self.read_tags(file).await?;
        let snapshot = file.snapshot();

        let best = self.identify(&file).await;
        let registry = match &best {
            Some(best) => self.lookup_registry(best).await,
            None => None,
        };

        let metadata = self
            .reconciler
            .reconcile(&snapshot, best.as_ref(), registry.as_ref());
        report.identified = metadata.is_identified();
        self.stage(&file, Stage::Reconcile).await;

        let artwork = if self.wants_artwork(&metadata, &snapshot) {
            self.resolve_artwork(&file, &metadata).await
        } else {
            None
        };
        let lyrics = if self.wants_lyrics(&metadata, &snapshot) {
            self.resolve_lyrics(&file, &metadata).await
        } else {
            None
        };

        self.check_cancelled()?;

        if self.config().dry_run {
            debug!(file = %file.path.display(), "Dry run, tags not written");
        } else {
            let (has_artwork, has_lyrics) = (artwork.is_some(), lyrics.is_some());
            let outcome = self.write_tags(&file, &metadata, artwork, lyrics).await?;
            report.tags_written = outcome == WriteOutcome::Written;
            report.artwork_embedded = has_artwork;
            report.lyrics_embedded = has_lyrics;
        }

        let plan = self.engine.plan(&metadata, &file);
        let engine = Arc::clone(&self.engine);
        let target = tokio::task::spawn_blocking(move || engine.apply(&plan))
            .await
            .map_err(join_error)??;
        self.stage(&file, Stage::Rename).await;

        if target == file.path {
            Ok(FileOutcome::Unchanged)
        } else {
            Ok(FileOutcome::Renamed {
                from: file.path,
                to: target,
            })
        }
    }

    async fn embed_cover_only(
        &self,
        file: AudioFile,
        report: &mut FileReport,
    ) -> PipelineResult<FileOutcome> {
        let file = self.read_tags(file).await?;
        let snapshot = file.snapshot();

        if snapshot.has_front_cover {
            return Ok(FileOutcome::Skipped {
                kind: None,
                reason: "already has a front cover".to_string(),
            });
        }

        let asset = match self.artwork.resolve(&ArtworkQuery::from_tags(&snapshot)).await {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                return Ok(FileOutcome::Skipped {
                    kind: None,
                    reason: "no artwork found".to_string(),
                })
            }
            Err(e) => return Err(PipelineError::NetworkError(e.to_string())),
        };
        self.stage(&file, Stage::Artwork).await;

        self.check_cancelled()?;
        if self.config().dry_run {
            return Ok(FileOutcome::CoverEmbedded);
        }

        let (path, format) = (file.path.clone(), file.format);
        let outcome = tokio::task::spawn_blocking(move || tag_codec::embed_artwork(&path, format, &asset))
            .await
            .map_err(join_error)??;
        self.stage(&file, Stage::WriteTags).await;

        report.artwork_embedded = outcome == WriteOutcome::Written;
        Ok(FileOutcome::CoverEmbedded)
    }

    async fn read_tags(&self, file: AudioFile) -> PipelineResult<AudioFile> {
        if file.format == AudioFormat::Unknown {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{}: content does not match its extension",
                file.path.display()
            )));
        }

        let (path, format) = (file.path.clone(), file.format);
        let snapshot = tokio::task::spawn_blocking(move || tag_codec::read_tags(&path, format))
            .await
            .map_err(join_error)??;
        self.stage(&file, Stage::ReadTags).await;

        Ok(file.with_tags(snapshot))
    }

    /// Best fingerprint match, if identification is running
    async fn identify(&self, file: &AudioFile) -> Option<FingerprintMatch> {
        let identifier = self.identifier.as_ref()?;
        if !self.identification_live.load(Ordering::Acquire) {
            return None;
        }

        let result = identifier.identify(file).await;
        self.stage(file, Stage::Identify).await;

        match result {
            Ok(matches) => matches.into_iter().next(),
            Err(e) => {
                self.disable_identification(e);
                None
            }
        }
    }

    /// Reported once; later files skip identification
    fn disable_identification(&self, err: IdentifyError) {
        if !self.identification_live.swap(false, Ordering::AcqRel) {
            return;
        }
        warn!(error = %err, "Identification disabled for the rest of the run");

        match err {
            IdentifyError::DependencyMissing(msg) => *lock(&self.dependency_missing) = Some(msg),
            IdentifyError::InvalidApiKey => lock(&self.warnings).push(err.to_string()),
        }
    }

    async fn lookup_registry(&self, best: &FingerprintMatch) -> Option<RegistryRecord> {
        let registry = self.pipeline.registry.as_ref()?;
        if best.score < self.reconciler.min_confidence() {
            return None;
        }

        let result = with_backoff("registry_lookup", &self.pipeline.retry, || {
            registry.lookup(&best.recording_id, best.release_id.as_deref())
        })
        .await;

        match result {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    recording_id = %best.recording_id,
                    error = %e,
                    "Registry lookup failed, continuing without it"
                );
                None
            }
        }
    }

    /// Identified files, or any file when `embed_unidentified` is set
    fn wants_artwork(&self, metadata: &CanonicalMetadata, snapshot: &TagSnapshot) -> bool {
        !snapshot.has_front_cover && (metadata.is_identified() || self.config().embed_unidentified)
    }

    /// Lyrics were requested; existing synced lyrics are kept
    fn wants_lyrics(&self, metadata: &CanonicalMetadata, snapshot: &TagSnapshot) -> bool {
        let config = self.config();
        if !config.lyrics || has_synced_lyrics(snapshot) {
            return false;
        }
        self.identifier.is_none() || metadata.is_identified() || config.embed_unidentified
    }

    async fn resolve_artwork(
        &self,
        file: &AudioFile,
        metadata: &CanonicalMetadata,
    ) -> Option<Arc<ArtworkAsset>> {
        let result = self.artwork.resolve(&ArtworkQuery::from_metadata(metadata)).await;
        self.stage(file, Stage::Artwork).await;

        match result {
            Ok(asset) => asset,
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Artwork unavailable");
                None
            }
        }
    }

    async fn resolve_lyrics(
        &self,
        file: &AudioFile,
        metadata: &CanonicalMetadata,
    ) -> Option<LyricsAsset> {
        let duration = file.tags.as_ref().and_then(|t| t.duration);
        let query = LyricsQuery::from_metadata(metadata, duration)?;

        let result = self.lyrics.resolve(&query).await;
        self.stage(file, Stage::Lyrics).await;

        match result {
            Ok(asset) => asset,
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Lyrics unavailable");
                None
            }
        }
    }

    async fn write_tags(
        &self,
        file: &AudioFile,
        metadata: &CanonicalMetadata,
        artwork: Option<Arc<ArtworkAsset>>,
        lyrics: Option<LyricsAsset>,
    ) -> PipelineResult<WriteOutcome> {
        let (path, format, metadata) = (file.path.clone(), file.format, metadata.clone());
        let outcome = tokio::task::spawn_blocking(move || {
            tag_codec::write_tags(&path, format, &metadata, artwork.as_deref(), lyrics.as_ref())
        })
        .await
        .map_err(join_error)??;
        self.stage(file, Stage::WriteTags).await;

        Ok(outcome)
    }
}

fn has_synced_lyrics(snapshot: &TagSnapshot) -> bool {
    snapshot
        .lyrics
        .as_deref()
        .is_some_and(|text| !parse_lrc(text).is_empty())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn join_error(err: tokio::task::JoinError) -> PipelineError {
    PipelineError::Common(musicren_common::Error::Internal(format!(
        "Blocking task failed: {}",
        err
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_worker_count_is_clamped() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.worker_count(), DEFAULT_WORKERS);

        config.workers = 0;
        assert_eq!(config.worker_count(), 1);

        config.workers = 64;
        assert_eq!(config.worker_count(), MAX_WORKERS);
    }

    #[test]
    fn test_synced_lyrics_detection() {
        let mut snapshot = TagSnapshot::default();
        assert!(!has_synced_lyrics(&snapshot));

        snapshot.lyrics = Some("plain words only".to_string());
        assert!(!has_synced_lyrics(&snapshot));

        snapshot.lyrics = Some("[00:01.00]Timed line".to_string());
        assert!(has_synced_lyrics(&snapshot));
    }

    #[tokio::test]
    async fn test_missing_root_is_error() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let err = pipeline
            .run(Path::new("/nonexistent/musicren/root"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Common(musicren_common::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unsupported_content_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fake.mp3"), b"definitely not audio").unwrap();

        let report = Pipeline::new(PipelineConfig::default())
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(report.summary.skipped, 1);
        assert!(matches!(
            report.files[0].outcome,
            FileOutcome::Skipped {
                kind: Some(ErrorKind::UnsupportedFormat),
                ..
            }
        ));
        assert!(dir.path().join("fake.mp3").exists());
    }

    #[tokio::test]
    async fn test_cancelled_batch_dispatches_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"ID3\x04\x00\x00\x00\x00\x00\x00").unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"ID3\x04\x00\x00\x00\x00\x00\x00").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let report = Pipeline::new(PipelineConfig::default())
            .with_cancellation(token)
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(report.summary.total, 2);
        assert!(report.files.iter().all(|f| matches!(
            f.outcome,
            FileOutcome::Skipped {
                kind: Some(ErrorKind::Cancelled),
                ..
            }
        )));
        assert!(report.journal.is_empty());
    }
}
