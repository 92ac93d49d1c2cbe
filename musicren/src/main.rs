//! musicren - audio file enrichment and renaming
//!
//! Scans a directory, optionally identifies each file by acoustic
//! fingerprint, reconciles metadata, embeds artwork and synchronised lyrics
//! and renames the file from its canonical metadata.
//!
//! Exit codes: 0 every file processed, 1 some files skipped or failed,
//! 2 identification requested but fpcalc is missing.

use anyhow::{Context, Result};
use clap::Parser;
use musicren::cli::Cli;
use musicren::config::{self, Settings};
use musicren::services::{
    ArtworkResolver, FingerprintIdentifier, LyricsResolver, MusicBrainzClient, NameTemplate,
    RenameEngine,
};
use musicren::workflow::{BatchReport, FileOutcome, Pipeline, PipelineEvent};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config_path, toml) =
        config::load_file_config(&cli).context("Failed to load configuration")?;
    init_tracing(&cli, &toml.logging.level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting musicren"
    );

    let settings = Settings::resolve(&cli, config_path, toml).context("Invalid settings")?;

    if cli.save_config {
        return save_config(&settings);
    }
    if let Some(report_path) = &cli.undo {
        return undo_from_report(report_path, cli.dry_run);
    }

    let pipeline = build_pipeline(&settings)?;

    let cancel_token = CancellationToken::new();
    let interrupt_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing files already in progress");
            interrupt_token.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let event_logger = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    let pipeline = pipeline
        .with_events(event_tx)
        .with_cancellation(cancel_token);
    let result = pipeline.run(&cli.directory).await;
    drop(pipeline);
    let _ = event_logger.await;

    let report = result.with_context(|| format!("Cannot process {}", cli.directory.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    Ok(exit_code(report.exit_status().code()))
}

/// Level precedence: -v/-q > RUST_LOG > `[logging] level` > info
fn init_tracing(cli: &Cli, toml_level: &str) {
    let directives = |level: &str| format!("warn,musicren={level},musicren_common={level}");

    let filter = match cli.log_level() {
        Some(level) => EnvFilter::new(directives(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(toml_level))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let config = &settings.pipeline;
    let mut pipeline = Pipeline::new(config.clone()).with_retry(settings.retry);

    if config.identify {
        let identifier = FingerprintIdentifier::new(
            settings.fpcalc.as_deref(),
            settings.acoustid_api_key.clone(),
            config.min_confidence,
            settings.retry,
        )
        .context("Failed to create AcoustID client")?;
        let registry = MusicBrainzClient::new().context("Failed to create MusicBrainz client")?;

        pipeline = pipeline
            .with_identifier(Arc::new(identifier))
            .with_registry(Arc::new(registry));
    }

    let artwork_providers =
        ArtworkResolver::default_providers().context("Failed to create artwork clients")?;
    pipeline = pipeline.with_artwork_providers(artwork_providers);

    if config.lyrics {
        let lyrics_providers =
            LyricsResolver::default_providers().context("Failed to create lyrics client")?;
        pipeline = pipeline.with_lyrics_providers(lyrics_providers);
    }

    Ok(pipeline)
}

fn save_config(settings: &Settings) -> Result<ExitCode> {
    let path = settings
        .config_path
        .as_deref()
        .context("No config location available; pass --config PATH")?;

    musicren_common::config::write_toml_config(&settings.to_toml(), path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "Settings saved");
    Ok(ExitCode::SUCCESS)
}

/// Replay a saved report's rename journal backwards
fn undo_from_report(report_path: &Path, dry_run: bool) -> Result<ExitCode> {
    let content = std::fs::read_to_string(report_path)
        .with_context(|| format!("Failed to read {}", report_path.display()))?;
    let report: BatchReport = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a musicren JSON report", report_path.display()))?;

    let engine = RenameEngine::new(NameTemplate::default(), dry_run);
    let mut restored = 0;
    for result in engine.undo(&report.journal) {
        match result {
            Ok(record) => {
                restored += 1;
                info!(from = %record.from.display(), to = %record.to.display(), "Restored");
            }
            Err(e) => warn!(error = %e, "Undo failed"),
        }
    }

    println!("Restored {} of {} renamed files", restored, report.journal.len());
    let code = if restored == report.journal.len() { 0 } else { 1 };
    Ok(exit_code(code))
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::BatchStarted { total_files, .. } => {
            info!(files = total_files, "Scan complete");
        }
        PipelineEvent::FileStarted { file_path } => {
            debug!(file = %file_path, "Processing");
        }
        PipelineEvent::StageCompleted { file_path, stage } => {
            trace!(file = %file_path, stage = %stage, "Stage completed");
        }
        PipelineEvent::FileFinished {
            file_path,
            outcome,
            processed,
            total_files,
        } => {
            let progress = format!("{}/{}", processed, total_files);
            match outcome {
                FileOutcome::Renamed { to, .. } => {
                    info!(progress = %progress, file = %file_path, to = %to.display(), "Renamed");
                }
                FileOutcome::Unchanged => {
                    info!(progress = %progress, file = %file_path, "Already named correctly");
                }
                FileOutcome::CoverEmbedded => {
                    info!(progress = %progress, file = %file_path, "Cover embedded");
                }
                FileOutcome::Skipped { reason, .. } => {
                    info!(progress = %progress, file = %file_path, reason = %reason, "Skipped");
                }
                FileOutcome::Failed { reason, .. } => {
                    info!(progress = %progress, file = %file_path, reason = %reason, "Failed");
                }
            }
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
