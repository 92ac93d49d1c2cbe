//! Settings resolution for musicren
//!
//! Every setting is resolved with CLI → ENV → TOML → default priority via
//! [`musicren_common::config::resolve_setting`]; a value found in more than
//! one source logs a warning naming them.

use crate::cli::Cli;
use crate::services::acoustid_client::DEFAULT_API_KEY;
use crate::services::metadata_reconciler::DEFAULT_MIN_CONFIDENCE;
use crate::services::rename_engine::{NameTemplate, DEFAULT_TEMPLATE};
use crate::workflow::pipeline::{PipelineConfig, DEFAULT_WORKERS, MAX_WORKERS};
use musicren_common::config::{
    load_toml_config, resolve_config_path, resolve_setting, RetryConfig, SettingSource, TomlConfig,
};
use musicren_common::{Error, Result};
use std::path::PathBuf;
use tracing::{info, warn};

pub const ACOUSTID_KEY_ENV: &str = "MUSICREN_ACOUSTID_KEY";
pub const WORKERS_ENV: &str = "MUSICREN_WORKERS";
pub const MAX_DEPTH_ENV: &str = "MUSICREN_MAX_DEPTH";
pub const MIN_CONFIDENCE_ENV: &str = "MUSICREN_MIN_CONFIDENCE";
pub const TEMPLATE_ENV: &str = "MUSICREN_TEMPLATE";
pub const EMBED_UNIDENTIFIED_ENV: &str = "MUSICREN_EMBED_UNIDENTIFIED";
pub const FPCALC_ENV: &str = "MUSICREN_FPCALC";

/// Locate and load the config file named by `--config`, `MUSICREN_CONFIG`
/// or the platform default
///
/// Runs before logging is initialised, so it only reports through its result.
pub fn load_file_config(cli: &Cli) -> Result<(Option<PathBuf>, TomlConfig)> {
    let path = resolve_config_path(cli.config.as_deref());
    let toml = match &path {
        Some(path) => load_toml_config(path)?,
        None => TomlConfig::default(),
    };
    Ok((path, toml))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the AcoustID key
///
/// **Priority:** CLI → ENV → TOML → public application key
pub fn resolve_acoustid_api_key(cli_key: Option<&str>, toml: &TomlConfig) -> String {
    let (key, source) = resolve_setting(
        "acoustid_api_key",
        cli_key.filter(|k| is_valid_key(k)).map(str::to_string),
        ACOUSTID_KEY_ENV,
        toml.acoustid_api_key.clone().filter(|k| is_valid_key(k)),
        DEFAULT_API_KEY.to_string(),
    );

    if source == SettingSource::Default {
        info!("Using the public AcoustID application key");
    } else {
        info!("AcoustID API key loaded from {}", source);
    }
    key
}

/// Effective settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Config file consulted (may not exist)
    pub config_path: Option<PathBuf>,
    pub acoustid_api_key: String,
    pub fpcalc: Option<PathBuf>,
    /// Template as written by the user, kept for `--save-config`
    pub template_source: String,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(cli: &Cli, config_path: Option<PathBuf>, toml: TomlConfig) -> Result<Self> {
        let acoustid_api_key = resolve_acoustid_api_key(cli.acoustid_key.as_deref(), &toml);

        let (workers, _) = resolve_setting("workers", cli.workers, WORKERS_ENV, toml.workers, DEFAULT_WORKERS);
        if !(1..=MAX_WORKERS).contains(&workers) {
            warn!(
                workers,
                max = MAX_WORKERS,
                "Worker count out of range, clamping"
            );
        }
        let workers = workers.clamp(1, MAX_WORKERS);

        let (min_confidence, _) = resolve_setting(
            "min_confidence",
            cli.min_confidence,
            MIN_CONFIDENCE_ENV,
            toml.min_confidence,
            DEFAULT_MIN_CONFIDENCE,
        );
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(Error::InvalidInput(format!(
                "min_confidence must be between 0.0 and 1.0, got {}",
                min_confidence
            )));
        }

        let (max_depth, depth_source) =
            resolve_setting("max_depth", cli.max_depth, MAX_DEPTH_ENV, toml.max_depth, usize::MAX);
        let max_depth = (depth_source != SettingSource::Default).then_some(max_depth);

        let (template_source, _) = resolve_setting(
            "template",
            cli.template.clone(),
            TEMPLATE_ENV,
            toml.template.clone(),
            DEFAULT_TEMPLATE.to_string(),
        );
        let template = NameTemplate::parse(&template_source)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let (embed_unidentified, _) = resolve_setting(
            "embed_unidentified",
            cli.embed_unidentified.then_some(true),
            EMBED_UNIDENTIFIED_ENV,
            toml.embed_unidentified,
            false,
        );

        let (fpcalc, fpcalc_source) = resolve_setting(
            "fpcalc_path",
            cli.fpcalc.clone(),
            FPCALC_ENV,
            toml.fpcalc_path.clone(),
            PathBuf::new(),
        );
        let fpcalc = (fpcalc_source != SettingSource::Default).then_some(fpcalc);

        let pipeline = PipelineConfig {
            identify: cli.recognition,
            lyrics: cli.lyrics,
            artwork_only: cli.only_covers,
            embed_unidentified,
            dry_run: cli.dry_run,
            template,
            workers,
            min_confidence,
            max_depth,
        };

        Ok(Self {
            config_path,
            acoustid_api_key,
            fpcalc,
            template_source,
            pipeline,
            retry: toml.retry,
            log_level: toml.logging.level,
        })
    }

    /// Settings as they would be written by `--save-config`
    ///
    /// The public AcoustID key is left out so a later change of the
    /// built-in key takes effect.
    pub fn to_toml(&self) -> TomlConfig {
        let mut config = TomlConfig {
            acoustid_api_key: (self.acoustid_api_key != DEFAULT_API_KEY)
                .then(|| self.acoustid_api_key.clone()),
            min_confidence: Some(self.pipeline.min_confidence),
            workers: Some(self.pipeline.workers),
            max_depth: self.pipeline.max_depth,
            template: Some(self.template_source.clone()),
            embed_unidentified: Some(self.pipeline.embed_unidentified),
            fpcalc_path: self.fpcalc.clone(),
            retry: self.retry,
            ..Default::default()
        };
        config.logging.level = self.log_level.clone();
        config
    }
}
