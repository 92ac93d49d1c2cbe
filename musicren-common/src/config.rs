//! Configuration loading and setting resolution
//!
//! Every tunable follows the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "MUSICREN_CONFIG";

/// Configuration file contents
///
/// All fields are optional; anything left out falls through to the
/// compiled default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// AcoustID application key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acoustid_api_key: Option<String>,

    /// Minimum fingerprint match score accepted (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,

    /// Number of files processed concurrently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Maximum directory recursion depth (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// File naming template, e.g. `"{artist} - {title}{ext}"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Embed artwork/lyrics for files that were not identified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_unidentified: Option<bool>,

    /// Explicit path to the fpcalc executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpcalc_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for external services
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bounded retry policy for external service calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubled for each further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    2000
}

/// Where a resolved setting came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Cli,
    Environment,
    Toml,
    Default,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingSource::Cli => "command line",
            SettingSource::Environment => "environment",
            SettingSource::Toml => "TOML config",
            SettingSource::Default => "built-in default",
        };
        f.write_str(name)
    }
}

/// Resolve one setting from its four possible sources
///
/// Environment values that fail to parse are ignored with a warning.
/// When more than one explicit source provides a value the highest
/// priority wins and a warning lists all of them.
pub fn resolve_setting<T>(
    name: &str,
    cli: Option<T>,
    env_var_name: &str,
    toml: Option<T>,
    default: T,
) -> (T, SettingSource)
where
    T: FromStr + fmt::Debug,
{
    let env = match std::env::var(env_var_name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    setting = name,
                    env_var = env_var_name,
                    value = %raw,
                    "Ignoring unparseable environment value"
                );
                None
            }
        },
        _ => None,
    };

    let mut sources = Vec::new();
    if cli.is_some() {
        sources.push(SettingSource::Cli);
    }
    if env.is_some() {
        sources.push(SettingSource::Environment);
    }
    if toml.is_some() {
        sources.push(SettingSource::Toml);
    }

    if sources.len() > 1 {
        let names: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        warn!(
            "Setting '{}' found in multiple sources: {}. Using {} (highest priority).",
            name,
            names.join(", "),
            sources[0]
        );
    }

    let (value, source) = if let Some(v) = cli {
        (v, SettingSource::Cli)
    } else if let Some(v) = env {
        (v, SettingSource::Environment)
    } else if let Some(v) = toml {
        (v, SettingSource::Toml)
    } else {
        (default, SettingSource::Default)
    };

    debug!(setting = name, source = %source, value = ?value, "Resolved setting");
    (value, source)
}

/// Locate the configuration file
///
/// Priority: explicit path > `MUSICREN_CONFIG` > `<config_dir>/musicren/config.toml`.
/// Returns `None` only when no platform config directory exists.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Platform default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("musicren").join("config.toml"))
}

/// Load configuration from a TOML file
///
/// A missing file yields the default configuration; a file that exists
/// but cannot be read or parsed is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write configuration to a TOML file atomically
///
/// Serialises to a temp file in the destination directory and renames it
/// over the target, creating parent directories as needed.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| Error::Config(format!("Write {} failed: {}", path.display(), e.error)))?;

    Ok(())
}

/// User-Agent sent to every external service
pub fn get_user_agent() -> String {
    format!(
        "musicren/{} ( https://github.com/musicren/musicren )",
        env!("CARGO_PKG_VERSION")
    )
}
