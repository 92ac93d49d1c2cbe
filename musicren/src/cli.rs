//! Command-line arguments
//!
//! Flags that also exist in the config file are optional here so that
//! [`crate::config::Settings`] can tell "not given" from an explicit value.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Command-line arguments for musicren
#[derive(Parser, Debug, Clone)]
#[command(name = "musicren")]
#[command(about = "Identify, tag and rename audio files")]
#[command(version)]
pub struct Cli {
    /// Directory to process
    #[arg(short = 'd', long = "directory", value_name = "DIR", default_value = ".")]
    pub directory: PathBuf,

    /// Search and embed synchronised lyrics
    #[arg(short = 'l', long)]
    pub lyrics: bool,

    /// Identify files by acoustic fingerprint (requires fpcalc)
    #[arg(short = 'r', long)]
    pub recognition: bool,

    /// AcoustID application key
    #[arg(long = "acoustid-key", value_name = "KEY")]
    pub acoustid_key: Option<String>,

    /// Only embed missing cover art; no identification, lyrics or rename
    #[arg(long = "only-covers", conflicts_with_all = ["lyrics", "recognition"])]
    pub only_covers: bool,

    /// Embed artwork even for files identification did not recognise
    #[arg(long)]
    pub embed_unidentified: bool,

    /// Files processed concurrently (1-8)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Maximum directory recursion depth
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Minimum fingerprint match score (0.0-1.0)
    #[arg(long, value_name = "F")]
    pub min_confidence: Option<f64>,

    /// File name template, e.g. "{track} {artist} - {title}{ext}"
    #[arg(long, value_name = "TEMPLATE")]
    pub template: Option<String>,

    /// Path to the fpcalc executable
    #[arg(long, value_name = "PATH")]
    pub fpcalc: Option<PathBuf>,

    /// Show what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the batch report as JSON
    #[arg(long)]
    pub json: bool,

    /// Config file (default: <config dir>/musicren/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective settings to the config file and exit
    #[arg(long)]
    pub save_config: bool,

    /// Undo the renames recorded in a JSON report and exit
    #[arg(long, value_name = "REPORT", conflicts_with_all = ["only_covers", "recognition", "lyrics", "save_config"])]
    pub undo: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Log level requested on the command line, if any
    pub fn log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}
