//! # musicren common library
//!
//! Shared code for the musicren crates:
//! - Error type used across crate boundaries
//! - TOML configuration model, file location and write-back
//! - Setting resolution (CLI > environment > TOML > default)

pub mod config;
pub mod error;

pub use error::{Error, Result};
