//! musicren library interface
//!
//! Exposes the pipeline components for the binary and for integration tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::error::{ErrorKind, PipelineError, PipelineResult};
pub use crate::workflow::{BatchReport, ExitStatus, Pipeline, PipelineConfig};
