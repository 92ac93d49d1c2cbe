//! Test Helper Utilities
//!
//! Shared fixtures and fake services for the musicren integration tests

#![allow(dead_code)]

pub mod audio_fixtures;
pub mod fake_services;

pub use audio_fixtures::{file_names, front_cover, png_bytes, read_tags, tagged, untagged};
pub use fake_services::{
    fingerprint_match, registry_record, FakeArtwork, FakeIdentifier, FakeLyrics, FakeRegistry,
};

use musicren::workflow::PipelineConfig;
use musicren_common::config::RetryConfig;

/// Three attempts with millisecond backoff
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// Test defaults: no identification, no lyrics, four workers
pub fn config() -> PipelineConfig {
    PipelineConfig::default()
}
