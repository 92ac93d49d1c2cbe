//! Fingerprint identification
//!
//! Combines the local fpcalc fingerprinter with the AcoustID lookup service.
//! Only a missing fpcalc or a rejected API key surface as errors; every other
//! failure is logged and reported as "no match" for that file.

use crate::error::PipelineError;
use crate::models::{AudioFile, FingerprintMatch};
use crate::services::acoustid_client::{ranked_matches, AcoustIDClient, AcoustIDError};
use crate::services::fingerprinter::{FingerprintError, Fingerprinter};
use crate::utils::retry::with_backoff;
use async_trait::async_trait;
use musicren_common::config::RetryConfig;
use std::path::Path;
use thiserror::Error;

/// Identification errors that stop identification for the whole run
#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    #[error("AcoustID rejected the API key")]
    InvalidApiKey,
}

impl From<IdentifyError> for PipelineError {
    fn from(err: IdentifyError) -> Self {
        match err {
            IdentifyError::DependencyMissing(msg) => PipelineError::DependencyMissing(msg),
            IdentifyError::InvalidApiKey => PipelineError::NetworkError(err.to_string()),
        }
    }
}

/// Acoustic identification of audio files
#[async_trait]
pub trait RecordingIdentifier: Send + Sync {
    /// Verify that everything needed to identify files is installed
    fn check_dependency(&self) -> Result<(), PipelineError>;

    /// Ranked matches at or above the minimum confidence, best first
    async fn identify(&self, file: &AudioFile) -> Result<Vec<FingerprintMatch>, IdentifyError>;
}

/// fpcalc + AcoustID identifier
pub struct FingerprintIdentifier {
    fingerprinter: Result<Fingerprinter, String>,
    client: AcoustIDClient,
    min_confidence: f64,
    retry: RetryConfig,
}

impl FingerprintIdentifier {
    /// Locate fpcalc and build the AcoustID client
    ///
    /// A missing fpcalc does not fail construction; it is reported by
    /// [`RecordingIdentifier::check_dependency`].
    pub fn new(
        fpcalc: Option<&Path>,
        api_key: String,
        min_confidence: f64,
        retry: RetryConfig,
    ) -> Result<Self, AcoustIDError> {
        Ok(Self::with_parts(
            Fingerprinter::locate(fpcalc),
            AcoustIDClient::new(api_key)?,
            min_confidence,
            retry,
        ))
    }

    pub fn with_parts(
        fingerprinter: Result<Fingerprinter, FingerprintError>,
        client: AcoustIDClient,
        min_confidence: f64,
        retry: RetryConfig,
    ) -> Self {
        Self {
            fingerprinter: fingerprinter.map_err(|e| e.to_string()),
            client,
            min_confidence,
            retry,
        }
    }
}

#[async_trait]
impl RecordingIdentifier for FingerprintIdentifier {
    fn check_dependency(&self) -> Result<(), PipelineError> {
        match &self.fingerprinter {
            Ok(_) => Ok(()),
            Err(msg) => Err(PipelineError::DependencyMissing(msg.clone())),
        }
    }

    async fn identify(&self, file: &AudioFile) -> Result<Vec<FingerprintMatch>, IdentifyError> {
        let fingerprinter = self
            .fingerprinter
            .as_ref()
            .map_err(|msg| IdentifyError::DependencyMissing(msg.clone()))?;

        let fingerprint = match fingerprinter.fingerprint_file(file.path()).await {
            Ok(fp) => fp,
            Err(FingerprintError::BinaryMissing(msg)) => {
                return Err(IdentifyError::DependencyMissing(msg));
            }
            Err(e) => {
                tracing::warn!(file = %file.path().display(), error = %e, "Fingerprinting failed");
                return Ok(Vec::new());
            }
        };

        let response = with_backoff("acoustid_lookup", &self.retry, || {
            self.client
                .lookup(&fingerprint.fingerprint, fingerprint.duration_secs)
        })
        .await;

        match response {
            Ok(response) => {
                let matches = ranked_matches(&response, self.min_confidence);
                tracing::debug!(
                    file = %file.path().display(),
                    matches = matches.len(),
                    best_score = matches.first().map(|m| m.score),
                    "Identification complete"
                );
                Ok(matches)
            }
            Err(AcoustIDError::InvalidApiKey) => Err(IdentifyError::InvalidApiKey),
            Err(e) => {
                tracing::warn!(
                    file = %file.path().display(),
                    error = %e,
                    "AcoustID unavailable, continuing without a match"
                );
                Ok(Vec::new())
            }
        }
    }
}
