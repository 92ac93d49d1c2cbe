//! Audio fingerprinting via the Chromaprint `fpcalc` executable
//!
//! The executable is looked up once, in this order:
//! 1. Explicit path (`--fpcalc` / `MUSICREN_FPCALC` / config file)
//! 2. Directory containing the running executable
//! 3. Each directory on `PATH`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Upper bound for one fpcalc run
const FPCALC_TIMEOUT: Duration = Duration::from_secs(60);

/// Fingerprinting errors
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("fpcalc executable not found ({0})")]
    BinaryMissing(String),

    #[error("fpcalc failed: {0}")]
    ExecutionFailed(String),

    #[error("Unexpected fpcalc output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Chromaprint fingerprint plus the duration fpcalc decoded
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// Whole seconds, as expected by AcoustID
    pub duration_secs: u64,
    /// Compressed, base64-encoded fingerprint
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct FpcalcOutput {
    duration: f64,
    fingerprint: String,
}

/// Platform executable name
pub fn fpcalc_name() -> &'static str {
    if cfg!(windows) {
        "fpcalc.exe"
    } else {
        "fpcalc"
    }
}

/// Find fpcalc without running it
pub fn find_fpcalc(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }

    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(fpcalc_name())))
        .filter(|candidate| candidate.is_file());
    if beside_exe.is_some() {
        return beside_exe;
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(fpcalc_name()))
        .find(|candidate| candidate.is_file())
}

/// Audio fingerprinter backed by fpcalc
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    binary: PathBuf,
}

impl Fingerprinter {
    /// Locate fpcalc, failing with [`FingerprintError::BinaryMissing`]
    pub fn locate(explicit: Option<&Path>) -> Result<Self, FingerprintError> {
        match find_fpcalc(explicit) {
            Some(binary) => {
                tracing::info!(fpcalc = %binary.display(), "Using fpcalc");
                Ok(Self { binary })
            }
            None => Err(FingerprintError::BinaryMissing(match explicit {
                Some(path) => format!("{} does not exist", path.display()),
                None => format!(
                    "{} is neither next to the executable nor on PATH",
                    fpcalc_name()
                ),
            })),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Generate the fingerprint of an audio file
    pub async fn fingerprint_file(&self, audio_path: &Path) -> Result<Fingerprint, FingerprintError> {
        let run = Command::new(&self.binary)
            .arg("-json")
            .arg(audio_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(FPCALC_TIMEOUT, run)
            .await
            .map_err(|_| {
                FingerprintError::ExecutionFailed(format!(
                    "timed out after {}s",
                    FPCALC_TIMEOUT.as_secs()
                ))
            })??;

        if !output.status.success() {
            return Err(FingerprintError::ExecutionFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let fingerprint = parse_fpcalc_json(&output.stdout)?;

        tracing::debug!(
            file = %audio_path.display(),
            duration_secs = fingerprint.duration_secs,
            "Fingerprint generated"
        );

        Ok(fingerprint)
    }
}

fn parse_fpcalc_json(stdout: &[u8]) -> Result<Fingerprint, FingerprintError> {
    let parsed: FpcalcOutput = serde_json::from_slice(stdout)
        .map_err(|e| FingerprintError::ParseError(e.to_string()))?;

    if parsed.fingerprint.is_empty() {
        return Err(FingerprintError::ParseError("empty fingerprint".to_string()));
    }

    Ok(Fingerprint {
        duration_secs: parsed.duration.max(0.0).round() as u64,
        fingerprint: parsed.fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fpcalc_json() {
        let fp = parse_fpcalc_json(br#"{"duration": 354.73, "fingerprint": "AQADtEmUZEkS"}"#).unwrap();
        assert_eq!(fp.duration_secs, 355);
        assert_eq!(fp.fingerprint, "AQADtEmUZEkS");
    }

    #[test]
    fn test_parse_rejects_empty_fingerprint() {
        assert!(matches!(
            parse_fpcalc_json(br#"{"duration": 10.0, "fingerprint": ""}"#),
            Err(FingerprintError::ParseError(_))
        ));
        assert!(matches!(
            parse_fpcalc_json(b"ERROR: unable to open file"),
            Err(FingerprintError::ParseError(_))
        ));
    }

    #[test]
    fn test_explicit_missing_binary() {
        let err = Fingerprinter::locate(Some(Path::new("/nonexistent/fpcalc"))).unwrap_err();
        assert!(matches!(err, FingerprintError::BinaryMissing(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fingerprint_with_stub_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let stub = dir.path().join("fpcalc");
        std::fs::write(
            &stub,
            "#!/bin/sh\necho '{\"duration\": 12.2, \"fingerprint\": \"AQAAstub\"}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fingerprinter = Fingerprinter::locate(Some(&stub)).unwrap();
        let fp = fingerprinter
            .fingerprint_file(Path::new("/any/file.mp3"))
            .await
            .unwrap();

        assert_eq!(fp.duration_secs, 12);
        assert_eq!(fp.fingerprint, "AQAAstub");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_executable_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let stub = dir.path().join("fpcalc");
        std::fs::write(&stub, "#!/bin/sh\necho 'ERROR: could not decode' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fingerprinter = Fingerprinter::locate(Some(&stub)).unwrap();
        match fingerprinter.fingerprint_file(Path::new("/any/file.mp3")).await {
            Err(FingerprintError::ExecutionFailed(msg)) => assert!(msg.contains("could not decode")),
            other => panic!("expected ExecutionFailed, got {:?}", other),
        }
    }
}
