//! Artwork and lyrics fetched for a file

use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

/// Cover image for a release
///
/// Shared read-only between every file of the same release once cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtworkAsset {
    /// Release identifier, or the artist/album key for releases without one
    pub release_id: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    /// MIME type detected from the image bytes
    pub mime: String,
    /// Provider that supplied the image
    pub provider: String,
}

/// One timed line of synchronised lyrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LyricLine {
    pub timestamp: Duration,
    pub text: String,
}

/// Synchronised lyrics for one track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LyricsAsset {
    /// Lines ordered by timestamp
    pub lines: Vec<LyricLine>,
    pub provider: String,
    /// Match confidence (0.0 to 1.0)
    pub confidence: f64,
}

impl LyricsAsset {
    /// Render as LRC text (`[mm:ss.xx]line`)
    pub fn to_lrc(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let centis = line.timestamp.as_millis() / 10;
            let minutes = centis / 6000;
            let seconds = (centis / 100) % 60;
            let hundredths = centis % 100;
            // Writing to a String cannot fail
            let _ = writeln!(out, "[{:02}:{:02}.{:02}]{}", minutes, seconds, hundredths, line.text);
        }
        out
    }

    /// Lines as (milliseconds, text) pairs for SYLT-style frames
    pub fn timed_lines_ms(&self) -> Vec<(u32, String)> {
        self.lines
            .iter()
            .map(|l| {
                let ms = u32::try_from(l.timestamp.as_millis()).unwrap_or(u32::MAX);
                (ms, l.text.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lrc_rendering() {
        let lyrics = LyricsAsset {
            lines: vec![
                LyricLine {
                    timestamp: Duration::from_millis(0),
                    text: "Is this the real life?".to_string(),
                },
                LyricLine {
                    timestamp: Duration::from_millis(65_430),
                    text: "Is this just fantasy?".to_string(),
                },
            ],
            provider: "test".to_string(),
            confidence: 1.0,
        };

        assert_eq!(
            lyrics.to_lrc(),
            "[00:00.00]Is this the real life?\n[01:05.43]Is this just fantasy?\n"
        );
        assert_eq!(lyrics.timed_lines_ms()[1], (65_430, "Is this just fantasy?".to_string()));
    }
}
