//! Audio files discovered by the scanner

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Container format of an audio file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG audio with ID3v2 tags
    Mp3,
    /// FLAC with Vorbis comments
    Flac,
    /// MPEG-4 audio with iTunes-style atoms
    M4a,
    /// Recognised extension but the content is not a supported container
    Unknown,
}

impl AudioFormat {
    /// Map a file extension (without the dot, any case) to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "m4a" => Some(Self::M4a),
            _ => None,
        }
    }

    /// Detect the container from the first bytes of a file
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        match header {
            [b'I', b'D', b'3', ..] => Some(Self::Mp3),
            [0xFF, b1, ..] if b1 & 0xE0 == 0xE0 => Some(Self::Mp3),
            [b'f', b'L', b'a', b'C', ..] => Some(Self::Flac),
            [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some(Self::M4a),
            _ => None,
        }
    }

    /// Canonical lower-case extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            other => f.write_str(other.extension()),
        }
    }
}

/// Metadata found in a file before any enrichment
///
/// Empty or whitespace-only tag values are normalised to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSnapshot {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    /// MusicBrainz recording id written by an earlier run
    pub recording_id: Option<String>,
    /// MusicBrainz release id written by an earlier run
    pub release_id: Option<String>,
    /// Unsynchronised lyrics text (LRC text when written by us)
    pub lyrics: Option<String>,
    pub has_front_cover: bool,
    /// Audio duration reported by the container
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl TagSnapshot {
    /// True when both artist and title are present
    pub fn has_identity(&self) -> bool {
        self.artist.is_some() && self.title.is_some()
    }
}

/// A candidate audio file
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Container format detected from the file header
    pub format: AudioFormat,
    /// File size in bytes at scan time
    pub size: u64,
    /// Existing tags, filled in by the tag codec after scanning
    pub tags: Option<TagSnapshot>,
}

impl AudioFile {
    pub fn new(path: PathBuf, format: AudioFormat, size: u64) -> Self {
        Self {
            path,
            format,
            size,
            tags: None,
        }
    }

    /// Attach the snapshot read by the tag codec
    pub fn with_tags(mut self, tags: TagSnapshot) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension of the current file name including the dot, as found on disk
    pub fn dotted_extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Existing tags, or an empty snapshot when none were read
    pub fn snapshot(&self) -> TagSnapshot {
        self.tags.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping_is_case_insensitive() {
        assert_eq!(AudioFormat::from_extension("MP3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_extension("Flac"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::from_extension("m4a"), Some(AudioFormat::M4a));
        assert_eq!(AudioFormat::from_extension("ogg"), None);
        assert_eq!(AudioFormat::from_extension("wav"), None);
    }

    #[test]
    fn test_magic_detection() {
        assert_eq!(AudioFormat::from_magic(b"ID3\x04\x00"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_magic(&[0xFF, 0xFB, 0x90, 0x00]), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_magic(b"fLaC\x80\x00\x00\x22"), Some(AudioFormat::Flac));
        assert_eq!(
            AudioFormat::from_magic(b"\x00\x00\x00\x20ftypM4A "),
            Some(AudioFormat::M4a)
        );
        assert_eq!(AudioFormat::from_magic(b"RIFF\x00\x00\x00\x00WAVE"), None);
        assert_eq!(AudioFormat::from_magic(b"ab"), None);
    }

    #[test]
    fn test_dotted_extension_keeps_original_case() {
        let file = AudioFile::new(PathBuf::from("/music/Song.MP3"), AudioFormat::Mp3, 10);
        assert_eq!(file.dotted_extension(), ".MP3");
        assert!(file.snapshot().artist.is_none());
    }
}
