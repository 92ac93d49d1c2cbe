//! MP3 (ID3v2) variant
//!
//! lofty's generic tag cannot carry SYLT frames, so lyrics are written
//! with the `id3` crate on the staged copy after lofty has saved it:
//! one USLT frame with the LRC text and one SYLT frame with millisecond
//! timestamps. The USLT description stays empty so lofty maps the frame
//! back to its generic lyrics item when the file is read again.

use super::{TagCodec, TagError};
use crate::models::{AudioFormat, LyricsAsset};
use id3::frame::{Lyrics, SynchronisedLyrics, SynchronisedLyricsType, TimestampFormat};
use id3::TagLike;
use lofty::tag::{Tag, TagType};
use std::path::Path;

const LYRICS_LANG: &str = "eng";
const LYRICS_DESCRIPTION: &str = "Lyrics";

/// ID3v2 codec for MPEG audio
pub struct Id3Codec;

impl TagCodec for Id3Codec {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn tag_type(&self) -> TagType {
        TagType::Id3v2
    }

    fn embed_lyrics(&self, _tag: &mut Tag, _lyrics: &LyricsAsset) -> Result<(), TagError> {
        // Written in finalize
        Ok(())
    }

    fn finalize(&self, staged: &Path, lyrics: Option<&LyricsAsset>) -> Result<(), TagError> {
        let Some(lyrics) = lyrics else {
            return Ok(());
        };

        let mut tag = match id3::Tag::read_from_path(staged) {
            Ok(tag) => tag,
            Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => id3::Tag::new(),
            Err(e) => return Err(TagError::WriteFailed(staged.to_path_buf(), e.to_string())),
        };

        tag.remove_all_lyrics();
        tag.remove_all_synchronised_lyrics();

        tag.add_frame(Lyrics {
            lang: LYRICS_LANG.to_string(),
            description: String::new(),
            text: lyrics.to_lrc().trim_end().to_string(),
        });
        tag.add_frame(SynchronisedLyrics {
            lang: LYRICS_LANG.to_string(),
            timestamp_format: TimestampFormat::Ms,
            content_type: SynchronisedLyricsType::Lyrics,
            description: LYRICS_DESCRIPTION.to_string(),
            content: lyrics.timed_lines_ms(),
        });

        tag.write_to_path(staged, id3::Version::Id3v24)
            .map_err(|e| TagError::WriteFailed(staged.to_path_buf(), e.to_string()))?;

        tracing::debug!(
            file = %staged.display(),
            lines = lyrics.lines.len(),
            "Wrote USLT and SYLT frames"
        );
        Ok(())
    }
}
