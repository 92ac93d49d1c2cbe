//! Tag codec
//!
//! Uniform read/write of metadata fields, cover art and lyrics across the
//! supported containers. [`TagCodec`] is the capability interface; one
//! variant per container overrides whatever its format does differently.
//!
//! Writes are all-or-nothing: the tag is saved into a copy of the file in
//! the same directory, which then replaces the original with a single
//! rename. Any failure drops the copy and leaves the original untouched.

mod id3_codec;
mod mp4_codec;
mod vorbis_codec;

pub use id3_codec::Id3Codec;
pub use mp4_codec::Mp4Codec;
pub use vorbis_codec::VorbisCodec;

use crate::error::PipelineError;
use crate::models::{
    ArtworkAsset, AudioFormat, CanonicalMetadata, FieldSource, LyricsAsset, TagSnapshot,
};
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tag codec errors
#[derive(Debug, Error)]
pub enum TagError {
    /// Container could not be parsed
    #[error("Unreadable container {0}: {1}")]
    Unreadable(PathBuf, String),

    /// Format or asset not supported by this container
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Write failed; the original file was left unmodified
    #[error("Write failed for {0}: {1}")]
    WriteFailed(PathBuf, String),

    /// I/O error (file read)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TagError> for PipelineError {
    fn from(err: TagError) -> Self {
        match err {
            TagError::Unreadable(..) | TagError::UnsupportedFormat(_) => {
                PipelineError::UnsupportedFormat(err.to_string())
            }
            TagError::WriteFailed(..) | TagError::Io(_) => {
                PipelineError::TagWriteError(err.to_string())
            }
        }
    }
}

/// Result of a tag write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// File content replaced
    Written,
    /// Tags already matched; file not touched
    Unchanged,
}

/// Per-container tag handling
///
/// Default methods operate on lofty's format-neutral [`Tag`]; variants
/// override the capabilities whose rules differ for their container.
pub trait TagCodec: Send + Sync {
    /// Container handled by this codec
    fn format(&self) -> AudioFormat;

    /// lofty tag type written into the container
    fn tag_type(&self) -> TagType;

    /// Read descriptive fields from a tag
    fn read_fields(&self, tag: &Tag) -> TagSnapshot {
        read_common_fields(tag)
    }

    /// Write canonical fields into a tag
    fn write_fields(&self, tag: &mut Tag, metadata: &CanonicalMetadata) {
        write_common_fields(tag, metadata);
    }

    /// Whether a stored picture counts as the front cover
    fn is_front_cover(&self, picture: &Picture) -> bool {
        picture.pic_type() == PictureType::CoverFront
    }

    /// Replace the front cover
    fn embed_image(&self, tag: &mut Tag, artwork: &ArtworkAsset) -> Result<(), TagError> {
        let mime = picture_mime(&artwork.mime)?;
        replace_front_cover(tag, mime, &artwork.data);
        Ok(())
    }

    /// Store synced lyrics as LRC text
    fn embed_lyrics(&self, tag: &mut Tag, lyrics: &LyricsAsset) -> Result<(), TagError> {
        tag.insert_text(ItemKey::Lyrics, lyrics.to_lrc());
        Ok(())
    }

    /// Format-specific work on the staged copy after lofty saved it
    fn finalize(&self, _staged: &Path, _lyrics: Option<&LyricsAsset>) -> Result<(), TagError> {
        Ok(())
    }
}

static ID3: Id3Codec = Id3Codec;
static VORBIS: VorbisCodec = VorbisCodec;
static MP4: Mp4Codec = Mp4Codec;

/// Select the codec for a detected container format
pub fn codec_for(format: AudioFormat) -> Result<&'static dyn TagCodec, TagError> {
    match format {
        AudioFormat::Mp3 => Ok(&ID3),
        AudioFormat::Flac => Ok(&VORBIS),
        AudioFormat::M4a => Ok(&MP4),
        AudioFormat::Unknown => Err(TagError::UnsupportedFormat(
            "content does not match a supported container".to_string(),
        )),
    }
}

/// Read the existing tags and duration of a file
pub fn read_tags(path: &Path, format: AudioFormat) -> Result<TagSnapshot, TagError> {
    let codec = codec_for(format)?;
    let tagged_file = open(path)?;

    let mut snapshot = tagged_file
        .tag(codec.tag_type())
        .or_else(|| tagged_file.primary_tag())
        .or_else(|| tagged_file.first_tag())
        .map(|tag| codec.read_fields(tag))
        .unwrap_or_default();

    let duration = tagged_file.properties().duration();
    if !duration.is_zero() {
        snapshot.duration = Some(duration);
    }

    tracing::debug!(
        file = %path.display(),
        format = %format,
        artist = ?snapshot.artist,
        title = ?snapshot.title,
        "Read existing tags"
    );

    Ok(snapshot)
}

/// Write canonical metadata and optional assets into a file
///
/// Returns [`WriteOutcome::Unchanged`] without touching the file when the
/// tags already hold the same values. Every failure is reported as
/// [`TagError::WriteFailed`] and leaves the file byte-identical.
pub fn write_tags(
    path: &Path,
    format: AudioFormat,
    metadata: &CanonicalMetadata,
    artwork: Option<&ArtworkAsset>,
    lyrics: Option<&LyricsAsset>,
) -> Result<WriteOutcome, TagError> {
    stage_and_replace(path, format, Some(metadata), artwork, lyrics).map_err(|e| as_write_failure(path, e))
}

/// Embed a front cover without touching any other tag field
pub fn embed_artwork(
    path: &Path,
    format: AudioFormat,
    artwork: &ArtworkAsset,
) -> Result<WriteOutcome, TagError> {
    stage_and_replace(path, format, None, Some(artwork), None).map_err(|e| as_write_failure(path, e))
}

fn as_write_failure(path: &Path, err: TagError) -> TagError {
    match err {
        TagError::WriteFailed(..) => err,
        other => TagError::WriteFailed(path.to_path_buf(), other.to_string()),
    }
}

fn stage_and_replace(
    path: &Path,
    format: AudioFormat,
    metadata: Option<&CanonicalMetadata>,
    artwork: Option<&ArtworkAsset>,
    lyrics: Option<&LyricsAsset>,
) -> Result<WriteOutcome, TagError> {
    let codec = codec_for(format)?;
    let mut tagged_file = open(path)?;
    let tag = tag_for_write(&mut tagged_file, codec.tag_type(), path)?;

    let before = codec.read_fields(tag);
    if let Some(metadata) = metadata {
        codec.write_fields(tag, metadata);
    }
    let mut changed = codec.read_fields(tag) != before;

    if let Some(artwork) = artwork {
        if !has_cover(codec, tag, &artwork.data) {
            codec.embed_image(tag, artwork)?;
            changed = true;
        }
    }

    let lyrics = lyrics.filter(|l| before.lyrics.as_deref() != Some(l.to_lrc().trim()));
    if let Some(lyrics) = lyrics {
        codec.embed_lyrics(tag, lyrics)?;
        changed = true;
    }

    if !changed {
        tracing::debug!(file = %path.display(), "Tags already up to date");
        return Ok(WriteOutcome::Unchanged);
    }

    let mut expected = codec.read_fields(tag);
    if let Some(lyrics) = lyrics {
        expected.lyrics = Some(lyrics.to_lrc().trim().to_string());
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let staged = tempfile::Builder::new()
        .prefix(".musicren-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(dir)?;
    std::fs::copy(path, staged.path())?;

    tag.save_to_path(staged.path(), WriteOptions::default())
        .map_err(|e| TagError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    codec.finalize(staged.path(), lyrics)?;
    verify_staged(codec, staged.path(), &expected)
        .map_err(|reason| TagError::WriteFailed(path.to_path_buf(), reason))?;

    staged
        .persist(path)
        .map_err(|e| TagError::WriteFailed(path.to_path_buf(), e.error.to_string()))?;

    tracing::debug!(
        file = %path.display(),
        artwork = artwork.is_some(),
        lyrics = lyrics.is_some(),
        "Tags written"
    );

    Ok(WriteOutcome::Written)
}

/// Read the staged copy back; the original is only replaced when every
/// field came back as written
fn verify_staged(codec: &dyn TagCodec, staged: &Path, expected: &TagSnapshot) -> Result<(), String> {
    let tagged_file = open(staged).map_err(|e| format!("written file is unreadable: {}", e))?;
    let found = tagged_file
        .tag(codec.tag_type())
        .map(|tag| codec.read_fields(tag))
        .unwrap_or_default();

    if &found != expected {
        tracing::warn!(
            file = %staged.display(),
            expected = ?expected,
            found = ?found,
            "Tags did not read back as written"
        );
        return Err("tags did not read back as written".to_string());
    }
    Ok(())
}

fn open(path: &Path) -> Result<TaggedFile, TagError> {
    Probe::open(path)
        .map_err(|e| TagError::Unreadable(path.to_path_buf(), e.to_string()))?
        .read()
        .map_err(|e| TagError::Unreadable(path.to_path_buf(), e.to_string()))
}

/// Get the tag of the requested type, inserting an empty one if missing
fn tag_for_write<'a>(
    tagged_file: &'a mut TaggedFile,
    tag_type: TagType,
    path: &Path,
) -> Result<&'a mut Tag, TagError> {
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    tagged_file.tag_mut(tag_type).ok_or_else(|| {
        TagError::UnsupportedFormat(format!(
            "{} cannot hold {:?} tags",
            path.display(),
            tag_type
        ))
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Field mapping shared by every container (lofty translates item keys)
pub(crate) fn read_common_fields(tag: &Tag) -> TagSnapshot {
    let date = non_empty(tag.get_string(&ItemKey::RecordingDate))
        .or_else(|| tag.year().map(|y| y.to_string()));

    TagSnapshot {
        artist: non_empty(tag.artist().as_deref()),
        title: non_empty(tag.title().as_deref()),
        album: non_empty(tag.album().as_deref()),
        album_artist: non_empty(tag.get_string(&ItemKey::AlbumArtist)),
        date,
        genre: non_empty(tag.genre().as_deref()),
        composer: non_empty(tag.get_string(&ItemKey::Composer)),
        track_number: tag.track(),
        track_total: tag.track_total(),
        disc_number: tag.disk(),
        disc_total: tag.disk_total(),
        recording_id: non_empty(tag.get_string(&ItemKey::MusicBrainzRecordingId)),
        release_id: non_empty(tag.get_string(&ItemKey::MusicBrainzReleaseId)),
        lyrics: non_empty(tag.get_string(&ItemKey::Lyrics)),
        has_front_cover: tag
            .pictures()
            .iter()
            .any(|p| p.pic_type() == PictureType::CoverFront),
        duration: None,
    }
}

/// Placeholder artist/title values are never written into the file
pub(crate) fn write_common_fields(tag: &mut Tag, metadata: &CanonicalMetadata) {
    if metadata.artist.source != FieldSource::Placeholder {
        tag.set_artist(metadata.artist.value.clone());
    }
    if metadata.title.source != FieldSource::Placeholder {
        tag.set_title(metadata.title.value.clone());
    }

    if let Some(album) = &metadata.album {
        tag.set_album(album.value.clone());
    }
    if let Some(genre) = &metadata.genre {
        tag.set_genre(genre.value.clone());
    }

    let text_fields = [
        (ItemKey::AlbumArtist, &metadata.album_artist),
        (ItemKey::RecordingDate, &metadata.date),
        (ItemKey::Composer, &metadata.composer),
        (ItemKey::MusicBrainzRecordingId, &metadata.recording_id),
        (ItemKey::MusicBrainzReleaseId, &metadata.release_id),
    ];
    for (key, field) in text_fields {
        if let Some(field) = field {
            tag.insert_text(key, field.value.clone());
        }
    }

    if let Some(n) = &metadata.track_number {
        tag.set_track(n.value);
    }
    if let Some(n) = &metadata.track_total {
        tag.set_track_total(n.value);
    }
    if let Some(n) = &metadata.disc_number {
        tag.set_disk(n.value);
    }
    if let Some(n) = &metadata.disc_total {
        tag.set_disk_total(n.value);
    }
}

/// Map a MIME string to a picture type lofty can embed
pub(crate) fn picture_mime(mime: &str) -> Result<MimeType, TagError> {
    match mime.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Ok(MimeType::Jpeg),
        "image/png" => Ok(MimeType::Png),
        "image/gif" => Ok(MimeType::Gif),
        "image/bmp" => Ok(MimeType::Bmp),
        "image/tiff" => Ok(MimeType::Tiff),
        other => Err(TagError::UnsupportedFormat(format!(
            "artwork of type '{}' is not an embeddable image",
            other
        ))),
    }
}

pub(crate) fn replace_front_cover(tag: &mut Tag, mime: MimeType, data: &[u8]) {
    tag.remove_picture_type(PictureType::CoverFront);
    tag.push_picture(Picture::new_unchecked(
        PictureType::CoverFront,
        Some(mime),
        Some("Cover".to_string()),
        data.to_vec(),
    ));
}

fn has_cover(codec: &dyn TagCodec, tag: &Tag, data: &[u8]) -> bool {
    tag.pictures()
        .iter()
        .any(|p| codec.is_front_cover(p) && p.data() == data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LyricLine, MetadataField};
    use std::time::Duration;
    use tempfile::TempDir;

    fn streaminfo(last: bool) -> Vec<u8> {
        let mut bytes = vec![if last { 0x80 } else { 0x00 }, 0x00, 0x00, 0x22];
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 6]);
        let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 441_000;
        bytes.extend_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes
    }

    /// FLAC stream laid out like an encoder writes it: STREAMINFO followed
    /// by a last-flagged PADDING block, then frame data
    fn flac_bytes() -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();
        bytes.extend_from_slice(&streaminfo(false));
        bytes.extend_from_slice(&[0x81, 0x00, 0x00, 0x40]);
        bytes.extend_from_slice(&[0u8; 64]);
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    /// FLAC stream whose only metadata block is a last-flagged STREAMINFO
    fn bare_flac_bytes() -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();
        bytes.extend_from_slice(&streaminfo(true));
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut bytes = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(kind);
        bytes.extend_from_slice(body);
        bytes
    }

    /// Untagged M4A: ftyp, a single sound track (10 s at 44.1 kHz) and mdat
    fn m4a_bytes() -> Vec<u8> {
        let mut mdhd = vec![0u8; 12];
        mdhd.extend_from_slice(&44_100u32.to_be_bytes());
        mdhd.extend_from_slice(&441_000u32.to_be_bytes());
        mdhd.extend_from_slice(&[0x55, 0xC4, 0x00, 0x00]);

        let mut hdlr = vec![0u8; 8];
        hdlr.extend_from_slice(b"soun");
        hdlr.extend_from_slice(&[0u8; 13]);

        let mdia = atom(b"mdia", &[atom(b"mdhd", &mdhd), atom(b"hdlr", &hdlr)].concat());
        let moov = atom(b"moov", &atom(b"trak", &mdia));

        let mut bytes = atom(b"ftyp", b"M4A \0\0\0\0M4A isom");
        bytes.extend_from_slice(&moov);
        bytes.extend_from_slice(&atom(b"mdat", &[0u8; 64]));
        bytes
    }

    fn write_flac(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, flac_bytes()).unwrap();
        path
    }

    fn metadata(artist: &str, title: &str) -> CanonicalMetadata {
        CanonicalMetadata {
            artist: MetadataField::new(artist.to_string(), FieldSource::ExistingTags),
            title: MetadataField::new(title.to_string(), FieldSource::ExistingTags),
            album: Some(MetadataField::new("A Night at the Opera".to_string(), FieldSource::Registry)),
            album_artist: None,
            date: Some(MetadataField::new("1975-10-31".to_string(), FieldSource::Registry)),
            genre: Some(MetadataField::new("Rock".to_string(), FieldSource::Registry)),
            composer: None,
            track_number: Some(MetadataField::new(11, FieldSource::Registry)),
            track_total: Some(MetadataField::new(12, FieldSource::Registry)),
            disc_number: Some(MetadataField::new(1, FieldSource::Registry)),
            disc_total: None,
            recording_id: None,
            release_id: Some(MetadataField::new("r-1".to_string(), FieldSource::Registry)),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_codec_selection_by_format() {
        assert_eq!(codec_for(AudioFormat::Mp3).unwrap().tag_type(), TagType::Id3v2);
        assert_eq!(codec_for(AudioFormat::Flac).unwrap().tag_type(), TagType::VorbisComments);
        assert_eq!(codec_for(AudioFormat::M4a).unwrap().tag_type(), TagType::Mp4Ilst);
        assert!(matches!(
            codec_for(AudioFormat::Unknown),
            Err(TagError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_flac_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");

        let outcome =
            write_tags(&path, AudioFormat::Flac, &metadata("Queen", "Bohemian Rhapsody"), None, None)
                .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let snapshot = read_tags(&path, AudioFormat::Flac).unwrap();
        assert_eq!(snapshot.artist.as_deref(), Some("Queen"));
        assert_eq!(snapshot.title.as_deref(), Some("Bohemian Rhapsody"));
        assert_eq!(snapshot.album.as_deref(), Some("A Night at the Opera"));
        assert_eq!(snapshot.genre.as_deref(), Some("Rock"));
        assert_eq!(snapshot.track_number, Some(11));
        assert_eq!(snapshot.release_id.as_deref(), Some("r-1"));
        assert_eq!(snapshot.duration, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_second_write_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");
        let meta = metadata("Queen", "Bohemian Rhapsody");

        write_tags(&path, AudioFormat::Flac, &meta, None, None).unwrap();
        let written = std::fs::read(&path).unwrap();

        let outcome = write_tags(&path, AudioFormat::Flac, &meta, None, None).unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert_eq!(std::fs::read(&path).unwrap(), written);
    }

    #[test]
    fn test_artwork_and_lyrics_embedded() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");

        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.resize(256, 0);
        let artwork = ArtworkAsset {
            release_id: "r-1".to_string(),
            data: png,
            mime: "image/png".to_string(),
            provider: "test".to_string(),
        };
        let lyrics = LyricsAsset {
            lines: vec![LyricLine {
                timestamp: Duration::from_millis(1_500),
                text: "Mama, just killed a man".to_string(),
            }],
            provider: "test".to_string(),
            confidence: 1.0,
        };

        let meta = metadata("Queen", "Bohemian Rhapsody");
        write_tags(&path, AudioFormat::Flac, &meta, Some(&artwork), Some(&lyrics)).unwrap();

        let snapshot = read_tags(&path, AudioFormat::Flac).unwrap();
        assert!(snapshot.has_front_cover);
        assert_eq!(snapshot.lyrics.as_deref(), Some("[00:01.50]Mama, just killed a man"));

        let again =
            write_tags(&path, AudioFormat::Flac, &meta, Some(&artwork), Some(&lyrics)).unwrap();
        assert_eq!(again, WriteOutcome::Unchanged);
    }

    #[test]
    fn test_m4a_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.m4a");
        std::fs::write(&path, m4a_bytes()).unwrap();

        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.resize(256, 7);
        let artwork = ArtworkAsset {
            release_id: "r-1".to_string(),
            data: png,
            mime: "image/png".to_string(),
            provider: "test".to_string(),
        };
        let lyrics = LyricsAsset {
            lines: vec![
                LyricLine {
                    timestamp: Duration::from_millis(1_500),
                    text: "Is this the real life?".to_string(),
                },
                LyricLine {
                    timestamp: Duration::from_millis(4_250),
                    text: "Is this just fantasy?".to_string(),
                },
            ],
            provider: "test".to_string(),
            confidence: 1.0,
        };

        let meta = metadata("Queen", "Bohemian Rhapsody");
        let outcome =
            write_tags(&path, AudioFormat::M4a, &meta, Some(&artwork), Some(&lyrics)).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let snapshot = read_tags(&path, AudioFormat::M4a).unwrap();
        assert_eq!(snapshot.artist.as_deref(), Some("Queen"));
        assert_eq!(snapshot.title.as_deref(), Some("Bohemian Rhapsody"));
        assert_eq!(snapshot.album.as_deref(), Some("A Night at the Opera"));
        assert_eq!(snapshot.track_number, Some(11));
        assert_eq!(snapshot.track_total, Some(12));
        assert_eq!(snapshot.disc_number, Some(1));
        assert_eq!(snapshot.duration, Some(Duration::from_secs(10)));
        assert!(snapshot.has_front_cover);
        assert_eq!(
            snapshot.lyrics.as_deref(),
            Some("[00:01.50]Is this the real life?\n[00:04.25]Is this just fantasy?")
        );

        let tagged_file = Probe::open(&path).unwrap().read().unwrap();
        let ilst = tagged_file.tag(TagType::Mp4Ilst).unwrap();
        assert_eq!(ilst.pictures().len(), 1);
        assert_eq!(ilst.pictures()[0].data(), artwork.data.as_slice());

        let again =
            write_tags(&path, AudioFormat::M4a, &meta, Some(&artwork), Some(&lyrics)).unwrap();
        assert_eq!(again, WriteOutcome::Unchanged);
    }

    #[test]
    fn test_embed_artwork_keeps_existing_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");
        write_tags(&path, AudioFormat::Flac, &metadata("Queen", "Innuendo"), None, None).unwrap();

        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.resize(256, 0);
        let artwork = ArtworkAsset {
            release_id: "r-1".to_string(),
            data: png,
            mime: "image/png".to_string(),
            provider: "test".to_string(),
        };

        let outcome = embed_artwork(&path, AudioFormat::Flac, &artwork).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let snapshot = read_tags(&path, AudioFormat::Flac).unwrap();
        assert!(snapshot.has_front_cover);
        assert_eq!(snapshot.artist.as_deref(), Some("Queen"));
        assert_eq!(snapshot.title.as_deref(), Some("Innuendo"));
    }

    #[test]
    fn test_placeholders_not_written() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");
        let mut meta = metadata(crate::models::UNKNOWN, crate::models::UNKNOWN);
        meta.artist.source = FieldSource::Placeholder;
        meta.title.source = FieldSource::Placeholder;

        write_tags(&path, AudioFormat::Flac, &meta, None, None).unwrap();

        let snapshot = read_tags(&path, AudioFormat::Flac).unwrap();
        assert_eq!(snapshot.artist, None);
        assert_eq!(snapshot.title, None);
        assert_eq!(snapshot.album.as_deref(), Some("A Night at the Opera"));
    }

    #[test]
    fn test_failed_write_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");
        let original = std::fs::read(&path).unwrap();

        let not_an_image = ArtworkAsset {
            release_id: "r-1".to_string(),
            data: vec![0u8; 512],
            mime: "application/octet-stream".to_string(),
            provider: "test".to_string(),
        };

        let err = write_tags(
            &path,
            AudioFormat::Flac,
            &metadata("Queen", "Bohemian Rhapsody"),
            Some(&not_an_image),
            None,
        )
        .unwrap_err();

        assert!(matches!(err, TagError::WriteFailed(..)));
        assert_eq!(std::fs::read(&path).unwrap(), original);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "staged copy must not survive a failed write");
    }

    #[test]
    fn test_streaminfo_only_flac_never_left_with_unreadable_tags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.flac");
        std::fs::write(&path, bare_flac_bytes()).unwrap();
        let original = std::fs::read(&path).unwrap();

        match write_tags(
            &path,
            AudioFormat::Flac,
            &metadata("Queen", "Bohemian Rhapsody"),
            None,
            None,
        ) {
            Ok(outcome) => {
                assert_eq!(outcome, WriteOutcome::Written);
                let snapshot = read_tags(&path, AudioFormat::Flac).unwrap();
                assert_eq!(snapshot.artist.as_deref(), Some("Queen"));
                assert_eq!(snapshot.title.as_deref(), Some("Bohemian Rhapsody"));
                assert_eq!(snapshot.track_number, Some(11));
            }
            Err(err) => {
                assert!(matches!(err, TagError::WriteFailed(..)));
                assert_eq!(std::fs::read(&path).unwrap(), original);
            }
        }
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "staged copy must not survive");
    }

    #[test]
    fn test_readback_mismatch_rejects_staged_copy() {
        let dir = TempDir::new().unwrap();
        let path = write_flac(&dir, "track.flac");
        let codec = codec_for(AudioFormat::Flac).unwrap();

        let mut expected = read_tags(&path, AudioFormat::Flac).unwrap();
        expected.duration = None;
        assert!(verify_staged(codec, &path, &expected).is_ok());

        expected.artist = Some("Queen".to_string());
        let reason = verify_staged(codec, &path, &expected).unwrap_err();
        assert!(reason.contains("did not read back"));
    }

    #[test]
    fn test_corrupt_container_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.flac");
        std::fs::write(&path, b"fLaC\x00\x00").unwrap();

        let err = read_tags(&path, AudioFormat::Flac).unwrap_err();
        assert!(matches!(err, TagError::Unreadable(..)));
        assert!(matches!(
            PipelineError::from(err),
            PipelineError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn test_picture_mime_mapping() {
        assert_eq!(picture_mime("image/JPEG").unwrap(), MimeType::Jpeg);
        assert_eq!(picture_mime("image/png").unwrap(), MimeType::Png);
        assert!(picture_mime("text/html").is_err());
    }
}
