//! Synthetic audio files
//!
//! Minimal but valid containers built in code, so tests need no binary
//! fixtures on disk.

use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::tag::TagType;
use musicren::models::{AudioFormat, TagSnapshot};
use musicren::services::{tag_codec, MetadataReconciler};
use std::path::{Path, PathBuf};

/// FLAC stream (10 s at 44.1 kHz) with STREAMINFO followed by a
/// last-flagged PADDING block, the layout encoders produce
pub fn flac_bytes() -> Vec<u8> {
    let mut bytes = b"fLaC".to_vec();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x22]);
    bytes.extend_from_slice(&4096u16.to_be_bytes());
    bytes.extend_from_slice(&4096u16.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 6]);
    let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 441_000;
    bytes.extend_from_slice(&packed.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 16]);
    bytes.extend_from_slice(&[0x81, 0x00, 0x00, 0x40]);
    bytes.extend_from_slice(&[0u8; 64]);
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut bytes = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(kind);
    bytes.extend_from_slice(body);
    bytes
}

/// MPEG-4 audio with one sound track (10 s at 44.1 kHz) and no ilst
pub fn m4a_bytes() -> Vec<u8> {
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

/// Silent MPEG-1 Layer III stream: 128 kbps, 44.1 kHz, 40 frames
pub fn mp3_bytes() -> Vec<u8> {
    const FRAME_LEN: usize = 417;
    let mut bytes = Vec::with_capacity(FRAME_LEN * 40);
    for _ in 0..40 {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        bytes.extend_from_slice(&frame);
    }
    bytes
}

/// PNG signature padded past the minimum image size
pub fn png_bytes() -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    data.resize(512, 0x42);
    data
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Untagged file of the format matching `name`'s extension
pub fn untagged(dir: &Path, name: &str) -> PathBuf {
    let bytes = match format_of(name) {
        AudioFormat::Mp3 => mp3_bytes(),
        AudioFormat::M4a => m4a_bytes(),
        _ => flac_bytes(),
    };
    write_file(dir, name, &bytes)
}

/// File carrying artist and title tags (plus album when given)
pub fn tagged(dir: &Path, name: &str, artist: &str, title: &str, album: Option<&str>) -> PathBuf {
    let path = untagged(dir, name);
    let snapshot = TagSnapshot {
        artist: Some(artist.to_string()),
        title: Some(title.to_string()),
        album: album.map(str::to_string),
        ..Default::default()
    };
    let metadata = MetadataReconciler::default().reconcile(&snapshot, None, None);
    tag_codec::write_tags(&path, format_of(name), &metadata, None, None).unwrap();
    path
}

pub fn read_tags(path: &Path) -> TagSnapshot {
    tag_codec::read_tags(path, format_of(&path.to_string_lossy())).unwrap()
}

/// Bytes of the embedded front cover, if any
///
/// ilst pictures carry no type, so any `covr` image counts.
pub fn front_cover(path: &Path) -> Option<Vec<u8>> {
    let tagged_file = lofty::read_from_path(path).unwrap();
    let tag = tagged_file.primary_tag()?;
    let untyped = tag.tag_type() == TagType::Mp4Ilst;
    tag.pictures()
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront || untyped)
        .map(|p| p.data().to_vec())
}

pub fn format_of(name: &str) -> AudioFormat {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    AudioFormat::from_extension(&ext).unwrap_or(AudioFormat::Unknown)
}

/// File names directly under `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
