//! FLAC (Vorbis comments) variant
//!
//! Field mapping and picture blocks are handled by lofty's generic tag;
//! lyrics go to the `LYRICS` comment. Vorbis comments have no dedicated
//! year field, so a bare year found in `YEAR` is carried over into `DATE`.

use super::{read_common_fields, TagCodec};
use crate::models::{AudioFormat, TagSnapshot};
use lofty::tag::{ItemKey, Tag, TagType};

/// Vorbis comment codec for FLAC
pub struct VorbisCodec;

impl TagCodec for VorbisCodec {
    fn format(&self) -> AudioFormat {
        AudioFormat::Flac
    }

    fn tag_type(&self) -> TagType {
        TagType::VorbisComments
    }

    fn read_fields(&self, tag: &Tag) -> TagSnapshot {
        let mut snapshot = read_common_fields(tag);
        if snapshot.date.is_none() {
            snapshot.date = tag
                .get_string(&ItemKey::Unknown("YEAR".to_string()))
                .map(str::trim)
                .filter(|y| !y.is_empty())
                .map(str::to_string);
        }
        snapshot
    }
}
