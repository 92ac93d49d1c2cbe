//! M4A (iTunes ilst atoms) variant
//!
//! `covr` atoms only distinguish JPEG and PNG, so any other image type is
//! refused instead of being stored with a wrong type flag. They carry no
//! picture type either: lofty reads every `covr` image back as
//! [`PictureType::Other`], and the first one is the cover.

use super::{picture_mime, read_common_fields, replace_front_cover, TagCodec, TagError};
use crate::models::{ArtworkAsset, AudioFormat, TagSnapshot};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Tag, TagType};

/// ilst codec for MPEG-4 audio
pub struct Mp4Codec;

impl TagCodec for Mp4Codec {
    fn format(&self) -> AudioFormat {
        AudioFormat::M4a
    }

    fn tag_type(&self) -> TagType {
        TagType::Mp4Ilst
    }

    fn read_fields(&self, tag: &Tag) -> TagSnapshot {
        let mut snapshot = read_common_fields(tag);
        snapshot.has_front_cover = tag.pictures().iter().any(|p| self.is_front_cover(p));
        snapshot
    }

    fn is_front_cover(&self, picture: &Picture) -> bool {
        matches!(picture.pic_type(), PictureType::CoverFront | PictureType::Other)
    }

    fn embed_image(&self, tag: &mut Tag, artwork: &ArtworkAsset) -> Result<(), TagError> {
        match picture_mime(&artwork.mime)? {
            mime @ (MimeType::Jpeg | MimeType::Png) => {
                tag.remove_picture_type(PictureType::Other);
                replace_front_cover(tag, mime, &artwork.data);
                Ok(())
            }
            _ => Err(TagError::UnsupportedFormat(format!(
                "{} cover art must be JPEG or PNG, got {}",
                self.format(),
                artwork.mime
            ))),
        }
    }
}
