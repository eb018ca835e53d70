use super::{BitDepth, ProvisionalMetadata, SongFormat, TagCodec, TagError, TagFields};
use lofty::{
    Accessor, AudioFile, ItemKey, ItemValue, Probe, Tag, TagExt, TagItem, TagType, TaggedFileExt,
};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Tag codec backed by `lofty`. FLAC and OGG carry Vorbis comments, MP3
/// carries ID3v2. Content of unknown format is left untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyTagCodec;

impl LoftyTagCodec {
    fn tag_type(format: SongFormat) -> Option<TagType> {
        match format {
            SongFormat::Flac | SongFormat::Ogg => Some(TagType::VorbisComments),
            SongFormat::Mp3 => Some(TagType::Id3v2),
            SongFormat::Unknown => None,
        }
    }

    fn extract_from_tag(tag: &Tag) -> ProvisionalMetadata {
        let non_empty = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        ProvisionalMetadata {
            title: tag.title().as_deref().and_then(non_empty),
            album_name: tag.album().as_deref().and_then(non_empty),
            track_number: tag.track().map(i64::from),
            year: tag.year().map(i64::from),
            artist_names: tag
                .get_strings(&ItemKey::TrackArtist)
                .filter_map(non_empty)
                .collect(),
            bit_depth: BitDepth::Unknown,
        }
    }

    fn set_optional_text(tag: &mut Tag, key: ItemKey, value: Option<String>) {
        match value {
            Some(value) => {
                tag.insert_text(key, value);
            }
            None => tag.remove_key(&key),
        }
    }

    fn set_multi_text(tag: &mut Tag, key: ItemKey, values: &[String]) {
        tag.remove_key(&key);
        for value in values {
            tag.push(TagItem::new(key.clone(), ItemValue::Text(value.clone())));
        }
    }

    fn fill_tag(tag: &mut Tag, fields: &TagFields) {
        tag.insert_text(ItemKey::TrackTitle, fields.title.clone());
        Self::set_optional_text(tag, ItemKey::AlbumTitle, fields.album_name.clone());
        Self::set_multi_text(tag, ItemKey::TrackArtist, &fields.artist_names);
        Self::set_multi_text(tag, ItemKey::AlbumArtist, &fields.album_artist_names);
        Self::set_optional_text(
            tag,
            ItemKey::TrackNumber,
            fields.track_number.map(|n| n.to_string()),
        );
        Self::set_optional_text(
            tag,
            ItemKey::RecordingDate,
            fields.year.map(|y| y.to_string()),
        );
    }
}

impl TagCodec for LoftyTagCodec {
    fn extract(&self, format: SongFormat, content: &[u8]) -> Result<ProvisionalMetadata, TagError> {
        if Self::tag_type(format).is_none() {
            return Ok(ProvisionalMetadata::default());
        }

        let tagged_file = Probe::new(Cursor::new(content))
            .guess_file_type()?
            .read()?;

        let mut metadata = tagged_file
            .primary_tag()
            .or(tagged_file.first_tag())
            .map(Self::extract_from_tag)
            .unwrap_or_default();
        metadata.bit_depth = tagged_file
            .properties()
            .bit_depth()
            .map(BitDepth::from_bits)
            .unwrap_or_default();
        Ok(metadata)
    }

    fn rewrite(&self, format: SongFormat, path: &Path, fields: &TagFields) -> Result<(), TagError> {
        let Some(tag_type) = Self::tag_type(format) else {
            return Ok(());
        };

        let mut tagged_file = Probe::open(path)?.read()?;
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| TagError::MissingTag(format!("{:?}", tag_type)))?;

        Self::fill_tag(tag, fields);
        tag.save_to_path(path)?;

        debug!("Rewrote {:?} tag of {:?}", tag_type, path);
        Ok(())
    }
}
