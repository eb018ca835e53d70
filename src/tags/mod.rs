//! Boundary to the audio tag codecs.
//!
//! The library core only needs two things from a codec: pull provisional
//! metadata out of a freshly uploaded blob, and rewrite the embedded tag of a
//! stored content file after the song's metadata changed.

mod format;
mod lofty_codec;

pub use format::{BitDepth, SongFormat};
pub use lofty_codec::LoftyTagCodec;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tag codec error: {0}")]
    Codec(#[from] lofty::error::LoftyError),

    #[error("Content has no tag of type {0}")]
    MissingTag(String),
}

/// Metadata read from the tag of an uploaded file, before any name is
/// resolved to a library entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionalMetadata {
    pub title: Option<String>,
    pub album_name: Option<String>,
    pub track_number: Option<i64>,
    pub year: Option<i64>,
    pub artist_names: Vec<String>,
    pub bit_depth: BitDepth,
}

/// The tag-visible projection of a song. A rewrite is only needed when this
/// value changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagFields {
    pub title: String,
    pub album_name: Option<String>,
    pub album_artist_names: Vec<String>,
    pub artist_names: Vec<String>,
    pub track_number: Option<i64>,
    pub year: Option<i64>,
}

pub trait TagCodec: Send + Sync {
    fn extract(&self, format: SongFormat, content: &[u8]) -> Result<ProvisionalMetadata, TagError>;

    fn rewrite(&self, format: SongFormat, path: &Path, fields: &TagFields) -> Result<(), TagError>;

    /// Whether `rewrite` modifies files at all. When false the store skips
    /// rewrites and the content backups they need.
    fn writes_tags(&self) -> bool {
        true
    }
}

/// Codec that never touches content. Used when tag writing is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTagCodec;

impl TagCodec for NullTagCodec {
    fn extract(&self, _format: SongFormat, _content: &[u8]) -> Result<ProvisionalMetadata, TagError> {
        Ok(ProvisionalMetadata::default())
    }

    fn rewrite(&self, _format: SongFormat, _path: &Path, _fields: &TagFields) -> Result<(), TagError> {
        Ok(())
    }

    fn writes_tags(&self) -> bool {
        false
    }
}
