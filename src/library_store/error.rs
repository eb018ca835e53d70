use crate::tags::TagError;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Song,
    Album,
    Artist,
    Playlist,
    User,
    FavoriteSong,
    FavoritePlaylist,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Song => "Song",
            EntityKind::Album => "Album",
            EntityKind::Artist => "Artist",
            EntityKind::Playlist => "Playlist",
            EntityKind::User => "User",
            EntityKind::FavoriteSong => "Favorite song",
            EntityKind::FavoritePlaylist => "Favorite playlist",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the library store. Everything below the referential
/// guards is a storage failure that aborted the unit of work.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Album {0} still has songs")]
    AlbumHasSongs(String),

    #[error("Artist {0} still has songs")]
    ArtistHasSongs(String),

    #[error("The incoming playlist cannot be deleted")]
    CannotDeleteIncomingPlaylist,

    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LibraryError {
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        LibraryError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            LibraryError::NotFound { .. } => "not_found",
            LibraryError::AlbumHasSongs(_) => "delete_album_with_songs",
            LibraryError::ArtistHasSongs(_) => "delete_artist_with_songs",
            LibraryError::CannotDeleteIncomingPlaylist => "delete_incoming_playlist",
            LibraryError::Tag(_)
            | LibraryError::Sqlite(_)
            | LibraryError::Io(_)
            | LibraryError::Internal(_) => "internal",
        }
    }
}

pub type LibraryResult<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinguishable() {
        assert_eq!(
            LibraryError::not_found(EntityKind::Song, "x").code(),
            "not_found"
        );
        assert_eq!(
            LibraryError::AlbumHasSongs("a".into()).code(),
            "delete_album_with_songs"
        );
        assert_eq!(
            LibraryError::ArtistHasSongs("a".into()).code(),
            "delete_artist_with_songs"
        );
        assert_eq!(
            LibraryError::CannotDeleteIncomingPlaylist.code(),
            "delete_incoming_playlist"
        );
        assert_eq!(
            LibraryError::from(anyhow::anyhow!("boom")).code(),
            "internal"
        );
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = LibraryError::not_found(EntityKind::FavoritePlaylist, "u:p");
        assert_eq!(err.to_string(), "Favorite playlist not found: u:p");
    }
}
