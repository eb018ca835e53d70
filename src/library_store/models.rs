//! Library entities, their create/update payloads and read filters.
//!
//! Entities serialize to the camelCase JSON shape consumed by sync clients.

use crate::tags::{BitDepth, SongFormat};
use serde::{Deserialize, Serialize};

/// Id of the system playlist every imported song is appended to.
pub const INCOMING_PLAYLIST_ID: &str = "00000000-0000-0000-0000-000000000000";
pub const INCOMING_PLAYLIST_NAME: &str = "(incoming)";
/// Maximum number of entries kept in the incoming playlist.
pub const INCOMING_PLAYLIST_CAPACITY: i64 = 100;

// =============================================================================
// Songs
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub creation_ts: i64,
    pub update_ts: i64,
    pub name: String,
    pub format: SongFormat,
    pub size: i64,
    pub bit_depth: BitDepth,
    pub publication_year: Option<i64>,
    /// `None` for songs that belong to no album.
    pub album_id: Option<String>,
    pub track_number: Option<i64>,
    pub explicit: bool,
    /// Deduplicated, ordered by artist name then id.
    pub artist_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongMeta {
    pub name: String,
    pub publication_year: Option<i64>,
    pub album_id: Option<String>,
    pub track_number: Option<i64>,
    pub explicit: bool,
    pub artist_ids: Vec<String>,
}

/// A song to be created along with its content.
#[derive(Clone, Debug)]
pub struct NewSong<'a> {
    pub meta: SongMeta,
    pub format: SongFormat,
    pub bit_depth: BitDepth,
    pub content: &'a [u8],
}

/// Partial song update. Absent fields are left untouched; for nullable
/// fields `Some(None)` clears the value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongUpdate {
    pub name: Option<String>,
    pub publication_year: Option<Option<i64>>,
    pub album_id: Option<Option<String>>,
    pub track_number: Option<Option<i64>>,
    pub explicit: Option<bool>,
    pub artist_ids: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct SongFilter {
    pub from_ts: Option<i64>,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    /// Restrict to songs favorited by this user.
    pub favorite_user_id: Option<String>,
    /// With `favorite_user_id`: songs whose favorite or whose own row changed
    /// since this timestamp.
    pub favorite_from_ts: Option<i64>,
}

// =============================================================================
// Albums & artists
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub creation_ts: i64,
    pub update_ts: i64,
    pub name: String,
    /// Derived by majority vote over the album's songs.
    pub artist_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumMeta {
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct AlbumFilter {
    pub from_ts: Option<i64>,
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub creation_ts: i64,
    pub update_ts: i64,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistMeta {
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ArtistFilter {
    pub from_ts: Option<i64>,
    pub name: Option<String>,
}

// =============================================================================
// Playlists
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub creation_ts: i64,
    pub update_ts: i64,
    /// Only moves when the name or the song list changes.
    pub content_update_ts: i64,
    pub name: String,
    pub song_ids: Vec<String>,
    pub owner_user_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistMeta {
    pub name: String,
    pub song_ids: Vec<String>,
    pub owner_user_ids: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PlaylistFilter {
    pub from_ts: Option<i64>,
    pub favorite_user_id: Option<String>,
    /// With `favorite_user_id`: playlists whose favorite row or whose content
    /// changed since this timestamp.
    pub favorite_from_ts: Option<i64>,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub creation_ts: i64,
    pub update_ts: i64,
    pub name: String,
    pub hide_explicit: bool,
    pub admin: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMeta {
    pub name: String,
    pub hide_explicit: bool,
    pub admin: bool,
}

/// User payload including the credential. On update an empty password keeps
/// the stored one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetaComplete {
    #[serde(flatten)]
    pub meta: UserMeta,
    pub password: String,
}

/// What the authentication boundary needs to check a login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserCredentials {
    pub user_id: String,
    pub password: String,
}

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub from_ts: Option<i64>,
    pub admin: Option<bool>,
}

// =============================================================================
// Favorites
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteSongId {
    pub user_id: String,
    pub song_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteSong {
    pub id: FavoriteSongId,
    pub update_ts: i64,
}

#[derive(Clone, Debug, Default)]
pub struct FavoriteSongFilter {
    pub from_ts: Option<i64>,
    pub user_id: Option<String>,
    pub song_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritePlaylistId {
    pub user_id: String,
    pub playlist_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritePlaylist {
    pub id: FavoritePlaylistId,
    pub update_ts: i64,
}

#[derive(Clone, Debug, Default)]
pub struct FavoritePlaylistFilter {
    pub from_ts: Option<i64>,
    pub user_id: Option<String>,
    pub playlist_id: Option<String>,
}
