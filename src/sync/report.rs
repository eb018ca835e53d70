use super::file_path::{albumed_song_path, unalbumed_song_path};
use crate::library_store::{
    Album, AlbumFilter, Artist, ArtistFilter, FavoritePlaylist, FavoritePlaylistFilter,
    FavoritePlaylistId, LibraryResult, LibraryStore, Playlist, PlaylistFilter, Song, SongFilter,
    UnitOfWork, User, UserFilter,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Everything in the library that changed since a watermark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub songs: Vec<Song>,
    pub deleted_song_ids: Vec<String>,
    pub albums: Vec<Album>,
    pub deleted_album_ids: Vec<String>,
    pub artists: Vec<Artist>,
    pub deleted_artist_ids: Vec<String>,
    pub playlists: Vec<Playlist>,
    pub deleted_playlist_ids: Vec<String>,
    pub users: Vec<User>,
    pub deleted_user_ids: Vec<String>,
    pub favorite_playlists: Vec<FavoritePlaylist>,
    pub deleted_favorite_playlist_ids: Vec<FavoritePlaylistId>,
    /// Watermark to send back as `from_ts` on the next call.
    pub sync_ts: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncSong {
    pub id: String,
    pub update_ts: i64,
    /// Suggested path relative to the client's music folder.
    pub filepath: String,
}

/// What a file-mirroring client of one user needs to catch up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncReport {
    pub file_sync_songs: Vec<FileSyncSong>,
    pub deleted_song_ids: Vec<String>,
    /// Favorite playlists of the user whose favorite or content changed.
    pub playlists: Vec<Playlist>,
    /// Playlists the user stopped favoriting, or that were deleted.
    pub deleted_playlist_ids: Vec<String>,
    pub sync_ts: i64,
}

/// Resolves album and artist names once per report.
#[derive(Default)]
struct PathResolver {
    albums: HashMap<String, (String, Vec<String>)>,
    artist_names: HashMap<String, String>,
}

impl PathResolver {
    fn artist_names(&mut self, uow: &UnitOfWork, artist_ids: &[String]) -> LibraryResult<Vec<String>> {
        let mut names = Vec::with_capacity(artist_ids.len());
        for artist_id in artist_ids {
            if let Some(name) = self.artist_names.get(artist_id) {
                names.push(name.clone());
                continue;
            }
            let name = uow.read_artist(artist_id)?.name;
            self.artist_names.insert(artist_id.clone(), name.clone());
            names.push(name);
        }
        Ok(names)
    }

    fn filepath(&mut self, uow: &UnitOfWork, song: &Song) -> LibraryResult<String> {
        let extension = song.format.extension();
        let Some(album_id) = &song.album_id else {
            let artist_names = self.artist_names(uow, &song.artist_ids)?;
            return Ok(unalbumed_song_path(&artist_names, &song.name, extension));
        };

        if !self.albums.contains_key(album_id) {
            let album = uow.read_album(album_id)?;
            let artist_names = self.artist_names(uow, &album.artist_ids)?;
            self.albums.insert(album_id.clone(), (album.name, artist_names));
        }
        let (album_name, album_artist_names) = &self.albums[album_id];
        Ok(albumed_song_path(
            album_artist_names,
            album_name,
            song.track_number,
            &song.name,
            extension,
        ))
    }
}

impl LibraryStore {
    /// Whole-library delta since `from_ts`, read from one snapshot. Entities
    /// and tombstones are ordered by timestamp then id, so retrying with the
    /// same watermark is safe.
    pub fn read_sync_report(&self, from_ts: i64) -> LibraryResult<SyncReport> {
        let sync_ts = self.sync_watermark()?;
        let report = self.read(|uow| {
            Ok(SyncReport {
                songs: uow.read_songs(&SongFilter {
                    from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_song_ids: uow.deleted_song_ids(from_ts)?,
                albums: uow.read_albums(&AlbumFilter {
                    from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_album_ids: uow.deleted_album_ids(from_ts)?,
                artists: uow.read_artists(&ArtistFilter {
                    from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_artist_ids: uow.deleted_artist_ids(from_ts)?,
                playlists: uow.read_playlists(&PlaylistFilter {
                    from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_playlist_ids: uow.deleted_playlist_ids(from_ts)?,
                users: uow.read_users(&UserFilter {
                    from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_user_ids: uow.deleted_user_ids(from_ts)?,
                favorite_playlists: uow.read_favorite_playlists(&FavoritePlaylistFilter {
                    from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_favorite_playlist_ids: uow.deleted_favorite_playlist_ids(from_ts)?,
                sync_ts,
            })
        })?;

        debug!(
            "Sync report from {}: {} songs, {} albums, {} artists, {} playlists, {} users",
            from_ts,
            report.songs.len(),
            report.albums.len(),
            report.artists.len(),
            report.playlists.len(),
            report.users.len()
        );
        Ok(report)
    }

    /// Per-user file sync delta since `from_ts`. Playlists are selected on
    /// their content version, so ownership-only edits do not show up.
    pub fn read_file_sync_report(&self, from_ts: i64, user_id: &str) -> LibraryResult<FileSyncReport> {
        let sync_ts = self.sync_watermark()?;
        let report = self.read(|uow| {
            uow.read_user(user_id)?;

            let songs = uow.read_songs(&SongFilter {
                from_ts: Some(from_ts),
                ..Default::default()
            })?;
            let mut resolver = PathResolver::default();
            let file_sync_songs = songs
                .iter()
                .map(|song| {
                    Ok(FileSyncSong {
                        id: song.id.clone(),
                        update_ts: song.update_ts,
                        filepath: resolver.filepath(uow, song)?,
                    })
                })
                .collect::<LibraryResult<Vec<_>>>()?;

            Ok(FileSyncReport {
                file_sync_songs,
                deleted_song_ids: uow.deleted_song_ids(from_ts)?,
                playlists: uow.read_playlists(&PlaylistFilter {
                    favorite_user_id: Some(user_id.to_string()),
                    favorite_from_ts: Some(from_ts),
                    ..Default::default()
                })?,
                deleted_playlist_ids: uow.deleted_user_favorite_playlist_ids(from_ts, user_id)?,
                sync_ts,
            })
        })?;

        debug!(
            "File sync report for user {} from {}: {} songs, {} playlists",
            user_id,
            from_ts,
            report.file_sync_songs.len(),
            report.playlists.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::{AlbumMeta, ArtistMeta, NewSong, SongMeta};
    use crate::tags::{BitDepth, NullTagCodec, SongFormat};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, LibraryStore) {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::open(
            dir.path().join("library.db"),
            dir.path().join("songs"),
            Arc::new(NullTagCodec),
            &crate::library_store::LibraryStoreOptions {
                default_admin_password: Some("pw".into()),
                ..Default::default()
            },
        )
        .unwrap();
        (dir, store)
    }

    #[test]
    fn report_serializes_in_camel_case() {
        let (_dir, store) = open_store();
        let report = store.read_sync_report(0).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("deletedSongIds").is_some());
        assert!(json.get("favoritePlaylists").is_some());
        assert!(json.get("deletedFavoritePlaylistIds").is_some());
        assert_eq!(json["syncTs"], report.sync_ts);
    }

    #[test]
    fn file_sync_song_paths_use_album_artists() {
        let (_dir, store) = open_store();
        let album = store.create_album(&AlbumMeta { name: "Foo".into() }).unwrap();
        let artist = store.create_artist(&ArtistMeta { name: "Bar".into() }).unwrap();
        store
            .create_song(NewSong {
                meta: SongMeta {
                    name: "Song: One".into(),
                    album_id: Some(album.id.clone()),
                    track_number: Some(1),
                    artist_ids: vec![artist.id.clone()],
                    ..Default::default()
                },
                format: SongFormat::Flac,
                bit_depth: BitDepth::Sixteen,
                content: b"fLaC",
            })
            .unwrap();
        store
            .create_song(NewSong {
                meta: SongMeta {
                    name: "Loose".into(),
                    ..Default::default()
                },
                format: SongFormat::Mp3,
                bit_depth: BitDepth::Unknown,
                content: b"ID3",
            })
            .unwrap();

        let admin = store.read_user_by_name("admin").unwrap();
        let report = store.read_file_sync_report(0, &admin.id).unwrap();
        let paths: Vec<&str> = report
            .file_sync_songs
            .iter()
            .map(|s| s.filepath.as_str())
            .collect();
        assert_eq!(paths, vec!["Bar/Foo/01 - Song_ One.flac", "(Unknown) - Loose.mp3"]);
    }

    #[test]
    fn file_sync_report_for_unknown_user_is_not_found() {
        let (_dir, store) = open_store();
        let err = store.read_file_sync_report(0, "missing").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
