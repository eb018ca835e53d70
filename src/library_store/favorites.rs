//! Favorite songs and favorite playlists, and how they propagate.
//!
//! Favoriting a playlist favorites every song it holds at that moment.
//! Favoriting or unfavoriting a song bumps the user's favorite playlists
//! that contain it, so per-user sync notices the change.

use super::error::{EntityKind, LibraryError, LibraryResult};
use super::ids::now_ts;
use super::models::{
    FavoritePlaylist, FavoritePlaylistFilter, FavoritePlaylistId, FavoriteSong,
    FavoriteSongFilter, FavoriteSongId,
};
use super::unit_of_work::{SqlFilter, UnitOfWork};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeSet;

fn favorite_song_from_row(row: &Row) -> rusqlite::Result<FavoriteSong> {
    Ok(FavoriteSong {
        id: FavoriteSongId {
            user_id: row.get(0)?,
            song_id: row.get(1)?,
        },
        update_ts: row.get(2)?,
    })
}

fn favorite_playlist_from_row(row: &Row) -> rusqlite::Result<FavoritePlaylist> {
    Ok(FavoritePlaylist {
        id: FavoritePlaylistId {
            user_id: row.get(0)?,
            playlist_id: row.get(1)?,
        },
        update_ts: row.get(2)?,
    })
}

impl UnitOfWork<'_> {
    // =========================================================================
    // Favorite songs
    // =========================================================================

    pub fn read_favorite_songs(&self, filter: &FavoriteSongFilter) -> LibraryResult<Vec<FavoriteSong>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(user_id) = &filter.user_id {
            sql_filter.and("user_id = ?", vec![Box::new(user_id.clone())]);
        }
        if let Some(song_id) = &filter.song_id {
            sql_filter.and("song_id = ?", vec![Box::new(song_id.clone())]);
        }
        let order_by = if filter.from_ts.is_some() {
            "update_ts, user_id, song_id"
        } else {
            "user_id, song_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT user_id, song_id, update_ts FROM favorite_song{} ORDER BY {}",
            sql_filter.where_sql(),
            order_by
        ))?;
        let favorites = stmt
            .query_map(sql_filter.params().as_slice(), favorite_song_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(favorites)
    }

    /// Favorite a song. Favoriting it again is a no-op.
    pub fn create_favorite_song(&self, id: &FavoriteSongId) -> LibraryResult<FavoriteSong> {
        self.ensure_exists(EntityKind::User, "user", "user_id", &id.user_id)?;
        self.ensure_exists(EntityKind::Song, "song", "song_id", &id.song_id)?;
        if let Some(existing) = self.read_favorite_song(id)? {
            return Ok(existing);
        }

        let now = now_ts();
        self.conn().execute(
            "INSERT INTO favorite_song (user_id, song_id, update_ts) VALUES (?1, ?2, ?3)",
            params![id.user_id, id.song_id, now],
        )?;
        self.conn().execute(
            "DELETE FROM deleted_favorite_song WHERE user_id = ?1 AND song_id = ?2",
            params![id.user_id, id.song_id],
        )?;
        self.touch_favorite_playlists_containing(&id.user_id, &id.song_id, now)?;

        Ok(FavoriteSong {
            id: id.clone(),
            update_ts: now,
        })
    }

    pub fn delete_favorite_song(&self, id: &FavoriteSongId) -> LibraryResult<FavoriteSong> {
        let favorite = self.read_favorite_song(id)?.ok_or_else(|| {
            LibraryError::not_found(
                EntityKind::FavoriteSong,
                format!("{}:{}", id.user_id, id.song_id),
            )
        })?;

        let now = now_ts();
        self.conn().execute(
            "DELETE FROM favorite_song WHERE user_id = ?1 AND song_id = ?2",
            params![id.user_id, id.song_id],
        )?;
        self.conn().execute(
            "INSERT OR REPLACE INTO deleted_favorite_song (user_id, song_id, delete_ts) VALUES (?1, ?2, ?3)",
            params![id.user_id, id.song_id, now],
        )?;
        self.touch_favorite_playlists_containing(&id.user_id, &id.song_id, now)?;
        Ok(favorite)
    }

    pub fn deleted_favorite_song_ids(&self, from_ts: i64) -> LibraryResult<Vec<FavoriteSongId>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT user_id, song_id FROM deleted_favorite_song
             WHERE delete_ts >= ?1 ORDER BY delete_ts, user_id, song_id",
        )?;
        let ids = stmt
            .query_map(params![from_ts], |row| {
                Ok(FavoriteSongId {
                    user_id: row.get(0)?,
                    song_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn deleted_user_favorite_song_ids(&self, from_ts: i64, user_id: &str) -> LibraryResult<Vec<String>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT song_id FROM deleted_favorite_song
             WHERE delete_ts >= ?1 AND user_id = ?2 ORDER BY delete_ts, song_id",
        )?;
        let ids = stmt
            .query_map(params![from_ts, user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // =========================================================================
    // Favorite playlists
    // =========================================================================

    pub fn read_favorite_playlists(
        &self,
        filter: &FavoritePlaylistFilter,
    ) -> LibraryResult<Vec<FavoritePlaylist>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(user_id) = &filter.user_id {
            sql_filter.and("user_id = ?", vec![Box::new(user_id.clone())]);
        }
        if let Some(playlist_id) = &filter.playlist_id {
            sql_filter.and("playlist_id = ?", vec![Box::new(playlist_id.clone())]);
        }
        let order_by = if filter.from_ts.is_some() {
            "update_ts, user_id, playlist_id"
        } else {
            "user_id, playlist_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT user_id, playlist_id, update_ts FROM favorite_playlist{} ORDER BY {}",
            sql_filter.where_sql(),
            order_by
        ))?;
        let favorites = stmt
            .query_map(sql_filter.params().as_slice(), favorite_playlist_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(favorites)
    }

    /// Favorite a playlist and every song it currently holds. Favoriting it
    /// again is a no-op.
    pub fn create_favorite_playlist(&self, id: &FavoritePlaylistId) -> LibraryResult<FavoritePlaylist> {
        self.ensure_exists(EntityKind::User, "user", "user_id", &id.user_id)?;
        let playlist = self.read_playlist(&id.playlist_id)?;
        if let Some(existing) = self.read_favorite_playlist(id)? {
            return Ok(existing);
        }

        let now = now_ts();
        self.conn().execute(
            "INSERT INTO favorite_playlist (user_id, playlist_id, update_ts) VALUES (?1, ?2, ?3)",
            params![id.user_id, id.playlist_id, now],
        )?;
        self.conn().execute(
            "DELETE FROM deleted_favorite_playlist WHERE user_id = ?1 AND playlist_id = ?2",
            params![id.user_id, id.playlist_id],
        )?;

        let song_ids: BTreeSet<&String> = playlist.song_ids.iter().collect();
        for song_id in song_ids {
            self.create_favorite_song(&FavoriteSongId {
                user_id: id.user_id.clone(),
                song_id: song_id.clone(),
            })?;
        }

        self.read_favorite_playlist(id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::FavoritePlaylist, &id.playlist_id))
    }

    /// Unfavorite a playlist. The songs it made favorite stay favorite.
    pub fn delete_favorite_playlist(&self, id: &FavoritePlaylistId) -> LibraryResult<FavoritePlaylist> {
        let favorite = self.read_favorite_playlist(id)?.ok_or_else(|| {
            LibraryError::not_found(
                EntityKind::FavoritePlaylist,
                format!("{}:{}", id.user_id, id.playlist_id),
            )
        })?;

        self.conn().execute(
            "DELETE FROM favorite_playlist WHERE user_id = ?1 AND playlist_id = ?2",
            params![id.user_id, id.playlist_id],
        )?;
        self.conn().execute(
            "INSERT OR REPLACE INTO deleted_favorite_playlist (user_id, playlist_id, delete_ts)
             VALUES (?1, ?2, ?3)",
            params![id.user_id, id.playlist_id, now_ts()],
        )?;
        Ok(favorite)
    }

    pub fn deleted_favorite_playlist_ids(&self, from_ts: i64) -> LibraryResult<Vec<FavoritePlaylistId>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT user_id, playlist_id FROM deleted_favorite_playlist
             WHERE delete_ts >= ?1 ORDER BY delete_ts, user_id, playlist_id",
        )?;
        let ids = stmt
            .query_map(params![from_ts], |row| {
                Ok(FavoritePlaylistId {
                    user_id: row.get(0)?,
                    playlist_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn deleted_user_favorite_playlist_ids(
        &self,
        from_ts: i64,
        user_id: &str,
    ) -> LibraryResult<Vec<String>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT playlist_id FROM deleted_favorite_playlist
             WHERE delete_ts >= ?1 AND user_id = ?2 ORDER BY delete_ts, playlist_id",
        )?;
        let ids = stmt
            .query_map(params![from_ts, user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn read_favorite_song(&self, id: &FavoriteSongId) -> LibraryResult<Option<FavoriteSong>> {
        let favorite = self
            .conn()
            .query_row(
                "SELECT user_id, song_id, update_ts FROM favorite_song WHERE user_id = ?1 AND song_id = ?2",
                params![id.user_id, id.song_id],
                favorite_song_from_row,
            )
            .optional()?;
        Ok(favorite)
    }

    fn read_favorite_playlist(&self, id: &FavoritePlaylistId) -> LibraryResult<Option<FavoritePlaylist>> {
        let favorite = self
            .conn()
            .query_row(
                "SELECT user_id, playlist_id, update_ts FROM favorite_playlist
                 WHERE user_id = ?1 AND playlist_id = ?2",
                params![id.user_id, id.playlist_id],
                favorite_playlist_from_row,
            )
            .optional()?;
        Ok(favorite)
    }

    fn touch_favorite_playlists_containing(&self, user_id: &str, song_id: &str, ts: i64) -> LibraryResult<()> {
        self.conn().execute(
            "UPDATE favorite_playlist SET update_ts = ?1
             WHERE user_id = ?2
               AND playlist_id IN (SELECT playlist_id FROM playlist_song WHERE song_id = ?3)",
            params![ts, user_id, song_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::models::{PlaylistMeta, UserMeta, UserMetaComplete};
    use crate::library_store::test_support::{create_song, create_tmp_store};

    fn create_user(store: &crate::library_store::LibraryStore, name: &str) -> String {
        store
            .write(|uow| {
                uow.create_user(&UserMetaComplete {
                    meta: UserMeta {
                        name: name.to_string(),
                        ..Default::default()
                    },
                    password: "pw".to_string(),
                })
            })
            .unwrap()
            .id
    }

    #[test]
    fn favoriting_playlist_favorites_its_songs() {
        let (_dir, store) = create_tmp_store();
        let user_id = create_user(&store, "u");
        let s1 = create_song(&store, "S1", None, &[]);
        let s2 = create_song(&store, "S2", None, &[]);
        let playlist = store
            .write(|uow| {
                uow.create_playlist(&PlaylistMeta {
                    name: "P".into(),
                    song_ids: vec![s1.id.clone(), s2.id.clone()],
                    owner_user_ids: vec![],
                })
            })
            .unwrap();

        let favorite_id = FavoritePlaylistId {
            user_id: user_id.clone(),
            playlist_id: playlist.id.clone(),
        };
        let favorite = store.write(|uow| uow.create_favorite_playlist(&favorite_id)).unwrap();

        let favorite_songs: Vec<String> = store
            .read(|uow| {
                uow.read_favorite_songs(&FavoriteSongFilter {
                    user_id: Some(user_id.clone()),
                    ..Default::default()
                })
            })
            .unwrap()
            .into_iter()
            .map(|f| f.id.song_id)
            .collect();
        let mut expected = vec![s1.id.clone(), s2.id.clone()];
        expected.sort();
        assert_eq!(favorite_songs, expected);

        let again = store.write(|uow| uow.create_favorite_playlist(&favorite_id)).unwrap();
        assert_eq!(again, favorite);
    }

    #[test]
    fn refavoriting_clears_tombstone() {
        let (_dir, store) = create_tmp_store();
        let user_id = create_user(&store, "u");
        let song = create_song(&store, "S", None, &[]);
        let id = FavoriteSongId {
            user_id: user_id.clone(),
            song_id: song.id.clone(),
        };

        store.write(|uow| uow.create_favorite_song(&id)).unwrap();
        store.write(|uow| uow.delete_favorite_song(&id)).unwrap();
        assert_eq!(
            store.read(|uow| uow.deleted_favorite_song_ids(0)).unwrap(),
            vec![id.clone()]
        );

        store.write(|uow| uow.create_favorite_song(&id)).unwrap();
        assert!(store.read(|uow| uow.deleted_favorite_song_ids(0)).unwrap().is_empty());
        assert!(store
            .read(|uow| uow.deleted_user_favorite_song_ids(0, &user_id))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unfavoriting_playlist_keeps_song_favorites() {
        let (_dir, store) = create_tmp_store();
        let user_id = create_user(&store, "u");
        let song = create_song(&store, "S", None, &[]);
        let playlist = store
            .write(|uow| {
                uow.create_playlist(&PlaylistMeta {
                    name: "P".into(),
                    song_ids: vec![song.id.clone()],
                    owner_user_ids: vec![user_id.clone()],
                })
            })
            .unwrap();

        let id = FavoritePlaylistId {
            user_id: user_id.clone(),
            playlist_id: playlist.id.clone(),
        };
        store.write(|uow| uow.delete_favorite_playlist(&id)).unwrap();

        assert_eq!(
            store
                .read(|uow| uow.deleted_user_favorite_playlist_ids(0, &user_id))
                .unwrap(),
            vec![playlist.id.clone()]
        );
        let favorite_songs = store
            .read(|uow| {
                uow.read_favorite_songs(&FavoriteSongFilter {
                    user_id: Some(user_id.clone()),
                    song_id: Some(song.id.clone()),
                    ..Default::default()
                })
            })
            .unwrap();
        assert_eq!(favorite_songs.len(), 1);
    }

    #[test]
    fn deleting_missing_favorite_is_not_found() {
        let (_dir, store) = create_tmp_store();
        let err = store
            .write(|uow| {
                uow.delete_favorite_song(&FavoriteSongId {
                    user_id: "u".into(),
                    song_id: "s".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { entity: EntityKind::FavoriteSong, .. }));
    }
}
