use super::error::{EntityKind, LibraryError, LibraryResult};
use super::ids::{new_id, now_ts};
use super::models::{
    FavoritePlaylistFilter, FavoritePlaylistId, Playlist, PlaylistFilter, PlaylistMeta,
    INCOMING_PLAYLIST_CAPACITY, INCOMING_PLAYLIST_ID, INCOMING_PLAYLIST_NAME,
};
use super::unit_of_work::{SqlFilter, UnitOfWork};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeSet;
use tracing::{debug, info};

const PLAYLIST_COLUMNS: &str = "p.playlist_id, p.creation_ts, p.update_ts, p.content_update_ts, p.name";

fn playlist_from_row(row: &Row) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        creation_ts: row.get(1)?,
        update_ts: row.get(2)?,
        content_update_ts: row.get(3)?,
        name: row.get(4)?,
        song_ids: Vec::new(),
        owner_user_ids: Vec::new(),
    })
}

impl UnitOfWork<'_> {
    pub fn read_playlists(&self, filter: &PlaylistFilter) -> LibraryResult<Vec<Playlist>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("p.update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(user_id) = &filter.favorite_user_id {
            match filter.favorite_from_ts {
                Some(favorite_from_ts) => sql_filter.and(
                    "EXISTS (SELECT 1 FROM favorite_playlist f WHERE f.playlist_id = p.playlist_id \
                     AND f.user_id = ? AND (f.update_ts >= ? OR p.content_update_ts >= ?))",
                    vec![
                        Box::new(user_id.clone()),
                        Box::new(favorite_from_ts),
                        Box::new(favorite_from_ts),
                    ],
                ),
                None => sql_filter.and(
                    "EXISTS (SELECT 1 FROM favorite_playlist f WHERE f.playlist_id = p.playlist_id AND f.user_id = ?)",
                    vec![Box::new(user_id.clone())],
                ),
            }
        }
        let order_by = if filter.from_ts.is_some() || filter.favorite_from_ts.is_some() {
            "p.update_ts, p.playlist_id"
        } else {
            "p.name, p.playlist_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM playlist p{} ORDER BY {}",
            PLAYLIST_COLUMNS,
            sql_filter.where_sql(),
            order_by
        ))?;
        let mut playlists = stmt
            .query_map(sql_filter.params().as_slice(), playlist_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for playlist in &mut playlists {
            self.load_playlist_links(playlist)?;
        }
        Ok(playlists)
    }

    pub fn read_playlist(&self, playlist_id: &str) -> LibraryResult<Playlist> {
        let mut playlist = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM playlist p WHERE p.playlist_id = ?1", PLAYLIST_COLUMNS),
                params![playlist_id],
                playlist_from_row,
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Playlist, playlist_id))?;
        self.load_playlist_links(&mut playlist)?;
        Ok(playlist)
    }

    /// Create a playlist. Every owner gets it as a favorite.
    pub fn create_playlist(&self, meta: &PlaylistMeta) -> LibraryResult<Playlist> {
        self.insert_playlist(&new_id(), meta)
    }

    /// Update a playlist. `content_update_ts` only moves when the name or the
    /// song list changes. New owners get the playlist as a favorite.
    pub fn update_playlist(&self, playlist_id: &str, meta: &PlaylistMeta) -> LibraryResult<Playlist> {
        let old = self.read_playlist(playlist_id)?;
        self.ensure_songs_exist(&meta.song_ids)?;
        let owner_user_ids = self.checked_owner_ids(&meta.owner_user_ids)?;

        let content_changed = old.name != meta.name || old.song_ids != meta.song_ids;
        let now = now_ts();
        self.conn().execute(
            "UPDATE playlist SET name = ?1, update_ts = ?2,
                                 content_update_ts = CASE WHEN ?3 THEN ?2 ELSE content_update_ts END
             WHERE playlist_id = ?4",
            params![meta.name, now, content_changed, playlist_id],
        )?;

        if old.song_ids != meta.song_ids {
            self.conn().execute(
                "DELETE FROM playlist_song WHERE playlist_id = ?1",
                params![playlist_id],
            )?;
            self.insert_playlist_songs(playlist_id, &meta.song_ids)?;
            if playlist_id == INCOMING_PLAYLIST_ID {
                self.trim_incoming_playlist()?;
            }
        }

        if old.owner_user_ids != owner_user_ids {
            self.conn().execute(
                "DELETE FROM playlist_owned_user WHERE playlist_id = ?1",
                params![playlist_id],
            )?;
            self.insert_playlist_owners(playlist_id, &owner_user_ids)?;
            for user_id in owner_user_ids
                .iter()
                .filter(|user_id| !old.owner_user_ids.contains(user_id))
            {
                self.create_favorite_playlist(&FavoritePlaylistId {
                    user_id: user_id.clone(),
                    playlist_id: playlist_id.to_string(),
                })?;
            }
        }

        self.read_playlist(playlist_id)
    }

    /// Append a song at the end of a playlist. The incoming playlist then
    /// drops its oldest entries beyond its capacity.
    pub fn add_song_to_playlist(&self, playlist_id: &str, song_id: &str) -> LibraryResult<()> {
        self.ensure_exists(EntityKind::Playlist, "playlist", "playlist_id", playlist_id)?;
        self.ensure_exists(EntityKind::Song, "song", "song_id", song_id)?;

        self.conn().execute(
            "INSERT INTO playlist_song (playlist_id, position, song_id)
             SELECT ?1, COALESCE(MAX(position) + 1, 0), ?2 FROM playlist_song WHERE playlist_id = ?1",
            params![playlist_id, song_id],
        )?;
        let now = now_ts();
        self.conn().execute(
            "UPDATE playlist SET update_ts = ?1, content_update_ts = ?1 WHERE playlist_id = ?2",
            params![now, playlist_id],
        )?;

        if playlist_id == INCOMING_PLAYLIST_ID {
            self.trim_incoming_playlist()?;
        }
        Ok(())
    }

    /// Delete a playlist and its favorites. The incoming playlist cannot be
    /// deleted.
    pub fn delete_playlist(&self, playlist_id: &str) -> LibraryResult<Playlist> {
        if playlist_id == INCOMING_PLAYLIST_ID {
            return Err(LibraryError::CannotDeleteIncomingPlaylist);
        }
        let playlist = self.read_playlist(playlist_id)?;

        let favorites = self.read_favorite_playlists(&FavoritePlaylistFilter {
            playlist_id: Some(playlist_id.to_string()),
            ..Default::default()
        })?;
        for favorite in favorites {
            self.delete_favorite_playlist(&favorite.id)?;
        }

        self.conn().execute(
            "DELETE FROM playlist WHERE playlist_id = ?1",
            params![playlist_id],
        )?;
        self.write_tombstone("deleted_playlist", "playlist_id", playlist_id, now_ts())?;
        debug!("Deleted playlist {} ({})", playlist.id, playlist.name);
        Ok(playlist)
    }

    pub fn deleted_playlist_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.deleted_ids("deleted_playlist", "playlist_id", from_ts)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Create the incoming playlist if it does not exist yet. Returns whether
    /// it was created.
    pub(crate) fn ensure_incoming_playlist(&self) -> LibraryResult<bool> {
        if self.exists("playlist", "playlist_id", INCOMING_PLAYLIST_ID)? {
            return Ok(false);
        }
        self.insert_playlist(
            INCOMING_PLAYLIST_ID,
            &PlaylistMeta {
                name: INCOMING_PLAYLIST_NAME.to_string(),
                ..Default::default()
            },
        )?;
        info!("Created incoming playlist");
        Ok(true)
    }

    fn insert_playlist(&self, playlist_id: &str, meta: &PlaylistMeta) -> LibraryResult<Playlist> {
        self.ensure_songs_exist(&meta.song_ids)?;
        let owner_user_ids = self.checked_owner_ids(&meta.owner_user_ids)?;

        let now = now_ts();
        self.conn().execute(
            "INSERT INTO playlist (playlist_id, creation_ts, update_ts, content_update_ts, name)
             VALUES (?1, ?2, ?2, ?2, ?3)",
            params![playlist_id, now, meta.name],
        )?;
        self.insert_playlist_songs(playlist_id, &meta.song_ids)?;
        self.insert_playlist_owners(playlist_id, &owner_user_ids)?;

        for user_id in &owner_user_ids {
            self.create_favorite_playlist(&FavoritePlaylistId {
                user_id: user_id.clone(),
                playlist_id: playlist_id.to_string(),
            })?;
        }

        self.read_playlist(playlist_id)
    }

    /// Evict the oldest incoming entries while the playlist is over capacity.
    /// Eviction removes positions, so a song also present at a later position
    /// stays in the playlist.
    fn trim_incoming_playlist(&self) -> LibraryResult<()> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM playlist_song WHERE playlist_id = ?1",
            params![INCOMING_PLAYLIST_ID],
            |row| row.get(0),
        )?;
        let excess = count - INCOMING_PLAYLIST_CAPACITY;
        if excess <= 0 {
            return Ok(());
        }

        self.conn().execute(
            "DELETE FROM playlist_song WHERE rowid IN (
                 SELECT rowid FROM playlist_song WHERE playlist_id = ?1 ORDER BY position LIMIT ?2
             )",
            params![INCOMING_PLAYLIST_ID, excess],
        )?;
        let first_position: i64 = self.conn().query_row(
            "SELECT COALESCE(MIN(position), 0) FROM playlist_song WHERE playlist_id = ?1",
            params![INCOMING_PLAYLIST_ID],
            |row| row.get(0),
        )?;
        self.conn().execute(
            "UPDATE playlist_song SET position = position - ?1 WHERE playlist_id = ?2",
            params![first_position, INCOMING_PLAYLIST_ID],
        )?;
        debug!("Evicted {} entries from the incoming playlist", excess);
        Ok(())
    }

    fn load_playlist_links(&self, playlist: &mut Playlist) -> LibraryResult<()> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT song_id FROM playlist_song WHERE playlist_id = ?1 ORDER BY position",
        )?;
        playlist.song_ids = stmt
            .query_map(params![playlist.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut stmt = self.conn().prepare_cached(
            "SELECT user_id FROM playlist_owned_user WHERE playlist_id = ?1 ORDER BY user_id",
        )?;
        playlist.owner_user_ids = stmt
            .query_map(params![playlist.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(())
    }

    fn insert_playlist_songs(&self, playlist_id: &str, song_ids: &[String]) -> LibraryResult<()> {
        for (position, song_id) in song_ids.iter().enumerate() {
            self.conn().execute(
                "INSERT INTO playlist_song (playlist_id, position, song_id) VALUES (?1, ?2, ?3)",
                params![playlist_id, position as i64, song_id],
            )?;
        }
        Ok(())
    }

    fn insert_playlist_owners(&self, playlist_id: &str, user_ids: &[String]) -> LibraryResult<()> {
        for user_id in user_ids {
            self.conn().execute(
                "INSERT INTO playlist_owned_user (playlist_id, user_id) VALUES (?1, ?2)",
                params![playlist_id, user_id],
            )?;
        }
        Ok(())
    }

    fn ensure_songs_exist(&self, song_ids: &[String]) -> LibraryResult<()> {
        for song_id in song_ids.iter().collect::<BTreeSet<_>>() {
            self.ensure_exists(EntityKind::Song, "song", "song_id", song_id)?;
        }
        Ok(())
    }

    /// Deduplicated, sorted owner ids, all of existing users.
    fn checked_owner_ids(&self, user_ids: &[String]) -> LibraryResult<Vec<String>> {
        let unique: BTreeSet<String> = user_ids.iter().cloned().collect();
        for user_id in &unique {
            self.ensure_exists(EntityKind::User, "user", "user_id", user_id)?;
        }
        Ok(unique.into_iter().collect())
    }
}
