use super::error::{EntityKind, LibraryError, LibraryResult};
use super::ids::{new_id, now_ts};
use super::models::{Album, AlbumFilter, AlbumMeta};
use super::unit_of_work::{SqlFilter, UnitOfWork};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const ALBUM_COLUMNS: &str = "album_id, creation_ts, update_ts, name";

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        creation_ts: row.get(1)?,
        update_ts: row.get(2)?,
        name: row.get(3)?,
        artist_ids: Vec::new(),
    })
}

impl UnitOfWork<'_> {
    pub fn read_albums(&self, filter: &AlbumFilter) -> LibraryResult<Vec<Album>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(name) = &filter.name {
            sql_filter.and("instr(lower(name), lower(?)) > 0", vec![Box::new(name.clone())]);
        }
        let order_by = if filter.from_ts.is_some() {
            "update_ts, album_id"
        } else {
            "name, album_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM album{} ORDER BY {}",
            ALBUM_COLUMNS,
            sql_filter.where_sql(),
            order_by
        ))?;
        let mut albums = stmt
            .query_map(sql_filter.params().as_slice(), album_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for album in &mut albums {
            album.artist_ids = self.album_artist_ids(&album.id)?;
        }
        Ok(albums)
    }

    pub fn read_album(&self, album_id: &str) -> LibraryResult<Album> {
        let mut album = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM album WHERE album_id = ?1", ALBUM_COLUMNS),
                params![album_id],
                album_from_row,
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Album, album_id))?;
        album.artist_ids = self.album_artist_ids(album_id)?;
        Ok(album)
    }

    pub fn create_album(&self, meta: &AlbumMeta) -> LibraryResult<Album> {
        let now = now_ts();
        let album = Album {
            id: new_id(),
            creation_ts: now,
            update_ts: now,
            name: meta.name.clone(),
            artist_ids: Vec::new(),
        };
        self.conn().execute(
            "INSERT INTO album (album_id, creation_ts, update_ts, name) VALUES (?1, ?2, ?3, ?4)",
            params![album.id, album.creation_ts, album.update_ts, album.name],
        )?;
        debug!("Created album {} ({})", album.id, album.name);
        Ok(album)
    }

    /// A rename refreshes the album's songs since their tags carry the
    /// album name.
    pub fn update_album(&self, album_id: &str, meta: &AlbumMeta) -> LibraryResult<Album> {
        let old = self.read_album(album_id)?;
        self.conn().execute(
            "UPDATE album SET name = ?1, update_ts = ?2 WHERE album_id = ?3",
            params![meta.name, now_ts(), album_id],
        )?;

        if old.name != meta.name {
            for song_id in self.album_song_ids(album_id)? {
                self.refresh_song(&song_id)?;
            }
        }

        self.read_album(album_id)
    }

    pub fn delete_album(&self, album_id: &str) -> LibraryResult<Album> {
        let album = self.read_album(album_id)?;
        if !self.album_song_ids(album_id)?.is_empty() {
            return Err(LibraryError::AlbumHasSongs(album_id.to_string()));
        }

        self.conn()
            .execute("DELETE FROM album WHERE album_id = ?1", params![album_id])?;
        self.write_tombstone("deleted_album", "album_id", album_id, now_ts())?;
        Ok(album)
    }

    pub fn deleted_album_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.deleted_ids("deleted_album", "album_id", from_ts)
    }

    /// Resolve an album name read from a tag to an album id.
    ///
    /// A blank name means no album. When `last_album_id` is one of the
    /// albums with that name it is reused. Without a hint the oldest
    /// homonym is reused. Otherwise a new album is created.
    pub fn resolve_album_by_name(
        &self,
        name: &str,
        last_album_id: Option<&str>,
    ) -> LibraryResult<Option<String>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT album_id FROM album WHERE name = ?1 ORDER BY album_id")?;
        let matches = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let reused = match last_album_id {
            Some(hint) => matches.into_iter().find(|id| id == hint),
            None => matches.into_iter().next(),
        };
        match reused {
            Some(album_id) => Ok(Some(album_id)),
            None => Ok(Some(
                self.create_album(&AlbumMeta {
                    name: name.to_string(),
                })?
                .id,
            )),
        }
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    pub(crate) fn album_artist_ids(&self, album_id: &str) -> LibraryResult<Vec<String>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT artist_id FROM album_artist WHERE album_id = ?1 ORDER BY position",
        )?;
        let artist_ids = stmt
            .query_map(params![album_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(artist_ids)
    }

    pub(crate) fn album_song_ids(&self, album_id: &str) -> LibraryResult<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT song_id FROM song WHERE album_id = ?1 ORDER BY song_id")?;
        let song_ids = stmt
            .query_map(params![album_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(song_ids)
    }
}
