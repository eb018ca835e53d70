use super::error::{EntityKind, LibraryError, LibraryResult};
use super::ids::{new_id, now_ts};
use super::models::{
    FavoriteSongFilter, NewSong, Song, SongFilter, SongMeta, SongUpdate, INCOMING_PLAYLIST_ID,
};
use super::unit_of_work::{SqlFilter, UnitOfWork};
use crate::tags::{BitDepth, SongFormat, TagFields};
use rusqlite::{params, OptionalExtension, Row};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Name given to imported songs whose tag carries no title.
const UNKNOWN_TITLE: &str = "(Unknown)";

const SONG_COLUMNS: &str = "s.song_id, s.creation_ts, s.update_ts, s.name, s.format, s.size, \
     s.bit_depth, s.publication_year, s.album_id, s.track_number, s.explicit_fg";

fn song_from_row(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        creation_ts: row.get(1)?,
        update_ts: row.get(2)?,
        name: row.get(3)?,
        format: SongFormat::from_db_value(row.get(4)?),
        size: row.get(5)?,
        bit_depth: BitDepth::from_db_value(row.get(6)?),
        publication_year: row.get(7)?,
        album_id: row.get(8)?,
        track_number: row.get(9)?,
        explicit: row.get::<_, i64>(10)? != 0,
        artist_ids: Vec::new(),
    })
}

impl UnitOfWork<'_> {
    pub fn read_songs(&self, filter: &SongFilter) -> LibraryResult<Vec<Song>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("s.update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(album_id) = &filter.album_id {
            sql_filter.and("s.album_id = ?", vec![Box::new(album_id.clone())]);
        }
        if let Some(artist_id) = &filter.artist_id {
            sql_filter.and(
                "s.song_id IN (SELECT song_id FROM artist_song WHERE artist_id = ?)",
                vec![Box::new(artist_id.clone())],
            );
        }
        if let Some(user_id) = &filter.favorite_user_id {
            match filter.favorite_from_ts {
                Some(favorite_from_ts) => sql_filter.and(
                    "EXISTS (SELECT 1 FROM favorite_song f WHERE f.song_id = s.song_id \
                     AND f.user_id = ? AND (f.update_ts >= ? OR s.update_ts >= ?))",
                    vec![
                        Box::new(user_id.clone()),
                        Box::new(favorite_from_ts),
                        Box::new(favorite_from_ts),
                    ],
                ),
                None => sql_filter.and(
                    "EXISTS (SELECT 1 FROM favorite_song f WHERE f.song_id = s.song_id AND f.user_id = ?)",
                    vec![Box::new(user_id.clone())],
                ),
            }
        }
        let order_by = if filter.from_ts.is_some() || filter.favorite_from_ts.is_some() {
            "s.update_ts, s.song_id"
        } else {
            "s.name, s.song_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM song s{} ORDER BY {}",
            SONG_COLUMNS,
            sql_filter.where_sql(),
            order_by
        ))?;
        let mut songs = stmt
            .query_map(sql_filter.params().as_slice(), song_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for song in &mut songs {
            song.artist_ids = self.song_artist_ids(&song.id)?;
        }
        Ok(songs)
    }

    pub fn read_song(&self, song_id: &str) -> LibraryResult<Song> {
        let mut song = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM song s WHERE s.song_id = ?1", SONG_COLUMNS),
                params![song_id],
                song_from_row,
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Song, song_id))?;
        song.artist_ids = self.song_artist_ids(song_id)?;
        Ok(song)
    }

    /// Location of the song's content file.
    pub fn song_content_path(&self, song_id: &str) -> LibraryResult<PathBuf> {
        let song = self.read_song(song_id)?;
        Ok(self.content_path(&song.id, song.format))
    }

    /// Create a song and store its content.
    ///
    /// The content file is tagged with the song's metadata. If tagging fails
    /// the file is removed and the whole unit of work fails. The new song is
    /// appended to the incoming playlist.
    pub fn create_song(&self, new_song: NewSong<'_>) -> LibraryResult<Song> {
        let meta = new_song.meta;
        let artist_ids = self.sort_artist_ids(&meta.artist_ids)?;
        if let Some(album_id) = &meta.album_id {
            self.ensure_exists(EntityKind::Album, "album", "album_id", album_id)?;
        }

        let now = now_ts();
        let song_id = new_id();
        self.conn().execute(
            "INSERT INTO song (song_id, creation_ts, update_ts, name, format, size, bit_depth,
                               publication_year, album_id, track_number, explicit_fg)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                song_id,
                now,
                now,
                meta.name,
                new_song.format.to_db_value(),
                new_song.content.len() as i64,
                new_song.bit_depth.to_db_value(),
                meta.publication_year,
                meta.album_id,
                meta.track_number,
                meta.explicit as i64,
            ],
        )?;
        self.link_song_artists(&song_id, &artist_ids)?;

        let path = self.write_content(&song_id, new_song.format, new_song.content)?;
        let song = self.read_song(&song_id)?;
        if let Err(e) = self.rewrite_song_tags(&song) {
            // The content file is tracked as created, so the rollback removes it
            warn!("Failed to tag new song {} at {:?}: {}", song_id, path, e);
            return Err(e);
        }

        if let Some(album_id) = &song.album_id {
            self.recompute_album_artists(album_id, None)?;
        }
        self.add_song_to_playlist(INCOMING_PLAYLIST_ID, &song_id)?;

        debug!("Created song {} ({})", song_id, song.name);
        self.read_song(&song_id)
    }

    /// Import a raw audio blob: detect its format, read its tag and resolve
    /// the tag's album and artist names to library entities.
    ///
    /// `last_album_id` is the album the previous song of the same import
    /// batch landed in, used to tell homonym albums apart.
    pub fn create_song_from_raw_content(
        &self,
        content: &[u8],
        last_album_id: Option<&str>,
    ) -> LibraryResult<Song> {
        let format = SongFormat::from_magic_bytes(content);
        let metadata = self.tag_codec().extract(format, content)?;

        let album_id = match &metadata.album_name {
            Some(album_name) => self.resolve_album_by_name(album_name, last_album_id)?,
            None => None,
        };
        let artist_ids = self.resolve_artists_by_name(&metadata.artist_names)?;

        let song = self.create_song(NewSong {
            meta: SongMeta {
                name: metadata
                    .title
                    .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                publication_year: metadata.year,
                album_id,
                track_number: metadata.track_number,
                explicit: false,
                artist_ids,
            },
            format,
            bit_depth: metadata.bit_depth,
            content,
        })?;

        info!(
            "Imported {:?} song {} ({}, {} bytes)",
            format, song.id, song.name, song.size
        );
        Ok(song)
    }

    /// Apply `update` to a song. With `None` nothing changes but the side
    /// effects run again: tags are rewritten and the album recomputed.
    pub fn update_song(&self, song_id: &str, update: Option<&SongUpdate>) -> LibraryResult<Song> {
        let old = self.read_song(song_id)?;
        let before = self.tag_fields(&old)?;

        let mut meta = SongMeta {
            name: old.name.clone(),
            publication_year: old.publication_year,
            album_id: old.album_id.clone(),
            track_number: old.track_number,
            explicit: old.explicit,
            artist_ids: old.artist_ids.clone(),
        };
        if let Some(update) = update {
            if let Some(name) = &update.name {
                meta.name = name.clone();
            }
            if let Some(publication_year) = update.publication_year {
                meta.publication_year = publication_year;
            }
            if let Some(album_id) = &update.album_id {
                meta.album_id = album_id.clone();
            }
            if let Some(track_number) = update.track_number {
                meta.track_number = track_number;
            }
            if let Some(explicit) = update.explicit {
                meta.explicit = explicit;
            }
            if let Some(artist_ids) = &update.artist_ids {
                meta.artist_ids = artist_ids.clone();
            }
        }

        let artist_ids = self.sort_artist_ids(&meta.artist_ids)?;
        let album_changed = meta.album_id != old.album_id;
        let artists_changed = artist_ids != old.artist_ids;
        if album_changed {
            if let Some(album_id) = &meta.album_id {
                self.ensure_exists(EntityKind::Album, "album", "album_id", album_id)?;
            }
        }

        self.conn().execute(
            "UPDATE song SET name = ?1, publication_year = ?2, album_id = ?3, track_number = ?4,
                             explicit_fg = ?5, update_ts = ?6
             WHERE song_id = ?7",
            params![
                meta.name,
                meta.publication_year,
                meta.album_id,
                meta.track_number,
                meta.explicit as i64,
                now_ts(),
                song_id,
            ],
        )?;
        if artists_changed {
            self.conn().execute(
                "DELETE FROM artist_song WHERE song_id = ?1",
                params![song_id],
            )?;
            self.link_song_artists(song_id, &artist_ids)?;
        }

        let song = self.read_song(song_id)?;
        if update.is_none() || self.tag_fields(&song)? != before {
            self.rewrite_song_tags(&song)?;
        }

        if album_changed {
            if let Some(old_album_id) = &old.album_id {
                self.recompute_album_artists(old_album_id, None)?;
            }
        }
        if album_changed || artists_changed || update.is_none() {
            if let Some(album_id) = &song.album_id {
                self.recompute_album_artists(album_id, None)?;
            }
        }

        self.read_song(song_id)
    }

    /// Delete a song with everything that references it. The content file is
    /// removed once the unit of work commits.
    pub fn delete_song(&self, song_id: &str) -> LibraryResult<Song> {
        let song = self.read_song(song_id)?;
        let now = now_ts();

        let favorites = self.read_favorite_songs(&FavoriteSongFilter {
            song_id: Some(song_id.to_string()),
            ..Default::default()
        })?;
        for favorite in favorites {
            self.delete_favorite_song(&favorite.id)?;
        }

        self.conn().execute(
            "UPDATE playlist SET update_ts = ?1, content_update_ts = ?1
             WHERE playlist_id IN (SELECT playlist_id FROM playlist_song WHERE song_id = ?2)",
            params![now, song_id],
        )?;
        self.conn().execute(
            "DELETE FROM playlist_song WHERE song_id = ?1",
            params![song_id],
        )?;
        self.conn().execute(
            "DELETE FROM artist_song WHERE song_id = ?1",
            params![song_id],
        )?;
        self.conn()
            .execute("DELETE FROM song WHERE song_id = ?1", params![song_id])?;
        self.write_tombstone("deleted_song", "song_id", song_id, now)?;

        if let Some(album_id) = &song.album_id {
            self.recompute_album_artists(album_id, None)?;
        }

        self.schedule_file_removal(self.content_path(&song.id, song.format));
        debug!("Deleted song {} ({})", song.id, song.name);
        Ok(song)
    }

    pub fn deleted_song_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.deleted_ids("deleted_song", "song_id", from_ts)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Bump the song's update_ts and rewrite its tags, after something the
    /// tags are derived from changed outside the song row.
    pub(crate) fn refresh_song(&self, song_id: &str) -> LibraryResult<Song> {
        self.conn().execute(
            "UPDATE song SET update_ts = ?1 WHERE song_id = ?2",
            params![now_ts(), song_id],
        )?;
        let song = self.read_song(song_id)?;
        self.rewrite_song_tags(&song)?;
        Ok(song)
    }

    pub(crate) fn tag_fields(&self, song: &Song) -> LibraryResult<TagFields> {
        let (album_name, album_artist_names) = match &song.album_id {
            Some(album_id) => {
                let album = self.read_album(album_id)?;
                (Some(album.name), self.artist_names(&album.artist_ids)?)
            }
            None => (None, Vec::new()),
        };
        Ok(TagFields {
            title: song.name.clone(),
            album_name,
            album_artist_names,
            artist_names: self.artist_names(&song.artist_ids)?,
            track_number: song.track_number,
            year: song.publication_year,
        })
    }

    /// Rewrite the song's embedded tags in place. The previous content is
    /// backed up first so a rollback restores it.
    fn rewrite_song_tags(&self, song: &Song) -> LibraryResult<()> {
        if !self.tag_codec().writes_tags() {
            return Ok(());
        }
        let fields = self.tag_fields(song)?;
        let path = self.content_path(&song.id, song.format);
        self.back_up_file(&path)?;
        self.tag_codec().rewrite(song.format, &path, &fields)?;
        Ok(())
    }

    /// `<content_dir>/<last two characters of the id>/<id><ext>`
    pub(crate) fn content_path(&self, song_id: &str, format: SongFormat) -> PathBuf {
        let shard = &song_id[song_id.len().saturating_sub(2)..];
        self.content_dir()
            .join(shard)
            .join(format!("{}{}", song_id, format.extension()))
    }

    fn write_content(&self, song_id: &str, format: SongFormat, content: &[u8]) -> LibraryResult<PathBuf> {
        let path = self.content_path(song_id, format);
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.content_dir().to_path_buf());
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        self.track_created_file(path.clone());
        Ok(path)
    }

    fn link_song_artists(&self, song_id: &str, artist_ids: &[String]) -> LibraryResult<()> {
        for artist_id in artist_ids {
            self.conn().execute(
                "INSERT INTO artist_song (artist_id, song_id) VALUES (?1, ?2)",
                params![artist_id, song_id],
            )?;
        }
        Ok(())
    }

    fn song_artist_ids(&self, song_id: &str) -> LibraryResult<Vec<String>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT a.artist_id FROM artist_song l
             JOIN artist a ON a.artist_id = l.artist_id
             WHERE l.song_id = ?1
             ORDER BY a.name, a.artist_id",
        )?;
        let artist_ids = stmt
            .query_map(params![song_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(artist_ids)
    }
}
