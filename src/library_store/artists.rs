use super::error::{EntityKind, LibraryError, LibraryResult};
use super::ids::{new_id, now_ts};
use super::models::{Artist, ArtistFilter, ArtistMeta};
use super::unit_of_work::{SqlFilter, UnitOfWork};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeSet;
use tracing::debug;

const ARTIST_COLUMNS: &str = "artist_id, creation_ts, update_ts, name";

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        creation_ts: row.get(1)?,
        update_ts: row.get(2)?,
        name: row.get(3)?,
    })
}

impl UnitOfWork<'_> {
    pub fn read_artists(&self, filter: &ArtistFilter) -> LibraryResult<Vec<Artist>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(name) = &filter.name {
            sql_filter.and("instr(lower(name), lower(?)) > 0", vec![Box::new(name.clone())]);
        }
        let order_by = if filter.from_ts.is_some() {
            "update_ts, artist_id"
        } else {
            "name, artist_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM artist{} ORDER BY {}",
            ARTIST_COLUMNS,
            sql_filter.where_sql(),
            order_by
        ))?;
        let artists = stmt
            .query_map(sql_filter.params().as_slice(), artist_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    pub fn read_artist(&self, artist_id: &str) -> LibraryResult<Artist> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM artist WHERE artist_id = ?1", ARTIST_COLUMNS),
                params![artist_id],
                artist_from_row,
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Artist, artist_id))
    }

    pub fn create_artist(&self, meta: &ArtistMeta) -> LibraryResult<Artist> {
        let now = now_ts();
        let artist = Artist {
            id: new_id(),
            creation_ts: now,
            update_ts: now,
            name: meta.name.clone(),
        };
        self.conn().execute(
            "INSERT INTO artist (artist_id, creation_ts, update_ts, name) VALUES (?1, ?2, ?3, ?4)",
            params![artist.id, artist.creation_ts, artist.update_ts, artist.name],
        )?;
        debug!("Created artist {} ({})", artist.id, artist.name);
        Ok(artist)
    }

    /// Renaming an artist refreshes every song it appears on and re-saves
    /// the albums it is an album artist of.
    pub fn update_artist(&self, artist_id: &str, meta: &ArtistMeta) -> LibraryResult<Artist> {
        let old = self.read_artist(artist_id)?;
        self.conn().execute(
            "UPDATE artist SET name = ?1, update_ts = ?2 WHERE artist_id = ?3",
            params![meta.name, now_ts(), artist_id],
        )?;

        if old.name != meta.name {
            // Re-saved albums refresh all their songs, so each song is
            // refreshed once either way.
            let mut songs = Vec::new();
            for song_id in self.artist_song_ids(artist_id)? {
                songs.push(self.read_song(&song_id)?);
            }
            let album_ids: BTreeSet<&str> = songs
                .iter()
                .filter_map(|song| song.album_id.as_deref())
                .collect();
            let mut refreshed_album_ids = BTreeSet::new();
            for album_id in album_ids {
                if self.recompute_album_artists(album_id, Some(artist_id))? {
                    refreshed_album_ids.insert(album_id);
                }
            }
            for song in &songs {
                let refreshed = song
                    .album_id
                    .as_deref()
                    .is_some_and(|album_id| refreshed_album_ids.contains(album_id));
                if !refreshed {
                    self.refresh_song(&song.id)?;
                }
            }
        }

        self.read_artist(artist_id)
    }

    pub fn delete_artist(&self, artist_id: &str) -> LibraryResult<Artist> {
        let artist = self.read_artist(artist_id)?;
        if !self.artist_song_ids(artist_id)?.is_empty() {
            return Err(LibraryError::ArtistHasSongs(artist_id.to_string()));
        }

        self.conn().execute(
            "DELETE FROM album_artist WHERE artist_id = ?1",
            params![artist_id],
        )?;
        self.conn()
            .execute("DELETE FROM artist WHERE artist_id = ?1", params![artist_id])?;
        self.write_tombstone("deleted_artist", "artist_id", artist_id, now_ts())?;
        Ok(artist)
    }

    pub fn deleted_artist_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.deleted_ids("deleted_artist", "artist_id", from_ts)
    }

    /// Map artist names to ids, creating the artists that do not exist yet.
    /// Names are trimmed and blank names dropped. An existing artist matches
    /// on exact name; among homonyms the oldest id wins.
    pub fn resolve_artists_by_name(&self, names: &[String]) -> LibraryResult<Vec<String>> {
        let mut artist_ids = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let existing: Option<String> = self
                .conn()
                .query_row(
                    "SELECT artist_id FROM artist WHERE name = ?1 ORDER BY artist_id LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            let artist_id = match existing {
                Some(artist_id) => artist_id,
                None => {
                    self.create_artist(&ArtistMeta {
                        name: name.to_string(),
                    })?
                    .id
                }
            };
            if !artist_ids.contains(&artist_id) {
                artist_ids.push(artist_id);
            }
        }
        Ok(artist_ids)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Deduplicate `artist_ids` and order them by artist name then id.
    /// Fails with not-found if one of them does not exist.
    pub(crate) fn sort_artist_ids(&self, artist_ids: &[String]) -> LibraryResult<Vec<String>> {
        let unique: BTreeSet<&String> = artist_ids.iter().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; unique.len()].join(", ");
        let mut stmt = self.conn().prepare(&format!(
            "SELECT artist_id FROM artist WHERE artist_id IN ({}) ORDER BY name, artist_id",
            placeholders
        ))?;
        let sorted = stmt
            .query_map(params_from_iter(unique.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if sorted.len() != unique.len() {
            let missing = unique
                .into_iter()
                .find(|id| !sorted.contains(id))
                .cloned()
                .unwrap_or_default();
            return Err(LibraryError::not_found(EntityKind::Artist, missing));
        }
        Ok(sorted)
    }

    pub(crate) fn artist_names(&self, artist_ids: &[String]) -> LibraryResult<Vec<String>> {
        artist_ids
            .iter()
            .map(|artist_id| Ok(self.read_artist(artist_id)?.name))
            .collect()
    }

    fn artist_song_ids(&self, artist_id: &str) -> LibraryResult<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT song_id FROM artist_song WHERE artist_id = ?1 ORDER BY song_id")?;
        let song_ids = stmt
            .query_map(params![artist_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(song_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::models::AlbumMeta;
    use crate::library_store::test_support::{
        create_song, create_tmp_store, create_tmp_store_with_codec, RecordingCodec,
    };
    use std::sync::Arc;

    #[test]
    fn reads_artists_by_name_or_watermark() {
        let (_dir, store) = create_tmp_store();
        let (zed, abba) = store
            .write(|uow| {
                let zed = uow.create_artist(&ArtistMeta { name: "Zed".into() })?;
                let abba = uow.create_artist(&ArtistMeta { name: "Abba".into() })?;
                Ok((zed, abba))
            })
            .unwrap();

        let by_name = store.read(|uow| uow.read_artists(&ArtistFilter::default())).unwrap();
        assert_eq!(by_name, vec![abba.clone(), zed.clone()]);

        let by_ts = store
            .read(|uow| {
                uow.read_artists(&ArtistFilter {
                    from_ts: Some(0),
                    ..Default::default()
                })
            })
            .unwrap();
        assert_eq!(by_ts, vec![zed.clone(), abba.clone()]);

        let matching = store
            .read(|uow| {
                uow.read_artists(&ArtistFilter {
                    name: Some("ZE".into()),
                    ..Default::default()
                })
            })
            .unwrap();
        assert_eq!(matching, vec![zed]);
    }

    #[test]
    fn resolve_reuses_existing_and_creates_missing() {
        let (_dir, store) = create_tmp_store();
        let existing = store
            .write(|uow| uow.create_artist(&ArtistMeta { name: "Bar".into() }))
            .unwrap();

        let ids = store
            .write(|uow| {
                uow.resolve_artists_by_name(&[
                    " Bar ".to_string(),
                    "".to_string(),
                    "New".to_string(),
                    "Bar".to_string(),
                ])
            })
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], existing.id);
        let created = store.read(|uow| uow.read_artist(&ids[1])).unwrap();
        assert_eq!(created.name, "New");
    }

    #[test]
    fn sorting_unknown_artist_is_not_found() {
        let (_dir, store) = create_tmp_store();
        let err = store
            .read(|uow| uow.sort_artist_ids(&["missing".to_string()]))
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn renaming_artist_retags_each_song_once() {
        let codec = Arc::new(RecordingCodec::default());
        let (_dir, store) = create_tmp_store_with_codec(codec.clone());
        let artist = store.create_artist(&ArtistMeta { name: "Bar".into() }).unwrap();
        let album = store.create_album(&AlbumMeta { name: "Foo".into() }).unwrap();
        create_song(&store, "Track", Some(&album.id), &[artist.id.clone()]);
        create_song(&store, "Single", None, &[artist.id.clone()]);
        let track_rewrites = codec.rewrites_of("Track");
        let single_rewrites = codec.rewrites_of("Single");

        store
            .update_artist(&artist.id, &ArtistMeta { name: "Baz".into() })
            .unwrap();

        assert_eq!(codec.rewrites_of("Track"), track_rewrites + 1);
        assert_eq!(codec.rewrites_of("Single"), single_rewrites + 1);
        let last = codec.rewrites.lock().unwrap();
        let track = last.iter().rev().find(|fields| fields.title == "Track").unwrap();
        assert_eq!(track.artist_names, vec!["Baz".to_string()]);
        assert_eq!(track.album_artist_names, vec!["Baz".to_string()]);
    }

    #[test]
    fn deleting_unused_artist_writes_tombstone() {
        let (_dir, store) = create_tmp_store();
        let artist = store
            .write(|uow| uow.create_artist(&ArtistMeta { name: "Gone".into() }))
            .unwrap();

        store.write(|uow| uow.delete_artist(&artist.id)).unwrap();

        let deleted = store.read(|uow| uow.deleted_artist_ids(0)).unwrap();
        assert_eq!(deleted, vec![artist.id.clone()]);
        let err = store.read(|uow| uow.read_artist(&artist.id)).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }
}
