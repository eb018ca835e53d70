//! Album artist consensus.
//!
//! An album's artists are never set by clients. They are the artists that
//! appear on strictly more than half of the album's songs, recomputed every
//! time the album's song set or one of its songs' artist sets changes.

use super::error::{EntityKind, LibraryResult};
use super::ids::now_ts;
use super::unit_of_work::UnitOfWork;
use rusqlite::params;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Artists appearing on strictly more than `song_count / 2` of the given
/// songs. Each artist counts at most once per song. Returned in id order.
pub fn majority_artist_ids(song_artist_ids: &[Vec<String>]) -> Vec<String> {
    let threshold = song_artist_ids.len() / 2;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for artist_ids in song_artist_ids {
        let unique: HashSet<&str> = artist_ids.iter().map(String::as_str).collect();
        for artist_id in unique {
            *counts.entry(artist_id).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(artist_id, _)| artist_id.to_string())
        .collect()
}

impl UnitOfWork<'_> {
    /// Recompute the artists of `album_id` from its current songs.
    ///
    /// The album is re-saved, and its songs refreshed, when the derived list
    /// differs from the stored one or when `renamed_artist_id` is one of the
    /// stored album artists. Returns whether the album was re-saved.
    pub fn recompute_album_artists(
        &self,
        album_id: &str,
        renamed_artist_id: Option<&str>,
    ) -> LibraryResult<bool> {
        self.ensure_exists(EntityKind::Album, "album", "album_id", album_id)?;

        let mut song_artists: BTreeMap<String, Vec<String>> = BTreeMap::new();
        {
            let mut stmt = self.conn().prepare_cached(
                "SELECT s.song_id, a.artist_id FROM song s
                 LEFT JOIN artist_song a ON a.song_id = s.song_id
                 WHERE s.album_id = ?1",
            )?;
            let rows = stmt.query_map(params![album_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            for row in rows {
                let (song_id, artist_id) = row?;
                let entry = song_artists.entry(song_id).or_default();
                if let Some(artist_id) = artist_id {
                    entry.push(artist_id);
                }
            }
        }
        let song_artists: Vec<Vec<String>> = song_artists.into_values().collect();

        let derived = self.sort_artist_ids(&majority_artist_ids(&song_artists))?;
        let stored = self.album_artist_ids(album_id)?;

        let renamed_member =
            renamed_artist_id.is_some_and(|renamed| stored.iter().any(|id| id == renamed));
        if derived == stored && !renamed_member {
            return Ok(false);
        }

        self.conn().execute(
            "DELETE FROM album_artist WHERE album_id = ?1",
            params![album_id],
        )?;
        for (position, artist_id) in derived.iter().enumerate() {
            self.conn().execute(
                "INSERT INTO album_artist (album_id, position, artist_id) VALUES (?1, ?2, ?3)",
                params![album_id, position as i64, artist_id],
            )?;
        }
        self.conn().execute(
            "UPDATE album SET update_ts = ?1 WHERE album_id = ?2",
            params![now_ts(), album_id],
        )?;

        for song_id in self.album_song_ids(album_id)? {
            self.refresh_song(&song_id)?;
        }

        debug!(
            "Album {} artists recomputed: {:?} -> {:?}",
            album_id, stored, derived
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn two_of_three_is_a_majority() {
        let songs = vec![ids(&["A"]), ids(&["A"]), ids(&["B"])];
        assert_eq!(majority_artist_ids(&songs), ids(&["A"]));
    }

    #[test]
    fn one_of_two_is_not_a_majority() {
        let songs = vec![ids(&["A"]), ids(&["B"])];
        assert!(majority_artist_ids(&songs).is_empty());
    }

    #[test]
    fn no_songs_means_no_artists() {
        assert!(majority_artist_ids(&[]).is_empty());
    }

    #[test]
    fn sole_song_makes_every_artist_qualify() {
        let songs = vec![ids(&["B", "A"])];
        assert_eq!(majority_artist_ids(&songs), ids(&["A", "B"]));
    }

    #[test]
    fn duplicates_within_a_song_count_once() {
        let songs = vec![ids(&["A", "A"]), ids(&["B"]), ids(&["C"])];
        assert!(majority_artist_ids(&songs).is_empty());
    }

    #[test]
    fn songs_without_artists_still_count_towards_the_total() {
        let songs = vec![ids(&["A"]), ids(&[]), ids(&[]), ids(&["A"])];
        assert!(majority_artist_ids(&songs).is_empty());
    }

    mod recompute {
        use crate::library_store::models::{AlbumMeta, ArtistMeta};
        use crate::library_store::test_support::{create_song, create_tmp_store};

        #[test]
        fn stored_artists_follow_song_majority() {
            let (_dir, store) = create_tmp_store();
            let album = store.create_album(&AlbumMeta { name: "Foo".into() }).unwrap();
            let a = store.create_artist(&ArtistMeta { name: "A".into() }).unwrap();
            let b = store.create_artist(&ArtistMeta { name: "B".into() }).unwrap();

            create_song(&store, "1", Some(&album.id), &[a.id.clone()]);
            create_song(&store, "2", Some(&album.id), &[b.id.clone()]);
            assert!(store.read_album(&album.id).unwrap().artist_ids.is_empty());

            create_song(&store, "3", Some(&album.id), &[a.id.clone()]);
            assert_eq!(store.read_album(&album.id).unwrap().artist_ids, vec![a.id]);
        }

        #[test]
        fn unchanged_majority_is_a_no_op() {
            let (_dir, store) = create_tmp_store();
            let album = store.create_album(&AlbumMeta { name: "Foo".into() }).unwrap();
            let a = store.create_artist(&ArtistMeta { name: "A".into() }).unwrap();
            create_song(&store, "1", Some(&album.id), &[a.id.clone()]);
            let before = store.read_album(&album.id).unwrap();

            assert!(!store.recompute_album_artists(&album.id, None).unwrap());
            assert_eq!(store.read_album(&album.id).unwrap(), before);
        }

        #[test]
        fn renamed_member_resaves_album_and_refreshes_songs() {
            let (_dir, store) = create_tmp_store();
            let album = store.create_album(&AlbumMeta { name: "Foo".into() }).unwrap();
            let a = store.create_artist(&ArtistMeta { name: "A".into() }).unwrap();
            let song = create_song(&store, "1", Some(&album.id), &[a.id.clone()]);
            let album_before = store.read_album(&album.id).unwrap();

            store
                .update_artist(&a.id, &ArtistMeta { name: "A2".into() })
                .unwrap();

            let album_after = store.read_album(&album.id).unwrap();
            assert!(album_after.update_ts > album_before.update_ts);
            assert_eq!(album_after.artist_ids, album_before.artist_ids);
            assert!(store.read_song(&song.id).unwrap().update_ts > song.update_ts);
        }

        #[test]
        fn recomputing_missing_album_is_not_found() {
            let (_dir, store) = create_tmp_store();
            let err = store.recompute_album_artists("missing", None).unwrap_err();
            assert_eq!(err.code(), "not_found");
        }
    }
}
