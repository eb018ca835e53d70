//! Sync ledger reports

mod common;

use common::TestLibrary;
use std::collections::{BTreeMap, BTreeSet};
use tunevault::library_store::{
    ArtistMeta, FavoritePlaylistId, PlaylistMeta, Song, INCOMING_PLAYLIST_ID,
};
use tunevault::sync::SyncReport;

#[test]
fn test_full_report_then_empty_delta() {
    let library = TestLibrary::open();
    let artist = library.artist("Bar");
    let album = library.album("Foo");
    let song = library.song("One", Some(&album), &[&artist]);

    let full = library.store.read_sync_report(0).unwrap();
    assert_eq!(full.songs, vec![library.store.read_song(&song.id).unwrap()]);
    assert_eq!(full.albums.len(), 1);
    assert_eq!(full.artists.len(), 1);
    assert!(full.playlists.iter().any(|p| p.id == INCOMING_PLAYLIST_ID));
    assert_eq!(full.users, vec![library.admin.clone()]);

    let delta = library.store.read_sync_report(full.sync_ts).unwrap();
    assert!(delta.sync_ts > full.sync_ts);
    assert!(delta.songs.is_empty());
    assert!(delta.albums.is_empty());
    assert!(delta.artists.is_empty());
    assert!(delta.playlists.is_empty());
    assert!(delta.users.is_empty());
    assert!(delta.favorite_playlists.is_empty());
}

#[test]
fn test_repeating_a_report_is_idempotent() {
    let library = TestLibrary::open();
    library.song("One", None, &[]);
    library.user("bob");

    let first = library.store.read_sync_report(0).unwrap();
    let second = library.store.read_sync_report(0).unwrap();

    assert_eq!(first.songs, second.songs);
    assert_eq!(first.playlists, second.playlists);
    assert_eq!(first.users, second.users);
    assert_eq!(first.favorite_playlists, second.favorite_playlists);
}

#[test]
fn test_tombstones_outlive_later_watermarks() {
    let library = TestLibrary::open();
    let song = library.song("One", None, &[]);
    let before = library.store.read_sync_report(0).unwrap();

    library.store.delete_song(&song.id).unwrap();

    let delta = library.store.read_sync_report(before.sync_ts).unwrap();
    assert_eq!(delta.deleted_song_ids, vec![song.id.clone()]);
    assert!(delta.songs.is_empty());
    // The incoming playlist lost the song
    assert_eq!(delta.playlists.len(), 1);
    assert!(delta.playlists[0].song_ids.is_empty());

    let later = library.store.read_sync_report(delta.sync_ts).unwrap();
    assert!(later.deleted_song_ids.is_empty());

    let library = library.reopen();
    let from_start = library.store.read_sync_report(0).unwrap();
    assert_eq!(from_start.deleted_song_ids, vec![song.id]);
}

#[test]
fn test_file_sync_ignores_ownership_only_edits() {
    let library = TestLibrary::open();
    let bob = library.user("bob");
    let song = library.song("One", None, &[]);
    let playlist = library
        .store
        .create_playlist(&PlaylistMeta {
            name: "Mix".into(),
            song_ids: vec![song.id.clone()],
            owner_user_ids: vec![bob.id.clone()],
        })
        .unwrap();

    let first = library.store.read_file_sync_report(0, &bob.id).unwrap();
    let playlist_ids: BTreeSet<&str> = first.playlists.iter().map(|p| p.id.as_str()).collect();
    assert!(playlist_ids.contains(playlist.id.as_str()));
    assert!(playlist_ids.contains(INCOMING_PLAYLIST_ID));
    assert_eq!(first.file_sync_songs.len(), 1);
    assert_eq!(first.file_sync_songs[0].filepath, "(Unknown) - One.mp3");

    library
        .store
        .update_playlist(
            &playlist.id,
            &PlaylistMeta {
                name: "Mix".into(),
                song_ids: vec![song.id.clone()],
                owner_user_ids: vec![bob.id.clone(), library.admin.id.clone()],
            },
        )
        .unwrap();
    let after_share = library
        .store
        .read_file_sync_report(first.sync_ts, &bob.id)
        .unwrap();
    assert!(after_share.playlists.is_empty());

    library
        .store
        .update_playlist(
            &playlist.id,
            &PlaylistMeta {
                name: "Mix 2".into(),
                song_ids: vec![song.id.clone()],
                owner_user_ids: vec![bob.id.clone(), library.admin.id.clone()],
            },
        )
        .unwrap();
    let after_rename = library
        .store
        .read_file_sync_report(after_share.sync_ts, &bob.id)
        .unwrap();
    assert_eq!(after_rename.playlists.len(), 1);
    assert_eq!(after_rename.playlists[0].name, "Mix 2");
}

#[test]
fn test_file_sync_reports_unfavorited_playlists() {
    let library = TestLibrary::open();
    let bob = library.user("bob");
    let playlist = library
        .store
        .create_playlist(&PlaylistMeta {
            name: "Mix".into(),
            ..Default::default()
        })
        .unwrap();
    let favorite_id = FavoritePlaylistId {
        user_id: bob.id.clone(),
        playlist_id: playlist.id.clone(),
    };
    library.store.create_favorite_playlist(&favorite_id).unwrap();
    let before = library.store.read_file_sync_report(0, &bob.id).unwrap();

    library.store.delete_favorite_playlist(&favorite_id).unwrap();

    let delta = library
        .store
        .read_file_sync_report(before.sync_ts, &bob.id)
        .unwrap();
    assert_eq!(delta.deleted_playlist_ids, vec![playlist.id]);
    assert!(delta.playlists.is_empty());
}

#[test]
fn test_replaying_deltas_rebuilds_the_library() {
    let library = TestLibrary::open();
    let mut replica: BTreeMap<String, Song> = BTreeMap::new();
    let mut apply = |report: SyncReport| {
        for song in report.songs {
            replica.insert(song.id.clone(), song);
        }
        for id in report.deleted_song_ids {
            replica.remove(&id);
        }
        report.sync_ts
    };

    let mut watermark = apply(library.store.read_sync_report(0).unwrap());
    let artist = library.artist("Bar");
    let kept = library.song("Kept", None, &[&artist]);
    let dropped = library.song("Dropped", None, &[]);
    watermark = apply(library.store.read_sync_report(watermark).unwrap());

    library.store.delete_song(&dropped.id).unwrap();
    library
        .store
        .update_artist(&artist.id, &ArtistMeta { name: "Baz".into() })
        .unwrap();
    apply(library.store.read_sync_report(watermark).unwrap());

    let fresh: BTreeMap<String, Song> = library
        .store
        .read_sync_report(0)
        .unwrap()
        .songs
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    assert_eq!(replica, fresh);
    assert!(replica.contains_key(&kept.id));
}
