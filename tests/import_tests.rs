//! Importing raw uploads through a tag codec

mod common;

use common::TestLibrary;
use std::path::Path;
use std::sync::Arc;
use tunevault::library_store::{AlbumFilter, AlbumMeta, INCOMING_PLAYLIST_ID};
use tunevault::tags::{BitDepth, ProvisionalMetadata, SongFormat, TagCodec, TagError, TagFields};

/// Reports the same tag for every upload.
struct FixedTagCodec(ProvisionalMetadata);

impl TagCodec for FixedTagCodec {
    fn extract(&self, _format: SongFormat, _content: &[u8]) -> Result<ProvisionalMetadata, TagError> {
        Ok(self.0.clone())
    }

    fn rewrite(&self, _format: SongFormat, _path: &Path, _fields: &TagFields) -> Result<(), TagError> {
        Ok(())
    }
}

fn tagged_library(metadata: ProvisionalMetadata) -> TestLibrary {
    TestLibrary::open_with_codec(Arc::new(FixedTagCodec(metadata)))
}

#[test]
fn test_untagged_upload_gets_placeholder_title() {
    let library = TestLibrary::open();

    let song = library
        .store
        .create_song_from_raw_content(b"OggS-no-tags", None)
        .unwrap();

    assert_eq!(song.name, "(Unknown)");
    assert_eq!(song.format, SongFormat::Ogg);
    assert_eq!(song.album_id, None);
    assert!(song.artist_ids.is_empty());
    assert_eq!(
        library.store.read_playlist(INCOMING_PLAYLIST_ID).unwrap().song_ids,
        vec![song.id]
    );
}

#[test]
fn test_tagged_uploads_share_album_and_artists() {
    let library = tagged_library(ProvisionalMetadata {
        title: Some("Track".into()),
        album_name: Some("Foo".into()),
        track_number: Some(1),
        year: Some(1999),
        artist_names: vec!["Bar".into(), "Baz".into()],
        bit_depth: BitDepth::Sixteen,
    });

    let first = library
        .store
        .create_song_from_raw_content(b"fLaC-one", None)
        .unwrap();
    let second = library
        .store
        .create_song_from_raw_content(b"fLaC-two", first.album_id.as_deref())
        .unwrap();

    assert_eq!(first.format, SongFormat::Flac);
    assert_eq!(first.bit_depth, BitDepth::Sixteen);
    assert_eq!(first.publication_year, Some(1999));
    assert_eq!(first.album_id, second.album_id);
    assert_eq!(first.artist_ids, second.artist_ids);
    assert_eq!(first.artist_ids.len(), 2);

    let album = library.store.read_album(first.album_id.as_deref().unwrap()).unwrap();
    assert_eq!(album.name, "Foo");
    assert_eq!(album.artist_ids, first.artist_ids);
}

#[test]
fn test_album_hint_picks_between_same_named_albums() {
    let library = tagged_library(ProvisionalMetadata {
        title: Some("Track".into()),
        album_name: Some("Greatest Hits".into()),
        ..Default::default()
    });
    let older = library
        .store
        .create_album(&AlbumMeta {
            name: "Greatest Hits".into(),
        })
        .unwrap();
    let newer = library
        .store
        .create_album(&AlbumMeta {
            name: "Greatest Hits".into(),
        })
        .unwrap();

    let hinted = library
        .store
        .create_song_from_raw_content(b"ID3-hinted", Some(&newer.id))
        .unwrap();
    assert_eq!(hinted.album_id.as_deref(), Some(newer.id.as_str()));

    let unhinted = library
        .store
        .create_song_from_raw_content(b"ID3-unhinted", None)
        .unwrap();
    assert_eq!(unhinted.album_id.as_deref(), Some(older.id.as_str()));

    let albums = library
        .store
        .read_albums(&AlbumFilter {
            name: Some("greatest".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(albums.len(), 2);
}
