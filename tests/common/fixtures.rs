//! Fixtures that open a throwaway library and populate it

use super::constants::*;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tunevault::library_store::{
    Album, AlbumMeta, Artist, ArtistMeta, NewSong, Song, SongMeta, User, UserMeta,
    UserMetaComplete,
};
use tunevault::tags::{BitDepth, SongFormat};
use tunevault::{LibraryStore, LibraryStoreOptions, NullTagCodec, TagCodec};

/// A library living in a temporary directory, removed on drop.
pub struct TestLibrary {
    pub dir: TempDir,
    pub store: LibraryStore,
    pub admin: User,
}

#[allow(dead_code)]
impl TestLibrary {
    pub fn open() -> Self {
        Self::open_with_codec(Arc::new(NullTagCodec))
    }

    pub fn open_with_codec(tag_codec: Arc<dyn TagCodec>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Self::open_store(&dir, tag_codec);
        let admin = store
            .read_user_by_name(ADMIN_USER)
            .expect("Default admin was not bootstrapped");
        TestLibrary { dir, store, admin }
    }

    /// Close the store and open the same database again.
    pub fn reopen(self) -> Self {
        let TestLibrary { dir, store, admin } = self;
        drop(store);
        let store = Self::open_store(&dir, Arc::new(NullTagCodec));
        TestLibrary { dir, store, admin }
    }

    fn open_store(dir: &TempDir, tag_codec: Arc<dyn TagCodec>) -> LibraryStore {
        LibraryStore::open(
            dir.path().join("library.db"),
            dir.path().join("songs"),
            tag_codec,
            &LibraryStoreOptions {
                read_pool_size: 2,
                default_admin_password: Some(ADMIN_PASS.to_string()),
                ..Default::default()
            },
        )
        .expect("Failed to open test library")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.dir.path().join("songs")
    }

    pub fn artist(&self, name: &str) -> Artist {
        self.store
            .create_artist(&ArtistMeta {
                name: name.to_string(),
            })
            .expect("Failed to create artist")
    }

    pub fn album(&self, name: &str) -> Album {
        self.store
            .create_album(&AlbumMeta {
                name: name.to_string(),
            })
            .expect("Failed to create album")
    }

    pub fn song(&self, name: &str, album: Option<&Album>, artists: &[&Artist]) -> Song {
        self.store
            .create_song(NewSong {
                meta: SongMeta {
                    name: name.to_string(),
                    album_id: album.map(|a| a.id.clone()),
                    artist_ids: artists.iter().map(|a| a.id.clone()).collect(),
                    ..Default::default()
                },
                format: SongFormat::Mp3,
                bit_depth: BitDepth::Unknown,
                content: TEST_SONG_CONTENT,
            })
            .expect("Failed to create song")
    }

    pub fn user(&self, name: &str) -> User {
        self.store
            .create_user(&UserMetaComplete {
                meta: UserMeta {
                    name: name.to_string(),
                    hide_explicit: false,
                    admin: false,
                },
                password: TEST_PASS.to_string(),
            })
            .expect("Failed to create user")
    }
}
