//! SQLite-backed library store.
//!
//! One write connection serialises writers with `BEGIN IMMEDIATE`. A small
//! pool of read-only connections serves read units of work concurrently
//! (WAL mode).

use super::error::{LibraryError, LibraryResult};
use super::ids::now_ts;
use super::models::*;
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::unit_of_work::{StoreContext, UnitOfWork};
use crate::sqlite_persistence::{read_schema_version, BASE_DB_VERSION};
use crate::tags::TagCodec;
use anyhow::{Context, Result};
use rand::distr::Alphanumeric;
use rand::Rng;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

const GENERATED_PASSWORD_LENGTH: usize = 16;

/// Tunables for opening a `LibraryStore`.
#[derive(Clone, Debug)]
pub struct LibraryStoreOptions {
    /// Number of read-only connections. Zero routes reads to the write
    /// connection.
    pub read_pool_size: usize,
    pub busy_timeout: Duration,
    pub default_admin_name: String,
    /// When absent a random password is generated and logged once.
    pub default_admin_password: Option<String>,
}

impl Default for LibraryStoreOptions {
    fn default() -> Self {
        Self {
            read_pool_size: 4,
            busy_timeout: Duration::from_millis(5000),
            default_admin_name: "admin".to_string(),
            default_admin_password: None,
        }
    }
}

#[derive(Clone)]
pub struct LibraryStore {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Vec<Arc<Mutex<Connection>>>,
    read_index: Arc<AtomicUsize>,
    context: Arc<StoreContext>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let latest_version = LIBRARY_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &LIBRARY_VERSIONED_SCHEMAS[latest_version];

    let Some(mut current_version) = read_schema_version(conn)? else {
        info!("Creating library db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    };

    if current_version > latest_version {
        anyhow::bail!(
            "Library db version {} is newer than the latest known version {}",
            current_version,
            latest_version
        );
    }

    if current_version < latest_version {
        let tx = conn.transaction()?;
        for schema in LIBRARY_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating library db from version {} to {}",
                    current_version, schema.version
                );
                migration_fn(&tx)?;
            }
            current_version = schema.version;
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
        tx.commit()?;
    }

    latest_schema
        .validate(conn)
        .context("Library db schema validation failed")?;
    Ok(())
}

fn random_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Lock a connection. A unit of work that panicked poisons the mutex and
/// leaves its transaction open; that transaction is rolled back here and the
/// connection reused.
fn lock(conn_mutex: &Mutex<Connection>) -> LibraryResult<MutexGuard<'_, Connection>> {
    let conn = match conn_mutex.lock() {
        Ok(conn) => conn,
        Err(poisoned) => {
            warn!("Library connection mutex poisoned by a panicked unit of work, recovering");
            conn_mutex.clear_poison();
            poisoned.into_inner()
        }
    };
    if !conn.is_autocommit() {
        warn!("Rolling back a transaction left open on a library connection");
        conn.execute("ROLLBACK", [])?;
    }
    Ok(conn)
}

fn rollback(conn: &Connection) {
    if let Err(e) = conn.execute("ROLLBACK", []) {
        warn!("Failed to roll back library transaction: {}", e);
    }
}

impl LibraryStore {
    /// Open the library database at `db_path`, creating and migrating its
    /// schema as needed, then bootstrap the incoming playlist and the
    /// default admin user.
    pub fn open<P: AsRef<Path>, C: AsRef<Path>>(
        db_path: P,
        content_dir: C,
        tag_codec: Arc<dyn TagCodec>,
        options: &LibraryStoreOptions,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();
        let content_dir = content_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&content_dir)
            .with_context(|| format!("Failed to create content dir {:?}", content_dir))?;

        let mut write_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open library database")?;
        write_conn.busy_timeout(options.busy_timeout)?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;

        migrate_if_needed(&mut write_conn)?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;

        let mut read_pool = Vec::with_capacity(options.read_pool_size);
        for _ in 0..options.read_pool_size {
            let read_conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.busy_timeout(options.busy_timeout)?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = LibraryStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
            context: Arc::new(StoreContext {
                content_dir,
                tag_codec,
            }),
        };
        store.bootstrap(options)?;

        let (songs, albums, artists, playlists, users) = store.read(|uow| {
            let count = |table: &str| -> LibraryResult<i64> {
                Ok(uow
                    .conn()
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
            };
            Ok((
                count("song")?,
                count("album")?,
                count("artist")?,
                count("playlist")?,
                count("user")?,
            ))
        })?;
        info!(
            "Opened library: {} songs, {} albums, {} artists, {} playlists, {} users",
            songs, albums, artists, playlists, users
        );

        Ok(store)
    }

    fn bootstrap(&self, options: &LibraryStoreOptions) -> Result<()> {
        self.write(|uow| {
            uow.ensure_incoming_playlist()?;

            let admins = uow.read_users(&UserFilter {
                admin: Some(true),
                ..Default::default()
            })?;
            if !admins.is_empty() {
                return Ok(());
            }
            match uow.read_user_by_name(&options.default_admin_name) {
                Ok(_) => {
                    warn!(
                        "No admin user, and '{}' is taken by a regular user",
                        options.default_admin_name
                    );
                }
                Err(LibraryError::NotFound { .. }) => {
                    let password = match &options.default_admin_password {
                        Some(password) => password.clone(),
                        None => {
                            let generated = random_password();
                            warn!(
                                "Generated password for default admin '{}': {}",
                                options.default_admin_name, generated
                            );
                            generated
                        }
                    };
                    uow.create_user(&UserMetaComplete {
                        meta: UserMeta {
                            name: options.default_admin_name.clone(),
                            hide_explicit: false,
                            admin: true,
                        },
                        password,
                    })?;
                    info!("Created default admin user '{}'", options.default_admin_name);
                }
                Err(e) => return Err(e),
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn content_dir(&self) -> &Path {
        &self.context.content_dir
    }

    /// A timestamp no in-flight write can fall behind: every write takes its
    /// timestamps while holding the write connection, so once the lock is
    /// acquired all earlier timestamps are committed.
    pub fn sync_watermark(&self) -> LibraryResult<i64> {
        let _guard = lock(&self.write_conn)?;
        Ok(now_ts())
    }

    fn get_read_conn(&self) -> &Arc<Mutex<Connection>> {
        if self.read_pool.is_empty() {
            return &self.write_conn;
        }
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        &self.read_pool[index]
    }

    // =========================================================================
    // Units of work
    // =========================================================================

    /// Run `f` in a write unit of work. Commits when `f` succeeds, rolls
    /// back otherwise. Content files written by a rolled back unit of work
    /// are removed; files of songs deleted by a committed one are removed
    /// after the commit.
    pub fn write<T, F>(&self, f: F) -> LibraryResult<T>
    where
        F: FnOnce(&UnitOfWork) -> LibraryResult<T>,
    {
        let conn = lock(&self.write_conn)?;
        conn.execute("BEGIN IMMEDIATE", [])?;

        let uow = UnitOfWork::new(&conn, &self.context);
        let result = f(&uow);
        let files = uow.into_pending_files();

        match result {
            Ok(value) => match conn.execute("COMMIT", []) {
                Ok(_) => {
                    files.after_commit();
                    Ok(value)
                }
                Err(e) => {
                    rollback(&conn);
                    files.after_rollback();
                    Err(e.into())
                }
            },
            Err(e) => {
                rollback(&conn);
                files.after_rollback();
                Err(e)
            }
        }
    }

    /// Run `f` in a read unit of work: one consistent snapshot across every
    /// query it issues.
    pub fn read<T, F>(&self, f: F) -> LibraryResult<T>
    where
        F: FnOnce(&UnitOfWork) -> LibraryResult<T>,
    {
        let conn = lock(self.get_read_conn())?;
        conn.execute("BEGIN", [])?;

        let uow = UnitOfWork::new(&conn, &self.context);
        let result = f(&uow);
        drop(uow);

        rollback(&conn);
        result
    }

    // =========================================================================
    // Songs
    // =========================================================================

    pub fn read_songs(&self, filter: &SongFilter) -> LibraryResult<Vec<Song>> {
        self.read(|uow| uow.read_songs(filter))
    }

    pub fn read_song(&self, song_id: &str) -> LibraryResult<Song> {
        self.read(|uow| uow.read_song(song_id))
    }

    pub fn song_content_path(&self, song_id: &str) -> LibraryResult<PathBuf> {
        self.read(|uow| uow.song_content_path(song_id))
    }

    pub fn create_song(&self, new_song: NewSong<'_>) -> LibraryResult<Song> {
        self.write(|uow| uow.create_song(new_song))
    }

    /// `content` must be fully buffered by the caller; no transaction is
    /// open while it is received.
    pub fn create_song_from_raw_content(
        &self,
        content: &[u8],
        last_album_id: Option<&str>,
    ) -> LibraryResult<Song> {
        self.write(|uow| uow.create_song_from_raw_content(content, last_album_id))
    }

    pub fn update_song(&self, song_id: &str, update: Option<&SongUpdate>) -> LibraryResult<Song> {
        self.write(|uow| uow.update_song(song_id, update))
    }

    pub fn delete_song(&self, song_id: &str) -> LibraryResult<Song> {
        self.write(|uow| uow.delete_song(song_id))
    }

    pub fn deleted_song_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_song_ids(from_ts))
    }

    // =========================================================================
    // Albums
    // =========================================================================

    pub fn read_albums(&self, filter: &AlbumFilter) -> LibraryResult<Vec<Album>> {
        self.read(|uow| uow.read_albums(filter))
    }

    pub fn read_album(&self, album_id: &str) -> LibraryResult<Album> {
        self.read(|uow| uow.read_album(album_id))
    }

    pub fn create_album(&self, meta: &AlbumMeta) -> LibraryResult<Album> {
        self.write(|uow| uow.create_album(meta))
    }

    pub fn update_album(&self, album_id: &str, meta: &AlbumMeta) -> LibraryResult<Album> {
        self.write(|uow| uow.update_album(album_id, meta))
    }

    pub fn delete_album(&self, album_id: &str) -> LibraryResult<Album> {
        self.write(|uow| uow.delete_album(album_id))
    }

    pub fn deleted_album_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_album_ids(from_ts))
    }

    pub fn resolve_album_by_name(
        &self,
        name: &str,
        last_album_id: Option<&str>,
    ) -> LibraryResult<Option<String>> {
        self.write(|uow| uow.resolve_album_by_name(name, last_album_id))
    }

    pub fn recompute_album_artists(
        &self,
        album_id: &str,
        renamed_artist_id: Option<&str>,
    ) -> LibraryResult<bool> {
        self.write(|uow| uow.recompute_album_artists(album_id, renamed_artist_id))
    }

    // =========================================================================
    // Artists
    // =========================================================================

    pub fn read_artists(&self, filter: &ArtistFilter) -> LibraryResult<Vec<Artist>> {
        self.read(|uow| uow.read_artists(filter))
    }

    pub fn read_artist(&self, artist_id: &str) -> LibraryResult<Artist> {
        self.read(|uow| uow.read_artist(artist_id))
    }

    pub fn create_artist(&self, meta: &ArtistMeta) -> LibraryResult<Artist> {
        self.write(|uow| uow.create_artist(meta))
    }

    pub fn update_artist(&self, artist_id: &str, meta: &ArtistMeta) -> LibraryResult<Artist> {
        self.write(|uow| uow.update_artist(artist_id, meta))
    }

    pub fn delete_artist(&self, artist_id: &str) -> LibraryResult<Artist> {
        self.write(|uow| uow.delete_artist(artist_id))
    }

    pub fn deleted_artist_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_artist_ids(from_ts))
    }

    pub fn resolve_artists_by_name(&self, names: &[String]) -> LibraryResult<Vec<String>> {
        self.write(|uow| uow.resolve_artists_by_name(names))
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    pub fn read_playlists(&self, filter: &PlaylistFilter) -> LibraryResult<Vec<Playlist>> {
        self.read(|uow| uow.read_playlists(filter))
    }

    pub fn read_playlist(&self, playlist_id: &str) -> LibraryResult<Playlist> {
        self.read(|uow| uow.read_playlist(playlist_id))
    }

    pub fn create_playlist(&self, meta: &PlaylistMeta) -> LibraryResult<Playlist> {
        self.write(|uow| uow.create_playlist(meta))
    }

    pub fn update_playlist(&self, playlist_id: &str, meta: &PlaylistMeta) -> LibraryResult<Playlist> {
        self.write(|uow| uow.update_playlist(playlist_id, meta))
    }

    pub fn add_song_to_playlist(&self, playlist_id: &str, song_id: &str) -> LibraryResult<()> {
        self.write(|uow| uow.add_song_to_playlist(playlist_id, song_id))
    }

    pub fn delete_playlist(&self, playlist_id: &str) -> LibraryResult<Playlist> {
        self.write(|uow| uow.delete_playlist(playlist_id))
    }

    pub fn deleted_playlist_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_playlist_ids(from_ts))
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn read_users(&self, filter: &UserFilter) -> LibraryResult<Vec<User>> {
        self.read(|uow| uow.read_users(filter))
    }

    pub fn read_user(&self, user_id: &str) -> LibraryResult<User> {
        self.read(|uow| uow.read_user(user_id))
    }

    pub fn read_user_by_name(&self, name: &str) -> LibraryResult<User> {
        self.read(|uow| uow.read_user_by_name(name))
    }

    pub fn read_user_credentials(&self, name: &str) -> LibraryResult<UserCredentials> {
        self.read(|uow| uow.read_user_credentials(name))
    }

    pub fn create_user(&self, user: &UserMetaComplete) -> LibraryResult<User> {
        self.write(|uow| uow.create_user(user))
    }

    pub fn update_user(&self, user_id: &str, user: &UserMetaComplete) -> LibraryResult<User> {
        self.write(|uow| uow.update_user(user_id, user))
    }

    pub fn delete_user(&self, user_id: &str) -> LibraryResult<User> {
        self.write(|uow| uow.delete_user(user_id))
    }

    pub fn deleted_user_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_user_ids(from_ts))
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    pub fn read_favorite_songs(&self, filter: &FavoriteSongFilter) -> LibraryResult<Vec<FavoriteSong>> {
        self.read(|uow| uow.read_favorite_songs(filter))
    }

    pub fn create_favorite_song(&self, id: &FavoriteSongId) -> LibraryResult<FavoriteSong> {
        self.write(|uow| uow.create_favorite_song(id))
    }

    pub fn delete_favorite_song(&self, id: &FavoriteSongId) -> LibraryResult<FavoriteSong> {
        self.write(|uow| uow.delete_favorite_song(id))
    }

    pub fn deleted_favorite_song_ids(&self, from_ts: i64) -> LibraryResult<Vec<FavoriteSongId>> {
        self.read(|uow| uow.deleted_favorite_song_ids(from_ts))
    }

    pub fn deleted_user_favorite_song_ids(&self, from_ts: i64, user_id: &str) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_user_favorite_song_ids(from_ts, user_id))
    }

    pub fn read_favorite_playlists(
        &self,
        filter: &FavoritePlaylistFilter,
    ) -> LibraryResult<Vec<FavoritePlaylist>> {
        self.read(|uow| uow.read_favorite_playlists(filter))
    }

    pub fn create_favorite_playlist(&self, id: &FavoritePlaylistId) -> LibraryResult<FavoritePlaylist> {
        self.write(|uow| uow.create_favorite_playlist(id))
    }

    pub fn delete_favorite_playlist(&self, id: &FavoritePlaylistId) -> LibraryResult<FavoritePlaylist> {
        self.write(|uow| uow.delete_favorite_playlist(id))
    }

    pub fn deleted_favorite_playlist_ids(&self, from_ts: i64) -> LibraryResult<Vec<FavoritePlaylistId>> {
        self.read(|uow| uow.deleted_favorite_playlist_ids(from_ts))
    }

    pub fn deleted_user_favorite_playlist_ids(
        &self,
        from_ts: i64,
        user_id: &str,
    ) -> LibraryResult<Vec<String>> {
        self.read(|uow| uow.deleted_user_favorite_playlist_ids(from_ts, user_id))
    }
}
