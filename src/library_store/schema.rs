//! SQLite schema definitions for the library database.
//!
//! Entity tables are keyed by their text id. Join tables carry no id of their
//! own. Every deletable entity has an append-only `deleted_*` tombstone table
//! read by the sync ledger.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};
use rusqlite::Connection;

// =============================================================================
// Foreign keys
// =============================================================================

const SONG_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "song",
    foreign_column: "song_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK_RESTRICT: ForeignKey = ForeignKey {
    foreign_table: "album",
    foreign_column: "album_id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const ALBUM_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "album",
    foreign_column: "album_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARTIST_FK_RESTRICT: ForeignKey = ForeignKey {
    foreign_table: "artist",
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const PLAYLIST_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "playlist",
    foreign_column: "playlist_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const USER_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "user_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Entity tables
// =============================================================================

const ALBUM_TABLE_V_0: Table = Table {
    name: "album",
    columns: &[
        sqlite_column!("album_id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("creation_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_album_update_ts", "update_ts"),
        ("idx_album_name", "name"),
    ],
    unique_constraints: &[],
};

const ARTIST_TABLE_V_0: Table = Table {
    name: "artist",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("creation_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_artist_update_ts", "update_ts"),
        ("idx_artist_name", "name"),
    ],
    unique_constraints: &[],
};

const SONG_TABLE_V_0: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("song_id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("creation_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("format", &SqlType::Integer, non_null = true), // 0=unknown, 1=flac, 2=mp3, 3=ogg
        sqlite_column!("size", &SqlType::Integer, non_null = true),
        sqlite_column!("bit_depth", &SqlType::Integer, non_null = true), // 0=unknown, 16, 24
        sqlite_column!("publication_year", &SqlType::Integer),
        sqlite_column!("album_id", &SqlType::Text, foreign_key = Some(&ALBUM_FK_RESTRICT)),
        sqlite_column!("track_number", &SqlType::Integer),
        sqlite_column!("explicit_fg", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_song_update_ts", "update_ts"),
        ("idx_song_album_id", "album_id"),
    ],
    unique_constraints: &[],
};

const PLAYLIST_TABLE_V_0: Table = Table {
    name: "playlist",
    columns: &[
        sqlite_column!("playlist_id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("creation_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("content_update_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_playlist_update_ts", "update_ts")],
    unique_constraints: &[],
};

const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("creation_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("hide_explicit_fg", &SqlType::Integer, non_null = true),
        sqlite_column!("admin_fg", &SqlType::Integer, non_null = true),
        sqlite_column!("password", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_user_update_ts", "update_ts")],
    unique_constraints: &[&["name"]],
};

// =============================================================================
// Join tables
// =============================================================================

/// Song artists. Order is not stored: it is derived from artist names.
const ARTIST_SONG_TABLE_V_0: Table = Table {
    name: "artist_song",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ARTIST_FK_RESTRICT)
        ),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SONG_FK_CASCADE)
        ),
    ],
    indices: &[("idx_artist_song_song_id", "song_id")],
    unique_constraints: &[&["artist_id", "song_id"]],
};

/// Album artists as last computed by the consensus engine.
const ALBUM_ARTIST_TABLE_V_0: Table = Table {
    name: "album_artist",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ALBUM_FK_CASCADE)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_album_artist_artist_id", "artist_id")],
    unique_constraints: &[&["album_id", "artist_id"]],
};

/// Playlist entries. Positions are not unique-constrained because eviction
/// from the incoming playlist shifts them in place.
const PLAYLIST_SONG_TABLE_V_0: Table = Table {
    name: "playlist_song",
    columns: &[
        sqlite_column!(
            "playlist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PLAYLIST_FK_CASCADE)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SONG_FK_CASCADE)
        ),
    ],
    indices: &[("idx_playlist_song_playlist", "playlist_id, position")],
    unique_constraints: &[],
};

const PLAYLIST_SONG_TABLE_V_1: Table = Table {
    name: "playlist_song",
    columns: PLAYLIST_SONG_TABLE_V_0.columns,
    indices: &[
        ("idx_playlist_song_playlist", "playlist_id, position"),
        ("idx_playlist_song_song", "song_id"),
    ],
    unique_constraints: &[],
};

const PLAYLIST_OWNED_USER_TABLE_V_0: Table = Table {
    name: "playlist_owned_user",
    columns: &[
        sqlite_column!(
            "playlist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PLAYLIST_FK_CASCADE)
        ),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK_CASCADE)
        ),
    ],
    indices: &[("idx_playlist_owned_user_user", "user_id")],
    unique_constraints: &[&["playlist_id", "user_id"]],
};

const FAVORITE_SONG_TABLE_V_0: Table = Table {
    name: "favorite_song",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK_CASCADE)
        ),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SONG_FK_CASCADE)
        ),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_favorite_song_update_ts", "update_ts")],
    unique_constraints: &[&["user_id", "song_id"]],
};

const FAVORITE_PLAYLIST_TABLE_V_0: Table = Table {
    name: "favorite_playlist",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK_CASCADE)
        ),
        sqlite_column!(
            "playlist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PLAYLIST_FK_CASCADE)
        ),
        sqlite_column!("update_ts", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["user_id", "playlist_id"]],
};

const FAVORITE_PLAYLIST_TABLE_V_1: Table = Table {
    name: "favorite_playlist",
    columns: FAVORITE_PLAYLIST_TABLE_V_0.columns,
    indices: &[("idx_favorite_playlist_update_ts", "update_ts")],
    unique_constraints: &[&["user_id", "playlist_id"]],
};

// =============================================================================
// Tombstones
// =============================================================================

macro_rules! tombstone_table {
    ($table:expr, $id_column:expr, $index:expr) => {
        Table {
            name: $table,
            columns: &[
                sqlite_column!($id_column, &SqlType::Text, is_primary_key = true, non_null = true),
                sqlite_column!("delete_ts", &SqlType::Integer, non_null = true),
            ],
            indices: &[($index, "delete_ts")],
            unique_constraints: &[],
        }
    };
}

macro_rules! favorite_tombstone_table {
    ($table:expr, $target_column:expr, $index:expr) => {
        Table {
            name: $table,
            columns: &[
                sqlite_column!("user_id", &SqlType::Text, non_null = true),
                sqlite_column!($target_column, &SqlType::Text, non_null = true),
                sqlite_column!("delete_ts", &SqlType::Integer, non_null = true),
            ],
            indices: &[($index, "delete_ts")],
            unique_constraints: &[&["user_id", $target_column]],
        }
    };
}

const DELETED_SONG_TABLE_V_0: Table =
    tombstone_table!("deleted_song", "song_id", "idx_deleted_song_delete_ts");
const DELETED_ALBUM_TABLE_V_0: Table =
    tombstone_table!("deleted_album", "album_id", "idx_deleted_album_delete_ts");
const DELETED_ARTIST_TABLE_V_0: Table =
    tombstone_table!("deleted_artist", "artist_id", "idx_deleted_artist_delete_ts");
const DELETED_PLAYLIST_TABLE_V_0: Table =
    tombstone_table!("deleted_playlist", "playlist_id", "idx_deleted_playlist_delete_ts");
const DELETED_USER_TABLE_V_0: Table =
    tombstone_table!("deleted_user", "user_id", "idx_deleted_user_delete_ts");
const DELETED_FAVORITE_SONG_TABLE_V_0: Table = favorite_tombstone_table!(
    "deleted_favorite_song",
    "song_id",
    "idx_deleted_favorite_song_delete_ts"
);
const DELETED_FAVORITE_PLAYLIST_TABLE_V_0: Table = favorite_tombstone_table!(
    "deleted_favorite_playlist",
    "playlist_id",
    "idx_deleted_favorite_playlist_delete_ts"
);

// =============================================================================
// Versions
// =============================================================================

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            ALBUM_TABLE_V_0,
            ARTIST_TABLE_V_0,
            SONG_TABLE_V_0,
            PLAYLIST_TABLE_V_0,
            USER_TABLE_V_0,
            ARTIST_SONG_TABLE_V_0,
            ALBUM_ARTIST_TABLE_V_0,
            PLAYLIST_SONG_TABLE_V_0,
            PLAYLIST_OWNED_USER_TABLE_V_0,
            FAVORITE_SONG_TABLE_V_0,
            FAVORITE_PLAYLIST_TABLE_V_0,
            DELETED_SONG_TABLE_V_0,
            DELETED_ALBUM_TABLE_V_0,
            DELETED_ARTIST_TABLE_V_0,
            DELETED_PLAYLIST_TABLE_V_0,
            DELETED_USER_TABLE_V_0,
            DELETED_FAVORITE_SONG_TABLE_V_0,
            DELETED_FAVORITE_PLAYLIST_TABLE_V_0,
        ],
        migration: None,
    },
    // Indices backing the "playlists containing song" and favorite watermark
    // lookups used by favorite propagation and the file sync report.
    VersionedSchema {
        version: 1,
        tables: &[
            ALBUM_TABLE_V_0,
            ARTIST_TABLE_V_0,
            SONG_TABLE_V_0,
            PLAYLIST_TABLE_V_0,
            USER_TABLE_V_0,
            ARTIST_SONG_TABLE_V_0,
            ALBUM_ARTIST_TABLE_V_0,
            PLAYLIST_SONG_TABLE_V_1,
            PLAYLIST_OWNED_USER_TABLE_V_0,
            FAVORITE_SONG_TABLE_V_0,
            FAVORITE_PLAYLIST_TABLE_V_1,
            DELETED_SONG_TABLE_V_0,
            DELETED_ALBUM_TABLE_V_0,
            DELETED_ARTIST_TABLE_V_0,
            DELETED_PLAYLIST_TABLE_V_0,
            DELETED_USER_TABLE_V_0,
            DELETED_FAVORITE_SONG_TABLE_V_0,
            DELETED_FAVORITE_PLAYLIST_TABLE_V_0,
        ],
        migration: Some(|conn: &Connection| {
            PLAYLIST_SONG_TABLE_V_1.create_index(conn, "idx_playlist_song_song", "song_id")?;
            FAVORITE_PLAYLIST_TABLE_V_1.create_index(
                conn,
                "idx_favorite_playlist_update_ts",
                "update_ts",
            )?;
            Ok(())
        }),
    },
];
