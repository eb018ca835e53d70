use super::error::{EntityKind, LibraryError, LibraryResult};
use super::ids::{new_id, now_ts};
use super::models::{
    FavoritePlaylistId, User, UserCredentials, UserFilter, UserMetaComplete, INCOMING_PLAYLIST_ID,
};
use super::unit_of_work::{SqlFilter, UnitOfWork};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const USER_COLUMNS: &str = "user_id, creation_ts, update_ts, name, hide_explicit_fg, admin_fg";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        creation_ts: row.get(1)?,
        update_ts: row.get(2)?,
        name: row.get(3)?,
        hide_explicit: row.get::<_, i64>(4)? != 0,
        admin: row.get::<_, i64>(5)? != 0,
    })
}

impl UnitOfWork<'_> {
    pub fn read_users(&self, filter: &UserFilter) -> LibraryResult<Vec<User>> {
        let mut sql_filter = SqlFilter::default();
        if let Some(from_ts) = filter.from_ts {
            sql_filter.and("update_ts >= ?", vec![Box::new(from_ts)]);
        }
        if let Some(admin) = filter.admin {
            sql_filter.and("admin_fg = ?", vec![Box::new(admin as i64)]);
        }
        let order_by = if filter.from_ts.is_some() {
            "update_ts, user_id"
        } else {
            "name, user_id"
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM user{} ORDER BY {}",
            USER_COLUMNS,
            sql_filter.where_sql(),
            order_by
        ))?;
        let users = stmt
            .query_map(sql_filter.params().as_slice(), user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn read_user(&self, user_id: &str) -> LibraryResult<User> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM user WHERE user_id = ?1", USER_COLUMNS),
                params![user_id],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, user_id))
    }

    pub fn read_user_by_name(&self, name: &str) -> LibraryResult<User> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM user WHERE name = ?1", USER_COLUMNS),
                params![name],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, name))
    }

    /// Stored credential for the authentication layer. The password is
    /// opaque to the library.
    pub fn read_user_credentials(&self, name: &str) -> LibraryResult<UserCredentials> {
        self.conn()
            .query_row(
                "SELECT user_id, password FROM user WHERE name = ?1",
                params![name],
                |row| {
                    Ok(UserCredentials {
                        user_id: row.get(0)?,
                        password: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, name))
    }

    /// Create a user. New users start with the incoming playlist as a
    /// favorite.
    pub fn create_user(&self, user: &UserMetaComplete) -> LibraryResult<User> {
        let now = now_ts();
        let user_id = new_id();
        self.conn().execute(
            "INSERT INTO user (user_id, creation_ts, update_ts, name, hide_explicit_fg, admin_fg, password)
             VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                now,
                user.meta.name,
                user.meta.hide_explicit as i64,
                user.meta.admin as i64,
                user.password,
            ],
        )?;

        if self.exists("playlist", "playlist_id", INCOMING_PLAYLIST_ID)? {
            self.create_favorite_playlist(&FavoritePlaylistId {
                user_id: user_id.clone(),
                playlist_id: INCOMING_PLAYLIST_ID.to_string(),
            })?;
        }

        debug!("Created user {} ({})", user_id, user.meta.name);
        self.read_user(&user_id)
    }

    /// Update a user. An empty password keeps the stored one.
    pub fn update_user(&self, user_id: &str, user: &UserMetaComplete) -> LibraryResult<User> {
        self.ensure_exists(EntityKind::User, "user", "user_id", user_id)?;
        self.conn().execute(
            "UPDATE user SET name = ?1, hide_explicit_fg = ?2, admin_fg = ?3, update_ts = ?4,
                             password = CASE WHEN ?5 = '' THEN password ELSE ?5 END
             WHERE user_id = ?6",
            params![
                user.meta.name,
                user.meta.hide_explicit as i64,
                user.meta.admin as i64,
                now_ts(),
                user.password,
                user_id,
            ],
        )?;
        self.read_user(user_id)
    }

    /// Delete a user along with its favorites. Playlists it owned lose an
    /// owner, which bumps their update_ts but not their content version.
    pub fn delete_user(&self, user_id: &str) -> LibraryResult<User> {
        let user = self.read_user(user_id)?;
        let now = now_ts();

        self.conn().execute(
            "INSERT OR REPLACE INTO deleted_favorite_song (user_id, song_id, delete_ts)
             SELECT user_id, song_id, ?1 FROM favorite_song WHERE user_id = ?2",
            params![now, user_id],
        )?;
        self.conn().execute(
            "DELETE FROM favorite_song WHERE user_id = ?1",
            params![user_id],
        )?;
        self.conn().execute(
            "INSERT OR REPLACE INTO deleted_favorite_playlist (user_id, playlist_id, delete_ts)
             SELECT user_id, playlist_id, ?1 FROM favorite_playlist WHERE user_id = ?2",
            params![now, user_id],
        )?;
        self.conn().execute(
            "DELETE FROM favorite_playlist WHERE user_id = ?1",
            params![user_id],
        )?;

        self.conn().execute(
            "UPDATE playlist SET update_ts = ?1
             WHERE playlist_id IN (SELECT playlist_id FROM playlist_owned_user WHERE user_id = ?2)",
            params![now, user_id],
        )?;
        self.conn().execute(
            "DELETE FROM playlist_owned_user WHERE user_id = ?1",
            params![user_id],
        )?;

        self.conn()
            .execute("DELETE FROM user WHERE user_id = ?1", params![user_id])?;
        self.write_tombstone("deleted_user", "user_id", user_id, now)?;
        debug!("Deleted user {} ({})", user.id, user.name);
        Ok(user)
    }

    pub fn deleted_user_ids(&self, from_ts: i64) -> LibraryResult<Vec<String>> {
        self.deleted_ids("deleted_user", "user_id", from_ts)
    }
}
