//! The unit of work every library operation runs in.
//!
//! A `UnitOfWork` borrows one open SQLite transaction. Operations compose by
//! calling each other on the same `UnitOfWork`, so a cascade commits or rolls
//! back as a whole. The owning `LibraryStore` decides the outcome.

use super::error::{EntityKind, LibraryError, LibraryResult};
use crate::tags::TagCodec;
use rusqlite::{params, Connection, ToSql};
use std::cell::RefCell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use tracing::warn;

/// Store-wide collaborators shared by every unit of work.
pub(crate) struct StoreContext {
    pub content_dir: PathBuf,
    pub tag_codec: Arc<dyn TagCodec>,
}

/// Content files touched while the transaction was open.
#[derive(Default)]
pub(crate) struct PendingFiles {
    /// Written in this unit of work; removed if it rolls back.
    created: Vec<PathBuf>,
    /// Belonging to deleted songs; removed once it commits.
    removed: Vec<PathBuf>,
    /// Copies of existing files taken before they were modified in place;
    /// put back if it rolls back, discarded once it commits.
    backups: Vec<(PathBuf, TempPath)>,
}

impl PendingFiles {
    pub fn after_commit(self) {
        for path in self.removed {
            remove_file_logged(&path);
        }
        for (path, backup) in self.backups {
            if let Err(e) = backup.close() {
                warn!("Failed to discard backup of content file {:?}: {}", path, e);
            }
        }
    }

    pub fn after_rollback(self) {
        for (path, backup) in self.backups.into_iter().rev() {
            if let Err(e) = backup.persist(&path) {
                warn!("Failed to restore content file {:?}: {}", path, e.error);
            }
        }
        for path in self.created {
            remove_file_logged(&path);
        }
    }
}

fn remove_file_logged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove content file {:?}: {}", path, e);
        }
    }
}

pub struct UnitOfWork<'a> {
    conn: &'a Connection,
    context: &'a StoreContext,
    files: RefCell<PendingFiles>,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(conn: &'a Connection, context: &'a StoreContext) -> Self {
        Self {
            conn,
            context,
            files: RefCell::new(PendingFiles::default()),
        }
    }

    pub(crate) fn into_pending_files(self) -> PendingFiles {
        self.files.into_inner()
    }

    pub(crate) fn conn(&self) -> &Connection {
        self.conn
    }

    pub(crate) fn tag_codec(&self) -> &dyn TagCodec {
        self.context.tag_codec.as_ref()
    }

    pub(crate) fn content_dir(&self) -> &Path {
        &self.context.content_dir
    }

    pub(crate) fn track_created_file(&self, path: PathBuf) {
        self.files.borrow_mut().created.push(path);
    }

    pub(crate) fn schedule_file_removal(&self, path: PathBuf) {
        self.files.borrow_mut().removed.push(path);
    }

    /// Copy an existing content file aside before it is modified in place,
    /// so a rollback can put the original back. Files created in this unit
    /// of work, or already backed up, need no copy.
    pub(crate) fn back_up_file(&self, path: &Path) -> LibraryResult<()> {
        {
            let files = self.files.borrow();
            if files.created.iter().any(|p| p == path)
                || files.backups.iter().any(|(p, _)| p == path)
            {
                return Ok(());
            }
        }

        let dir = path.parent().unwrap_or_else(|| self.content_dir());
        let mut backup = NamedTempFile::new_in(dir)?;
        std::io::copy(&mut File::open(path)?, backup.as_file_mut())?;
        self.files
            .borrow_mut()
            .backups
            .push((path.to_path_buf(), backup.into_temp_path()));
        Ok(())
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    pub(crate) fn exists(&self, table: &str, id_column: &str, id: &str) -> LibraryResult<bool> {
        let exists = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)", table, id_column),
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub(crate) fn ensure_exists(
        &self,
        entity: EntityKind,
        table: &str,
        id_column: &str,
        id: &str,
    ) -> LibraryResult<()> {
        if self.exists(table, id_column, id)? {
            Ok(())
        } else {
            Err(LibraryError::not_found(entity, id))
        }
    }

    /// Ids from a single-id tombstone table deleted at or after `from_ts`.
    pub(crate) fn deleted_ids(&self, table: &str, id_column: &str, from_ts: i64) -> LibraryResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {id} FROM {table} WHERE delete_ts >= ?1 ORDER BY delete_ts, {id}",
            id = id_column,
            table = table
        ))?;
        let ids = stmt
            .query_map(params![from_ts], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub(crate) fn write_tombstone(&self, table: &str, id_column: &str, id: &str, delete_ts: i64) -> LibraryResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} ({}, delete_ts) VALUES (?1, ?2)",
                table, id_column
            ),
            params![id, delete_ts],
        )?;
        Ok(())
    }
}

/// WHERE-clause builder for filtered reads. Placeholders are positional `?`
/// and bound in push order.
#[derive(Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
}

impl SqlFilter {
    pub fn and(&mut self, clause: &str, values: Vec<Box<dyn ToSql>>) {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.values.iter().map(|v| v.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_where_clause() {
        let filter = SqlFilter::default();
        assert_eq!(filter.where_sql(), "");
        assert!(filter.params().is_empty());
    }

    #[test]
    fn clauses_are_joined_with_and() {
        let mut filter = SqlFilter::default();
        filter.and("a.update_ts >= ?", vec![Box::new(5_i64)]);
        filter.and("(x = ? OR y = ?)", vec![Box::new("k"), Box::new("k")]);
        assert_eq!(filter.where_sql(), " WHERE a.update_ts >= ? AND (x = ? OR y = ?)");
        assert_eq!(filter.params().len(), 3);
    }

    #[test]
    fn pending_files_are_removed_on_rollback_only_when_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let created = dir.path().join("created");
        let removed = dir.path().join("removed");
        std::fs::write(&created, b"x").unwrap();
        std::fs::write(&removed, b"x").unwrap();

        let files = PendingFiles {
            created: vec![created.clone()],
            removed: vec![removed.clone()],
            backups: Vec::new(),
        };
        files.after_rollback();
        assert!(!created.exists());
        assert!(removed.exists());
    }

    #[test]
    fn backups_are_restored_on_rollback_and_dropped_on_commit() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("song.mp3");
        let pending_with_backup = || {
            std::fs::write(&path, b"original").unwrap();
            let mut backup = NamedTempFile::new_in(dir.path()).unwrap();
            std::io::copy(&mut File::open(&path).unwrap(), backup.as_file_mut()).unwrap();
            std::fs::write(&path, b"retagged").unwrap();
            PendingFiles {
                backups: vec![(path.clone(), backup.into_temp_path())],
                ..Default::default()
            }
        };

        pending_with_backup().after_rollback();
        assert_eq!(std::fs::read(&path).unwrap(), b"original");

        pending_with_backup().after_commit();
        assert_eq!(std::fs::read(&path).unwrap(), b"retagged");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
