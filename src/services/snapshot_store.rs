//! Snapshot Store for marksync.
//!
//! Persists named trees in the `trees` table: the current tree, the backup
//! (last tree agreed with the remote) and one snapshot per local store.
//! Together they let a restart reconcile local drift instead of merging
//! everything from scratch.

use rusqlite::{params, Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::bookmark::BookmarkModel;
use crate::types::errors::SnapshotError;
use crate::types::serial;

/// Name of the current tree.
pub const CURRENT: &str = "current";

/// Name of the last tree agreed with the remote.
pub const BACKUP: &str = "backup";

/// Name under which a local store's last seen tree is kept.
pub fn store_key(store: &str) -> String {
    format!("store:{}", store)
}

pub trait SnapshotStoreTrait {
    fn save_tree(&self, name: &str, tree: &BookmarkModel) -> Result<(), SnapshotError>;
    fn load_tree(&self, name: &str) -> Result<Option<BookmarkModel>, SnapshotError>;
    fn delete_tree(&self, name: &str) -> Result<(), SnapshotError>;
    fn clear(&self) -> Result<(), SnapshotError>;
    fn has_recoverable<S: AsRef<str>>(&self, stores: &[S]) -> Result<bool, SnapshotError>;
}

/// Snapshot store backed by a SQLite connection.
pub struct SnapshotStore<'a> {
    conn: &'a Connection,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Sync token stored alongside a tree, without decoding it.
    pub fn seq_no(&self, name: &str) -> Result<Option<i64>, SnapshotError> {
        self.conn
            .query_row(
                "SELECT seq_no FROM trees WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))
    }

    /// Names of every stored tree, sorted.
    pub fn names(&self) -> Result<Vec<String>, SnapshotError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM trees ORDER BY name")
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))
    }
}

impl<'a> SnapshotStoreTrait for SnapshotStore<'a> {
    fn save_tree(&self, name: &str, tree: &BookmarkModel) -> Result<(), SnapshotError> {
        let data =
            serial::to_json(tree).map_err(|e| SnapshotError::SerializationError(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO trees (name, data, seq_no, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, data, tree.seq_no(), Self::now()],
            )
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn load_tree(&self, name: &str) -> Result<Option<BookmarkModel>, SnapshotError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM trees WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))?;
        data.map(|json| {
            serial::from_json(&json).map_err(|e| SnapshotError::SerializationError(e.to_string()))
        })
        .transpose()
    }

    fn delete_tree(&self, name: &str) -> Result<(), SnapshotError> {
        self.conn
            .execute("DELETE FROM trees WHERE name = ?1", params![name])
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        self.conn
            .execute("DELETE FROM trees", [])
            .map_err(|e| SnapshotError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// True if the current tree, the backup and a snapshot of every store
    /// are all present.
    fn has_recoverable<S: AsRef<str>>(&self, stores: &[S]) -> Result<bool, SnapshotError> {
        let mut required = vec![CURRENT.to_string(), BACKUP.to_string()];
        required.extend(stores.iter().map(|s| store_key(s.as_ref())));
        for name in &required {
            if self.seq_no(name)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
