//! SQLite connection for the sync state database.
//!
//! [`Database`] owns a `rusqlite::Connection` and brings the schema up to
//! date when opened. The coordinator owns the only instance; snapshot and
//! credential stores borrow its connection.

use rusqlite::Connection;
use std::path::{Path, PathBuf};

use super::migrations;

/// File name of the state database inside the platform data directory.
pub const DATABASE_FILE: &str = "marksync.db";

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (or creates) the database at `path` and runs migrations.
    ///
    /// # Errors
    /// Returns `rusqlite::Error` if the connection cannot be established or migrations fail.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path.as_ref())?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Opens an in-memory database; everything is discarded on drop.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Path of the database file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> i32 {
        migrations::get_schema_version(&self.conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
