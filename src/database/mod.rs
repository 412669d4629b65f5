//! Sync state database.
//!
//! Holds the serialized current/backup trees, one snapshot per local store,
//! and the encrypted remote login.
//!
//! ```no_run
//! use marksync::database::Database;
//!
//! let db = Database::open("marksync.db").expect("failed to open database");
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::{Database, DATABASE_FILE};
