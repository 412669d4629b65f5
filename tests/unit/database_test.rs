//! Unit tests for the marksync database layer (connection + migrations).

use marksync::database::migrations::CURRENT_SCHEMA_VERSION;
use marksync::database::Database;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
    assert!(db.unwrap().path().is_none());
}

#[test]
fn test_migrations_create_all_tables() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    for table in &["schema_version", "trees", "secure_store"] {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap_or(false);
        assert!(exists, "Table '{}' should exist after migrations", table);
    }
}

#[test]
fn test_schema_version_is_current() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    assert_eq!(db.schema_version(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let result = marksync::database::migrations::run_all(db.connection());
    assert!(result.is_ok(), "Running migrations twice should succeed (idempotent)");
    assert_eq!(db.schema_version(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_open_file_database_and_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("state.db");

    {
        let db = Database::open(&db_path).expect("open with file path should succeed");
        assert_eq!(db.path(), Some(db_path.as_path()));
        db.connection()
            .execute(
                "INSERT INTO trees (name, data, seq_no, updated_at) VALUES ('current', '{}', 7, 0)",
                [],
            )
            .expect("insert");
    }
    assert!(db_path.exists(), "Database file should exist on disk");

    let db = Database::open(&db_path).expect("reopen");
    let seq_no: i64 = db
        .connection()
        .query_row("SELECT seq_no FROM trees WHERE name = 'current'", [], |row| row.get(0))
        .expect("query");
    assert_eq!(seq_no, 7);
}

#[test]
fn test_trees_name_is_primary_key() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();
    conn.execute(
        "INSERT INTO trees (name, data, updated_at) VALUES ('backup', '{}', 0)",
        [],
    )
    .expect("first insert");
    let duplicate = conn.execute(
        "INSERT INTO trees (name, data, updated_at) VALUES ('backup', '{}', 0)",
        [],
    );
    assert!(duplicate.is_err());
}

#[test]
fn test_secure_store_table_schema() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    conn.execute(
        "INSERT INTO secure_store (key, ciphertext, iv, auth_tag, updated_at)
         VALUES ('remote_password', X'DEADBEEF', X'AABB', X'CCDD', 1700000000)",
        [],
    )
    .expect("Should insert into secure_store");

    let ciphertext: Vec<u8> = conn
        .query_row(
            "SELECT ciphertext FROM secure_store WHERE key = 'remote_password'",
            [],
            |row| row.get(0),
        )
        .expect("Should query secure_store");
    assert_eq!(ciphertext, vec![0xDE, 0xAD, 0xBE, 0xEF]);
}
