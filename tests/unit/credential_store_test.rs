//! Unit tests for CredentialStore, using an in-memory SQLite database.

use marksync::database::Database;
use marksync::services::credential_store::{CredentialStore, CredentialStoreTrait};
use marksync::types::credential::Credentials;
use marksync::types::errors::CredentialError;

fn setup() -> Database {
    Database::open_in_memory().expect("Failed to open in-memory database")
}

#[test]
fn test_load_without_login_is_not_configured() {
    let db = setup();
    let store = CredentialStore::new(db.connection(), b"client-secret");
    assert!(!store.has_credentials().unwrap());
    assert!(matches!(store.load(), Err(CredentialError::NotConfigured)));
}

#[test]
fn test_save_and_load_roundtrip() {
    let db = setup();
    let store = CredentialStore::new(db.connection(), b"client-secret");
    let login = Credentials::new("alice", "correct horse battery staple");

    store.save(&login).unwrap();
    assert!(store.has_credentials().unwrap());
    assert_eq!(store.load().unwrap(), login);
}

#[test]
fn test_password_is_not_stored_in_clear() {
    let db = setup();
    let store = CredentialStore::new(db.connection(), b"client-secret");
    store.save(&Credentials::new("alice", "plaintext-password")).unwrap();

    let ciphertext: Vec<u8> = db
        .connection()
        .query_row(
            "SELECT ciphertext FROM secure_store WHERE key = 'remote_login'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    let needle = b"plaintext-password";
    assert!(!ciphertext.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn test_other_secret_cannot_read_login() {
    let db = setup();
    CredentialStore::new(db.connection(), b"install-a")
        .save(&Credentials::new("bob", "pw"))
        .unwrap();
    let other = CredentialStore::new(db.connection(), b"install-b");
    assert!(matches!(other.load(), Err(CredentialError::Crypto(_))));
}

#[test]
fn test_salt_survives_login_changes() {
    let db = setup();
    let store = CredentialStore::new(db.connection(), b"client-secret");
    store.save(&Credentials::new("carol", "one")).unwrap();
    store.save(&Credentials::new("carol", "two")).unwrap();
    assert_eq!(store.load().unwrap().password, "two");

    // a fresh handle on the same database derives the same key
    let reopened = CredentialStore::new(db.connection(), b"client-secret");
    assert_eq!(reopened.load().unwrap().username, "carol");
}

#[test]
fn test_clear_removes_login() {
    let db = setup();
    let store = CredentialStore::new(db.connection(), b"client-secret");
    store.save(&Credentials::new("dave", "pw")).unwrap();
    store.clear().unwrap();
    assert!(!store.has_credentials().unwrap());
    assert!(matches!(store.load(), Err(CredentialError::NotConfigured)));
    // clearing twice is fine
    store.clear().unwrap();
}

#[test]
fn test_debug_output_hides_password() {
    let login = Credentials::new("erin", "s3cret");
    let debug = format!("{:?}", login);
    assert!(debug.contains("erin"));
    assert!(!debug.contains("s3cret"));
}
