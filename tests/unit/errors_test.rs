use std::error::Error;
use std::time::Duration;

use marksync::types::errors::*;

// === StoreError Tests ===

#[test]
fn store_error_display_variants() {
    assert_eq!(
        StoreError::IoError("disk full".to_string()).to_string(),
        "Store I/O error: disk full"
    );
    assert_eq!(
        StoreError::ParseError("line 3".to_string()).to_string(),
        "Store parse error: line 3"
    );
    assert_eq!(
        StoreError::Unavailable("firefox".to_string()).to_string(),
        "Store unavailable: firefox"
    );
}

#[test]
fn store_error_implements_error_trait() {
    let err: Box<dyn Error> = Box::new(StoreError::Unavailable("x".to_string()));
    assert!(err.source().is_none());
}

// === ExchangeError Tests ===

#[test]
fn exchange_error_display_variants() {
    assert_eq!(ExchangeError::HttpStatus(500).to_string(), "Unexpected HTTP status: 500");
    assert_eq!(
        ExchangeError::ServerWait(Some(Duration::from_secs(120))).to_string(),
        "Server busy, retry in 120s"
    );
    assert_eq!(ExchangeError::ServerWait(None).to_string(), "Server busy");
    assert_eq!(
        ExchangeError::BadCredentials.to_string(),
        "Invalid username or password"
    );
    assert_eq!(
        ExchangeError::UnknownAccount("alice".to_string()).to_string(),
        "Unknown account: alice"
    );
}

#[test]
fn exchange_error_permanence() {
    assert!(ExchangeError::BadCredentials.is_permanent());
    assert!(ExchangeError::UnknownAccount("bob".to_string()).is_permanent());

    let temporary = [
        ExchangeError::NameResolution("example.invalid".to_string()),
        ExchangeError::Connect("refused".to_string()),
        ExchangeError::Socket("reset".to_string()),
        ExchangeError::HttpStatus(502),
        ExchangeError::MalformedResponse("eof".to_string()),
        ExchangeError::ServerWait(None),
    ];
    for err in temporary {
        assert!(!err.is_permanent(), "{:?} should be retried", err);
    }
}

#[test]
fn exchange_error_retry_after_only_for_server_wait() {
    let wait = Duration::from_secs(30);
    assert_eq!(ExchangeError::ServerWait(Some(wait)).retry_after(), Some(wait));
    assert_eq!(ExchangeError::ServerWait(None).retry_after(), None);
    assert_eq!(ExchangeError::HttpStatus(503).retry_after(), None);
}

// === SnapshotError Tests ===

#[test]
fn snapshot_error_display_variants() {
    assert_eq!(
        SnapshotError::DatabaseError("locked".to_string()).to_string(),
        "Snapshot database error: locked"
    );
    assert_eq!(
        SnapshotError::SerializationError("bad json".to_string()).to_string(),
        "Snapshot serialization error: bad json"
    );
}

// === SettingsError Tests ===

#[test]
fn settings_error_display_variants() {
    assert_eq!(
        SettingsError::InvalidKey("general.nope".to_string()).to_string(),
        "Invalid settings key: general.nope"
    );
    assert_eq!(
        SettingsError::InvalidValue("not a bool".to_string()).to_string(),
        "Invalid settings value: not a bool"
    );
}

// === CryptoError Tests ===

#[test]
fn crypto_error_display_variants() {
    assert_eq!(
        CryptoError::KeyDerivation("bad salt".to_string()).to_string(),
        "Key derivation failed: bad salt"
    );
    assert_eq!(
        CryptoError::Decryption("tag mismatch".to_string()).to_string(),
        "Decryption failed: tag mismatch"
    );
}

// === CredentialError Tests ===

#[test]
fn credential_error_wraps_crypto_error() {
    let err: CredentialError = CryptoError::InvalidKey("short".to_string()).into();
    assert_eq!(err.to_string(), "Credential crypto error: Invalid key: short");
    assert!(err.source().is_some());
}

#[test]
fn credential_error_not_configured_has_no_source() {
    let err = CredentialError::NotConfigured;
    assert_eq!(err.to_string(), "No login configured");
    assert!(err.source().is_none());
}
