//! Unit tests for the CryptoService public API.
//!
//! These tests exercise key derivation and AES-256-GCM sealing through the
//! `CryptoServiceTrait` interface, the way the credential store uses them.

use marksync::services::crypto_service::{CryptoService, CryptoServiceTrait, KEY_LENGTH, SALT_LENGTH};
use marksync::types::errors::CryptoError;

/// Different plaintexts sealed with the same key must not share a ciphertext.
#[test]
fn test_different_plaintexts_produce_different_ciphertexts() {
    let service = CryptoService::new();
    let salt = service.generate_salt().unwrap();
    let key = service.derive_key(b"installation-secret", &salt).unwrap();

    let encrypted_a = service.encrypt(b"username:alice", &key).unwrap();
    let encrypted_b = service.encrypt(b"username:bob", &key).unwrap();

    assert_ne!(encrypted_a.ciphertext, encrypted_b.ciphertext);
}

/// Sealing the same plaintext twice uses fresh nonces.
#[test]
fn test_same_plaintext_gets_fresh_nonce() {
    let service = CryptoService::new();
    let salt = service.generate_salt().unwrap();
    let key = service.derive_key(b"secret", &salt).unwrap();

    let first = service.encrypt(b"same", &key).unwrap();
    let second = service.encrypt(b"same", &key).unwrap();
    assert_ne!(first.iv, second.iv);
    assert_eq!(service.decrypt(&first, &key).unwrap(), b"same");
    assert_eq!(service.decrypt(&second, &key).unwrap(), b"same");
}

/// Data sealed under one secret cannot be opened with a key from another.
#[test]
fn test_decryption_with_wrong_key_fails() {
    let service = CryptoService::new();
    let salt = service.generate_salt().unwrap();
    let correct_key = service.derive_key(b"correct", &salt).unwrap();
    let wrong_key = service.derive_key(b"wrong", &salt).unwrap();

    let encrypted = service.encrypt(b"hunter2", &correct_key).unwrap();
    assert!(matches!(
        service.decrypt(&encrypted, &wrong_key),
        Err(CryptoError::Decryption(_))
    ));
}

/// The same secret under different salts yields different keys.
#[test]
fn test_salt_changes_derived_key() {
    let service = CryptoService::new();
    let a = service.derive_key(b"secret", &[1u8; SALT_LENGTH]).unwrap();
    let b = service.derive_key(b"secret", &[2u8; SALT_LENGTH]).unwrap();
    assert_eq!(a.len(), KEY_LENGTH);
    assert_ne!(a, b);
}

#[test]
fn test_empty_salt_rejected() {
    let service = CryptoService::new();
    assert!(matches!(
        service.derive_key(b"secret", &[]),
        Err(CryptoError::KeyDerivation(_))
    ));
}

#[test]
fn test_generated_salts_are_random() {
    let service = CryptoService::new();
    let a = service.generate_salt().unwrap();
    let b = service.generate_salt().unwrap();
    assert_eq!(a.len(), SALT_LENGTH);
    assert_ne!(a, b);
}
