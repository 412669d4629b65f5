//! Credential Store for marksync.
//!
//! Keeps the remote login encrypted in the `secure_store` table. The key is
//! derived with PBKDF2 from an installation secret (the client id) and a
//! random salt stored next to the secret. Whether a login is present decides
//! how the coordinator starts.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, Zeroizing};

use crate::services::crypto_service::{CryptoService, CryptoServiceTrait};
use crate::types::credential::{Credentials, EncryptedData};
use crate::types::errors::{CredentialError, CryptoError};

const LOGIN_KEY: &str = "remote_login";
const SALT_KEY: &str = "kdf_salt";

pub trait CredentialStoreTrait {
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError>;
    fn load(&self) -> Result<Credentials, CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
    fn has_credentials(&self) -> Result<bool, CredentialError>;
}

#[derive(Serialize, Deserialize, Zeroize)]
struct LoginRecord {
    username: String,
    password: String,
}

pub struct CredentialStore<'a> {
    conn: &'a Connection,
    crypto: CryptoService,
    secret: Zeroizing<Vec<u8>>,
}

impl<'a> CredentialStore<'a> {
    /// `secret` is installation-specific key material, e.g. the client id bytes.
    pub fn new(conn: &'a Connection, secret: &[u8]) -> Self {
        Self {
            conn,
            crypto: CryptoService::new(),
            secret: Zeroizing::new(secret.to_vec()),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn read_row(&self, key: &str) -> Result<Option<EncryptedData>, CredentialError> {
        self.conn
            .query_row(
                "SELECT ciphertext, iv, auth_tag FROM secure_store WHERE key = ?1",
                params![key],
                |row| {
                    Ok(EncryptedData {
                        ciphertext: row.get(0)?,
                        iv: row.get(1)?,
                        auth_tag: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| CredentialError::DatabaseError(e.to_string()))
    }

    fn write_row(&self, key: &str, data: &EncryptedData) -> Result<(), CredentialError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO secure_store (key, ciphertext, iv, auth_tag, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key, data.ciphertext, data.iv, data.auth_tag, Self::now()],
            )
            .map_err(|e| CredentialError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// The salt row keeps the raw salt in `ciphertext` with empty iv/tag.
    fn salt(&self, create: bool) -> Result<Option<Vec<u8>>, CredentialError> {
        if let Some(row) = self.read_row(SALT_KEY)? {
            return Ok(Some(row.ciphertext));
        }
        if !create {
            return Ok(None);
        }
        let salt = self.crypto.generate_salt()?;
        self.write_row(
            SALT_KEY,
            &EncryptedData {
                ciphertext: salt.clone(),
                iv: Vec::new(),
                auth_tag: Vec::new(),
            },
        )?;
        Ok(Some(salt))
    }

    fn key(&self, salt: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.crypto.derive_key(&self.secret, salt).map(Zeroizing::new)
    }
}

impl<'a> CredentialStoreTrait for CredentialStore<'a> {
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let salt = self.salt(true)?.ok_or(CredentialError::NotConfigured)?;
        let key = self.key(&salt)?;
        let mut record = LoginRecord {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&record)
                .map_err(|e| CredentialError::Crypto(CryptoError::Encryption(e.to_string())))?,
        );
        record.zeroize();
        let sealed = self.crypto.encrypt(&plaintext, &key)?;
        self.write_row(LOGIN_KEY, &sealed)
    }

    fn load(&self) -> Result<Credentials, CredentialError> {
        let sealed = self.read_row(LOGIN_KEY)?.ok_or(CredentialError::NotConfigured)?;
        let salt = self.salt(false)?.ok_or(CredentialError::NotConfigured)?;
        let key = self.key(&salt)?;
        let plaintext = Zeroizing::new(self.crypto.decrypt(&sealed, &key)?);
        let mut record: LoginRecord = serde_json::from_slice(&plaintext)
            .map_err(|e| CredentialError::Crypto(CryptoError::Decryption(e.to_string())))?;
        let credentials = Credentials::new(&record.username, &record.password);
        record.zeroize();
        Ok(credentials)
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.conn
            .execute("DELETE FROM secure_store WHERE key = ?1", params![LOGIN_KEY])
            .map_err(|e| CredentialError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn has_credentials(&self) -> Result<bool, CredentialError> {
        Ok(self.read_row(LOGIN_KEY)?.is_some())
    }
}
