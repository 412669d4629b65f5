use std::fmt;
use std::time::Duration;

// === StoreError ===

/// Errors raised by a local bookmark store. Never fatal: the store is
/// skipped for the current cycle.
#[derive(Debug)]
pub enum StoreError {
    /// The store's file could not be read or written.
    IoError(String),
    /// The store's content could not be parsed.
    ParseError(String),
    /// The store is not reachable right now.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::IoError(msg) => write!(f, "Store I/O error: {}", msg),
            StoreError::ParseError(msg) => write!(f, "Store parse error: {}", msg),
            StoreError::Unavailable(name) => write!(f, "Store unavailable: {}", name),
        }
    }
}

impl std::error::Error for StoreError {}

// === ExchangeError ===

/// Outcome of a failed remote exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Host name could not be resolved.
    NameResolution(String),
    /// Connection could not be established.
    Connect(String),
    /// The connection broke or timed out mid-request.
    Socket(String),
    /// The server answered with an unexpected HTTP status.
    HttpStatus(u16),
    /// The response body could not be understood.
    MalformedResponse(String),
    /// The server asked the client to come back later.
    ServerWait(Option<Duration>),
    /// The account does not exist on the server.
    UnknownAccount(String),
    /// The server rejected the credentials.
    BadCredentials,
}

impl ExchangeError {
    /// Permanent errors need user action; everything else is retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ExchangeError::UnknownAccount(_) | ExchangeError::BadCredentials)
    }

    /// Delay requested by the server, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExchangeError::ServerWait(delay) => *delay,
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::NameResolution(host) => write!(f, "Cannot resolve host: {}", host),
            ExchangeError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            ExchangeError::Socket(msg) => write!(f, "Connection error: {}", msg),
            ExchangeError::HttpStatus(code) => write!(f, "Unexpected HTTP status: {}", code),
            ExchangeError::MalformedResponse(msg) => {
                write!(f, "Malformed server response: {}", msg)
            }
            ExchangeError::ServerWait(Some(delay)) => {
                write!(f, "Server busy, retry in {}s", delay.as_secs())
            }
            ExchangeError::ServerWait(None) => write!(f, "Server busy"),
            ExchangeError::UnknownAccount(user) => write!(f, "Unknown account: {}", user),
            ExchangeError::BadCredentials => write!(f, "Invalid username or password"),
        }
    }
}

impl std::error::Error for ExchangeError {}

// === SnapshotError ===

/// Errors related to persisted tree snapshots.
#[derive(Debug)]
pub enum SnapshotError {
    /// Database operation failed.
    DatabaseError(String),
    /// A stored tree could not be encoded or decoded.
    SerializationError(String),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::DatabaseError(msg) => write!(f, "Snapshot database error: {}", msg),
            SnapshotError::SerializationError(msg) => {
                write!(f, "Snapshot serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

// === CryptoError ===

/// Errors related to cryptographic operations.
#[derive(Debug)]
pub enum CryptoError {
    /// Failed to derive encryption key from password.
    KeyDerivation(String),
    /// Encryption operation failed.
    Encryption(String),
    /// Decryption operation failed.
    Decryption(String),
    /// Failed to generate random bytes.
    RandomGeneration(String),
    /// The provided key is invalid.
    InvalidKey(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyDerivation(msg) => write!(f, "Key derivation failed: {}", msg),
            CryptoError::Encryption(msg) => write!(f, "Encryption failed: {}", msg),
            CryptoError::Decryption(msg) => write!(f, "Decryption failed: {}", msg),
            CryptoError::RandomGeneration(msg) => {
                write!(f, "Random generation failed: {}", msg)
            }
            CryptoError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

// === CredentialError ===

/// Errors related to the stored remote login.
#[derive(Debug)]
pub enum CredentialError {
    /// No login has been stored yet.
    NotConfigured,
    /// Database operation failed.
    DatabaseError(String),
    /// The stored secret could not be encrypted or decrypted.
    Crypto(CryptoError),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::NotConfigured => write!(f, "No login configured"),
            CredentialError::DatabaseError(msg) => {
                write!(f, "Credential database error: {}", msg)
            }
            CredentialError::Crypto(err) => write!(f, "Credential crypto error: {}", err),
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CredentialError::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CryptoError> for CredentialError {
    fn from(err: CryptoError) -> Self {
        CredentialError::Crypto(err)
    }
}
