use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in Knox.
#[derive(Debug, Error)]
pub enum KnoxError {
    // --- Envelope / crypto errors ---
    #[error("Unsupported envelope version {0:#04x}, expected 0x02")]
    UnsupportedVersion(u8),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Decryption failed: wrong passphrase or corrupted file")]
    DecryptionFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    // --- Document errors ---
    #[error("Bunker file could not be read: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Domain errors ---
    #[error("Key \"{0}\" already exists.")]
    DuplicateKey(String),

    #[error("Key \"{0}\" not found.")]
    KeyNotFound(String),

    #[error("Authorization not found.")]
    AuthorizationNotFound,

    #[error("Maximum uses exceeded.")]
    UsageLimitExceeded,

    #[error("Authorization expired.")]
    AuthorizationExpired,

    #[error("Invalid pubkey \"{0}\"")]
    InvalidPubkey(String),

    #[error("Invalid relay URL \"{0}\"")]
    InvalidRelayUrl(String),

    #[error("Invalid expiration date \"{0}\"")]
    InvalidDate(String),

    #[error("Invalid number of uses \"{0}\"")]
    InvalidUseCount(String),

    #[error("Invalid format \"{0}\". Supported formats: csv, jsonl")]
    InvalidExportFormat(String),

    // --- Store errors ---
    #[error("Bunker not found at {0}. Run \"knox init\" to create one, or pass \"-f\" to specify its location.")]
    StoreNotFound(PathBuf),

    #[error("Bunker file already exists at {0}")]
    StoreAlreadyExists(PathBuf),

    #[error("Passphrase is required")]
    PassphraseRequired,

    #[error("Bunker file {0} was removed or renamed")]
    StoreFileLost(PathBuf),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl KnoxError {
    /// Returns `true` for policy failures whose message is safe to hand
    /// back to a remote application or print as-is.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey(_)
                | Self::KeyNotFound(_)
                | Self::AuthorizationNotFound
                | Self::UsageLimitExceeded
                | Self::AuthorizationExpired
                | Self::InvalidPubkey(_)
                | Self::InvalidRelayUrl(_)
                | Self::InvalidDate(_)
                | Self::InvalidUseCount(_)
                | Self::InvalidExportFormat(_)
        )
    }
}

/// Convenience type alias for Knox results.
pub type Result<T> = std::result::Result<T, KnoxError>;
