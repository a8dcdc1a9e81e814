//! Core error types.

use fileshare_crypto::CryptoError;
use fileshare_keystore::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type ShareResult<T> = Result<T, ShareError>;

/// Every failure the core can report. Each variant carries a message fit
/// for an administrator; none of them carry key material.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no key entry for user {user_id} on file {file_id}")]
    KeyNotFound { user_id: i64, file_id: String },

    #[error("master key unavailable: {0}")]
    MasterKeyUnavailable(String),

    #[error("unwrap failed: {0}")]
    Unwrap(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no recipients for {0}; the file would be unrecoverable")]
    NoRecipients(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<CryptoError> for ShareError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Entropy(msg) => ShareError::Entropy(msg),
            CryptoError::Cipher(msg) => ShareError::Cipher(msg),
            other @ CryptoError::InvalidKeyLength { .. } => ShareError::Cipher(other.to_string()),
        }
    }
}

impl From<StoreError> for ShareError {
    fn from(e: StoreError) -> Self {
        ShareError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(e: serde_json::Error) -> Self {
        ShareError::Config(e.to_string())
    }
}
