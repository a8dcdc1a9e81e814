//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the symmetric primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The OS random source could not produce bytes.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// The block cipher rejected its input.
    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
