//! Key and IV material.
//!
//! Every key in the hierarchy (master key, KEK, DEK) is a 256-bit
//! [`SymmetricKey`]. Keys zeroize on drop and never print their bytes.

use crate::error::{CryptoError, CryptoResult};
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of every symmetric key in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of a CBC initialization vector in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// A 256-bit symmetric key.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds a key from a slice, rejecting anything that isn't exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// A CBC initialization vector. Not secret, but never reused for a new wrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv {
    bytes: [u8; IV_SIZE],
}

impl Iv {
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; IV_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::Cipher(format!(
                "invalid IV length: expected {IV_SIZE}, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.bytes
    }
}

/// Generates a random 256-bit key from the OS CSPRNG.
pub fn generate_key() -> CryptoResult<SymmetricKey> {
    generate_key_with(&mut OsRng)
}

/// Generates a random 128-bit IV from the OS CSPRNG.
pub fn generate_iv() -> CryptoResult<Iv> {
    generate_iv_with(&mut OsRng)
}

/// Generates a key from a caller-supplied fallible RNG.
pub fn generate_key_with<R: TryRngCore + ?Sized>(rng: &mut R) -> CryptoResult<SymmetricKey> {
    let mut bytes = [0u8; KEY_SIZE];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Entropy(e.to_string()))?;
    let key = SymmetricKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Generates an IV from a caller-supplied fallible RNG.
pub fn generate_iv_with<R: TryRngCore + ?Sized>(rng: &mut R) -> CryptoResult<Iv> {
    let mut bytes = [0u8; IV_SIZE];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(Iv::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let key = SymmetricKey::from_bytes([0x41; KEY_SIZE]);
        let shown = format!("{key:?}");
        assert_eq!(shown, "SymmetricKey([REDACTED])");
        assert!(!shown.contains("65"));
    }

    #[test]
    fn from_slice_rejects_short_key() {
        let err = SymmetricKey::from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength { expected: 32, actual: 16 }
        ));
    }

    #[test]
    fn iv_from_slice_rejects_wrong_length() {
        assert!(matches!(
            Iv::from_slice(&[0u8; 12]),
            Err(CryptoError::Cipher(_))
        ));
        assert!(Iv::from_slice(&[7u8; IV_SIZE]).is_ok());
    }
}
