//! Abstract crypto engine used by the key hierarchy and the file cipher.
//!
//! Consumers hold an `Arc<dyn CryptoEngine>`; production code uses
//! [`AesCbcEngine`], tests may substitute an engine with a failing
//! random source.

use crate::error::CryptoResult;
use crate::key::{Iv, SymmetricKey};

/// Random key/IV generation plus symmetric encrypt/decrypt.
pub trait CryptoEngine: Send + Sync {
    /// Fresh 256-bit key from a cryptographically secure source.
    fn generate_key(&self) -> CryptoResult<SymmetricKey>;

    /// Fresh 128-bit IV from a cryptographically secure source.
    fn generate_iv(&self) -> CryptoResult<Iv>;

    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>>;
}

/// AES-256-CBC / PKCS#7 engine backed by the OS CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct AesCbcEngine;

impl CryptoEngine for AesCbcEngine {
    fn generate_key(&self) -> CryptoResult<SymmetricKey> {
        crate::key::generate_key()
    }

    fn generate_iv(&self) -> CryptoResult<Iv> {
        crate::key::generate_iv()
    }

    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
        crate::cipher::encrypt(plaintext, key, iv)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
        crate::cipher::decrypt(ciphertext, key, iv)
    }
}
