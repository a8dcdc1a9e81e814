//! AES-256-CBC with PKCS#7 padding.
//!
//! Deterministic for identical inputs and side-effect free. Any failure is
//! reported as [`CryptoError::Cipher`]; a decrypt never returns an empty
//! success for input it could not process.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{Iv, SymmetricKey};
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypts `plaintext` under `key` and `iv`.
///
/// Output length is always a non-zero multiple of [`BLOCK_SIZE`].
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
    encrypt_raw(plaintext, key.as_bytes(), iv.as_bytes())
}

/// Decrypts `ciphertext` under `key` and `iv`, stripping PKCS#7 padding.
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
    decrypt_raw(ciphertext, key.as_bytes(), iv.as_bytes())
}

/// Slice-based encrypt for callers holding unvalidated key material.
pub fn encrypt_raw(plaintext: &[u8], key: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
    let enc = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| {
        CryptoError::Cipher(format!(
            "bad key/IV size for AES-256-CBC (key {} bytes, iv {} bytes)",
            key.len(),
            iv.len()
        ))
    })?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Slice-based decrypt for callers holding unvalidated key material.
pub fn decrypt_raw(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Cipher(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let dec = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| {
        CryptoError::Cipher(format!(
            "bad key/IV size for AES-256-CBC (key {} bytes, iv {} bytes)",
            key.len(),
            iv.len()
        ))
    })?;

    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Cipher("bad padding (wrong key or corrupted data)".to_string()))
}
