//! File contents at rest.
//!
//! An encrypted file is the 16-byte IV followed by the AES-256-CBC
//! ciphertext, nothing else. One fresh DEK and one fresh IV per file. The DEK
//! is handed back to the caller and never written anywhere by this module.
//!
//! A wrong DEK fails the padding check most of the time. The `_checked`
//! variants also compare the plaintext against its recorded SHA-256, so a
//! wrong key always ends in [`ShareError::Cipher`].

use fileshare_crypto::{BLOCK_SIZE, CryptoEngine, IV_SIZE, Iv, SymmetricKey};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{ShareError, ShareResult};

/// Extension appended to a plaintext path to name its encrypted counterpart.
pub const ENCRYPTED_EXTENSION: &str = "enc";

pub struct FileCipher {
    engine: Arc<dyn CryptoEngine>,
}

impl FileCipher {
    pub fn new(engine: Arc<dyn CryptoEngine>) -> Self {
        Self { engine }
    }

    /// Encrypts the file at `path` under a fresh DEK.
    ///
    /// Writes `<path>.enc` (never overwriting an existing file) and then
    /// deletes the plaintext. If anything fails before that point the original
    /// is left as it was and no encrypted file remains.
    pub fn encrypt_file(&self, path: &Path) -> ShareResult<(PathBuf, SymmetricKey)> {
        let plaintext = Zeroizing::new(fs::read(path)?);
        let (body, dek) = self.encrypt_bytes(&plaintext)?;

        let encrypted_path = encrypted_path_for(path);
        write_new_file(&encrypted_path, &body)?;

        if let Err(e) = fs::remove_file(path) {
            let _ = fs::remove_file(&encrypted_path);
            return Err(e.into());
        }

        debug!(
            "encrypted {} ({} bytes) -> {}",
            path.display(),
            plaintext.len(),
            encrypted_path.display()
        );
        Ok((encrypted_path, dek))
    }

    /// Reads and decrypts a file produced by [`encrypt_file`](Self::encrypt_file).
    pub fn decrypt_file(&self, encrypted_path: &Path, dek: &SymmetricKey) -> ShareResult<Vec<u8>> {
        let body = fs::read(encrypted_path)?;
        self.decrypt_bytes(&body, dek)
    }

    /// Like [`decrypt_file`](Self::decrypt_file), but rejects any plaintext
    /// whose hex SHA-256 is not `expected_hash`.
    pub fn decrypt_file_checked(
        &self,
        encrypted_path: &Path,
        dek: &SymmetricKey,
        expected_hash: &str,
    ) -> ShareResult<Vec<u8>> {
        let body = fs::read(encrypted_path)?;
        self.decrypt_bytes_checked(&body, dek, expected_hash)
    }

    /// Encrypts `plaintext` under a fresh DEK, returning `IV || ciphertext` and the DEK.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> ShareResult<(Vec<u8>, SymmetricKey)> {
        let dek = self.engine.generate_key()?;
        let iv = self.engine.generate_iv()?;
        let ciphertext = self.engine.encrypt(plaintext, &dek, &iv)?;

        let mut body = Vec::with_capacity(IV_SIZE + ciphertext.len());
        body.extend_from_slice(iv.as_bytes());
        body.extend_from_slice(&ciphertext);
        Ok((body, dek))
    }

    /// Splits `IV || ciphertext` at the IV boundary and decrypts.
    pub fn decrypt_bytes(&self, body: &[u8], dek: &SymmetricKey) -> ShareResult<Vec<u8>> {
        if body.len() < IV_SIZE + BLOCK_SIZE {
            return Err(ShareError::Cipher(format!(
                "encrypted body too short: {} bytes, need at least {}",
                body.len(),
                IV_SIZE + BLOCK_SIZE
            )));
        }

        let (iv_bytes, ciphertext) = body.split_at(IV_SIZE);
        let iv = Iv::from_slice(iv_bytes)?;
        Ok(self.engine.decrypt(ciphertext, dek, &iv)?)
    }

    /// Decrypts and verifies the plaintext against `expected_hash`.
    pub fn decrypt_bytes_checked(
        &self,
        body: &[u8],
        dek: &SymmetricKey,
        expected_hash: &str,
    ) -> ShareResult<Vec<u8>> {
        let mut plaintext = Zeroizing::new(self.decrypt_bytes(body, dek)?);
        if !content_hash(&plaintext).eq_ignore_ascii_case(expected_hash) {
            return Err(ShareError::Cipher(
                "content hash mismatch (wrong key or corrupted data)".into(),
            ));
        }
        Ok(std::mem::take(&mut *plaintext))
    }
}

/// Hex SHA-256 of a plaintext.
pub fn content_hash(plaintext: &[u8]) -> String {
    hex::encode(Sha256::digest(plaintext))
}

/// `report.pdf` -> `report.pdf.enc`
pub fn encrypted_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    PathBuf::from(name)
}

/// Creates `path` exclusively and writes `bytes`, removing the partial file on failure.
pub(crate) fn write_new_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(bytes).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}
