//! Symmetric primitives for the fileshare key hierarchy.
//!
//! Provides:
//! - AES-256-CBC with PKCS#7 padding for file bodies and key wrapping
//! - OS-CSPRNG key and IV generation
//! - Zeroizing key types
//!
//! # Architecture
//!
//! The hierarchy built on top of this crate has three levels:
//!
//! 1. **Master Key**: a random key persisted once. It wraps every KEK.
//!
//! 2. **Key Encryption Key (KEK)**: a random key per (recipient, file).
//!    It wraps that file's DEK for exactly one recipient.
//!
//! 3. **Data Encryption Key (DEK)**: a random key per file. It encrypts
//!    the file contents and is only ever stored wrapped.
//!
//! This crate knows nothing about that hierarchy; it supplies the primitives
//! through the [`CryptoEngine`] trait.

mod cipher;
mod engine;
mod error;
mod key;

pub use cipher::{BLOCK_SIZE, decrypt, decrypt_raw, encrypt, encrypt_raw};
pub use engine::{AesCbcEngine, CryptoEngine};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    IV_SIZE, Iv, KEY_SIZE, SymmetricKey, generate_iv, generate_iv_with, generate_key,
    generate_key_with,
};
