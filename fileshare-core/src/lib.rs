//! File sharing core built on envelope encryption.
//!
//! Provides:
//! - The DEK ← KEK ← master key hierarchy and per-recipient sharing
//! - File encryption at rest with a fresh DEK per file
//! - Local-directory and in-memory storage backends
//! - An expiry sweep for time-limited shares
//! - An async facade over the synchronous service

pub mod backend;
pub mod blocking;
pub mod config;
pub mod error;
pub mod expiry;
pub mod file_cipher;
pub mod hierarchy;
pub mod logging;
pub mod service;

pub use backend::{LocalBackend, MemoryBackend, StorageBackend};
pub use blocking::{AsyncFileShare, run_blocking};
pub use config::{BackendKind, ShareConfig, StorageConfig};
pub use error::{ShareError, ShareResult};
pub use expiry::{ExpirySweeper, SweepReport};
pub use file_cipher::FileCipher;
pub use hierarchy::{KeyHierarchyManager, ShareOutcome};
pub use logging::init_logging;
pub use service::{FileShareService, UploadReceipt};

pub use fileshare_keystore::{FileRecord, FileStatus, UserId};
