//! Persistence seams consumed by the key hierarchy and the share service.
//!
//! Implementations store opaque bytes and perform no cryptography.

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::error::StoreResult;
use crate::model::{EncryptionKeyEntry, FileRecord, FileStatus, UserId};

/// Master key and per-recipient key entries.
pub trait KeyStore: Send + Sync {
    /// Loads the master key, or `None` if it has never been created.
    fn load_master_key(&self) -> StoreResult<Option<Zeroizing<Vec<u8>>>>;

    /// Stores the master key. Fails with `AlreadyExists` if one is present.
    fn insert_master_key(&self, secret: &[u8]) -> StoreResult<()>;

    /// Deletes any existing master key and stores `secret` in its place,
    /// as a single unit.
    fn replace_master_key(&self, secret: &[u8]) -> StoreResult<()>;

    /// Inserts or replaces the entry for `(entry.user_id, entry.file_id)`.
    fn upsert_entry(&self, entry: &EncryptionKeyEntry) -> StoreResult<()>;

    fn get_entry(&self, user_id: UserId, file_id: &str) -> StoreResult<Option<EncryptionKeyEntry>>;

    fn delete_entry(&self, user_id: UserId, file_id: &str) -> StoreResult<bool>;

    /// Returns the number of entries removed.
    fn delete_entries_for_file(&self, file_id: &str) -> StoreResult<usize>;

    fn list_recipients(&self, file_id: &str) -> StoreResult<Vec<UserId>>;

    fn count_entries(&self) -> StoreResult<usize>;

    /// Records a download timestamp. Returns false if no entry exists.
    fn mark_downloaded(&self, user_id: UserId, file_id: &str, at: DateTime<Utc>)
    -> StoreResult<bool>;
}

/// File metadata.
pub trait FileCatalog: Send + Sync {
    /// Fails with `AlreadyExists` on a duplicate id or file name.
    fn insert_file(&self, record: &FileRecord) -> StoreResult<()>;

    fn get_file(&self, file_id: &str) -> StoreResult<Option<FileRecord>>;

    fn set_file_status(&self, file_id: &str, status: FileStatus) -> StoreResult<bool>;

    fn delete_file(&self, file_id: &str) -> StoreResult<bool>;

    /// Files still in `Encrypted` state whose expiration is at or before `now`.
    fn list_expired_files(&self, now: DateTime<Utc>) -> StoreResult<Vec<FileRecord>>;
}
