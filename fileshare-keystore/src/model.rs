//! Persisted records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Host-application user identifier.
pub type UserId = i64;

/// One recipient's wrapped key material for one file.
///
/// `encryption_key` is the file DEK wrapped under this recipient's KEK;
/// `user_kek` is that KEK wrapped under the master key. Each wrap has its
/// own IV.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKeyEntry {
    pub user_id: UserId,
    pub file_id: String,
    pub encryption_key: Vec<u8>,
    pub dek_iv: Vec<u8>,
    pub user_kek: Vec<u8>,
    pub kek_iv: Vec<u8>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub download_date: Option<DateTime<Utc>>,
}

impl EncryptionKeyEntry {
    /// Whether the entry has passed its expiration at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }
}

// Wrapped material is not secret on its own, but it has no business in logs.
impl fmt::Debug for EncryptionKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyEntry")
            .field("user_id", &self.user_id)
            .field("file_id", &self.file_id)
            .field("encryption_key", &format_args!("<{} bytes>", self.encryption_key.len()))
            .field("user_kek", &format_args!("<{} bytes>", self.user_kek.len()))
            .field("expiration_date", &self.expiration_date)
            .field("created_at", &self.created_at)
            .field("download_date", &self.download_date)
            .finish()
    }
}

/// Lifecycle state of a shared file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Ciphertext is held by the storage backend.
    Encrypted,
    /// Past its expiration; ciphertext has been deleted. Terminal.
    Expired,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Encrypted => "encrypted",
            FileStatus::Expired => "expired",
        }
    }
}

impl FromStr for FileStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encrypted" => Ok(FileStatus::Encrypted),
            "expired" => Ok(FileStatus::Expired),
            other => Err(StoreError::Corrupt(format!("unknown file status '{other}'"))),
        }
    }
}

/// Metadata for one shareable file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file_id: String,
    pub file_name: String,
    /// Storage-backend location of the encrypted bytes.
    pub location: String,
    pub upload_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// SHA-256 of the plaintext, hex encoded.
    pub content_hash: String,
    /// Plaintext size in bytes.
    pub size: i64,
    pub status: FileStatus,
}

impl FileRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

pub(crate) fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    ms.map(from_millis).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_str() {
        for status in [FileStatus::Encrypted, FileStatus::Expired] {
            assert_eq!(status.as_str().parse::<FileStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<FileStatus>().is_err());
    }

    #[test]
    fn millis_conversion_keeps_millisecond_precision() {
        let ts = from_millis(1_760_000_000_123).unwrap();
        assert_eq!(to_millis(ts), 1_760_000_000_123);
    }

    #[test]
    fn entry_debug_hides_key_bytes() {
        let entry = EncryptionKeyEntry {
            user_id: 7,
            file_id: "f".into(),
            encryption_key: vec![0xEE; 48],
            dek_iv: vec![0; 16],
            user_kek: vec![0xDD; 48],
            kek_iv: vec![0; 16],
            expiration_date: None,
            created_at: from_millis(0).unwrap(),
            download_date: None,
        };
        let shown = format!("{entry:?}");
        assert!(shown.contains("<48 bytes>"));
        assert!(!shown.contains("238"));
    }
}
