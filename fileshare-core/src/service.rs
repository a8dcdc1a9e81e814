//! Share service: the request-level API.
//!
//! Wires the key hierarchy, the file cipher, file metadata and a storage
//! backend together. Every operation is synchronous and runs to completion
//! on the calling thread; see [`crate::blocking`] for async callers.

use chrono::{DateTime, Duration, Utc};
use fileshare_crypto::{AesCbcEngine, CryptoEngine, SymmetricKey};
use fileshare_keystore::{DuckDbStore, FileCatalog, FileRecord, FileStatus, KeyStore, UserId};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::backend::StorageBackend;
use crate::config::ShareConfig;
use crate::error::{ShareError, ShareResult};
use crate::expiry::{ExpirySweeper, SweepReport};
use crate::file_cipher::{FileCipher, content_hash, write_new_file};
use crate::hierarchy::{KeyHierarchyManager, ShareOutcome};

/// What an upload produced. The DEK is not part of it; it only exists
/// wrapped inside the recipients' key entries.
#[derive(Debug)]
pub struct UploadReceipt {
    pub record: FileRecord,
    /// Recipients that can now download, and those that could not be stored.
    pub outcome: ShareOutcome,
}

pub struct FileShareService {
    config: ShareConfig,
    keys: Arc<dyn KeyStore>,
    catalog: Arc<dyn FileCatalog>,
    hierarchy: KeyHierarchyManager,
    cipher: FileCipher,
    backend: StorageBackend,
    sweeper: ExpirySweeper,
}

impl FileShareService {
    /// Opens the configured database and backend with the AES-CBC engine.
    pub fn open(config: ShareConfig) -> ShareResult<Self> {
        config.validate()?;
        let store = Arc::new(DuckDbStore::open(
            &config.database_path,
            &config.db_memory_limit,
            config.db_threads,
        )?);
        let backend = StorageBackend::from_config(&config.storage)?;
        info!(
            "opened share service: database {}, backend {:?}",
            config.database_path.display(),
            backend.kind()
        );
        Self::with_parts(
            config,
            store.clone(),
            store,
            Arc::new(AesCbcEngine),
            backend,
        )
    }

    /// Assembles a service from explicit collaborators.
    pub fn with_parts(
        config: ShareConfig,
        keys: Arc<dyn KeyStore>,
        catalog: Arc<dyn FileCatalog>,
        engine: Arc<dyn CryptoEngine>,
        backend: StorageBackend,
    ) -> ShareResult<Self> {
        config.validate()?;
        let sweeper = ExpirySweeper::new(catalog.clone(), backend.clone(), config.expiry_enabled);
        Ok(Self {
            hierarchy: KeyHierarchyManager::new(engine.clone(), keys.clone()),
            cipher: FileCipher::new(engine),
            config,
            keys,
            catalog,
            backend,
            sweeper,
        })
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> &KeyHierarchyManager {
        &self.hierarchy
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Creates the master key if this is the first activation.
    pub fn activate(&self) -> ShareResult<bool> {
        self.hierarchy.ensure_master_key()
    }

    // ========== Upload ==========

    /// Encrypts `plaintext`, stores the ciphertext and shares it.
    ///
    /// `expiration` falls back to the configured default. At least one
    /// recipient is required, since the DEK only survives inside their
    /// entries. If the metadata insert fails, or no recipient entry could be
    /// stored, the ciphertext and any partial entries are removed before the
    /// error is returned.
    pub fn upload(
        &self,
        file_name: &str,
        plaintext: &[u8],
        recipients: &[UserId],
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<UploadReceipt> {
        require_recipients(file_name, recipients)?;
        let (sealed, dek) = self.cipher.encrypt_bytes(plaintext)?;
        self.store_sealed(
            file_name,
            &sealed,
            &dek,
            content_hash(plaintext),
            plaintext.len(),
            recipients,
            expiration,
        )
    }

    /// Encrypts a local file in place (`<path>.enc`, original deleted) and
    /// uploads the result.
    ///
    /// The staging `.enc` file is removed once the backend holds the bytes.
    /// If the upload fails afterwards, the original plaintext is restored.
    pub fn upload_path(
        &self,
        path: &Path,
        recipients: &[UserId],
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<UploadReceipt> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ShareError::FileNotFound(format!("not a file: {}", path.display())))?;

        require_recipients(&file_name, recipients)?;

        let (encrypted_path, dek) = self.cipher.encrypt_file(path)?;
        let result = fs::read(&encrypted_path)
            .map_err(ShareError::from)
            .and_then(|sealed| {
                // Hash what was actually encrypted, not a second read of the source.
                let plaintext = Zeroizing::new(self.cipher.decrypt_bytes(&sealed, &dek)?);
                let (hash, size) = (content_hash(&plaintext), plaintext.len());
                drop(plaintext);
                self.store_sealed(&file_name, &sealed, &dek, hash, size, recipients, expiration)
            });

        match result {
            Ok(receipt) => {
                if let Err(e) = fs::remove_file(&encrypted_path) {
                    warn!(
                        "uploaded {file_name} but could not remove staging file {}: {e}",
                        encrypted_path.display()
                    );
                }
                Ok(receipt)
            }
            Err(e) => {
                if let Err(restore_err) = self.restore_plaintext(path, &encrypted_path, &dek) {
                    warn!(
                        "upload of {file_name} failed and the original could not be restored: {restore_err}"
                    );
                }
                Err(e)
            }
        }
    }

    fn restore_plaintext(
        &self,
        path: &Path,
        encrypted_path: &Path,
        dek: &SymmetricKey,
    ) -> ShareResult<()> {
        let plaintext = Zeroizing::new(self.cipher.decrypt_file(encrypted_path, dek)?);
        write_new_file(path, &plaintext)?;
        fs::remove_file(encrypted_path)?;
        debug!("restored {} after failed upload", path.display());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn store_sealed(
        &self,
        file_name: &str,
        sealed: &[u8],
        dek: &SymmetricKey,
        content_hash: String,
        size: usize,
        recipients: &[UserId],
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<UploadReceipt> {
        let now = Utc::now();
        let expiration = expiration.or_else(|| {
            self.config
                .default_expiration_days
                .map(|days| now + Duration::days(days))
        });

        let location = self.backend.put(sealed)?;
        let record = FileRecord {
            file_id: Uuid::now_v7().to_string(),
            file_name: file_name.to_string(),
            location,
            upload_date: now,
            expiration_date: expiration,
            content_hash,
            size: i64::try_from(size).unwrap_or(i64::MAX),
            status: FileStatus::Encrypted,
        };

        if let Err(e) = self.catalog.insert_file(&record) {
            self.discard_object(&record.location);
            return Err(e.into());
        }

        let mut outcome = match self
            .hierarchy
            .share_file(&record.file_id, recipients, dek, expiration)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.rollback_upload(&record);
                return Err(e);
            }
        };

        // Without a single stored entry the DEK is gone with this call.
        if outcome.succeeded.is_empty() {
            self.rollback_upload(&record);
            return Err(match outcome.failed.drain(..).next() {
                Some((_, e)) => e,
                None => ShareError::NoRecipients(record.file_name),
            });
        }

        info!(
            "uploaded {} as {} ({} bytes) for {} recipient(s)",
            record.file_name,
            record.file_id,
            record.size,
            outcome.succeeded.len()
        );
        Ok(UploadReceipt { record, outcome })
    }

    fn discard_object(&self, location: &str) {
        if let Err(e) = self.backend.delete(location) {
            warn!("could not remove orphaned object {location}: {e}");
        }
    }

    fn rollback_upload(&self, record: &FileRecord) {
        if let Err(e) = self.hierarchy.revoke_all(&record.file_id) {
            warn!("rollback of {}: could not remove key entries: {e}", record.file_id);
        }
        if let Err(e) = self.catalog.delete_file(&record.file_id) {
            warn!("rollback of {}: could not remove metadata: {e}", record.file_id);
        }
        self.discard_object(&record.location);
    }

    // ========== Download ==========

    /// Decrypts `file_id` for `user_id`. Either the full plaintext or an error.
    pub fn download(&self, user_id: UserId, file_id: &str) -> ShareResult<Vec<u8>> {
        let record = self.require_file(file_id)?;
        let now = Utc::now();
        if record.status == FileStatus::Expired || record.is_expired_at(now) {
            return Err(ShareError::Expired(format!("file {file_id} has expired")));
        }

        let dek = self.hierarchy.get_dek_for(user_id, file_id)?;
        let sealed = self.backend.get(&record.location)?;
        let plaintext = self
            .cipher
            .decrypt_bytes_checked(&sealed, &dek, &record.content_hash)?;

        if let Err(e) = self.keys.mark_downloaded(user_id, file_id, now) {
            warn!("could not record download of {file_id} by user {user_id}: {e}");
        }
        debug!("user {user_id} downloaded {file_id}");
        Ok(plaintext)
    }

    // ========== Sharing ==========

    /// Grants more recipients access, recovering the DEK through
    /// `granting_user`'s own entry.
    pub fn share_with(
        &self,
        file_id: &str,
        granting_user: UserId,
        recipients: &[UserId],
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<ShareOutcome> {
        let record = self.require_file(file_id)?;
        if record.status == FileStatus::Expired {
            return Err(ShareError::Expired(format!("file {file_id} has expired")));
        }
        self.hierarchy
            .extend_share(file_id, granting_user, recipients, expiration.or(record.expiration_date))
    }

    pub fn revoke(&self, user_id: UserId, file_id: &str) -> ShareResult<bool> {
        self.hierarchy.revoke(user_id, file_id)
    }

    pub fn recipients(&self, file_id: &str) -> ShareResult<Vec<UserId>> {
        self.hierarchy.recipients(file_id)
    }

    // ========== File lifecycle ==========

    pub fn file(&self, file_id: &str) -> ShareResult<Option<FileRecord>> {
        Ok(self.catalog.get_file(file_id)?)
    }

    fn require_file(&self, file_id: &str) -> ShareResult<FileRecord> {
        self.file(file_id)?
            .ok_or_else(|| ShareError::FileNotFound(file_id.to_string()))
    }

    /// Removes the ciphertext, every key entry and the metadata of a file.
    /// Returns false if the file was unknown.
    pub fn delete_file(&self, file_id: &str) -> ShareResult<bool> {
        let Some(record) = self.file(file_id)? else {
            return Ok(false);
        };
        // Entries, then metadata, then bytes: a failure part way never leaves
        // a record pointing at missing ciphertext.
        let entries = self.hierarchy.revoke_all(file_id)?;
        self.catalog.delete_file(file_id)?;
        self.discard_object(&record.location);
        info!("deleted file {file_id} and {entries} key entries");
        Ok(true)
    }

    /// Runs one expiry pass at `now`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> ShareResult<SweepReport> {
        self.sweeper.sweep(now)
    }
}

fn require_recipients(file_name: &str, recipients: &[UserId]) -> ShareResult<()> {
    if recipients.is_empty() {
        return Err(ShareError::NoRecipients(file_name.to_string()));
    }
    Ok(())
}
