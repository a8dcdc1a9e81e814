//! Two-level key hierarchy: DEK ← KEK ← master key.
//!
//! Sharing a file with N recipients produces N key entries. Each entry holds
//! the file's DEK wrapped under a KEK generated for that recipient alone, and
//! that KEK wrapped under the master key. Every wrap uses its own fresh IV.
//!
//! Recovering a DEK reverses the chain: master key unwraps the recipient's
//! KEK, the KEK unwraps the DEK. A recipient's KEK can only ever open that
//! recipient's entry.

use chrono::{DateTime, Utc};
use fileshare_crypto::{CryptoEngine, Iv, SymmetricKey};
use fileshare_keystore::{EncryptionKeyEntry, KeyStore, UserId};
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{ShareError, ShareResult};

/// Per-recipient result of [`KeyHierarchyManager::share_file`].
#[derive(Debug, Default)]
pub struct ShareOutcome {
    pub succeeded: Vec<UserId>,
    pub failed: Vec<(UserId, ShareError)>,
}

impl ShareOutcome {
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// True when every recipient got an entry.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Orchestrates wrapping and unwrapping across the key hierarchy.
///
/// Holds an administrative lock: wrap/unwrap take it shared, master key
/// regeneration takes it exclusively, so an unwrap never observes the master
/// key mid-replacement.
pub struct KeyHierarchyManager {
    engine: Arc<dyn CryptoEngine>,
    store: Arc<dyn KeyStore>,
    admin_lock: RwLock<()>,
}

impl KeyHierarchyManager {
    pub fn new(engine: Arc<dyn CryptoEngine>, store: Arc<dyn KeyStore>) -> Self {
        Self {
            engine,
            store,
            admin_lock: RwLock::new(()),
        }
    }

    fn shared(&self) -> ShareResult<RwLockReadGuard<'_, ()>> {
        self.admin_lock
            .read()
            .map_err(|_| ShareError::Persistence("administrative lock poisoned".into()))
    }

    fn exclusive(&self) -> ShareResult<RwLockWriteGuard<'_, ()>> {
        self.admin_lock
            .write()
            .map_err(|_| ShareError::Persistence("administrative lock poisoned".into()))
    }

    // ========== Master key lifecycle ==========

    pub fn has_master_key(&self) -> ShareResult<bool> {
        let _guard = self.shared()?;
        Ok(self.store.load_master_key()?.is_some())
    }

    /// Creates the master key on first activation. Never touches an existing
    /// key. Returns whether a key was created.
    pub fn ensure_master_key(&self) -> ShareResult<bool> {
        let _guard = self.exclusive()?;
        if self.store.load_master_key()?.is_some() {
            return Ok(false);
        }
        let key = self.engine.generate_key()?;
        self.store.insert_master_key(key.as_bytes())?;
        info!("master key created");
        Ok(true)
    }

    /// Replaces the master key with a fresh one.
    ///
    /// Destructive: every KEK wrapped under the old key becomes permanently
    /// unrecoverable, and with it every existing share. Administrative use only.
    pub fn generate_master_key(&self) -> ShareResult<()> {
        let _guard = self.exclusive()?;
        let orphaned = self.store.count_entries()?;

        // Generated before the old key goes, so an entropy failure leaves it intact.
        let key = self.engine.generate_key()?;
        self.store.replace_master_key(key.as_bytes())?;

        warn!("master key regenerated; {orphaned} existing key entries are now unrecoverable");
        Ok(())
    }

    fn load_master_key(&self) -> ShareResult<SymmetricKey> {
        let raw = self
            .store
            .load_master_key()
            .map_err(|e| ShareError::MasterKeyUnavailable(e.to_string()))?
            .ok_or_else(|| {
                ShareError::MasterKeyUnavailable("no master key has been generated".into())
            })?;

        SymmetricKey::from_slice(&raw).map_err(|e| {
            ShareError::MasterKeyUnavailable(format!("stored master key is malformed: {e}"))
        })
    }

    // ========== Wrap ==========

    /// Wraps `dek` for every recipient and persists one entry each.
    ///
    /// A persistence failure for one recipient is recorded in the outcome and
    /// the remaining recipients are still attempted. A missing master key or
    /// an entropy failure would hit every recipient alike, so those abort the
    /// call. Duplicate recipient ids are processed once.
    pub fn share_file(
        &self,
        file_id: &str,
        recipients: &[UserId],
        dek: &SymmetricKey,
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<ShareOutcome> {
        let _guard = self.shared()?;
        let master = self.load_master_key()?;

        let mut outcome = ShareOutcome::default();
        let mut seen = HashSet::with_capacity(recipients.len());

        for &user_id in recipients {
            if !seen.insert(user_id) {
                continue;
            }

            let entry = self.wrap_for(user_id, file_id, dek, &master, expiration)?;
            match self.store.upsert_entry(&entry) {
                Ok(()) => {
                    debug!("stored key entry for file {file_id} -> user {user_id}");
                    outcome.succeeded.push(user_id);
                }
                Err(e) => {
                    warn!("failed to store key entry for file {file_id} -> user {user_id}: {e}");
                    outcome.failed.push((user_id, e.into()));
                }
            }
        }

        info!(
            "shared file {file_id} with {} recipient(s), {} failure(s)",
            outcome.succeeded.len(),
            outcome.failure_count()
        );
        Ok(outcome)
    }

    fn wrap_for(
        &self,
        user_id: UserId,
        file_id: &str,
        dek: &SymmetricKey,
        master: &SymmetricKey,
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<EncryptionKeyEntry> {
        let kek = self.engine.generate_key()?;
        let dek_iv = self.engine.generate_iv()?;
        let kek_iv = self.engine.generate_iv()?;

        let wrapped_dek = self.engine.encrypt(dek.as_bytes(), &kek, &dek_iv)?;
        let wrapped_kek = self.engine.encrypt(kek.as_bytes(), master, &kek_iv)?;

        Ok(EncryptionKeyEntry {
            user_id,
            file_id: file_id.to_string(),
            encryption_key: wrapped_dek,
            dek_iv: dek_iv.as_bytes().to_vec(),
            user_kek: wrapped_kek,
            kek_iv: kek_iv.as_bytes().to_vec(),
            expiration_date: expiration,
            created_at: Utc::now(),
            download_date: None,
        })
    }

    // ========== Unwrap ==========

    /// Recovers the DEK of `file_id` on behalf of `user_id`.
    pub fn get_dek_for(&self, user_id: UserId, file_id: &str) -> ShareResult<SymmetricKey> {
        let _guard = self.shared()?;

        let entry = self
            .store
            .get_entry(user_id, file_id)?
            .ok_or_else(|| ShareError::KeyNotFound {
                user_id,
                file_id: file_id.to_string(),
            })?;

        if entry.is_expired_at(Utc::now()) {
            return Err(ShareError::Expired(format!(
                "access for user {user_id} to file {file_id} has expired"
            )));
        }

        let master = self.load_master_key()?;
        let kek = self.unwrap_key(&entry.user_kek, &master, &entry.kek_iv, "KEK")?;
        self.unwrap_key(&entry.encryption_key, &kek, &entry.dek_iv, "DEK")
    }

    fn unwrap_key(
        &self,
        wrapped: &[u8],
        key: &SymmetricKey,
        iv: &[u8],
        what: &str,
    ) -> ShareResult<SymmetricKey> {
        let iv = Iv::from_slice(iv).map_err(|e| ShareError::Unwrap(format!("{what}: {e}")))?;
        let plain = Zeroizing::new(
            self.engine
                .decrypt(wrapped, key, &iv)
                .map_err(|e| ShareError::Unwrap(format!("{what}: {e}")))?,
        );
        SymmetricKey::from_slice(&plain).map_err(|_| {
            ShareError::Unwrap(format!(
                "{what}: unwrapped {} bytes (wrong key or corrupted entry)",
                plain.len()
            ))
        })
    }

    // ========== Recipient management ==========

    /// Wraps the DEK of an already-shared file for more recipients, recovering
    /// it through `granting_user`'s entry.
    pub fn extend_share(
        &self,
        file_id: &str,
        granting_user: UserId,
        recipients: &[UserId],
        expiration: Option<DateTime<Utc>>,
    ) -> ShareResult<ShareOutcome> {
        let dek = self.get_dek_for(granting_user, file_id)?;
        self.share_file(file_id, recipients, &dek, expiration)
    }

    /// Removes one recipient's access. Returns false if there was none.
    pub fn revoke(&self, user_id: UserId, file_id: &str) -> ShareResult<bool> {
        let removed = self.store.delete_entry(user_id, file_id)?;
        if removed {
            info!("revoked access to file {file_id} for user {user_id}");
        }
        Ok(removed)
    }

    /// Removes every recipient's access to a file.
    pub fn revoke_all(&self, file_id: &str) -> ShareResult<usize> {
        let removed = self.store.delete_entries_for_file(file_id)?;
        debug!("removed {removed} key entries for file {file_id}");
        Ok(removed)
    }

    pub fn recipients(&self, file_id: &str) -> ShareResult<Vec<UserId>> {
        Ok(self.store.list_recipients(file_id)?)
    }
}
