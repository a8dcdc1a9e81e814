//! Shared test helpers: in-memory services and fault-injecting collaborators.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use fileshare_core::{FileShareService, KeyHierarchyManager, MemoryBackend, ShareConfig, StorageBackend};
use fileshare_crypto::{AesCbcEngine, CryptoEngine, CryptoError, CryptoResult, Iv, SymmetricKey};
use fileshare_keystore::{
    DuckDbStore, EncryptionKeyEntry, FileCatalog, FileRecord, FileStatus, KeyStore, StoreError,
    StoreResult, UserId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use zeroize::Zeroizing;

/// Hierarchy over a fresh in-memory store, master key already created.
pub fn hierarchy() -> (KeyHierarchyManager, Arc<DuckDbStore>) {
    let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
    let manager = KeyHierarchyManager::new(Arc::new(AesCbcEngine), store.clone());
    manager.ensure_master_key().unwrap();
    (manager, store)
}

/// Activated service over an in-memory database and memory backend.
pub fn memory_service() -> (FileShareService, MemoryBackend) {
    memory_service_with(ShareConfig::ephemeral())
}

pub fn memory_service_with(config: ShareConfig) -> (FileShareService, MemoryBackend) {
    let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
    let objects = MemoryBackend::new();
    let svc = FileShareService::with_parts(
        config,
        store.clone(),
        store,
        Arc::new(AesCbcEngine),
        StorageBackend::Memory(objects.clone()),
    )
    .unwrap();
    svc.activate().unwrap();
    (svc, objects)
}

// ── Fault injection ──

/// Key store that refuses to persist entries for one user.
pub struct FailingKeyStore {
    pub inner: DuckDbStore,
    pub fail_for: UserId,
}

impl FailingKeyStore {
    pub fn new(fail_for: UserId) -> Self {
        Self {
            inner: DuckDbStore::open_in_memory().unwrap(),
            fail_for,
        }
    }
}

impl KeyStore for FailingKeyStore {
    fn load_master_key(&self) -> StoreResult<Option<Zeroizing<Vec<u8>>>> {
        self.inner.load_master_key()
    }

    fn insert_master_key(&self, secret: &[u8]) -> StoreResult<()> {
        self.inner.insert_master_key(secret)
    }

    fn replace_master_key(&self, secret: &[u8]) -> StoreResult<()> {
        self.inner.replace_master_key(secret)
    }

    fn upsert_entry(&self, entry: &EncryptionKeyEntry) -> StoreResult<()> {
        if entry.user_id == self.fail_for {
            return Err(StoreError::Persistence(format!(
                "injected write failure for user {}",
                entry.user_id
            )));
        }
        self.inner.upsert_entry(entry)
    }

    fn get_entry(&self, user_id: UserId, file_id: &str) -> StoreResult<Option<EncryptionKeyEntry>> {
        self.inner.get_entry(user_id, file_id)
    }

    fn delete_entry(&self, user_id: UserId, file_id: &str) -> StoreResult<bool> {
        self.inner.delete_entry(user_id, file_id)
    }

    fn delete_entries_for_file(&self, file_id: &str) -> StoreResult<usize> {
        self.inner.delete_entries_for_file(file_id)
    }

    fn list_recipients(&self, file_id: &str) -> StoreResult<Vec<UserId>> {
        self.inner.list_recipients(file_id)
    }

    fn count_entries(&self) -> StoreResult<usize> {
        self.inner.count_entries()
    }

    fn mark_downloaded(
        &self,
        user_id: UserId,
        file_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.mark_downloaded(user_id, file_id, at)
    }
}

/// File catalog whose deletes always fail.
pub struct UndeletableCatalog {
    pub inner: DuckDbStore,
}

impl FileCatalog for UndeletableCatalog {
    fn insert_file(&self, record: &FileRecord) -> StoreResult<()> {
        self.inner.insert_file(record)
    }

    fn get_file(&self, file_id: &str) -> StoreResult<Option<FileRecord>> {
        self.inner.get_file(file_id)
    }

    fn set_file_status(&self, file_id: &str, status: FileStatus) -> StoreResult<bool> {
        self.inner.set_file_status(file_id, status)
    }

    fn delete_file(&self, file_id: &str) -> StoreResult<bool> {
        Err(StoreError::Persistence(format!(
            "injected delete failure for {file_id}"
        )))
    }

    fn list_expired_files(&self, now: DateTime<Utc>) -> StoreResult<Vec<FileRecord>> {
        self.inner.list_expired_files(now)
    }
}

/// AES engine whose random source can be switched off mid-test.
#[derive(Default)]
pub struct SwitchableEngine {
    dead: AtomicBool,
}

impl SwitchableEngine {
    pub fn kill_entropy(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> CryptoResult<()> {
        if self.dead.load(Ordering::SeqCst) {
            return Err(CryptoError::Entropy("injected RNG failure".into()));
        }
        Ok(())
    }
}

impl CryptoEngine for SwitchableEngine {
    fn generate_key(&self) -> CryptoResult<SymmetricKey> {
        self.check()?;
        AesCbcEngine.generate_key()
    }

    fn generate_iv(&self) -> CryptoResult<Iv> {
        self.check()?;
        AesCbcEngine.generate_iv()
    }

    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
        AesCbcEngine.encrypt(plaintext, key, iv)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &SymmetricKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
        AesCbcEngine.decrypt(ciphertext, key, iv)
    }
}
