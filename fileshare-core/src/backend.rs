//! Where encrypted file bytes live.
//!
//! Backends only ever see ciphertext. A `location` is an opaque string the
//! backend hands out on `put` and accepts back on `get`/`delete`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{ShareError, ShareResult};
use crate::file_cipher::write_new_file;

#[derive(Clone)]
pub enum StorageBackend {
    Local(LocalBackend),
    Memory(MemoryBackend),
}

impl StorageBackend {
    /// Builds the configured backend. Remote kinds are not supported.
    pub fn from_config(config: &StorageConfig) -> ShareResult<Self> {
        match config.backend {
            BackendKind::Local => Ok(Self::Local(LocalBackend::new(&config.root)?)),
            BackendKind::Memory => Ok(Self::Memory(MemoryBackend::new())),
            other @ (BackendKind::Amazon | BackendKind::Google | BackendKind::Dropbox) => Err(
                ShareError::Config(format!("storage backend {other:?} is not supported")),
            ),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Memory(_) => BackendKind::Memory,
        }
    }

    /// Stores `bytes` and returns the location to fetch them back with.
    pub fn put(&self, bytes: &[u8]) -> ShareResult<String> {
        match self {
            Self::Local(b) => b.put(bytes),
            Self::Memory(b) => b.put(bytes),
        }
    }

    pub fn get(&self, location: &str) -> ShareResult<Vec<u8>> {
        match self {
            Self::Local(b) => b.get(location),
            Self::Memory(b) => b.get(location),
        }
    }

    /// Removes the object. Returns false if it was already gone.
    pub fn delete(&self, location: &str) -> ShareResult<bool> {
        match self {
            Self::Local(b) => b.delete(location),
            Self::Memory(b) => b.delete(location),
        }
    }
}

// ============================================================================
// Local directory
// ============================================================================

/// Flat directory of `{uuid}.bin` objects.
#[derive(Clone, Debug)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Creates `root` if missing.
    pub fn new(root: &Path) -> ShareResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> ShareResult<PathBuf> {
        let rel = Path::new(location);
        let mut components = rel.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(rel)),
            _ => Err(ShareError::FileNotFound(format!(
                "invalid storage location: {location}"
            ))),
        }
    }

    fn put(&self, bytes: &[u8]) -> ShareResult<String> {
        let location = format!("{}.bin", Uuid::new_v4());
        write_new_file(&self.root.join(&location), bytes)?;
        debug!("stored {} bytes at {location}", bytes.len());
        Ok(location)
    }

    fn get(&self, location: &str) -> ShareResult<Vec<u8>> {
        let path = self.resolve(location)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ShareError::FileNotFound(location.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, location: &str) -> ShareResult<bool> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-process map
// ============================================================================

/// Shared in-memory object map. Clones see the same objects.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> ShareError {
        ShareError::Persistence("memory backend lock poisoned".into())
    }

    fn put(&self, bytes: &[u8]) -> ShareResult<String> {
        let location = Uuid::new_v4().to_string();
        self.objects
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(location.clone(), bytes.to_vec());
        Ok(location)
    }

    fn get(&self, location: &str) -> ShareResult<Vec<u8>> {
        self.objects
            .read()
            .map_err(|_| Self::poisoned())?
            .get(location)
            .cloned()
            .ok_or_else(|| ShareError::FileNotFound(location.to_string()))
    }

    fn delete(&self, location: &str) -> ShareResult<bool> {
        Ok(self
            .objects
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(location)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path()).unwrap();

        for bad in ["../escape.bin", "/etc/passwd", "a/b.bin", "", "."] {
            assert!(
                matches!(backend.resolve(bad), Err(ShareError::FileNotFound(_))),
                "accepted {bad:?}"
            );
        }
        assert!(backend.resolve("ok.bin").is_ok());
    }
}
