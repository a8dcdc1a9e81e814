//! Process-wide configuration.
//!
//! Built once at startup and passed by reference; nothing in the core reads
//! global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ShareError, ShareResult};

/// Which storage backend holds encrypted file bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Memory,
    Amazon,
    Google,
    Dropbox,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,

    /// Root directory for the local backend.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            root: PathBuf::from("uploads"),
        }
    }
}

/// Configuration for the share service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// DuckDB file holding keys and file metadata (`":memory:"` for ephemeral).
    pub database_path: PathBuf,

    /// DuckDB memory cap, e.g. "64MB".
    pub db_memory_limit: String,

    pub db_threads: u32,

    pub storage: StorageConfig,

    /// Expiration applied to uploads that don't specify one.
    pub default_expiration_days: Option<i64>,

    /// When false, the expiry sweep does nothing.
    pub expiry_enabled: bool,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fileshare.duckdb"),
            db_memory_limit: "64MB".to_string(),
            db_threads: 1,
            storage: StorageConfig::default(),
            default_expiration_days: None,
            expiry_enabled: true,
            log_filter: "info".to_string(),
        }
    }
}

impl ShareConfig {
    /// Parses a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ShareResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> ShareResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ShareError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Fully in-memory config: in-memory database and memory backend.
    pub fn ephemeral() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            storage: StorageConfig {
                backend: BackendKind::Memory,
                root: PathBuf::new(),
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ShareResult<()> {
        if self.db_threads == 0 {
            return Err(ShareError::Config("db_threads must be at least 1".into()));
        }
        if let Some(days) = self.default_expiration_days {
            if days <= 0 {
                return Err(ShareError::Config(format!(
                    "default_expiration_days must be positive, got {days}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = ShareConfig::from_json("{}").unwrap();
        assert_eq!(config.database_path, PathBuf::from("fileshare.duckdb"));
        assert_eq!(config.storage.backend, BackendKind::Local);
        assert!(config.expiry_enabled);
    }

    #[test]
    fn zero_expiration_days_is_rejected() {
        let err = ShareConfig::from_json(r#"{"default_expiration_days": 0}"#).unwrap_err();
        assert!(matches!(err, ShareError::Config(_)));
    }
}
