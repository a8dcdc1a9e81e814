//! Expiry sweep.
//!
//! Not scheduled internally. Whatever drives the process (cron, a timer task,
//! an admin endpoint) calls [`ExpirySweeper::sweep`].

use chrono::{DateTime, Utc};
use fileshare_keystore::{FileCatalog, FileStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::error::{ShareError, ShareResult};

/// Result of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// File ids moved to `Expired` in this pass.
    pub expired: Vec<String>,
    pub failed: Vec<(String, ShareError)>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.failed.is_empty()
    }
}

pub struct ExpirySweeper {
    catalog: Arc<dyn FileCatalog>,
    backend: StorageBackend,
    enabled: bool,
}

impl ExpirySweeper {
    pub fn new(catalog: Arc<dyn FileCatalog>, backend: StorageBackend, enabled: bool) -> Self {
        Self {
            catalog,
            backend,
            enabled,
        }
    }

    /// Deletes the ciphertext of every encrypted file expired at `now` and
    /// marks it `Expired`. A failure on one file does not stop the others.
    pub fn sweep(&self, now: DateTime<Utc>) -> ShareResult<SweepReport> {
        let mut report = SweepReport::default();
        if !self.enabled {
            debug!("expiry sweep disabled");
            return Ok(report);
        }

        for record in self.catalog.list_expired_files(now)? {
            match self.expire_one(&record.file_id, &record.location) {
                Ok(()) => report.expired.push(record.file_id),
                Err(e) => {
                    warn!("failed to expire file {}: {e}", record.file_id);
                    report.failed.push((record.file_id, e));
                }
            }
        }

        if !report.is_empty() {
            info!(
                "expiry sweep: {} expired, {} failed",
                report.expired.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    fn expire_one(&self, file_id: &str, location: &str) -> ShareResult<()> {
        if !self.backend.delete(location)? {
            debug!("ciphertext for file {file_id} was already gone");
        }
        self.catalog.set_file_status(file_id, FileStatus::Expired)?;
        Ok(())
    }
}
