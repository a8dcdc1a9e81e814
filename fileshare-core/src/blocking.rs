//! Async boundary.
//!
//! The core is synchronous and blocking. Async hosts go through here so
//! DuckDB and file I/O run on tokio's blocking pool instead of a worker.

use chrono::Utc;
use fileshare_keystore::UserId;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::{ShareError, ShareResult};
use crate::expiry::SweepReport;
use crate::service::{FileShareService, UploadReceipt};

/// Runs `f` on the blocking pool, optionally bounded by `timeout`.
///
/// On timeout the caller gets [`ShareError::Timeout`] but `f` keeps running
/// to completion in the background; blocking work cannot be cancelled.
pub async fn run_blocking<T, F>(timeout: Option<Duration>, f: F) -> ShareResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ShareResult<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("blocking operation exceeded {limit:?}; it will finish in the background");
                return Err(ShareError::Timeout(limit));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(ShareError::Io(io::Error::other(format!(
            "blocking task did not complete: {e}"
        )))),
    }
}

/// Async facade over a shared [`FileShareService`].
#[derive(Clone)]
pub struct AsyncFileShare {
    inner: Arc<FileShareService>,
    timeout: Option<Duration>,
}

impl AsyncFileShare {
    pub fn new(inner: Arc<FileShareService>) -> Self {
        Self {
            inner,
            timeout: None,
        }
    }

    /// Bounds every call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn service(&self) -> &Arc<FileShareService> {
        &self.inner
    }

    pub async fn upload(
        &self,
        file_name: String,
        plaintext: Vec<u8>,
        recipients: Vec<UserId>,
        expiration: Option<chrono::DateTime<Utc>>,
    ) -> ShareResult<UploadReceipt> {
        let svc = self.inner.clone();
        run_blocking(self.timeout, move || {
            svc.upload(&file_name, &plaintext, &recipients, expiration)
        })
        .await
    }

    pub async fn download(&self, user_id: UserId, file_id: String) -> ShareResult<Vec<u8>> {
        let svc = self.inner.clone();
        run_blocking(self.timeout, move || svc.download(user_id, &file_id)).await
    }

    /// Runs an expiry pass at the current time.
    pub async fn sweep_expired(&self) -> ShareResult<SweepReport> {
        let svc = self.inner.clone();
        run_blocking(self.timeout, move || svc.sweep_expired(Utc::now())).await
    }
}
