mod support;

use fileshare_core::{AsyncFileShare, ShareError, run_blocking};
use std::sync::Arc;
use std::time::Duration;
use support::memory_service;

#[tokio::test]
async fn upload_and_download_through_async_facade() {
    let (svc, _) = memory_service();
    let share = AsyncFileShare::new(Arc::new(svc)).with_timeout(Duration::from_secs(30));

    let receipt = share
        .upload("async.txt".into(), b"from a task".to_vec(), vec![1, 2], None)
        .await
        .unwrap();
    assert!(receipt.outcome.is_complete());

    let plaintext = share.download(2, receipt.record.file_id.clone()).await.unwrap();
    assert_eq!(plaintext, b"from a task");

    let report = share.sweep_expired().await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn errors_pass_through() {
    let (svc, _) = memory_service();
    let share = AsyncFileShare::new(Arc::new(svc));

    assert!(matches!(
        share.download(1, "missing".into()).await,
        Err(ShareError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn run_blocking_returns_closure_result() {
    let value = run_blocking(None, || Ok(21 * 2)).await.unwrap();
    assert_eq!(value, 42);
}

#[tokio::test]
async fn run_blocking_times_out() {
    let limit = Duration::from_millis(20);
    let err = run_blocking(Some(limit), || {
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ShareError::Timeout(d) if d == limit));
}
