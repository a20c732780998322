//! Request pacing and retry of transient failures.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::error::{EtlError, EtlResult};

/// Enforces a minimum interval between consecutive API requests.
///
/// Holding the lock across the sleep serializes callers, so requests leave
/// one at a time and never closer together than `interval`.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits until the next request may be sent and records its start.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            sleep_until(previous + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

/// Runs `op`, retrying up to `retries` extra times with exponential backoff
/// while it fails with a transient error.
pub async fn retry_transient<T, F, Fut>(retries: usize, op: F) -> EtlResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EtlResult<T>>,
{
    op.retry(
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_times(retries),
    )
    .when(EtlError::is_transient)
    .notify(|err: &EtlError, after: Duration| {
        log::warn!("transient failure, retrying in {after:?}: {err}");
    })
    .await
}
