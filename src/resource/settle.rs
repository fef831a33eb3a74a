//! Read-after-write polling.
//!
//! IBM services may acknowledge a create before the object is visible on the
//! read path. After a create the reconciler keeps reading until the object
//! shows up or the settle window closes.

use crate::error::{ProviderError, Result};
use crate::ibm::client::SettleSettings;
use std::future::Future;
use tokio::time::Instant;

/// Outcome of one read while polling
enum Step<T> {
    Settled(T),
    Polling(ProviderError),
}

/// Keep calling `read` until it succeeds.
///
/// Only errors accepted by [`ProviderError::is_retryable_while_settling`] are
/// retried; anything else is returned immediately. Once the timeout elapses a
/// final read is attempted before giving up with [`ProviderError::Timeout`].
pub async fn wait_until_readable<T, F, Fut>(
    what: &str,
    settings: &SettleSettings,
    mut read: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let step = match read().await {
            Ok(value) => Step::Settled(value),
            Err(e) if e.is_retryable_while_settling(settings.retry_transient) => Step::Polling(e),
            Err(e) => return Err(e),
        };

        match step {
            Step::Settled(value) => {
                if attempts > 1 {
                    tracing::info!("{} became readable after {} attempts", what, attempts);
                }
                return Ok(value);
            }
            Step::Polling(e) => {
                let elapsed = started.elapsed();
                if elapsed >= settings.timeout {
                    tracing::warn!("{} still not readable after {:?}: {}", what, elapsed, e);
                    break;
                }
                tracing::debug!("{} not readable yet (attempt {}): {}", what, attempts, e);
                let remaining = settings.timeout - elapsed;
                tokio::time::sleep(settings.interval.min(remaining)).await;
            }
        }
    }

    match read().await {
        Ok(value) => Ok(value),
        Err(e) if e.is_retryable_while_settling(settings.retry_transient) => {
            Err(ProviderError::Timeout {
                what: what.to_string(),
                elapsed: started.elapsed(),
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast(timeout_ms: u64) -> SettleSettings {
        SettleSettings {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(5),
            retry_transient: false,
        }
    }

    #[tokio::test]
    async fn test_settles_after_not_found() {
        let calls = &AtomicU32::new(0);
        let result = wait_until_readable("policy p1", &fast(2000), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::not_found("policy p1"))
            } else {
                Ok("ready")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_fatal_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = wait_until_readable("policy p1", &fast(2000), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transient {
                status: Some(500),
                message: "boom".to_string(),
            })
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_when_enabled() {
        let calls = &AtomicU32::new(0);
        let settings = SettleSettings {
            retry_transient: true,
            ..fast(2000)
        };
        let result = wait_until_readable("target t1", &settings, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::Transient {
                    status: Some(503),
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(1)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_times_out_with_final_read() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = wait_until_readable("policy p1", &fast(30), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::not_found("policy p1"))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Timeout { .. })));
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}
