//! Polling eventually consistent lookups with a fixed retry policy.
//!
//! AWS control-plane reads lag behind writes. A resource that was just
//! created may be reported missing for a few seconds, and lookups may be
//! throttled. [`poll_until`] repeats a lookup with a constant delay until it
//! yields a value or the attempt budget runs out.

use crate::reconcile::ReconcileError;
use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use renderfarm_common::defaults::{DEFAULT_RETRIES, DEFAULT_WAIT_SECS};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often, and how far apart, a lookup is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRIES,
            delay: Duration::from_secs(DEFAULT_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Delays to sleep between attempts (one fewer than the attempts).
    pub fn backoff(&self) -> ConstantBackoff {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.max(1) as usize - 1)
            .build()
    }
}

/// Repeat `check` until it returns `Ok(Some(_))`.
///
/// `Ok(None)` and retryable errors consume an attempt. Any other error is
/// returned immediately. When attempts run out the result is
/// [`ReconcileError::ReconciliationTimeout`] carrying the last retryable
/// error, if any.
pub async fn poll_until<T, F, Fut>(
    policy: &RetryPolicy,
    resource: &str,
    mut check: F,
) -> Result<T, ReconcileError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ReconcileError>>,
{
    let mut delays = policy.backoff();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;

        match check().await {
            Ok(Some(value)) => {
                debug!(resource = %resource, attempts, "Resource visible");
                return Ok(value);
            }
            Ok(None) => {
                last_error = None;
            }
            Err(e) if e.is_retryable() => {
                warn!(resource = %resource, attempt = attempts, error = %e, "Lookup failed, retrying");
                last_error = Some(e.to_string());
            }
            Err(e) => return Err(e),
        }

        match delays.next() {
            Some(delay) => {
                debug!(
                    resource = %resource,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Resource not visible yet"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(ReconcileError::ReconciliationTimeout {
                    resource: resource.to_string(),
                    attempts,
                    last_error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn transient() -> ReconcileError {
        ReconcileError::TransientLookup {
            resource: "queue 'q'".into(),
            message: "Rate exceeded".into(),
        }
    }

    #[test]
    fn test_backoff_yields_one_delay_fewer_than_attempts() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2));
        let delays: Vec<_> = policy.backoff().collect();
        assert_eq!(delays, vec![Duration::from_secs(2); 3]);

        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).backoff().count(), 0);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_value() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let value = poll_until(&policy, "queue 'q'", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Ok(if n == 3 { Some(n) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(4, Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        let err = poll_until(&policy, "queue 'q'", || {
            calls.set(calls.get() + 1);
            async { Ok::<Option<()>, _>(None) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 4);
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert!(start.elapsed() < Duration::from_secs(16));
        assert!(matches!(
            err,
            ReconcileError::ReconciliationTimeout {
                attempts: 4,
                last_error: None,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_are_retried_and_reported() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let err = poll_until(&policy, "queue 'q'", || async {
            Err::<Option<()>, _>(transient())
        })
        .await
        .unwrap_err();

        match err {
            ReconcileError::ReconciliationTimeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.unwrap().contains("Rate exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let err = poll_until(&policy, "queue 'q'", || {
            calls.set(calls.get() + 1);
            async { Err::<Option<()>, _>(ReconcileError::malformed("queue 'q'", "bad")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, ReconcileError::MalformedResponse { .. }));
    }
}
