//! Retry policy for provider calls.
//!
//! Only [`ProviderError::TransientNetwork`] is retried, a fixed number of
//! times with a fixed backoff. Everything else fails the unit on the first
//! attempt.

use std::future::Future;
use std::time::Duration;

use lvgen_providers::{ProviderError, ProviderResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::metrics;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    /// Wait between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_backoff)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: ProviderResult<T>,
    /// Attempts made, including the first
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retries run out. Cancellation during the backoff ends the loop with
/// `ProviderCancelled`.
pub async fn retry_transient<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    provider: &str,
    operation: F,
) -> Attempted<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        metrics::record_provider_attempt(provider);

        match operation().await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(e) if e.is_retryable() && attempts <= policy.retries => {
                warn!(
                    provider,
                    attempt = attempts,
                    "Transient provider error, retrying in {:?}: {}",
                    policy.backoff,
                    e
                );
                metrics::record_provider_retry(provider);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Attempted {
                            result: Err(ProviderError::ProviderCancelled),
                            attempts,
                        };
                    }
                    _ = tokio::time::sleep(policy.backoff) => {}
                }
            }
            Err(e) => {
                debug!(provider, attempts, "Provider call gave up: {}", e);
                return Attempted {
                    result: Err(e),
                    attempts,
                };
            }
        }
    }
}

/// State tracker for repeated operations that may fail intermittently.
///
/// Used by the executor loop so a queue outage does not flood the logs.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_get_two_retries() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let attempted = retry_transient(&policy, &CancellationToken::new(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProviderError::transient("connection reset")) }
        })
        .await;

        assert!(matches!(attempted.result, Err(ProviderError::TransientNetwork(_))));
        assert_eq!(attempted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_retried() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let attempted = retry_transient(&policy, &CancellationToken::new(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProviderError::failed("content policy")) }
        })
        .await;

        assert!(matches!(attempted.result, Err(ProviderError::ProviderFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let attempted = retry_transient(&policy, &CancellationToken::new(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::transient("502"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(attempted.result.unwrap(), 42);
        assert_eq!(attempted.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let attempted = retry_transient(&policy, &cancel, "test", || async {
            Err::<(), _>(ProviderError::transient("timeout"))
        })
        .await;

        assert!(matches!(attempted.result, Err(ProviderError::ProviderCancelled)));
        assert_eq!(attempted.attempts, 1);
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(2);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }
}
