//! Poll-until-done loop shared by the adapters.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Timing of one provider's status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingProfile {
    pub poll_interval: Duration,
    /// Past this a warning is logged; polling continues
    pub soft_limit: Duration,
    /// Past this the generation fails with `ProviderTimeout`
    pub hard_timeout: Duration,
    /// Consecutive transient poll failures tolerated before giving up
    pub max_poll_errors: u32,
}

impl PollingProfile {
    pub const fn new(poll_interval: Duration, soft_limit: Duration, hard_timeout: Duration) -> Self {
        Self {
            poll_interval,
            soft_limit,
            hard_timeout,
            max_poll_errors: 3,
        }
    }
}

/// Outcome of a single status check.
#[derive(Debug)]
pub enum PollStatus<T> {
    Pending,
    Done(T),
}

/// Call `poll` every `profile.poll_interval` until it reports `Done`,
/// fails, the hard timeout elapses, or `cancel` fires.
pub async fn poll_until<T, F, Fut>(
    profile: &PollingProfile,
    cancel: &CancellationToken,
    remote_id: &str,
    mut poll: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<PollStatus<T>>>,
{
    let started = Instant::now();
    let mut warned = false;
    let mut consecutive_errors = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::ProviderCancelled);
        }

        match poll().await {
            Ok(PollStatus::Done(value)) => return Ok(value),
            Ok(PollStatus::Pending) => consecutive_errors = 0,
            Err(e) if e.is_retryable() && consecutive_errors < profile.max_poll_errors => {
                consecutive_errors += 1;
                warn!(remote_id, attempt = consecutive_errors, "Status poll failed: {}", e);
            }
            Err(e) => return Err(e),
        }

        let elapsed = started.elapsed();
        if elapsed >= profile.hard_timeout {
            return Err(ProviderError::ProviderTimeout {
                elapsed_secs: elapsed.as_secs(),
            });
        }
        if !warned && elapsed >= profile.soft_limit {
            warned = true;
            warn!(
                remote_id,
                elapsed_secs = elapsed.as_secs(),
                "Generation still running past soft limit"
            );
        }

        debug!(remote_id, elapsed_secs = elapsed.as_secs(), "Generation pending");
        tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::ProviderCancelled),
            _ = tokio::time::sleep(profile.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const PROFILE: PollingProfile = PollingProfile::new(
        Duration::from_secs(5),
        Duration::from_secs(20),
        Duration::from_secs(60),
    );

    #[tokio::test(start_paused = true)]
    async fn test_returns_when_done() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = poll_until(&PROFILE, &CancellationToken::new(), "r1", move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(PollStatus::Pending)
                } else {
                    Ok(PollStatus::Done("url"))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "url");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_timeout() {
        let err = poll_until::<(), _, _>(&PROFILE, &CancellationToken::new(), "r1", || async {
            Ok(PollStatus::Pending)
        })
        .await
        .unwrap_err();
        match err {
            ProviderError::ProviderTimeout { elapsed_secs } => assert!(elapsed_secs >= 60),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });
        let err = poll_until::<(), _, _>(&PROFILE, &token, "r1", || async { Ok(PollStatus::Pending) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ProviderCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_tolerated_then_propagated() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = poll_until::<(), _, _>(&PROFILE, &CancellationToken::new(), "r1", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::transient("502")) }
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), PROFILE.max_poll_errors + 1);

        let err = poll_until::<(), _, _>(&PROFILE, &CancellationToken::new(), "r1", || async {
            Err(ProviderError::failed("content policy"))
        })
        .await
        .unwrap_err();
        assert!(!err.is_retryable());
    }
}
