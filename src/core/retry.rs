//! Retry primitives for async operations
//!
//! A fixed-delay policy with a per-attempt deadline. Attempts are counted
//! from one and the policy allows `max_attempts` invocations in total.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Retry policy for one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
            attempt_timeout: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempts_made` have failed
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Wait out the retry delay
    ///
    /// Returns `false` when `cancel` fired first, in which case no further
    /// attempt should be made.
    pub async fn backoff(&self, cancel: &CancellationToken) -> bool {
        if self.delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(self.delay) => true,
        }
    }
}

/// Why an attempt did not produce a value
#[derive(Debug, PartialEq)]
pub enum AttemptFailure<E> {
    TimedOut(Duration),
    Failed(E),
}

/// Run one attempt, giving up once `deadline` has elapsed
///
/// The future is dropped on timeout. Anything it spawned keeps running.
pub async fn attempt_with_deadline<T, E, Fut>(
    deadline: Duration,
    attempt: Fut,
) -> Result<T, AttemptFailure<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match timeout(deadline, attempt).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(AttemptFailure::Failed(error)),
        Err(_) => Err(AttemptFailure::TimedOut(deadline)),
    }
}
