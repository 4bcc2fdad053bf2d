//! Bounded retry for establishing connections.
//!
//! Queue connections are retried a fixed number of times with the same
//! delay between attempts.
//!
//! # Example
//!
//! ```rust
//! use plan_registry_runtime::retry::{RetryPolicy, with_retry};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::fixed(10, Duration::from_millis(5000));
//!
//! let channel = with_retry(&policy, "queue connect", || async {
//!     Ok::<_, String>("connected")
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Retry policy.
///
/// Defaults to 10 attempts, 5 seconds apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero counts as one.
    pub max_attempts: usize,
    /// Delay after each failed attempt
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(10, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Fixed delay between a bounded number of attempts.
    #[must_use]
    pub const fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// `what` names the operation in log lines.
///
/// # Errors
///
/// Returns the error of the final attempt once all attempts have failed.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(what, attempt, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::error!(what, attempt, error = %err, "Giving up after max attempts");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay;
                tracing::warn!(
                    what,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Attempt failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
