//! Exponential backoff with jitter
//!
//! [`backoff_delay`] gives the controllers' `error_policy` its requeue delay.
//! [`retry_with_backoff`] wraps startup calls, such as CRD installation, that
//! must succeed before the controllers start.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// How often and how patiently to retry a startup call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on any delay
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Default delays, giving up after `attempts` tries
    pub fn attempts(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            ..Self::default()
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Un-jittered delay before retry number `attempt` (1-based)
///
/// Doubles from `base` and saturates at `max`.
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |d| d.min(max))
}

/// Jittered requeue delay after `attempt` consecutive failures
///
/// The nominal delay is scaled by a random factor in `0.5..1.5` so objects
/// failing together do not retry together. Never exceeds `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let nominal = exponential_delay(attempt, base, max);
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    nominal.mul_f64(factor).min(max)
}

/// Run `operation` until it succeeds or the policy gives up
///
/// The last error is returned once `max_attempts` is reached.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if policy.exhausted(attempt) {
            error!(what, attempt, error = %err, "giving up");
            return Err(err);
        }

        let delay = backoff_delay(attempt, policy.base, policy.cap);
        warn!(what, attempt, error = %err, retry_in_ms = delay.as_millis(), "retrying");
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
