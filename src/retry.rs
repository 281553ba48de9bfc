//! Bounded retry with fixed or exponential backoff.
//!
//! [`retry`] drives any fallible async operation under a [`RetryPolicy`]. A
//! predicate decides which errors are worth another attempt; anything else is
//! returned immediately.
//!
//! # Backoff
//!
//! ```text
//! fixed:        delay
//! exponential:  min(delay * 2^(attempt-1), max)
//! both:         + random_jitter(0..=jitter)
//! ```

use rand::{Rng, rng};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { max: Duration },
}

/// Attempt bound and delay schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub delay: Duration,
    pub backoff: Backoff,
    /// Upper bound of random extra delay added to each wait.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// `max_attempts` tries with the same `delay` between each.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (1-based), without jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max } => {
                let shift = attempt.saturating_sub(1).min(31);
                self.delay.saturating_mul(1u32 << shift).min(max)
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let max_ms = self.jitter.as_millis().min(u64::MAX as u128) as u64;
        delay + Duration::from_millis(rng().random_range(0..=max_ms))
    }
}

impl Default for RetryPolicy {
    /// Three attempts, two seconds apart.
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt bound is reached. `op` receives the 1-based attempt number.
///
/// On exhaustion the last error is returned.
///
/// # Arguments
///
/// * `policy` - Attempt bound and delay schedule
/// * `label` - Operation name used in log lines
/// * `is_retryable` - Whether an error is worth another attempt
/// * `op` - Produces one attempt's future from its attempt number
///
/// # Returns
///
/// The first success, the first non-retryable error, or the last error.
///
/// # Examples
///
/// ```ignore
/// let body = retry(&RetryPolicy::default(), "fetch", FetchError::is_retryable, |_| source.fetch()).await?;
/// ```
pub async fn retry<T, E, Op, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let total_t0 = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let attempt_t0 = Instant::now();
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                let elapsed_ms_total = total_t0.elapsed().as_millis();

                if !is_retryable(&e) {
                    error!(label, attempt, error = %e, "{label} failed with a non-retryable error");
                    return Err(e);
                }
                if attempt >= max_attempts {
                    error!(
                        label,
                        attempt,
                        max = max_attempts,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        error = %e,
                        "{label} exhausted retries"
                    );
                    return Err(e);
                }

                let delay = policy.jittered(policy.delay_after(attempt));
                warn!(
                    label,
                    attempt,
                    max = max_attempts,
                    elapsed_ms_attempt,
                    elapsed_ms_total,
                    ?delay,
                    error = %e,
                    "{label} attempt failed; retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum Flaky {
        Transient(u32),
        Fatal,
    }

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = Cell::new(0);
        let result = retry(&instant(3), "op", |_| true, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 3 {
                    Err(Flaky::Transient(attempt))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry(&instant(3), "op", |_| true, |attempt| {
            calls.set(calls.get() + 1);
            async move { Err(Flaky::Transient(attempt)) }
        })
        .await;

        assert_eq!(result, Err(Flaky::Transient(3)));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry(
            &instant(5),
            "op",
            |e| matches!(e, Flaky::Transient(_)),
            |_| {
                calls.set(calls.get() + 1);
                async { Err(Flaky::Fatal) }
            },
        )
        .await;

        assert_eq!(result, Err(Flaky::Fatal));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let _: Result<(), Flaky> = retry(&instant(0), "op", |_| true, |_| {
            calls.set(calls.get() + 1);
            async { Err(Flaky::Fatal) }
        })
        .await;
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_default_policy_is_three_attempts_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            delay: Duration::from_secs(1),
            backoff: Backoff::Exponential {
                max: Duration::from_secs(5),
            },
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(250),
            ..RetryPolicy::fixed(3, Duration::from_secs(1))
        };
        for _ in 0..50 {
            let d = policy.jittered(Duration::from_secs(1));
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_millis(1250));
        }
    }
}
