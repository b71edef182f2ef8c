//! A small reusable retry helper with exponential backoff
//!
//! Provider calls are the only remote calls clipforge retries; everything
//! else either surfaces to the caller or is swept up by the reaper.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::conf::Limits;

/// An exponential backoff schedule with a cap and an attempt limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// The base delay in milliseconds
    pub base_ms: u64,
    /// The cap on any single delay in milliseconds
    pub cap_ms: u64,
    /// The max number of attempts including the first
    pub max_attempts: usize,
}

impl Backoff {
    /// Create a new backoff schedule
    ///
    /// # Arguments
    ///
    /// * `base_ms` - The base delay in milliseconds
    /// * `cap_ms` - The cap on any single delay in milliseconds
    /// * `max_attempts` - The max number of attempts including the first
    #[must_use]
    pub fn new(base_ms: u64, cap_ms: u64, max_attempts: usize) -> Self {
        Backoff {
            base_ms,
            cap_ms,
            max_attempts,
        }
    }

    /// Build the provider retry schedule from the configured limits
    ///
    /// # Arguments
    ///
    /// * `limits` - The pool and lifecycle limits
    #[must_use]
    pub fn from_limits(limits: &Limits) -> Self {
        Backoff::new(limits.backoff_base_ms, limits.backoff_max_ms, 5)
    }

    /// Get the delay to wait after a failed attempt
    ///
    /// # Arguments
    ///
    /// * `failures` - How many attempts have failed so far, starting at 1
    #[must_use]
    pub fn delay(&self, failures: usize) -> Duration {
        // the first failure waits the base delay
        let shift = failures.saturating_sub(1).min(63) as u32;
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let delay = self.base_ms.saturating_mul(factor).min(self.cap_ms);
        Duration::from_millis(delay)
    }

    /// Get the delay for a failed attempt with up to 10% jitter added
    ///
    /// # Arguments
    ///
    /// * `failures` - How many attempts have failed so far, starting at 1
    #[must_use]
    pub fn jittered(&self, failures: usize) -> Duration {
        let delay = self.delay(failures);
        let spread = (delay.as_millis() as u64) / 10;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

/// Drive an async operation through a backoff schedule
///
/// Errors the predicate rejects are returned immediately; retryable errors
/// are returned once the schedule's attempts are exhausted.
///
/// # Arguments
///
/// * `backoff` - The backoff schedule to follow
/// * `retryable` - Whether an error is worth retrying
/// * `op` - The operation to drive
pub async fn retry_with<T, E, F, Fut, P>(backoff: &Backoff, retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut failures = 0;
    loop {
        match op().await {
            Ok(val) => return Ok(val),
            Err(error) => {
                failures += 1;
                // give up on terminal errors or an exhausted schedule
                if failures >= backoff.max_attempts || !retryable(&error) {
                    return Err(error);
                }
                tokio::time::sleep(backoff.jittered(failures)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delays_double_from_the_base() {
        let backoff = Backoff::new(100, 10_000, 5);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn provider_schedules_allow_five_attempts() {
        let backoff = Backoff::from_limits(&Limits::default());
        assert_eq!(backoff, Backoff::new(100, 10_000, 5));
    }

    #[test]
    fn delays_respect_the_cap() {
        let backoff = Backoff::new(100, 10_000, 12);
        assert_eq!(backoff.delay(9), Duration::from_millis(10_000));
        assert_eq!(backoff.delay(60), Duration::from_millis(10_000));
        // absurd failure counts must not overflow
        assert_eq!(backoff.delay(10_000), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let backoff = Backoff::new(100, 10_000, 5);
        let calls = AtomicUsize::new(0);
        let result: Result<usize, &str> = retry_with(&backoff, |_| true, || async {
            // fail the first three attempts
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err("rate limited")
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let backoff = Backoff::new(100, 10_000, 5);
        let calls = AtomicUsize::new(0);
        let result: Result<usize, &str> = retry_with(&backoff, |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("server error")
        })
        .await;
        assert_eq!(result, Err("server error"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_fail_fast() {
        let backoff = Backoff::new(100, 10_000, 5);
        let calls = AtomicUsize::new(0);
        let result: Result<usize, &str> = retry_with(
            &backoff,
            |error| *error != "bad request",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("bad request")
            },
        )
        .await;
        assert_eq!(result, Err("bad request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
