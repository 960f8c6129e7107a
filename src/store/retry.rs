use std::time::Duration;
use crate::store::error::StoreError;

/// Bounded exponential-backoff retry policy for record store calls.
///
/// Only transient errors are retried. Anything else (permanent, not-found,
/// conflicts, non-store failures) is returned on the first occurrence. When
/// attempts run out the last observed error is returned as-is.
///
/// # Examples
///
/// With base_delay=200ms, backoff=2.0:
/// - Retry after attempt 0: 200ms
/// - Retry after attempt 1: 400ms
/// - Retry after attempt 2: 800ms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
        }
    }

    /// Policy that retries without sleeping (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    /// Delay before the retry that follows a failed `attempt` (0-based):
    /// `base_delay * backoff^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(0.0).powi(attempt as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_finite() {
            Duration::from_secs_f64(secs.min(u32::MAX as f64))
        } else {
            Duration::from_secs(u32::MAX as u64)
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, F>(&self, label: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        self.run_with_sleep(label, op, std::thread::sleep)
    }

    pub(crate) fn run_with_sleep<T, F, S>(&self, label: &str, mut op: F, mut sleep: S) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
        S: FnMut(Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        label,
                        attempt + 1,
                        attempts,
                        err,
                        delay
                    );
                    if !delay.is_zero() {
                        sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        log::warn!("{}: giving up after {} attempts: {}", label, attempts, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
