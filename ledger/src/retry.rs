//! Retry schedule for conflicting transactions.

use std::time::Duration;

/// Default number of attempts before a conflict is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay before the first retry (ms).
pub const DEFAULT_BASE_DELAY_MS: u64 = 10;
/// Upper bound on a single backoff delay (ms).
pub const MAX_DELAY_MS: u64 = 1_000;

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
        }
    }

    /// Delay after the `retry`-th failed attempt (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        )
    }
}
