//! Bounded retry with exponential backoff for storage writes.

use std::time::Duration;

/// Retry policy: a fixed attempt budget with exponentially growing delays.
///
/// Only applied to retryable storage failures; conflicts and provider
/// errors are never retried here (re-sending a provider request may
/// duplicate cost, so that decision belongs to the caller).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Saturate the shift so absurd attempt counts stay finite.
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy {
            attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_none_allows_single_attempt() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.attempts, 1);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        let _ = policy.delay_for(40);
    }
}
