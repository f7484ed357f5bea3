use std::time::Duration;

/// Retry behavior for transient transfer failures.
#[derive(Clone, Copy, Debug)]
pub struct FetchPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^n`.
    pub base_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl FetchPolicy {
    /// Immediate retries, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff delay before retry number `attempt` (0-indexed).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = FetchPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.retry_delay(0), Duration::from_millis(100));
        assert_eq!(policy.retry_delay(1), Duration::from_millis(200));
        assert_eq!(policy.retry_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = FetchPolicy {
            max_retries: 1,
            base_delay: Duration::from_secs(u64::MAX / 2),
        };
        // saturating math, no overflow panic
        assert!(policy.retry_delay(40) > Duration::ZERO);
    }

    #[test]
    fn test_zero_base_stays_zero() {
        let policy = FetchPolicy::immediate(3);
        assert_eq!(policy.retry_delay(7), Duration::ZERO);
    }
}
