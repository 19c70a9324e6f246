// src/dag/retry.rs

//! Retry policy attached to every task node.

use std::time::Duration;

/// Fixed-delay retry policy.
///
/// `retries` counts re-attempts after the first failure: `retries = 1` means
/// at most two attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, retry_delay: Duration) -> Self {
        Self {
            retries,
            retry_delay,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether a task whose attempt number `attempt` (1-based) just failed
    /// gets another attempt.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.retries
    }
}

impl Default for RetryPolicy {
    /// One retry after five minutes.
    fn default() -> Self {
        Self::new(1, Duration::from_secs(5 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_count_reattempts_after_first_failure() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert!(!RetryPolicy::none().should_retry(1));
    }
}
