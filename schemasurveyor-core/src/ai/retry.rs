//! Exponential backoff for backend retries.

use crate::config::AiConfig;
use std::time::Duration;

/// Bounded exponential backoff without jitter.
///
/// The first wait is `min_wait`; each subsequent wait is multiplied by
/// `multiplier` and capped at `max_wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_wait: Duration::from_secs(config.retry_min_wait_secs),
            max_wait: Duration::from_secs(config.retry_max_wait_secs),
            multiplier: config.retry_multiplier.max(1),
        }
    }

    /// Starts a fresh backoff sequence.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.min_wait.min(self.max_wait),
            max: self.max_wait,
            multiplier: self.multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AiConfig::default())
    }
}

/// Iterator-like backoff state for one retried call.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: u32,
}

impl Backoff {
    /// Returns the current wait and advances to the next.
    pub fn next_backoff(&mut self) -> Duration {
        let current = self.next;
        self.next = current.saturating_mul(self.multiplier).min(self.max);
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);

        let mut backoff = policy.backoff();
        let waits: Vec<u64> = (0..5).map(|_| backoff.next_backoff().as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn test_min_above_max_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 2,
            min_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(5),
            multiplier: 3,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }
}
