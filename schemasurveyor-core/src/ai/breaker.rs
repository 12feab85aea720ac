//! Consecutive-failure circuit breaker.

use std::time::Duration;
use tokio::time::Instant;

/// Opens for `cooldown` once `threshold` consecutive failures accumulate.
///
/// After the cooldown the breaker lets calls through again but keeps the
/// failure count, so one more failure reopens it. A success closes it.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// True while calls must short-circuit.
    pub fn is_open(&self) -> bool {
        self.opened_at
            .is_some_and(|at| at.elapsed() < self.cooldown)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Counts a failure. Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.threshold && !self.is_open() {
            self.opened_at = Some(Instant::now());
            return true;
        }
        false
    }
}
