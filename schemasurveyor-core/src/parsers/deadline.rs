//! Cooperative wall-clock budgets.
//!
//! Parsers call [`Deadline::check`] at traversal boundaries (per record, per
//! element event, per column). Nothing is interrupted asynchronously, so a
//! budget is only enforced as often as the caller checks it.

use crate::{Result, SurveyError};
use std::time::{Duration, Instant};

/// A named stage with a fixed time budget.
#[derive(Debug, Clone)]
pub struct Deadline {
    stage: &'static str,
    budget: Duration,
    expires_at: Instant,
}

impl Deadline {
    /// Starts the clock for `stage`.
    pub fn start(stage: &'static str, budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            stage,
            budget,
            expires_at: now.checked_add(budget).unwrap_or(now),
        }
    }

    /// True once the budget has been spent.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Returns a timeout error once the budget has been spent.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            tracing::warn!(
                "{} exceeded its budget of {}s",
                self.stage,
                self.budget.as_secs()
            );
            return Err(self.error());
        }
        Ok(())
    }

    /// The timeout error for this stage.
    pub fn error(&self) -> SurveyError {
        SurveyError::timeout(self.stage, self.budget)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_passes() {
        let deadline = Deadline::start("JSON parsing", Duration::from_secs(60));
        assert!(deadline.check().is_ok());
        assert_eq!(deadline.stage(), "JSON parsing");
    }

    #[test]
    fn test_zero_budget_expires_immediately() {
        let deadline = Deadline::start("XML parsing", Duration::ZERO);
        let err = deadline.check().unwrap_err();
        assert!(matches!(err, SurveyError::Timeout { .. }));
        assert!(err.to_string().contains("XML parsing"));
    }
}
