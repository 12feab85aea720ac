//! Usage counters for the description generator.

use super::backend::TokenUsage;
use serde::Serialize;

/// Counters accumulated since construction or the last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub rate_limit_errors: u64,
    pub timeout_errors: u64,
    pub api_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub cache_size: usize,
    pub circuit_breaker_open: bool,
}

impl AiMetrics {
    pub(crate) fn record_usage(&mut self, usage: TokenUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
    }

    /// Share of cache lookups that hit, in percent.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_and_hit_rate() {
        let mut metrics = AiMetrics::default();
        assert_eq!(metrics.cache_hit_rate(), 0.0);

        metrics.record_usage(TokenUsage {
            prompt_tokens: 40,
            completion_tokens: 10,
            total_tokens: 50,
        });
        metrics.record_usage(TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 5,
            total_tokens: 10,
        });
        assert_eq!(metrics.total_tokens, 60);
        assert_eq!(metrics.prompt_tokens, 45);

        metrics.cache_hits = 1;
        metrics.cache_misses = 3;
        assert_eq!(metrics.cache_hit_rate(), 25.0);
    }
}
