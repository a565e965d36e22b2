//! Retry policy.

use std::time::Duration;

/// Delivery retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Attempts per message, first try included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(5000),
        }
    }
}

impl RouterConfig {
    /// Wait after failed attempt `attempt` (1-based): `initial * 2^(attempt-1)`, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}
