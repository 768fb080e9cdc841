//! Coordinator configuration

use backon::ExponentialBuilder;
use std::time::Duration;

/// Configuration for a coordinator instance
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Shared deadline for collecting every prepare vote
    pub prepare_timeout: Duration,

    /// Retries per participant for commit/rollback (on top of the first call)
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further retry
    pub initial_backoff: Duration,

    /// Upper bound for a single retry delay
    pub max_backoff: Duration,

    /// How many retired outcomes to remember without reading the log
    pub completed_cache_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            prepare_timeout: Duration::from_secs(1),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            completed_cache_capacity: 10_000,
        }
    }
}

impl CoordinatorConfig {
    /// Set the prepare deadline
    pub fn with_prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    /// Set the retry count for commit/rollback calls
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the first retry delay
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the cap on a single retry delay
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Set the retired-outcome cache size
    pub fn with_completed_cache_capacity(mut self, capacity: usize) -> Self {
        self.completed_cache_capacity = capacity;
        self
    }

    /// Backoff schedule for commit/rollback retries: `initial * 2^attempt`
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff.max(self.initial_backoff))
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }

    /// Upper bound on the time one participant spends sleeping between
    /// retries: `initial * 2^max_retries`
    pub fn retry_budget(&self) -> Duration {
        self.initial_backoff
            .saturating_mul(1u32.checked_shl(self.max_retries).unwrap_or(u32::MAX))
    }
}
