//! Reconciliation tuning knobs.
//!
//! # Invariants
//! - `max_attempts` is at least 1.

use std::time::Duration;

/// Default number of attempts for one reconciliation before lock contention
/// is reported as transient.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runtime configuration for `IdentityService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    max_attempts: u32,
    retry_backoff: Duration,
}

impl ReconcileConfig {
    /// Sets the attempt budget, clamped to at least one attempt.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base pause between attempts; attempt `n` waits `n * backoff`.
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(25),
        }
    }
}
