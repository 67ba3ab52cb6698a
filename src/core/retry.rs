//! Retry policy for model calls.

use serde::Deserialize;
use std::time::Duration;

/// Retry policy for transient model-call failures.
///
/// Attempts are 1-indexed. After attempt `n` fails the caller waits
/// `backoff_base_secs ^ n` seconds, so the default policy waits 3s,
/// then 9s, and abandons after the third failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff, in seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_secs() -> u64 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay after a specific failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs.saturating_pow(attempt))
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
