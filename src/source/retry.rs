//! Bounded retry policy for source requests.
//!
//! An explicit value handed to the client: attempt budget plus a capped exponential backoff
//! schedule. The client asks the policy what to do; no error-driven looping lives here.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Retry policy with capped exponential backoff (no jitter, so schedules are reproducible).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one (default: 3)
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds (default: 500)
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds (default: 5000)
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts have been made.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Transient statuses: any 5xx, plus 429 (rate limited) and 408 (request timeout).
    pub fn is_transient(&self, status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
    }
}
