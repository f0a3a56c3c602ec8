//! Retry policy: exponential backoff with a cap and a dead-letter
//! ceiling.

use chrono::{DateTime, Duration, Utc};
use outbox::FailureDisposition;

/// Decides what happens to a row after a failed delivery attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: i32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given ceiling and backoff bounds.
    pub fn new(max_retries: i32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            max_backoff,
        }
    }

    /// Returns the retry ceiling.
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Returns the backoff before attempt `retry_count` + 1, i.e. after
    /// `retry_count` failures: `base * 2^(retry_count - 1)`, capped.
    pub fn backoff(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.saturating_sub(1).clamp(0, 30) as u32;
        let base_ms = self.base_backoff.num_milliseconds();
        let backoff_ms = base_ms.saturating_mul(1i64 << exponent);
        Duration::milliseconds(backoff_ms.min(self.max_backoff.num_milliseconds()))
    }

    /// Returns the disposition for a row that just failed for the
    /// `retry_count`-th time: reschedule with backoff below the
    /// ceiling, dead-letter at or above it.
    pub fn disposition(&self, retry_count: i32, now: DateTime<Utc>) -> FailureDisposition {
        if retry_count >= self.max_retries {
            FailureDisposition::DeadLetter
        } else {
            FailureDisposition::Retry {
                available_at: now + self.backoff(retry_count),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::seconds(2),
            max_backoff: Duration::minutes(5),
        }
    }
}
