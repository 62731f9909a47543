//! Recovery decisions for failed tasks.
//!
//! The policy looks at three things only: the failure's severity, whether
//! the task belongs to a job, and how many retries the task has used.
//!
//! - `Escalate` for critical failures and orphan tasks
//! - `Retry` while the retry budget lasts, with a growing delay
//! - `Decompose` once the budget is spent

use std::time::Duration;

use serde::Serialize;

use crate::core::{ErrorSeverity, FailureInfo};

/// Default maximum number of retries before giving up on a task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff schedule; the last entry repeats.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(30),
];

/// What to do with a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Re-enqueue the same task after `delay`.
    Retry {
        /// Retry number, starting at 1.
        attempt: u32,
        delay: Duration,
    },
    /// Split the task into smaller ones.
    Decompose,
    /// Give up and hand the task to a human.
    Escalate {
        reason: String,
    },
}

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    pub max_retries: u32,
    pub retry_delays: Vec<Duration>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
        }
    }
}

impl RecoveryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Backoff before retry number `attempt` (1-based).
    ///
    /// Attempts past the end of the schedule reuse its last entry; an
    /// empty schedule retries immediately.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(last) = self.retry_delays.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (attempt.max(1) as usize - 1).min(last);
        self.retry_delays[index]
    }

    /// Choose a strategy for a failure.
    ///
    /// `retries_used` is the task's retry count before this failure.
    pub fn decide(&self, failure: &FailureInfo, has_job: bool, retries_used: u32) -> RecoveryStrategy {
        if failure.severity == ErrorSeverity::Critical {
            return RecoveryStrategy::Escalate {
                reason: format!("critical failure: {}", failure.description),
            };
        }

        if !has_job {
            return RecoveryStrategy::Escalate {
                reason: "task has no owning job".to_string(),
            };
        }

        if retries_used < self.max_retries {
            let attempt = retries_used + 1;
            return RecoveryStrategy::Retry {
                attempt,
                delay: self.delay_for(attempt),
            };
        }

        RecoveryStrategy::Decompose
    }
}
