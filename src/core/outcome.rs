//! Result of one dispatch attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkerError;

/// Failure code for errors raised by a worker's `execute`.
pub const EXECUTION_ERROR: &str = "execution_error";
/// Failure code for tasks whose worker type has no registered worker.
pub const NO_WORKER: &str = "no_worker";
/// Failure code for dispatches that exceeded the configured timeout.
pub const TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

/// How serious a failure is. `Critical` skips retries entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Critical,
    #[default]
    Warning,
    Info,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "critical"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Info => write!(f, "info"),
        }
    }
}

/// Description of a failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub code: String,
    pub severity: ErrorSeverity,
    pub description: String,
    pub recovery_hint: Option<String>,
}

impl FailureInfo {
    pub fn new(code: &str, severity: ErrorSeverity, description: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity,
            description: description.into(),
            recovery_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }
}

impl From<&WorkerError> for FailureInfo {
    fn from(err: &WorkerError) -> Self {
        match err {
            WorkerError::Execution(msg) => FailureInfo::new(EXECUTION_ERROR, ErrorSeverity::Warning, msg.clone())
                .with_hint("Retry the task"),
            WorkerError::Critical(msg) => FailureInfo::new(EXECUTION_ERROR, ErrorSeverity::Critical, msg.clone())
                .with_hint("Escalate for human intervention"),
        }
    }
}

/// Terminal result of a single dispatch attempt.
///
/// A retried task produces a fresh `Outcome`; outcomes are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    /// Worker result on success.
    pub result: Option<Value>,
    /// Error details on failure.
    pub failure: Option<FailureInfo>,
    /// Execution profile the attempt ran with.
    pub profile: Option<String>,
    /// Attempt number the outcome belongs to.
    pub attempt: u32,
    pub finished_at: DateTime<Utc>,
}

impl Outcome {
    pub fn completed(result: Value) -> Self {
        Self {
            status: OutcomeStatus::Completed,
            result: Some(result),
            failure: None,
            profile: None,
            attempt: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(failure: FailureInfo) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            result: None,
            failure: Some(failure),
            profile: None,
            attempt: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    /// Severity of the failure; `None` for successful outcomes.
    pub fn severity(&self) -> Option<ErrorSeverity> {
        self.failure.as_ref().map(|f| f.severity)
    }

    /// One-line summary of the failure for logs.
    pub fn error_description(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.description.as_str())
    }
}
