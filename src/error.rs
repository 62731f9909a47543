use thiserror::Error;

use crate::core::TaskId;
use crate::workflow::JobId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Job already exists: {0}")]
    JobExists(JobId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("Unknown priority: {0}")]
    UnknownPriority(String),

    #[error("Execution profile not found: {0}")]
    ProfileNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure surfaced by a worker's `execute`.
///
/// The coordinator never propagates these; they are folded into a failed
/// `Outcome` and handed to the recovery policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("{0}")]
    Execution(String),

    /// Bypasses retries and escalates immediately.
    #[error("critical: {0}")]
    Critical(String),
}
