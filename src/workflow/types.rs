//! Core job type definitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{Outcome, TaskId, TaskKind};
use crate::error::Error;

/// Unique identifier for a job.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new unique job identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Aggregate status of a job, derived from its children's outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, no tasks attached yet
    #[default]
    Submitted,
    /// At least one child has no outcome yet
    InProgress,
    /// Every child has a successful outcome
    Completed,
    /// Every child has an outcome and at least one failed
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What a submitted job asks for.
///
/// `ImplementSystem` is the multi-stage kind that decomposes into
/// design, implementation and verification tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ImplementSystem,
    Single(TaskKind),
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::ImplementSystem => write!(f, "implement_system"),
            JobKind::Single(kind) => write!(f, "{}", kind),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "implement_system" {
            return Ok(JobKind::ImplementSystem);
        }
        Ok(JobKind::Single(s.parse()?))
    }
}

/// A caller-submitted description of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescription {
    pub kind: JobKind,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Payload handed verbatim to single-task jobs.
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Explicit execution profile for every task of the job.
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl JobDescription {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            requirements: Vec::new(),
            constraints: Vec::new(),
            payload: Map::new(),
            metadata: Map::new(),
            profile: None,
            deadline: None,
        }
    }

    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The tracker's ledger entry for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Child tasks in insertion order.
    pub tasks: Vec<TaskId>,
    /// Latest outcome per child.
    pub outcomes: BTreeMap<TaskId, Outcome>,
    pub metadata: Map<String, Value>,
    /// Retries consumed per child.
    pub retry_counts: BTreeMap<TaskId, u32>,
}

impl JobRecord {
    pub fn new(id: JobId, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Submitted,
            created_at: now,
            updated_at: now,
            tasks: Vec::new(),
            outcomes: BTreeMap::new(),
            metadata,
            retry_counts: BTreeMap::new(),
        }
    }

    /// Status implied by the current children and outcomes.
    pub fn derive_status(&self) -> JobStatus {
        if self.tasks.is_empty() {
            return JobStatus::Submitted;
        }

        let mut any_failed = false;
        for task_id in &self.tasks {
            match self.outcomes.get(task_id) {
                None => return JobStatus::InProgress,
                Some(outcome) if !outcome.is_success() => any_failed = true,
                Some(_) => {}
            }
        }

        if any_failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn recompute(&mut self) -> JobStatus {
        self.status = self.derive_status();
        self.status
    }

    pub fn outcome(&self, task_id: &TaskId) -> Option<&Outcome> {
        self.outcomes.get(task_id)
    }

    pub fn retry_count(&self, task_id: &TaskId) -> u32 {
        self.retry_counts.get(task_id).copied().unwrap_or(0)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_success()).count()
    }
}
