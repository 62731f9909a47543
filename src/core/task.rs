//! Task data model for the coordination engine.
//!
//! Tasks are the atomic units of work routed to workers. Each task carries
//! its kind, priority, opaque payload and the bookkeeping the recovery
//! policy needs to re-enqueue it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::workflow::JobId;

/// Payload key the coordinator stamps with the selected execution profile.
pub const PROFILE_PAYLOAD_KEY: &str = "model";

/// Unique identifier for a task.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Scheduling priority. Declared highest first so `Ord` sorts HIGH < LOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Tiers in the order the queue scans them.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(Error::UnknownPriority(other.to_string())),
        }
    }
}

/// Every kind of task a worker can be asked to perform.
///
/// The set is closed: routing to a worker type is an exhaustive `match`
/// in `orchestration::worker::route`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SystemDesign,
    ComponentDesign,
    InterfaceDesign,
    AnalyzeRequirements,
    ImplementComponent,
    ImplementInterface,
    RefactorCode,
    FixBug,
    TestComponent,
    ValidateInterface,
    PerformanceTest,
}

impl TaskKind {
    pub const ALL: [TaskKind; 11] = [
        TaskKind::SystemDesign,
        TaskKind::ComponentDesign,
        TaskKind::InterfaceDesign,
        TaskKind::AnalyzeRequirements,
        TaskKind::ImplementComponent,
        TaskKind::ImplementInterface,
        TaskKind::RefactorCode,
        TaskKind::FixBug,
        TaskKind::TestComponent,
        TaskKind::ValidateInterface,
        TaskKind::PerformanceTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SystemDesign => "system_design",
            TaskKind::ComponentDesign => "component_design",
            TaskKind::InterfaceDesign => "interface_design",
            TaskKind::AnalyzeRequirements => "analyze_requirements",
            TaskKind::ImplementComponent => "implement_component",
            TaskKind::ImplementInterface => "implement_interface",
            TaskKind::RefactorCode => "refactor_code",
            TaskKind::FixBug => "fix_bug",
            TaskKind::TestComponent => "test_component",
            TaskKind::ValidateInterface => "validate_interface",
            TaskKind::PerformanceTest => "performance_test",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownTaskKind(s.to_string()))
    }
}

/// Lifecycle state of a task.
///
/// QUEUED -> DISPATCHED -> {COMPLETED | FAILED}; FAILED -> RETRYING -> QUEUED
/// while retries remain, otherwise FAILED -> ESCALATED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Queued,
    Dispatched,
    Completed,
    Failed,
    Retrying,
    Escalated,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Queued => write!(f, "queued"),
            TaskState::Dispatched => write!(f, "dispatched"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Retrying => write!(f, "retrying"),
            TaskState::Escalated => write!(f, "escalated"),
        }
    }
}

/// A single schedulable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// What the task asks a worker to do; drives routing.
    pub kind: TaskKind,
    /// Queue tier the task is placed in.
    pub priority: Priority,
    /// Worker-defined payload, opaque to the coordinator apart from
    /// `requirements`, `constraints` and the stamped profile.
    pub payload: Map<String, Value>,
    /// Owning job, if any.
    pub job_id: Option<JobId>,
    /// Advisory deadline; never enforced.
    pub deadline: Option<DateTime<Utc>>,
    /// Profile explicitly requested by the submitter.
    pub requested_profile: Option<String>,
    /// Free-form bookkeeping such as the pipeline stage.
    pub metadata: Map<String, Value>,
    /// Zero-based dispatch attempt; bumped by each retry.
    pub attempt: u32,
    /// Current lifecycle state.
    pub state: TaskState,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a queued task with an empty payload.
    pub fn new(kind: TaskKind, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            priority,
            payload: Map::new(),
            job_id: None,
            deadline: None,
            requested_profile: None,
            metadata: Map::new(),
            attempt: 0,
            state: TaskState::Queued,
            created_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.requested_profile = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Free-text requirements carried in the payload.
    pub fn requirements(&self) -> Vec<String> {
        string_list(&self.payload, "requirements")
    }

    /// Free-text constraints carried in the payload.
    pub fn constraints(&self) -> Vec<String> {
        string_list(&self.payload, "constraints")
    }

    /// Record the execution profile chosen for this dispatch.
    pub fn stamp_profile(&mut self, name: &str) {
        self.payload
            .insert(PROFILE_PAYLOAD_KEY.to_string(), Value::String(name.to_string()));
    }

    /// The profile stamped by the coordinator, if dispatched.
    pub fn profile(&self) -> Option<&str> {
        self.payload.get(PROFILE_PAYLOAD_KEY).and_then(Value::as_str)
    }

    /// Whether the advisory deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn dispatch(&mut self) {
        self.state = TaskState::Dispatched;
    }

    pub fn complete(&mut self) {
        self.state = TaskState::Completed;
    }

    pub fn fail(&mut self) {
        self.state = TaskState::Failed;
    }

    /// Prepare the same task for another attempt.
    pub fn retry(&mut self) {
        self.attempt += 1;
        self.state = TaskState::Retrying;
    }

    /// Put a retried task back in line.
    pub fn requeue(&mut self) {
        self.state = TaskState::Queued;
    }

    pub fn escalate(&mut self) {
        self.state = TaskState::Escalated;
    }

    /// Check if the task is in a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Escalated)
    }
}

fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}
