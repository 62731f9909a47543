//! Events published by the coordinator.

use serde::Serialize;

use crate::core::{ErrorSeverity, Outcome, TaskId, TaskKind};
use crate::workflow::JobId;

use super::worker::WorkerType;

/// Lifecycle notifications broadcast to every subscriber.
///
/// Subscribers that fall behind lose the oldest events; the coordinator
/// never waits on them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// A task was handed to a worker.
    TaskDispatched {
        task_id: TaskId,
        kind: TaskKind,
        worker: WorkerType,
        profile: Option<String>,
        attempt: u32,
    },
    TaskCompleted {
        task_id: TaskId,
        job_id: Option<JobId>,
        outcome: Outcome,
    },
    TaskFailed {
        task_id: TaskId,
        job_id: Option<JobId>,
        outcome: Outcome,
    },
    /// A failed task was scheduled for another attempt.
    TaskRetrying {
        task_id: TaskId,
        attempt: u32,
        delay_ms: u64,
    },
    /// A task gave up; it will not be dispatched again.
    TaskEscalated {
        task_id: TaskId,
        job_id: Option<JobId>,
        reason: String,
    },
    JobCompleted {
        job_id: JobId,
    },
    JobFailed {
        job_id: JobId,
    },
    /// Any failure routed through recovery.
    Error {
        task_id: TaskId,
        code: String,
        severity: ErrorSeverity,
        description: String,
    },
}

impl CoordinatorEvent {
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            CoordinatorEvent::TaskDispatched { task_id, .. }
            | CoordinatorEvent::TaskCompleted { task_id, .. }
            | CoordinatorEvent::TaskFailed { task_id, .. }
            | CoordinatorEvent::TaskRetrying { task_id, .. }
            | CoordinatorEvent::TaskEscalated { task_id, .. }
            | CoordinatorEvent::Error { task_id, .. } => Some(*task_id),
            CoordinatorEvent::JobCompleted { .. } | CoordinatorEvent::JobFailed { .. } => None,
        }
    }

    /// Whether this event ends a job.
    pub fn is_job_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorEvent::JobCompleted { .. } | CoordinatorEvent::JobFailed { .. }
        )
    }
}
