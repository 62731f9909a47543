//! Worker abstraction and task routing.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::{Outcome, Task, TaskKind};
use crate::error::WorkerError;

/// The three specialist roles tasks are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    /// Design and requirements analysis.
    Architect,
    /// Implementation and fixes.
    Coder,
    /// Testing and validation.
    Debugger,
}

impl WorkerType {
    pub const ALL: [WorkerType; 3] = [WorkerType::Architect, WorkerType::Coder, WorkerType::Debugger];
}

impl std::fmt::Display for WorkerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerType::Architect => write!(f, "architect"),
            WorkerType::Coder => write!(f, "coder"),
            WorkerType::Debugger => write!(f, "debugger"),
        }
    }
}

/// Worker type responsible for a task kind.
pub fn route(kind: TaskKind) -> WorkerType {
    match kind {
        TaskKind::SystemDesign
        | TaskKind::ComponentDesign
        | TaskKind::InterfaceDesign
        | TaskKind::AnalyzeRequirements => WorkerType::Architect,
        TaskKind::ImplementComponent
        | TaskKind::ImplementInterface
        | TaskKind::RefactorCode
        | TaskKind::FixBug => WorkerType::Coder,
        TaskKind::TestComponent | TaskKind::ValidateInterface | TaskKind::PerformanceTest => {
            WorkerType::Debugger
        }
    }
}

/// A specialist that executes tasks of its type.
///
/// Implementations may be called concurrently for different tasks.
/// The coordinator stamps the selected profile into the task payload
/// before calling `execute`; read it with `Task::profile`.
#[async_trait]
pub trait Worker: Send + Sync {
    fn worker_type(&self) -> WorkerType;

    async fn execute(&self, task: &Task) -> Result<Outcome, WorkerError>;
}

/// Stand-in worker used by the CLI.
///
/// Sleeps briefly and reports what it would have done. Kinds listed in
/// `fail_kinds` always fail, which exercises the recovery path.
pub struct SimulatedWorker {
    worker_type: WorkerType,
    latency: Duration,
    fail_kinds: Vec<TaskKind>,
}

impl SimulatedWorker {
    pub fn new(worker_type: WorkerType) -> Self {
        Self {
            worker_type,
            latency: Duration::from_millis(50),
            fail_kinds: Vec::new(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_on(mut self, kinds: impl IntoIterator<Item = TaskKind>) -> Self {
        self.fail_kinds.extend(kinds);
        self
    }
}

#[async_trait]
impl Worker for SimulatedWorker {
    fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    async fn execute(&self, task: &Task) -> Result<Outcome, WorkerError> {
        tokio::time::sleep(self.latency).await;

        if self.fail_kinds.contains(&task.kind) {
            return Err(WorkerError::Execution(format!(
                "simulated {} failure on attempt {}",
                task.kind, task.attempt
            )));
        }

        Ok(Outcome::completed(json!({
            "worker": self.worker_type,
            "kind": task.kind,
            "model": task.profile(),
            "stage": task.metadata.get("stage"),
            "requirements": task.requirements(),
        })))
    }
}
