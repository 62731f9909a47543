//! Core domain models for maestro.
//!
//! This module contains the data structures passed between the queue,
//! the tracker and the workers: tasks and the outcomes of dispatching them.

pub mod outcome;
pub mod task;

pub use outcome::{ErrorSeverity, FailureInfo, Outcome, OutcomeStatus};
pub use task::{Priority, Task, TaskId, TaskKind, TaskState, PROFILE_PAYLOAD_KEY};
