//! Orchestration layer for maestro.
//!
//! This module provides the priority task queue, the worker abstraction,
//! the recovery policy and the coordinator that ties them together.

mod coordinator;
mod decompose;
mod events;
mod queue;
mod recovery;
mod worker;

pub use coordinator::{Coordinator, CoordinatorConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_CONCURRENT};
pub use decompose::{decompose, COMPONENT_KEY, STAGE_KEY};
pub use events::CoordinatorEvent;
pub use queue::{QueueDepths, TaskQueue};
pub use recovery::{RecoveryPolicy, RecoveryStrategy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAYS};
pub use worker::{route, SimulatedWorker, Worker, WorkerType};
