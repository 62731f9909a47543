//! maestro: a coordination engine for specialized workers.
//!
//! Jobs are decomposed into tasks, queued by priority, routed to the
//! architect, coder or debugger worker, run with a selected execution
//! profile and retried or escalated on failure.

pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod models;
pub mod orchestration;
pub mod workflow;

pub use error::{Error, Result, WorkerError};
pub use orchestration::{Coordinator, CoordinatorConfig, CoordinatorEvent, Worker, WorkerType};
pub use workflow::{JobDescription, JobId, JobKind, JobStatus};
