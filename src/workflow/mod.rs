//! Job tracking for the maestro coordinator.
//!
//! A job is the caller-submitted unit of work; it is decomposed into tasks
//! whose outcomes roll up into one aggregate status.

mod tracker;
mod types;

pub use tracker::WorkflowTracker;
pub use types::{JobDescription, JobId, JobKind, JobRecord, JobStatus};
