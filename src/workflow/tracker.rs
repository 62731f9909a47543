//! In-memory ledger of jobs, their child tasks and outcomes.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::core::{Outcome, TaskId};
use crate::error::{Error, Result};

use super::types::{JobId, JobRecord, JobStatus};

#[derive(Default)]
struct Ledger {
    jobs: HashMap<JobId, JobRecord>,
    /// Reverse index from child task to owning job.
    owners: HashMap<TaskId, JobId>,
    /// Job IDs in creation order.
    order: Vec<JobId>,
}

/// Tracks every job's children, outcomes, retry counts and derived status.
///
/// Each method takes the lock once, so every call is atomic with respect
/// to the others. Jobs are never removed.
#[derive(Default)]
pub struct WorkflowTracker {
    inner: RwLock<Ledger>,
}

impl WorkflowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in the SUBMITTED state.
    pub fn create_job(&self, id: JobId, metadata: Map<String, Value>) -> Result<()> {
        let mut ledger = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if ledger.jobs.contains_key(&id) {
            return Err(Error::JobExists(id));
        }
        ledger.jobs.insert(id, JobRecord::new(id, metadata));
        ledger.order.push(id);
        tracing::debug!(job_id = %id, "job created");
        Ok(())
    }

    /// Attach a child task to a job.
    pub fn add_task(&self, job_id: JobId, task_id: TaskId) -> Result<()> {
        let mut ledger = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let record = ledger.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if !record.tasks.contains(&task_id) {
            record.tasks.push(task_id);
        }
        record.touch();
        record.recompute();
        ledger.owners.insert(task_id, job_id);
        Ok(())
    }

    /// Store the latest outcome for a task and return its job's new status.
    ///
    /// Returns `None` when the task belongs to no job.
    pub fn record_outcome(&self, task_id: TaskId, outcome: Outcome) -> Option<JobStatus> {
        let mut ledger = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(job_id) = ledger.owners.get(&task_id).copied() else {
            tracing::warn!(task_id = %task_id, "outcome for task with no owning job dropped");
            return None;
        };
        let record = ledger.jobs.get_mut(&job_id)?;
        record.outcomes.insert(task_id, outcome);
        record.touch();
        let status = record.recompute();
        tracing::debug!(job_id = %job_id, task_id = %task_id, status = %status, "outcome recorded");
        Some(status)
    }

    /// Snapshot of a job's record.
    pub fn status(&self, job_id: JobId) -> Result<JobRecord> {
        let ledger = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ledger.jobs.get(&job_id).cloned().ok_or(Error::JobNotFound(job_id))
    }

    pub fn job_for(&self, task_id: TaskId) -> Option<JobId> {
        let ledger = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ledger.owners.get(&task_id).copied()
    }

    /// Retries consumed by a task so far; zero for unknown tasks.
    pub fn retry_count(&self, task_id: TaskId) -> u32 {
        let ledger = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ledger
            .owners
            .get(&task_id)
            .and_then(|job_id| ledger.jobs.get(job_id))
            .map(|record| record.retry_count(&task_id))
            .unwrap_or(0)
    }

    /// Bump a task's retry count by one and return the new count.
    pub fn increment_retry(&self, task_id: TaskId) -> Result<u32> {
        let mut ledger = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let job_id = ledger
            .owners
            .get(&task_id)
            .copied()
            .ok_or(Error::TaskNotFound(task_id))?;
        let record = ledger.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        let count = record.retry_counts.entry(task_id).or_insert(0);
        *count += 1;
        let count = *count;
        record.touch();
        Ok(count)
    }

    /// All job IDs in creation order.
    pub fn jobs(&self) -> Vec<JobId> {
        let ledger = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ledger.order.clone()
    }

    pub fn len(&self) -> usize {
        let ledger = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ledger.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
