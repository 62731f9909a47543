//! Three-tier priority queue with an awaitable dequeue.
//!
//! Tasks are stored in one FIFO per priority tier. `dequeue` scans tiers
//! from HIGH to LOW and parks on a `Notify` when all are empty, so idle
//! consumers cost nothing and wake as soon as a producer enqueues.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;

use crate::core::{Priority, Task, TaskId};

/// Pending task counts per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueDepths {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }

    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Unbounded multi-level priority queue.
///
/// All operations take one short-lived lock and are linearizable.
#[derive(Default)]
pub struct TaskQueue {
    tiers: Mutex<[VecDeque<Task>; 3]>,
    available: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to its priority tier and wake one waiting consumer.
    pub fn enqueue(&self, task: Task) {
        {
            let mut tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
            tracing::trace!(task_id = %task.id, priority = %task.priority, "task enqueued");
            tiers[task.priority.index()].push_back(task);
        }
        self.available.notify_one();
    }

    /// Wait for and return the highest-priority pending task.
    ///
    /// Cancel safe: a dropped future never loses a task.
    pub async fn dequeue(&self) -> Task {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before checking so an enqueue between the
            // check and the await is not missed.
            notified.as_mut().enable();

            if let Some(task) = self.try_dequeue() {
                return task;
            }
            notified.await;
        }
    }

    /// Pop the highest-priority pending task without waiting.
    pub fn try_dequeue(&self) -> Option<Task> {
        let mut tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
        tiers.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Cancel a pending task. Returns `false` if it is no longer queued.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
        for tier in tiers.iter_mut() {
            if let Some(pos) = tier.iter().position(|task| task.id == id) {
                tier.remove(pos);
                tracing::debug!(task_id = %id, "queued task removed");
                return true;
            }
        }
        false
    }

    pub fn depths(&self) -> QueueDepths {
        let tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
        QueueDepths {
            high: tiers[Priority::High.index()].len(),
            medium: tiers[Priority::Medium.index()].len(),
            low: tiers[Priority::Low.index()].len(),
        }
    }

    pub fn is_tier_empty(&self, priority: Priority) -> bool {
        let tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
        tiers[priority.index()].is_empty()
    }

    pub fn len(&self) -> usize {
        self.depths().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
