//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Mock workers with scripted behavior
//! - Coordinators with short retry delays
//! - Draining the event channel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use maestro::core::{Outcome, Task, TaskKind};
use maestro::models::{ModelCatalog, DEFAULT_PROFILE};
use maestro::orchestration::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, RecoveryPolicy, Worker, WorkerType,
};
use maestro::WorkerError;

/// How a mock worker responds to each call.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Every call succeeds.
    Succeed,
    /// Every call fails with a retryable error.
    Fail,
    /// The first `n` calls fail, later calls succeed.
    FailTimes(usize),
    /// Every call fails with a critical error.
    Critical,
    /// Calls for these kinds fail, all others succeed.
    FailKinds(Vec<TaskKind>),
}

/// A worker that follows a `Behavior` and records what it saw.
pub struct MockWorker {
    worker_type: WorkerType,
    behavior: Behavior,
    latency: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    profiles: Mutex<Vec<Option<String>>>,
}

impl MockWorker {
    pub fn new(worker_type: WorkerType, behavior: Behavior) -> Self {
        Self {
            worker_type,
            behavior,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            profiles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of times `execute` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `execute` calls.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Profiles stamped into the payload of each call, in call order.
    pub fn profiles(&self) -> Vec<Option<String>> {
        self.profiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    async fn execute(&self, task: &Task) -> Result<Outcome, WorkerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.profiles
            .lock()
            .unwrap()
            .push(task.profile().map(str::to_string));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let fail = match &self.behavior {
            Behavior::Succeed => None,
            Behavior::Fail => Some(WorkerError::Execution(format!("call {} failed", call))),
            Behavior::FailTimes(n) if call < *n => {
                Some(WorkerError::Execution(format!("call {} failed", call)))
            }
            Behavior::FailTimes(_) => None,
            Behavior::Critical => Some(WorkerError::Critical("unrecoverable".to_string())),
            Behavior::FailKinds(kinds) if kinds.contains(&task.kind) => {
                Some(WorkerError::Execution(format!("{} always fails", task.kind)))
            }
            Behavior::FailKinds(_) => None,
        };

        match fail {
            Some(err) => Err(err),
            None => Ok(Outcome::completed(json!({
                "worker": self.worker_type,
                "kind": task.kind,
                "call": call,
            }))),
        }
    }
}

/// Recovery policy with the default budget and a 1ms backoff.
pub fn fast_recovery() -> RecoveryPolicy {
    RecoveryPolicy::default().retry_delays(vec![Duration::from_millis(1)])
}

/// Coordinator config with fast retries.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::default().with_recovery(fast_recovery())
}

/// Coordinator over the built-in catalog.
pub fn create_coordinator(config: CoordinatorConfig) -> Coordinator {
    Coordinator::new(config, ModelCatalog::with_builtin_profiles(DEFAULT_PROFILE))
}

/// Register one mock worker per worker type, all with the same behavior.
pub fn register_all(coordinator: &Coordinator, behavior: Behavior) -> Vec<Arc<MockWorker>> {
    WorkerType::ALL
        .into_iter()
        .map(|worker_type| {
            let worker = Arc::new(MockWorker::new(worker_type, behavior.clone()));
            coordinator.register_worker(worker.clone());
            worker
        })
        .collect()
}

/// Everything currently buffered on `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count events matching `predicate`.
pub fn count<F>(events: &[CoordinatorEvent], predicate: F) -> usize
where
    F: Fn(&CoordinatorEvent) -> bool,
{
    events.iter().filter(|e| predicate(e)).count()
}
