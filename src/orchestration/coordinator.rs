//! The coordinator: dispatch, response and error loops.
//!
//! ## Flow
//!
//! 1. `submit` creates a job, decomposes it and enqueues the tasks
//! 2. The dispatch loop takes a concurrency permit, dequeues the next task
//!    and spawns its dispatch
//! 3. A dispatch routes the task to a worker, stamps the selected profile
//!    and awaits `Worker::execute`
//! 4. The response loop records each outcome and forwards failures
//! 5. The error loop applies the recovery policy
//!
//! Loops talk over unbounded mpsc channels; subscribers observe progress
//! through a broadcast channel of `CoordinatorEvent`s.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::outcome::{EXECUTION_ERROR, NO_WORKER, TIMEOUT};
use crate::core::{ErrorSeverity, FailureInfo, Outcome, Priority, Task, TaskId};
use crate::error::Result;
use crate::models::{ExecutionProfile, ModelCatalog, ModelSelector, TaskDescription};
use crate::workflow::{JobDescription, JobId, JobRecord, JobStatus, WorkflowTracker};

use super::decompose::decompose;
use super::events::CoordinatorEvent;
use super::queue::{QueueDepths, TaskQueue};
use super::recovery::{RecoveryPolicy, RecoveryStrategy};
use super::worker::{route, Worker, WorkerType};

/// Default number of dispatches allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default capacity of the event broadcast buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Runtime settings for a `Coordinator`.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on concurrent dispatches.
    pub max_concurrent: usize,
    pub recovery: RecoveryPolicy,
    /// Fail dispatches that run longer than this. Off by default.
    pub dispatch_timeout: Option<Duration>,
    /// When false, skip the selector and run every task on the catalog
    /// default unless it names a registered profile.
    pub auto_select: bool,
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            recovery: RecoveryPolicy::default(),
            dispatch_timeout: None,
            auto_select: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn with_auto_select(mut self, auto_select: bool) -> Self {
        self.auto_select = auto_select;
        self
    }
}

/// A finished dispatch on its way to the response loop.
struct Completion {
    task: Task,
    outcome: Outcome,
}

struct Shared {
    config: CoordinatorConfig,
    queue: TaskQueue,
    tracker: WorkflowTracker,
    catalog: Arc<RwLock<ModelCatalog>>,
    selector: ModelSelector,
    workers: RwLock<HashMap<WorkerType, Arc<dyn Worker>>>,
    events: broadcast::Sender<CoordinatorEvent>,
    /// Tasks that gave up; consulted before announcing a failed job.
    escalated: Mutex<HashSet<TaskId>>,
    /// Jobs whose terminal event has been published.
    announced: Mutex<HashSet<JobId>>,
    /// Tasks accepted but not yet settled, including pending retries.
    outstanding: AtomicUsize,
    in_flight: AtomicUsize,
    pending_retries: AtomicUsize,
    settled: Notify,
}

/// Coordinates workers to complete submitted jobs.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, catalog: ModelCatalog) -> Self {
        Self::with_shared_catalog(config, Arc::new(RwLock::new(catalog)))
    }

    /// Build a coordinator around a catalog the caller keeps a handle to.
    pub fn with_shared_catalog(config: CoordinatorConfig, catalog: Arc<RwLock<ModelCatalog>>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                config,
                queue: TaskQueue::new(),
                tracker: WorkflowTracker::new(),
                selector: ModelSelector::new(Arc::clone(&catalog)),
                catalog,
                workers: RwLock::new(HashMap::new()),
                events,
                escalated: Mutex::new(HashSet::new()),
                announced: Mutex::new(HashSet::new()),
                outstanding: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                pending_retries: AtomicUsize::new(0),
                settled: Notify::new(),
            }),
        }
    }

    // ========== Workers ==========

    /// Register the worker for its type, replacing any previous one.
    pub fn register_worker(&self, worker: Arc<dyn Worker>) {
        let worker_type = worker.worker_type();
        let mut workers = self.shared.workers.write().unwrap_or_else(PoisonError::into_inner);
        if workers.insert(worker_type, worker).is_some() {
            tracing::warn!(worker = %worker_type, "replacing registered worker");
        } else {
            tracing::info!(worker = %worker_type, "worker registered");
        }
    }

    // ========== Submission ==========

    /// Create a job for `description` and enqueue its tasks.
    pub fn submit(&self, description: JobDescription, priority: Priority) -> Result<JobId> {
        let job_id = JobId::new();
        let shared = &self.shared;

        let mut metadata = description.metadata.clone();
        metadata.insert("kind".to_string(), description.kind.to_string().into());
        shared.tracker.create_job(job_id, metadata)?;

        let tasks = decompose(job_id, &description, priority);
        for task in &tasks {
            shared.tracker.add_task(job_id, task.id)?;
        }
        tracing::info!(job_id = %job_id, kind = %description.kind, tasks = tasks.len(), "job submitted");

        for task in tasks {
            shared.accept(task);
        }
        Ok(job_id)
    }

    /// Enqueue a task directly. Tasks with no owning job escalate on
    /// their first failure.
    pub fn enqueue_task(&self, task: Task) -> TaskId {
        let id = task.id;
        self.shared.accept(task);
        id
    }

    /// Cancel a task that has not been dispatched yet.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let removed = self.shared.queue.remove(id);
        if removed {
            tracing::info!(task_id = %id, "task cancelled");
            self.shared.settle();
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.shared.events.subscribe()
    }

    // ========== Running ==========

    /// Run the dispatch, response and error loops until `shutdown` fires.
    ///
    /// Shutdown stops new dispatches. Dispatches already running finish and
    /// their outcomes are recorded before this returns, so a worker that
    /// never returns holds shutdown up unless `dispatch_timeout` is set.
    /// Pending retries are enqueued immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        tracing::info!(max_concurrent = self.shared.config.max_concurrent, "coordinator started");
        tokio::join!(
            self.shared.dispatch_loop(completion_tx, shutdown.clone()),
            self.shared.response_loop(completion_rx, failure_tx),
            self.shared.error_loop(failure_rx, shutdown.clone()),
        );
        tracing::info!("coordinator stopped");
    }

    /// Run until every accepted task has settled: completed, escalated or
    /// cancelled, with no retry pending.
    pub async fn run_until_idle(&self) {
        let shutdown = CancellationToken::new();
        let watcher = async {
            loop {
                let settled = self.shared.settled.notified();
                tokio::pin!(settled);
                settled.as_mut().enable();
                if self.shared.outstanding.load(Ordering::SeqCst) == 0 {
                    break;
                }
                settled.await;
            }
            shutdown.cancel();
        };
        tokio::join!(self.run(shutdown.clone()), watcher);
    }

    // ========== Status ==========

    pub fn job_status(&self, id: JobId) -> Result<JobRecord> {
        self.shared.tracker.status(id)
    }

    pub fn jobs(&self) -> Vec<JobId> {
        self.shared.tracker.jobs()
    }

    pub fn queue_depths(&self) -> QueueDepths {
        self.shared.queue.depths()
    }

    /// Dispatches currently awaiting a worker.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Retries waiting out their backoff delay.
    pub fn pending_retries(&self) -> usize {
        self.shared.pending_retries.load(Ordering::SeqCst)
    }

    /// Accepted tasks that have not settled yet.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    // ========== Model administration ==========

    pub fn catalog(&self) -> Arc<RwLock<ModelCatalog>> {
        Arc::clone(&self.shared.catalog)
    }

    pub fn list_profiles(&self) -> Vec<String> {
        self.shared.catalog().list()
    }

    pub fn get_profile(&self, name: &str) -> Option<ExecutionProfile> {
        self.shared.catalog().get(name).cloned()
    }

    pub fn default_profile(&self) -> Option<String> {
        self.shared.catalog().default_name().map(str::to_string)
    }

    pub fn set_default_profile(&self, name: &str) -> bool {
        let mut catalog = self.shared.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let changed = catalog.set_default(name);
        if changed {
            tracing::info!(profile = name, "default profile changed");
        } else {
            tracing::warn!(profile = name, "cannot set unknown profile as default");
        }
        changed
    }
}

impl Shared {
    fn catalog(&self) -> std::sync::RwLockReadGuard<'_, ModelCatalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn accept(&self, task: Task) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.queue.enqueue(task);
    }

    fn settle(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.settled.notify_waiters();
        }
    }

    fn worker(&self, worker_type: WorkerType) -> Option<Arc<dyn Worker>> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        workers.get(&worker_type).cloned()
    }

    fn choose_profile(&self, task: &Task) -> Option<String> {
        if self.config.auto_select {
            return self.selector.select(&TaskDescription::from(task));
        }
        let catalog = self.catalog();
        match &task.requested_profile {
            Some(name) if catalog.contains(name) => Some(name.clone()),
            _ => catalog.default_name().map(str::to_string),
        }
    }

    // ========== Dispatch loop ==========

    async fn dispatch_loop(
        self: &Arc<Self>,
        completions: mpsc::UnboundedSender<Completion>,
        shutdown: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        loop {
            // Take the permit first so waiting tasks stay cancellable.
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let task = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                task = self.queue.dequeue() => task,
            };

            let shared = Arc::clone(self);
            let completions = completions.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let done = shared.dispatch(task).await;
                if completions.send(done).is_err() {
                    tracing::error!("response loop gone, outcome dropped");
                }
            });
        }
        tracing::debug!("dispatch loop stopped");
    }

    /// Run one task to an outcome.
    async fn dispatch(&self, mut task: Task) -> Completion {
        let worker_type = route(task.kind);
        let Some(worker) = self.worker(worker_type) else {
            tracing::warn!(task_id = %task.id, kind = %task.kind, worker = %worker_type, "no worker registered");
            let outcome = Outcome::failed(
                FailureInfo::new(
                    NO_WORKER,
                    ErrorSeverity::Warning,
                    format!("no {} worker registered", worker_type),
                )
                .with_hint("Register a worker for this task type"),
            )
            .with_attempt(task.attempt);
            return Completion { task, outcome };
        };

        let profile = self.choose_profile(&task);
        if let Some(name) = &profile {
            task.stamp_profile(name);
        }
        if task.is_overdue(chrono::Utc::now()) {
            tracing::warn!(task_id = %task.id, "dispatching task past its deadline");
        }

        task.dispatch();
        tracing::debug!(
            task_id = %task.id,
            kind = %task.kind,
            worker = %worker_type,
            profile = profile.as_deref().unwrap_or("-"),
            attempt = task.attempt,
            "dispatching task"
        );
        self.emit(CoordinatorEvent::TaskDispatched {
            task_id: task.id,
            kind: task.kind,
            worker: worker_type,
            profile: profile.clone(),
            attempt: task.attempt,
        });

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = self.execute(worker.as_ref(), &task).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = outcome.with_profile(profile).with_attempt(task.attempt);
        Completion { task, outcome }
    }

    /// Await the worker, turning errors, panics and timeouts into failures.
    async fn execute(&self, worker: &dyn Worker, task: &Task) -> Outcome {
        let call = AssertUnwindSafe(worker.execute(task)).catch_unwind();

        let result = match self.config.dispatch_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    return Outcome::failed(
                        FailureInfo::new(
                            TIMEOUT,
                            ErrorSeverity::Warning,
                            format!("dispatch exceeded {}ms", limit.as_millis()),
                        )
                        .with_hint("Retry the task"),
                    );
                }
            },
            None => call.await,
        };

        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => Outcome::failed(FailureInfo::from(&err)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(task_id = %task.id, %message, "worker panicked");
                Outcome::failed(
                    FailureInfo::new(
                        EXECUTION_ERROR,
                        ErrorSeverity::Warning,
                        format!("worker panicked: {}", message),
                    )
                    .with_hint("Retry the task"),
                )
            }
        }
    }

    // ========== Response loop ==========

    async fn response_loop(
        &self,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        failures: mpsc::UnboundedSender<Completion>,
    ) {
        while let Some(Completion { mut task, outcome }) = completions.recv().await {
            let status = self.tracker.record_outcome(task.id, outcome.clone());

            if outcome.is_success() {
                task.complete();
                tracing::info!(task_id = %task.id, kind = %task.kind, attempt = task.attempt, "task completed");
                self.emit(CoordinatorEvent::TaskCompleted {
                    task_id: task.id,
                    job_id: task.job_id,
                    outcome,
                });
                if let Some(job_id) = task.job_id {
                    self.announce_job(job_id, status);
                }
                self.settle();
                continue;
            }

            task.fail();
            self.emit(CoordinatorEvent::TaskFailed {
                task_id: task.id,
                job_id: task.job_id,
                outcome: outcome.clone(),
            });
            if failures.send(Completion { task, outcome }).is_err() {
                tracing::error!("error loop gone, failure dropped");
            }
        }
        tracing::debug!("response loop stopped");
    }

    /// Publish a job-level event, once, if `status` ends the job for good.
    fn announce_job(&self, job_id: JobId, status: Option<JobStatus>) {
        let event = match status {
            Some(JobStatus::Completed) => CoordinatorEvent::JobCompleted { job_id },
            Some(JobStatus::Failed) if self.failed_for_good(job_id) => {
                CoordinatorEvent::JobFailed { job_id }
            }
            _ => return,
        };

        let first = self
            .announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id);
        if !first {
            return;
        }
        match &event {
            CoordinatorEvent::JobFailed { .. } => tracing::warn!(job_id = %job_id, "job failed"),
            _ => tracing::info!(job_id = %job_id, "job completed"),
        }
        self.emit(event);
    }

    /// A FAILED job is final only once every failed child has escalated;
    /// until then a retry may still succeed.
    fn failed_for_good(&self, job_id: JobId) -> bool {
        let Ok(record) = self.tracker.status(job_id) else {
            return false;
        };
        let escalated = self.escalated.lock().unwrap_or_else(PoisonError::into_inner);
        record
            .outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .all(|(task_id, _)| escalated.contains(task_id))
    }

    // ========== Error loop ==========

    async fn error_loop(
        self: &Arc<Self>,
        mut failures: mpsc::UnboundedReceiver<Completion>,
        shutdown: CancellationToken,
    ) {
        while let Some(Completion { task, outcome }) = failures.recv().await {
            let failure = outcome.failure.clone().unwrap_or_else(|| {
                FailureInfo::new(EXECUTION_ERROR, ErrorSeverity::Warning, "failed without details")
            });

            tracing::warn!(
                task_id = %task.id,
                kind = %task.kind,
                code = %failure.code,
                severity = %failure.severity,
                attempt = task.attempt,
                "task failed: {}",
                failure.description
            );
            self.emit(CoordinatorEvent::Error {
                task_id: task.id,
                code: failure.code.clone(),
                severity: failure.severity,
                description: failure.description.clone(),
            });

            let has_job = self.tracker.job_for(task.id).is_some();
            let retries_used = self.tracker.retry_count(task.id);
            let strategy = self.config.recovery.decide(&failure, has_job, retries_used);
            tracing::debug!(task_id = %task.id, ?strategy, "recovery decided");

            match strategy {
                RecoveryStrategy::Retry { delay, .. } => self.retry(task, delay, &shutdown),
                RecoveryStrategy::Escalate { reason } => self.escalate(task, reason),
                RecoveryStrategy::Decompose => {
                    tracing::info!(task_id = %task.id, "retries exhausted, decomposition unsupported");
                    self.escalate(task, "retries exhausted; decomposition not supported".to_string());
                }
            }
        }
        tracing::debug!("error loop stopped");
    }

    fn retry(self: &Arc<Self>, mut task: Task, delay: Duration, shutdown: &CancellationToken) {
        if let Err(err) = self.tracker.increment_retry(task.id) {
            tracing::error!(task_id = %task.id, error = %err, "cannot record retry, escalating");
            self.escalate(task, err.to_string());
            return;
        }

        task.retry();
        tracing::info!(
            task_id = %task.id,
            attempt = task.attempt,
            delay_ms = delay.as_millis() as u64,
            "retrying task"
        );
        self.emit(CoordinatorEvent::TaskRetrying {
            task_id: task.id,
            attempt: task.attempt,
            delay_ms: delay.as_millis() as u64,
        });

        self.pending_retries.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(self);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {}
            }
            task.requeue();
            shared.queue.enqueue(task);
            shared.pending_retries.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn escalate(&self, mut task: Task, reason: String) {
        task.escalate();
        tracing::warn!(task_id = %task.id, kind = %task.kind, %reason, "task escalated");
        self.escalated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id);
        self.emit(CoordinatorEvent::TaskEscalated {
            task_id: task.id,
            job_id: task.job_id,
            reason,
        });

        if let Some(job_id) = task.job_id {
            let status = self.tracker.status(job_id).ok().map(|record| record.status);
            self.announce_job(job_id, status);
        }
        self.settle();
    }
}
