//! End-to-end job execution tests.
//!
//! These tests submit jobs to a coordinator with mock workers and verify
//! that every task is dispatched, recorded and rolled up into the job.

use std::sync::Arc;
use std::time::Duration;

use maestro::core::{Priority, TaskKind};
use maestro::orchestration::{CoordinatorEvent, Worker, WorkerType};
use maestro::workflow::{JobDescription, JobKind, JobStatus};

use crate::fixtures::{count, create_coordinator, drain_events, fast_config, register_all, Behavior, MockWorker};

/// Test: Three-stage job completes
/// Given succeeding workers for every type
/// When an implement_system job runs to idle
/// Then the job is COMPLETED with one successful outcome per stage
#[tokio::test]
async fn test_implement_system_completes() {
    let coordinator = create_coordinator(fast_config());
    let workers = register_all(&coordinator, Behavior::Succeed);
    let mut events = coordinator.subscribe();

    let job_id = coordinator
        .submit(
            JobDescription::new(JobKind::ImplementSystem).requirement("user service"),
            Priority::Medium,
        )
        .unwrap();
    coordinator.run_until_idle().await;

    let record = coordinator.job_status(job_id).unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.tasks.len(), 3);
    assert_eq!(record.outcomes.len(), 3);
    assert!(record.outcomes.values().all(|o| o.is_success()));

    // One call per worker type
    for worker in &workers {
        assert_eq!(worker.calls(), 1);
    }

    let events = drain_events(&mut events);
    assert_eq!(count(&events, |e| matches!(e, CoordinatorEvent::TaskDispatched { .. })), 3);
    assert_eq!(count(&events, |e| matches!(e, CoordinatorEvent::TaskCompleted { .. })), 3);
    assert_eq!(count(&events, |e| matches!(e, CoordinatorEvent::JobCompleted { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, CoordinatorEvent::JobFailed { .. })), 0);
    assert!(matches!(events.last(), Some(CoordinatorEvent::JobCompleted { job_id: id }) if *id == job_id));
}

/// Test: Stages route to the matching worker
/// Given one worker per type
/// When an implement_system job runs
/// Then design goes to the architect, implementation to the coder and
/// testing to the debugger
#[tokio::test]
async fn test_stages_route_to_worker_types() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);
    let mut events = coordinator.subscribe();

    coordinator
        .submit(JobDescription::new(JobKind::ImplementSystem), Priority::High)
        .unwrap();
    coordinator.run_until_idle().await;

    let routed: Vec<(TaskKind, WorkerType)> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            CoordinatorEvent::TaskDispatched { kind, worker, .. } => Some((kind, worker)),
            _ => None,
        })
        .collect();

    assert!(routed.contains(&(TaskKind::SystemDesign, WorkerType::Architect)));
    assert!(routed.contains(&(TaskKind::ImplementComponent, WorkerType::Coder)));
    assert!(routed.contains(&(TaskKind::TestComponent, WorkerType::Debugger)));
}

/// Test: Outcomes carry the stamped profile
/// Given a job with no explicit profile
/// When it completes
/// Then each worker saw a profile in the payload and each outcome records it
#[tokio::test]
async fn test_profile_stamped_and_recorded() {
    let coordinator = create_coordinator(fast_config());
    let workers = register_all(&coordinator, Behavior::Succeed);

    let job_id = coordinator
        .submit(JobDescription::new(JobKind::ImplementSystem), Priority::Low)
        .unwrap();
    coordinator.run_until_idle().await;

    let record = coordinator.job_status(job_id).unwrap();
    let registered = coordinator.list_profiles();
    for outcome in record.outcomes.values() {
        let profile = outcome.profile.as_ref().expect("profile recorded");
        assert!(registered.contains(profile));
    }
    for worker in &workers {
        let seen = worker.profiles();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_some());
    }
}

/// Test: Explicit profile applies to every stage
#[tokio::test]
async fn test_explicit_profile_for_whole_job() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let job_id = coordinator
        .submit(
            JobDescription::new(JobKind::ImplementSystem).with_profile("Claude-3.5-Haiku"),
            Priority::Medium,
        )
        .unwrap();
    coordinator.run_until_idle().await;

    let record = coordinator.job_status(job_id).unwrap();
    assert!(record
        .outcomes
        .values()
        .all(|o| o.profile.as_deref() == Some("Claude-3.5-Haiku")));
}

/// Test: Single-task job keeps its payload
#[tokio::test]
async fn test_single_task_job() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let job_id = coordinator
        .submit(
            JobDescription::new(JobKind::Single(TaskKind::PerformanceTest))
                .with_metadata("ticket", "PERF-12"),
            Priority::High,
        )
        .unwrap();
    coordinator.run_until_idle().await;

    let record = coordinator.job_status(job_id).unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.tasks.len(), 1);
    assert_eq!(record.metadata["ticket"], "PERF-12");
    assert_eq!(record.metadata["kind"], "performance_test");
}

/// Test: Many jobs complete together
/// Given ten jobs submitted at mixed priorities
/// When the coordinator runs to idle
/// Then every job is COMPLETED
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_jobs_complete() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let jobs: Vec<_> = (0..10)
        .map(|i| {
            coordinator
                .submit(JobDescription::new(JobKind::ImplementSystem), Priority::ALL[i % 3])
                .unwrap()
        })
        .collect();
    coordinator.run_until_idle().await;

    for job_id in jobs {
        assert_eq!(coordinator.job_status(job_id).unwrap().status, JobStatus::Completed);
    }
    assert_eq!(coordinator.outstanding(), 0);
    assert_eq!(coordinator.queue_depths().total(), 0);
}

/// Test: Higher priority jobs dispatch first
/// Given a LOW job submitted before a HIGH job and one dispatch slot
/// When the coordinator runs
/// Then all HIGH tasks are dispatched before any LOW task
#[tokio::test]
async fn test_priority_dispatch_order() {
    let coordinator = create_coordinator(fast_config().with_max_concurrent(1));
    register_all(&coordinator, Behavior::Succeed);
    let mut events = coordinator.subscribe();

    let low = coordinator
        .submit(JobDescription::new(JobKind::ImplementSystem), Priority::Low)
        .unwrap();
    let high = coordinator
        .submit(JobDescription::new(JobKind::ImplementSystem), Priority::High)
        .unwrap();
    let low_tasks = coordinator.job_status(low).unwrap().tasks;
    let high_tasks = coordinator.job_status(high).unwrap().tasks;

    coordinator.run_until_idle().await;

    let order: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            CoordinatorEvent::TaskDispatched { task_id, .. } => Some(task_id),
            _ => None,
        })
        .collect();

    let expected: Vec<_> = high_tasks.iter().chain(low_tasks.iter()).copied().collect();
    assert_eq!(order, expected);
}

/// Test: Dispatches are bounded by max_concurrent
/// Given a slow worker and a limit of two
/// When six tasks run
/// Then at most two execute at once, and the limit is reached
#[tokio::test]
async fn test_concurrency_limit() {
    let coordinator = create_coordinator(fast_config().with_max_concurrent(2));
    let coder = Arc::new(
        MockWorker::new(WorkerType::Coder, Behavior::Succeed).with_latency(Duration::from_millis(30)),
    );
    coordinator.register_worker(coder.clone());

    for _ in 0..6 {
        coordinator
            .submit(JobDescription::new(JobKind::Single(TaskKind::FixBug)), Priority::Medium)
            .unwrap();
    }
    coordinator.run_until_idle().await;

    assert_eq!(coder.calls(), 6);
    assert_eq!(coder.peak(), 2);
    assert_eq!(coordinator.in_flight(), 0);
}

/// Test: Cancelled task is never dispatched
#[tokio::test]
async fn test_cancelled_task_not_dispatched() {
    let coordinator = create_coordinator(fast_config());
    let workers = register_all(&coordinator, Behavior::Succeed);

    let job_id = coordinator
        .submit(JobDescription::new(JobKind::ImplementSystem), Priority::Medium)
        .unwrap();
    let tasks = coordinator.job_status(job_id).unwrap().tasks;

    assert!(coordinator.cancel_task(tasks[2]));
    coordinator.run_until_idle().await;

    let record = coordinator.job_status(job_id).unwrap();
    assert_eq!(record.outcomes.len(), 2);
    assert_eq!(record.status, JobStatus::InProgress);
    let debugger = workers
        .iter()
        .find(|w| w.worker_type() == WorkerType::Debugger)
        .unwrap();
    assert_eq!(debugger.calls(), 0);

    // Already gone
    assert!(!coordinator.cancel_task(tasks[2]));
    assert!(!coordinator.cancel_task(tasks[0]));
}
