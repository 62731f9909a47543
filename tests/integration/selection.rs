//! Execution profile selection tests.
//!
//! These tests verify that the profile a task actually runs with follows
//! the selection policy: explicit requests, capability coverage,
//! constraints, ranking and the catalog default.

use std::sync::{Arc, RwLock};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use maestro::core::{Priority, TaskKind};
use maestro::models::capability::*;
use maestro::models::{ExecutionProfile, ModelCatalog, ModelSelector, SizeTier, TaskDescription};
use maestro::orchestration::Coordinator;
use maestro::workflow::{JobDescription, JobKind, JobStatus};

use crate::fixtures::{create_coordinator, fast_config, register_all, Behavior};

/// Run a single-task job and return the profile its outcome recorded.
async fn run_and_profile(coordinator: &Coordinator, description: JobDescription) -> Option<String> {
    let job_id = coordinator.submit(description, Priority::Medium).unwrap();
    coordinator.run_until_idle().await;

    let record = coordinator.job_status(job_id).unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    record.outcomes.values().next().unwrap().profile.clone()
}

/// Test: Capability coverage decides the profile
/// Given A without debugging and B with it, A scoring higher
/// When a fix_bug task runs
/// Then it runs on B
#[tokio::test]
async fn test_capability_coverage_through_coordinator() {
    let mut catalog = ModelCatalog::new();
    catalog.register(
        "A",
        ExecutionProfile::new("acme", "1", SizeTier::Standard)
            .with_capabilities([NATURAL_LANGUAGE_UNDERSTANDING, CODE_GENERATION])
            .with_score(CODE_GENERATION, 0.99)
            .with_score(DEBUGGING, 0.99),
    );
    catalog.register(
        "B",
        ExecutionProfile::new("acme", "1", SizeTier::Standard)
            .with_capabilities([NATURAL_LANGUAGE_UNDERSTANDING, CODE_GENERATION, DEBUGGING])
            .with_score(CODE_GENERATION, 0.5)
            .with_score(DEBUGGING, 0.5),
    );
    let coordinator = Coordinator::new(fast_config(), catalog);
    register_all(&coordinator, Behavior::Succeed);

    let profile = run_and_profile(&coordinator, JobDescription::new(JobKind::Single(TaskKind::FixBug))).await;
    assert_eq!(profile.as_deref(), Some("B"));
}

/// Test: Ranking over the built-in catalog
#[tokio::test]
async fn test_builtin_ranking() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let profile = run_and_profile(&coordinator, JobDescription::new(JobKind::Single(TaskKind::FixBug))).await;
    assert_eq!(profile.as_deref(), Some("GPT-4o"));
}

/// Test: Provider constraint narrows candidates
/// Given the built-in catalog
/// When a fix_bug job is constrained to one provider
/// Then the best profile from that provider is used
#[tokio::test]
async fn test_provider_constraint() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let anthropic = run_and_profile(
        &coordinator,
        JobDescription::new(JobKind::Single(TaskKind::FixBug)).constraint("provider: anthropic"),
    )
    .await;
    assert_eq!(anthropic.as_deref(), Some("Claude-3.7-Sonnet"));

    let openai = run_and_profile(
        &coordinator,
        JobDescription::new(JobKind::Single(TaskKind::SystemDesign)).constraint("Provider:OpenAI"),
    )
    .await;
    assert_eq!(openai.as_deref(), Some("GPT-4o"));
}

/// Test: Constraints that exclude everything are ignored
#[tokio::test]
async fn test_unsatisfiable_constraint_is_ignored() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let profile = run_and_profile(
        &coordinator,
        JobDescription::new(JobKind::Single(TaskKind::FixBug)).constraint("provider:nobody"),
    )
    .await;
    assert_eq!(profile.as_deref(), Some("GPT-4o"));
}

/// Test: Explicit registered profile wins over policy
#[tokio::test]
async fn test_explicit_profile_wins() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let profile = run_and_profile(
        &coordinator,
        JobDescription::new(JobKind::Single(TaskKind::SystemDesign))
            .constraint("provider:openai")
            .with_profile("Claude-3.5-Haiku"),
    )
    .await;
    assert_eq!(profile.as_deref(), Some("Claude-3.5-Haiku"));
}

/// Test: Unregistered explicit profile falls back to policy
#[tokio::test]
async fn test_unregistered_profile_falls_back() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    let profile = run_and_profile(
        &coordinator,
        JobDescription::new(JobKind::Single(TaskKind::RefactorCode)).with_profile("GPT-2"),
    )
    .await
    .unwrap();
    assert_ne!(profile, "GPT-2");
    assert!(coordinator.list_profiles().contains(&profile));
}

/// Test: Without auto-selection the default is used
/// Given auto_select disabled and Haiku set as default
/// When a fix_bug task runs (which Haiku would never be selected for)
/// Then it runs on Haiku
#[tokio::test]
async fn test_auto_select_off_uses_default() {
    let coordinator = create_coordinator(fast_config().with_auto_select(false));
    register_all(&coordinator, Behavior::Succeed);
    assert!(coordinator.set_default_profile("Claude-3.5-Haiku"));

    let profile = run_and_profile(&coordinator, JobDescription::new(JobKind::Single(TaskKind::FixBug))).await;
    assert_eq!(profile.as_deref(), Some("Claude-3.5-Haiku"));
}

/// Test: Profiles registered at runtime are selectable
#[tokio::test]
async fn test_runtime_registration() {
    let coordinator = create_coordinator(fast_config());
    register_all(&coordinator, Behavior::Succeed);

    coordinator.catalog().write().unwrap().register(
        "Specialist",
        ExecutionProfile::new("acme", "2", SizeTier::Standard)
            .with_capabilities([NATURAL_LANGUAGE_UNDERSTANDING, CODE_GENERATION, DEBUGGING])
            .with_score(DEBUGGING, 1.0)
            .with_score(CODE_GENERATION, 1.0),
    );

    let profile = run_and_profile(&coordinator, JobDescription::new(JobKind::Single(TaskKind::TestComponent))).await;
    assert_eq!(profile.as_deref(), Some("Specialist"));
}

/// Test: Empty catalog still runs tasks
/// Given no registered profiles
/// When a job runs
/// Then it completes with no profile recorded
#[tokio::test]
async fn test_empty_catalog_runs_without_profile() {
    let coordinator = Coordinator::new(fast_config(), ModelCatalog::new());
    let workers = register_all(&coordinator, Behavior::Succeed);

    let profile = run_and_profile(&coordinator, JobDescription::new(JobKind::Single(TaskKind::SystemDesign))).await;
    assert!(profile.is_none());
    assert_eq!(workers[0].profiles(), vec![None]);
}

/// Test: Selection always names a registered profile
/// Given random catalogs and random task descriptions
/// When the selector runs
/// Then the result is always one of the registered names
#[test]
fn test_selection_is_always_registered() {
    const TAGS: [&str; 7] = [
        NATURAL_LANGUAGE_UNDERSTANDING,
        CODE_GENERATION,
        REASONING,
        INSTRUCTION_FOLLOWING,
        SYSTEM_DESIGN,
        DEBUGGING,
        COMPLEX_REASONING,
    ];
    const CONSTRAINTS: [&str; 5] = [
        "low cost",
        "high performance",
        "provider:alpha",
        "provider:beta",
        "budget",
    ];
    const REQUIREMENTS: [&str; 3] = ["complex reasoning", "optimize latency", "security audit"];

    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let mut catalog = ModelCatalog::new();
        let profiles = rng.gen_range(1..6);
        for i in 0..profiles {
            let tags: Vec<&str> = TAGS.iter().copied().filter(|_| rng.gen_bool(0.6)).collect();
            let mut profile = ExecutionProfile::new(
                if rng.gen_bool(0.5) { "alpha" } else { "beta" },
                "1",
                [SizeTier::Economy, SizeTier::Standard, SizeTier::Premium][rng.gen_range(0..3)],
            )
            .with_capabilities(tags.iter().copied())
            .with_cost(0.0, rng.gen_range(0.0..0.0001));
            for tag in &tags {
                profile = profile.with_score(tag, rng.gen_range(0.0..1.0));
            }
            catalog.register(&format!("p{}", i), profile);
        }
        let names = catalog.list();
        let selector = ModelSelector::new(Arc::new(RwLock::new(catalog)));

        let mut task = TaskDescription::new(TaskKind::ALL[rng.gen_range(0..TaskKind::ALL.len())]);
        for constraint in CONSTRAINTS {
            if rng.gen_bool(0.3) {
                task = task.constraint(constraint);
            }
        }
        for requirement in REQUIREMENTS {
            if rng.gen_bool(0.3) {
                task = task.requirement(requirement);
            }
        }
        if rng.gen_bool(0.2) {
            task = task.with_profile(format!("p{}", rng.gen_range(0..8)));
        }

        let chosen = selector.select(&task).expect("non-empty catalog");
        assert!(names.contains(&chosen), "{} not in {:?}", chosen, names);
    }
}
