use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use maestro::config::Config;
use maestro::core::{Priority, TaskKind};
use maestro::models::ModelCatalog;
use maestro::orchestration::{Coordinator, CoordinatorEvent, SimulatedWorker, WorkerType};
use maestro::workflow::{JobDescription, JobKind};
use maestro::{Error, Result};

/// maestro - priority scheduling, model selection and recovery for specialist workers
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    MAESTRO_DEBUG=1             Enable debug logging (alternative to --debug)\n    \
    MAESTRO_DEFAULT_PROFILE     Override the default execution profile\n    \
    MAESTRO_AUTO_SELECT         Enable or disable per-task profile selection\n    \
    MAESTRO_MAX_RETRIES         Retries per task before giving up\n    \
    MAESTRO_MAX_CONCURRENT      Dispatches allowed to run at once")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.maestro/maestro.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a job against the simulated workers and print its record
    Run {
        /// Job kind: implement_system or any task kind (e.g. fix_bug)
        kind: JobKind,

        /// Requirement passed to every task (repeatable)
        #[arg(short = 'r', long = "requirement")]
        requirements: Vec<String>,

        /// Constraint such as "low cost" or "provider:openai" (repeatable)
        #[arg(short = 'c', long = "constraint")]
        constraints: Vec<String>,

        /// Queue priority: high, medium or low
        #[arg(long, default_value = "medium")]
        priority: Priority,

        /// Execution profile to use instead of automatic selection
        #[arg(long)]
        model: Option<String>,

        /// Make the simulated worker fail every task of this kind (repeatable)
        #[arg(long)]
        fail_kind: Vec<TaskKind>,

        /// Override every retry delay, in seconds
        #[arg(long)]
        retry_delay: Option<u64>,
    },

    /// Inspect and manage execution profiles
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ModelsAction {
    /// List registered profiles
    List,
    /// Show one profile as JSON
    Show { name: String },
    /// Set and persist the default profile
    Default { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    maestro::log::init_with_debug(cli.debug);
    tracing::info!(debug = maestro::log::is_debug(), "maestro starting");

    let config = Config::load()?;

    match cli.command {
        Command::Run {
            kind,
            requirements,
            constraints,
            priority,
            model,
            fail_kind,
            retry_delay,
        } => {
            let mut description = JobDescription::new(kind);
            description.requirements = requirements;
            description.constraints = constraints;
            description.profile = model;
            run_job(config, description, priority, fail_kind, retry_delay)
        }
        Command::Models { action } => run_models(config, action),
    }
}

fn run_job(
    mut config: Config,
    description: JobDescription,
    priority: Priority,
    fail_kinds: Vec<TaskKind>,
    retry_delay: Option<u64>,
) -> Result<()> {
    if let Some(secs) = retry_delay {
        config.retry_delays_secs = vec![secs];
    }

    let catalog = ModelCatalog::with_builtin_profiles(&config.default_profile);
    let coordinator = Coordinator::new(config.coordinator_config(), catalog);
    for worker_type in WorkerType::ALL {
        coordinator.register_worker(Arc::new(
            SimulatedWorker::new(worker_type)
                .with_latency(Duration::from_millis(100))
                .failing_on(fail_kinds.iter().copied()),
        ));
    }

    let rt = tokio::runtime::Runtime::new()?;
    let record = rt.block_on(async {
        let mut events = coordinator.subscribe();
        let job_id = coordinator.submit(description, priority)?;

        let run = coordinator.run_until_idle();
        tokio::pin!(run);
        loop {
            tokio::select! {
                _ = &mut run => break,
                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(missed)) => eprintln!("  ({} events skipped)", missed),
                    Err(RecvError::Closed) => {
                        (&mut run).await;
                        break;
                    }
                },
            }
        }
        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }

        coordinator.job_status(job_id)
    })?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn print_event(event: &CoordinatorEvent) {
    match event {
        CoordinatorEvent::TaskDispatched {
            task_id,
            kind,
            worker,
            profile,
            attempt,
        } => eprintln!(
            "  -> {} {} to {} on {} (attempt {})",
            task_id.short(),
            kind,
            worker,
            profile.as_deref().unwrap_or("-"),
            attempt
        ),
        CoordinatorEvent::TaskCompleted { task_id, .. } => eprintln!("  ok {}", task_id.short()),
        CoordinatorEvent::TaskFailed { task_id, outcome, .. } => eprintln!(
            "  !! {} {}",
            task_id.short(),
            outcome.error_description().unwrap_or("failed")
        ),
        CoordinatorEvent::TaskRetrying {
            task_id,
            attempt,
            delay_ms,
        } => eprintln!("  .. {} retry {} in {}ms", task_id.short(), attempt, delay_ms),
        CoordinatorEvent::TaskEscalated { task_id, reason, .. } => {
            eprintln!("  ^^ {} escalated: {}", task_id.short(), reason)
        }
        CoordinatorEvent::JobCompleted { job_id } => eprintln!("job {} completed", job_id.short()),
        CoordinatorEvent::JobFailed { job_id } => eprintln!("job {} failed", job_id.short()),
        CoordinatorEvent::Error { .. } => {}
    }
}

fn run_models(config: Config, action: ModelsAction) -> Result<()> {
    let catalog = ModelCatalog::with_builtin_profiles(&config.default_profile);

    match action {
        ModelsAction::List => {
            let default = catalog.default_name().unwrap_or_default();
            for (name, profile) in catalog.iter() {
                let marker = if name == default { "*" } else { " " };
                println!(
                    "{} {:<20} {:<10} {:<9} {:>7} tokens",
                    marker,
                    name,
                    profile.provider,
                    profile.size.to_string(),
                    profile.context_window
                );
            }
        }
        ModelsAction::Show { name } => {
            let profile = catalog
                .get(&name)
                .ok_or_else(|| Error::ProfileNotFound(name.clone()))?;
            println!("{}", serde_json::to_string_pretty(profile)?);
        }
        ModelsAction::Default { name } => {
            if !catalog.contains(&name) {
                return Err(Error::ProfileNotFound(name));
            }
            Config::persist_default_profile(&Config::config_path()?, &name)?;
            println!("Default profile set to {}", name);
        }
    }
    Ok(())
}
