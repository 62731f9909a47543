//! Expansion of a job description into schedulable tasks.

use serde_json::{Map, Value};

use crate::core::{Priority, Task, TaskKind};
use crate::workflow::{JobDescription, JobId, JobKind};

/// Metadata key naming a task's pipeline stage.
pub const STAGE_KEY: &str = "stage";

/// Payload key naming the component the implementation and testing stages
/// work on.
pub const COMPONENT_KEY: &str = "component_name";

/// Tasks for `description`, in pipeline order, owned by `job_id`.
pub fn decompose(job_id: JobId, description: &JobDescription, priority: Priority) -> Vec<Task> {
    let tasks = match description.kind {
        JobKind::ImplementSystem => implement_system(description, priority),
        JobKind::Single(kind) => {
            let mut payload = description.payload.clone();
            insert_list_if_absent(&mut payload, "requirements", &description.requirements);
            insert_list_if_absent(&mut payload, "constraints", &description.constraints);
            vec![Task::new(kind, priority).with_payload(payload)]
        }
    };

    tasks
        .into_iter()
        .map(|mut task| {
            task = task.with_job(job_id);
            if let Some(profile) = &description.profile {
                task = task.with_profile(profile.clone());
            }
            if let Some(deadline) = description.deadline {
                task = task.with_deadline(deadline);
            }
            task
        })
        .collect()
}

/// Design, implementation and verification of one component.
fn implement_system(description: &JobDescription, priority: Priority) -> Vec<Task> {
    let base = || {
        let mut payload = Map::new();
        payload.insert("requirements".into(), list(&description.requirements));
        payload.insert("constraints".into(), list(&description.constraints));
        payload
    };

    let design = base();

    let mut implementation = base();
    implementation.insert(COMPONENT_KEY.into(), Value::from("main"));

    let mut testing = base();
    testing.insert(COMPONENT_KEY.into(), Value::from("main"));

    vec![
        Task::new(TaskKind::SystemDesign, priority)
            .with_payload(design)
            .with_metadata(STAGE_KEY, "design"),
        Task::new(TaskKind::ImplementComponent, priority)
            .with_payload(implementation)
            .with_metadata(STAGE_KEY, "implementation"),
        Task::new(TaskKind::TestComponent, priority)
            .with_payload(testing)
            .with_metadata(STAGE_KEY, "testing"),
    ]
}

fn list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn insert_list_if_absent(payload: &mut Map<String, Value>, key: &str, items: &[String]) {
    if !items.is_empty() && !payload.contains_key(key) {
        payload.insert(key.to_string(), list(items));
    }
}
