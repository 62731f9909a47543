//! Per-task execution profile selection.
//!
//! Selection runs in four passes: an explicit registered request wins;
//! otherwise candidates must cover the task's required capabilities, are
//! narrowed by caller constraints and ranked by the task kind's metrics.
//! Any empty result falls back to the catalog default.

use std::cmp::Ordering;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;

use super::catalog::{capability, ExecutionProfile, ModelCatalog};
use crate::core::{Task, TaskKind};

/// Output cost ceiling applied by the "low cost"/"budget" constraint.
pub const LOW_COST_MAX_OUTPUT: f64 = 0.00003;
/// Mean score floor applied by the "high performance" constraint.
pub const HIGH_PERFORMANCE_MIN: f64 = 0.85;

static PROVIDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)provider\s*:(.*)").unwrap());

/// What the selector needs to know about a task.
#[derive(Debug, Clone)]
pub struct TaskDescription {
    pub kind: TaskKind,
    pub requirements: Vec<String>,
    pub constraints: Vec<String>,
    /// Explicitly requested profile.
    pub profile: Option<String>,
}

impl TaskDescription {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            requirements: Vec::new(),
            constraints: Vec::new(),
            profile: None,
        }
    }

    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }
}

impl From<&Task> for TaskDescription {
    fn from(task: &Task) -> Self {
        Self {
            kind: task.kind,
            requirements: task.requirements(),
            constraints: task.constraints(),
            profile: task.requested_profile.clone(),
        }
    }
}

/// Capabilities every candidate for `kind` must have.
fn kind_capabilities(kind: TaskKind) -> &'static [&'static str] {
    use capability::*;

    match kind {
        TaskKind::SystemDesign | TaskKind::ComponentDesign | TaskKind::InterfaceDesign => {
            &[NATURAL_LANGUAGE_UNDERSTANDING, REASONING, SYSTEM_DESIGN]
        }
        TaskKind::AnalyzeRequirements => &[NATURAL_LANGUAGE_UNDERSTANDING, REASONING],
        TaskKind::ImplementComponent | TaskKind::ImplementInterface | TaskKind::RefactorCode => {
            &[NATURAL_LANGUAGE_UNDERSTANDING, CODE_GENERATION]
        }
        TaskKind::FixBug
        | TaskKind::TestComponent
        | TaskKind::ValidateInterface
        | TaskKind::PerformanceTest => &[NATURAL_LANGUAGE_UNDERSTANDING, CODE_GENERATION, DEBUGGING],
    }
}

/// Metrics averaged to rank candidates for `kind`.
fn kind_metrics(kind: TaskKind) -> &'static [&'static str] {
    use capability::*;

    match kind {
        TaskKind::SystemDesign | TaskKind::ComponentDesign | TaskKind::InterfaceDesign => {
            &[SYSTEM_DESIGN, REASONING]
        }
        TaskKind::AnalyzeRequirements => &[REASONING],
        TaskKind::ImplementComponent | TaskKind::ImplementInterface | TaskKind::RefactorCode => {
            &[CODE_GENERATION]
        }
        TaskKind::FixBug | TaskKind::TestComponent | TaskKind::ValidateInterface => {
            &[DEBUGGING, CODE_GENERATION]
        }
        TaskKind::PerformanceTest => &[DEBUGGING],
    }
}

/// Capabilities implied by `kind` plus keyword scans over the requirements.
pub fn required_capabilities(kind: TaskKind, requirements: &[String]) -> Vec<String> {
    let mut required: Vec<String> = kind_capabilities(kind).iter().map(|c| c.to_string()).collect();

    let mut add = |tag: &str| {
        if !required.iter().any(|c| c == tag) {
            required.push(tag.to_string());
        }
    };

    for requirement in requirements {
        let text = requirement.to_lowercase();
        if text.contains("complex") && text.contains("reasoning") {
            add(capability::COMPLEX_REASONING);
        }
        if text.contains("optimize") || text.contains("performance") {
            add(capability::DEBUGGING);
        }
        if text.contains("security") {
            add(capability::DEBUGGING);
        }
    }

    required
}

#[derive(Debug, Default)]
struct ConstraintFilter {
    low_cost: bool,
    high_performance: bool,
    provider: Option<String>,
}

impl ConstraintFilter {
    fn parse(constraints: &[String]) -> Self {
        let mut filter = Self::default();
        for constraint in constraints {
            let text = constraint.to_lowercase();
            if text.contains("low cost") || text.contains("budget") {
                filter.low_cost = true;
            }
            if text.contains("high performance") {
                filter.high_performance = true;
            }
            // The provider is the whole trimmed remainder, spaces included
            if let Some(captures) = PROVIDER_RE.captures(constraint) {
                let provider = captures[1].trim();
                if !provider.is_empty() {
                    filter.provider = Some(provider.to_lowercase());
                }
            }
        }
        filter
    }

    fn is_empty(&self) -> bool {
        !self.low_cost && !self.high_performance && self.provider.is_none()
    }

    fn accepts(&self, profile: &ExecutionProfile) -> bool {
        if self.low_cost && profile.cost.output_per_token > LOW_COST_MAX_OUTPUT {
            return false;
        }
        if self.high_performance && profile.mean_performance() < HIGH_PERFORMANCE_MIN {
            return false;
        }
        if let Some(provider) = &self.provider {
            if profile.provider.to_lowercase() != *provider {
                return false;
            }
        }
        true
    }
}

/// Stateless selection policy over a shared catalog.
#[derive(Clone)]
pub struct ModelSelector {
    catalog: Arc<RwLock<ModelCatalog>>,
}

impl ModelSelector {
    pub fn new(catalog: Arc<RwLock<ModelCatalog>>) -> Self {
        Self { catalog }
    }

    /// Pick the profile to run `task` with.
    ///
    /// Always returns a registered name; `None` only for an empty catalog.
    pub fn select(&self, task: &TaskDescription) -> Option<String> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        let fallback = || catalog.default_name().map(str::to_string);

        if let Some(name) = &task.profile {
            if catalog.contains(name) {
                return Some(name.clone());
            }
            tracing::warn!(profile = %name, kind = %task.kind, "requested profile not registered, selecting by policy");
        }

        let required = required_capabilities(task.kind, &task.requirements);
        let candidates: Vec<(&str, &ExecutionProfile)> = catalog
            .iter()
            .filter(|(_, profile)| required.iter().all(|tag| profile.has_capability(tag)))
            .collect();
        if candidates.is_empty() {
            tracing::debug!(kind = %task.kind, ?required, "no profile covers required capabilities");
            return fallback();
        }

        let filter = ConstraintFilter::parse(&task.constraints);
        let candidates = if filter.is_empty() {
            candidates
        } else {
            let narrowed: Vec<_> = candidates
                .iter()
                .copied()
                .filter(|(_, profile)| filter.accepts(profile))
                .collect();
            if narrowed.is_empty() {
                tracing::debug!(kind = %task.kind, ?filter, "constraints exclude every candidate, ignoring them");
                candidates
            } else {
                narrowed
            }
        };

        let metrics = kind_metrics(task.kind);
        let mut ranked: Vec<(&str, f64)> = candidates
            .into_iter()
            .map(|(name, profile)| (name, profile.score_for(metrics) * profile.size.score_factor()))
            .collect();
        // Stable sort keeps registration order among equal scores.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        match ranked.first() {
            Some(&(name, score)) => {
                tracing::debug!(kind = %task.kind, profile = name, score, "profile selected");
                Some(name.to_string())
            }
            None => fallback(),
        }
    }
}
