//! Registry of named execution profiles.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability tags understood by the selector.
pub mod capability {
    pub const NATURAL_LANGUAGE_UNDERSTANDING: &str = "natural_language_understanding";
    pub const CODE_GENERATION: &str = "code_generation";
    pub const REASONING: &str = "reasoning";
    pub const INSTRUCTION_FOLLOWING: &str = "instruction_following";
    pub const SYSTEM_DESIGN: &str = "system_design";
    pub const DEBUGGING: &str = "debugging";
    pub const COMPLEX_REASONING: &str = "complex_reasoning";
}

/// Name of the profile the built-in catalog falls back to.
pub const DEFAULT_PROFILE: &str = "Claude-3.7-Sonnet";

/// Relative size of a profile; scales its ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

impl SizeTier {
    /// Ranking multiplier. Favors cheaper tiers when scores are close.
    pub fn score_factor(&self) -> f64 {
        match self {
            SizeTier::Economy => 1.1,
            SizeTier::Standard => 1.0,
            SizeTier::Premium => 0.9,
        }
    }
}

impl std::fmt::Display for SizeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeTier::Economy => write!(f, "economy"),
            SizeTier::Standard => write!(f, "standard"),
            SizeTier::Premium => write!(f, "premium"),
        }
    }
}

/// Unit cost in currency per token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ProfileCost {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

/// Capabilities, scores and cost of one remote execution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub provider: String,
    pub version: String,
    pub size: SizeTier,
    pub capabilities: BTreeSet<String>,
    /// Per-metric scores in 0.0..=1.0.
    pub performance: BTreeMap<String, f64>,
    pub cost: ProfileCost,
    pub context_window: u32,
    #[serde(default)]
    pub description: String,
}

impl ExecutionProfile {
    pub fn new(provider: &str, version: &str, size: SizeTier) -> Self {
        Self {
            provider: provider.to_string(),
            version: version.to_string(),
            size,
            capabilities: BTreeSet::new(),
            performance: BTreeMap::new(),
            cost: ProfileCost::default(),
            context_window: 0,
            description: String::new(),
        }
    }

    pub fn with_capabilities<'a>(mut self, tags: impl IntoIterator<Item = &'a str>) -> Self {
        self.capabilities.extend(tags.into_iter().map(str::to_string));
        self
    }

    pub fn with_score(mut self, metric: &str, score: f64) -> Self {
        self.performance.insert(metric.to_string(), score);
        self
    }

    pub fn with_cost(mut self, input_per_token: f64, output_per_token: f64) -> Self {
        self.cost = ProfileCost {
            input_per_token,
            output_per_token,
        };
        self
    }

    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    /// Mean over every recorded score; 0.0 when none are recorded.
    pub fn mean_performance(&self) -> f64 {
        if self.performance.is_empty() {
            return 0.0;
        }
        self.performance.values().sum::<f64>() / self.performance.len() as f64
    }

    /// Mean over the given metrics; a missing metric counts as 0.0.
    pub fn score_for(&self, metrics: &[&str]) -> f64 {
        if metrics.is_empty() {
            return 0.0;
        }
        let total: f64 = metrics
            .iter()
            .map(|metric| self.performance.get(*metric).copied().unwrap_or(0.0))
            .sum();
        total / metrics.len() as f64
    }
}

/// Field filters for `ModelCatalog::find_by_criteria`.
///
/// Each entry names a top-level profile field and the exact JSON value it
/// must serialize to. All entries must match.
#[derive(Debug, Clone, Default)]
pub struct Criteria(Map<String, Value>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    fn matches(&self, profile: &ExecutionProfile) -> bool {
        let Ok(Value::Object(fields)) = serde_json::to_value(profile) else {
            return false;
        };
        self.0
            .iter()
            .all(|(name, expected)| fields.get(name) == Some(expected))
    }
}

impl From<Map<String, Value>> for Criteria {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Named execution profiles with a mutable default.
///
/// Iteration follows registration order; overwriting a name keeps its
/// original position.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    profiles: HashMap<String, ExecutionProfile>,
    order: Vec<String>,
    default: Option<String>,
}

impl ModelCatalog {
    /// Empty catalog. The first registered profile becomes the default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the built-in profiles.
    ///
    /// `default` is used when registered, otherwise `DEFAULT_PROFILE`.
    pub fn with_builtin_profiles(default: &str) -> Self {
        let mut catalog = Self::new();
        for (name, profile) in builtin_profiles() {
            catalog.register(name, profile);
        }
        if !catalog.set_default(default) {
            tracing::warn!(profile = default, "unknown default profile, using {}", DEFAULT_PROFILE);
            catalog.set_default(DEFAULT_PROFILE);
        }
        catalog
    }

    pub fn register(&mut self, name: &str, profile: ExecutionProfile) {
        if self.profiles.insert(name.to_string(), profile).is_some() {
            tracing::warn!(profile = name, "overwriting registered profile");
        } else {
            self.order.push(name.to_string());
        }
        if self.default.is_none() {
            self.default = Some(name.to_string());
        }
    }

    pub fn get(&self, name: &str) -> Option<&ExecutionProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Change the default. Returns `false` and leaves it untouched when
    /// `name` is not registered.
    pub fn set_default(&mut self, name: &str) -> bool {
        if !self.profiles.contains_key(name) {
            return false;
        }
        self.default = Some(name.to_string());
        true
    }

    /// Name of the default profile; `None` only for an empty catalog.
    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn default_profile(&self) -> Option<&ExecutionProfile> {
        self.default.as_deref().and_then(|name| self.get(name))
    }

    /// Registered names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Profiles in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExecutionProfile)> {
        self.order
            .iter()
            .filter_map(|name| self.profiles.get(name).map(|p| (name.as_str(), p)))
    }

    pub fn find_by_capability(&self, tag: &str) -> Vec<String> {
        self.iter()
            .filter(|(_, profile)| profile.has_capability(tag))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn find_by_criteria(&self, criteria: &Criteria) -> Vec<String> {
        self.iter()
            .filter(|(_, profile)| criteria.matches(profile))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn builtin_profiles() -> Vec<(&'static str, ExecutionProfile)> {
    use capability::*;

    let full = [
        NATURAL_LANGUAGE_UNDERSTANDING,
        CODE_GENERATION,
        REASONING,
        INSTRUCTION_FOLLOWING,
        SYSTEM_DESIGN,
        DEBUGGING,
    ];

    vec![
        (
            "Claude-3.7-Sonnet",
            ExecutionProfile::new("Anthropic", "3.7", SizeTier::Standard)
                .with_capabilities(full)
                .with_score(REASONING, 0.9)
                .with_score(CODE_GENERATION, 0.85)
                .with_score(SYSTEM_DESIGN, 0.9)
                .with_score(DEBUGGING, 0.8)
                .with_cost(0.00000325, 0.0000155)
                .with_context_window(200_000)
                .with_description("Balanced general-purpose profile"),
        ),
        (
            "Claude-3.5-Sonnet",
            ExecutionProfile::new("Anthropic", "3.5", SizeTier::Standard)
                .with_capabilities(full)
                .with_score(REASONING, 0.85)
                .with_score(CODE_GENERATION, 0.8)
                .with_score(SYSTEM_DESIGN, 0.85)
                .with_score(DEBUGGING, 0.75)
                .with_cost(0.000003, 0.000015)
                .with_context_window(200_000)
                .with_description("Previous-generation balanced profile"),
        ),
        (
            "Claude-3.5-Haiku",
            ExecutionProfile::new("Anthropic", "3.5", SizeTier::Economy)
                .with_capabilities([
                    NATURAL_LANGUAGE_UNDERSTANDING,
                    CODE_GENERATION,
                    REASONING,
                    INSTRUCTION_FOLLOWING,
                ])
                .with_score(REASONING, 0.8)
                .with_score(CODE_GENERATION, 0.75)
                .with_score(SYSTEM_DESIGN, 0.7)
                .with_score(DEBUGGING, 0.65)
                .with_cost(0.00000025, 0.00000125)
                .with_context_window(200_000)
                .with_description("Fast, low-cost profile for simple tasks"),
        ),
        (
            "Claude-3.5-Opus",
            ExecutionProfile::new("Anthropic", "3.5", SizeTier::Premium)
                .with_capabilities(full)
                .with_capabilities([COMPLEX_REASONING])
                .with_score(REASONING, 0.95)
                .with_score(CODE_GENERATION, 0.9)
                .with_score(SYSTEM_DESIGN, 0.95)
                .with_score(DEBUGGING, 0.9)
                .with_cost(0.000015, 0.000075)
                .with_context_window(200_000)
                .with_description("Highest-capability profile for complex reasoning"),
        ),
        (
            "GPT-4o",
            ExecutionProfile::new("OpenAI", "4o", SizeTier::Standard)
                .with_capabilities(full)
                .with_score(REASONING, 0.9)
                .with_score(CODE_GENERATION, 0.9)
                .with_score(SYSTEM_DESIGN, 0.85)
                .with_score(DEBUGGING, 0.85)
                .with_cost(0.00001, 0.00003)
                .with_context_window(128_000)
                .with_description("General-purpose profile from a second provider"),
        ),
    ]
}
