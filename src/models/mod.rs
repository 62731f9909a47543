//! Execution profile catalog and selection policy.

pub mod catalog;
pub mod selector;

pub use catalog::{
    capability, Criteria, ExecutionProfile, ModelCatalog, ProfileCost, SizeTier, DEFAULT_PROFILE,
};
pub use selector::{required_capabilities, ModelSelector, TaskDescription};
