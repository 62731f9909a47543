use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::DEFAULT_PROFILE;
use crate::orchestration::{CoordinatorConfig, RecoveryPolicy, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES};
use crate::{Error, Result};

pub const ENV_DEFAULT_PROFILE: &str = "MAESTRO_DEFAULT_PROFILE";
pub const ENV_AUTO_SELECT: &str = "MAESTRO_AUTO_SELECT";
pub const ENV_MAX_RETRIES: &str = "MAESTRO_MAX_RETRIES";
pub const ENV_MAX_CONCURRENT: &str = "MAESTRO_MAX_CONCURRENT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_profile: String,
    pub auto_select: bool,
    pub max_retries: u32,
    pub retry_delays_secs: Vec<u64>,
    pub max_concurrent: usize,
    pub dispatch_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: DEFAULT_PROFILE.to_string(),
            auto_select: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delays_secs: vec![5, 15, 30],
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            dispatch_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn maestro_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".maestro"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::maestro_dir()?.join("maestro.toml"))
    }

    /// Load `~/.maestro/maestro.toml` and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading config");
        if !path.exists() {
            tracing::debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        tracing::debug!(?config, "config loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Change the persisted default profile in the file at `path`.
    ///
    /// Reads the file as written, without environment overrides, so only
    /// `default_profile` changes on disk.
    pub fn persist_default_profile(path: &Path, name: &str) -> Result<Self> {
        let mut stored = Self::load_from(path)?;
        stored.default_profile = name.to_string();
        stored.save_to(path)?;
        Ok(stored)
    }

    /// Override fields from `MAESTRO_*` variables resolved by `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(profile) = lookup(ENV_DEFAULT_PROFILE) {
            self.default_profile = profile;
        }
        if let Some(value) = lookup(ENV_AUTO_SELECT) {
            self.auto_select = parse_bool(ENV_AUTO_SELECT, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENT) {
            self.max_concurrent = parse_number(ENV_MAX_CONCURRENT, &value)?;
        }
        Ok(())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let recovery = RecoveryPolicy::with_max_retries(self.max_retries).retry_delays(
            self.retry_delays_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        );
        let config = CoordinatorConfig::default()
            .with_max_concurrent(self.max_concurrent)
            .with_recovery(recovery)
            .with_auto_select(self.auto_select);
        match self.dispatch_timeout_secs {
            Some(secs) => config.with_dispatch_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config {
            key: key.to_string(),
            message: format!("expected a boolean, got {:?}", value),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::Config {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got {:?}", value),
    })
}
