//! Cleanup configuration.
//!
//! Loaded from YAML, then overridden by `LFK_*` environment variables, then
//! validated. Every toggle the cleanup path consults lives here so a run is
//! fully determined by the value passed in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LfkError;

/// Configuration for the cleanup worker and the per-invocation budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    /// Ceiling on deletions + updates per invocation.
    pub max_modifications: u64,
    /// Wall-clock limit per invocation in seconds. `0` disables it.
    pub max_runtime_secs: u64,
    /// Rows removed per bounded delete pass.
    pub delete_batch_size: i64,
    /// Rows rewritten per bounded nullify pass.
    pub update_batch_size: i64,
    /// Deleted records loaded per parent table per invocation.
    pub records_per_table: i64,
    /// Run a skip-locked phase before the blocking phase of each relation.
    pub skip_locked_pass: bool,
    /// Upper bound on consecutive non-empty passes in one phase.
    pub max_passes_per_phase: Option<u32>,
    /// YAML file holding relation definitions.
    pub definitions_path: Option<PathBuf>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_modifications: 100_000,
            max_runtime_secs: 30,
            delete_batch_size: 1000,
            update_batch_size: 500,
            records_per_table: 500,
            skip_locked_pass: true,
            max_passes_per_phase: None,
            definitions_path: None,
        }
    }
}

impl CleanupConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, LfkError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| LfkError::Config(format!("invalid cleanup config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LfkError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LfkError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_yaml_str(&content)
    }

    /// Apply `LFK_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, LfkError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `LFK_*` overrides from an arbitrary lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, LfkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, LfkError> {
            value
                .trim()
                .parse()
                .map_err(|_| LfkError::Config(format!("{key} has invalid value {value:?}")))
        }

        if let Some(v) = lookup("LFK_MAX_MODIFICATIONS") {
            self.max_modifications = parse("LFK_MAX_MODIFICATIONS", v)?;
        }
        if let Some(v) = lookup("LFK_MAX_RUNTIME_SECS") {
            self.max_runtime_secs = parse("LFK_MAX_RUNTIME_SECS", v)?;
        }
        if let Some(v) = lookup("LFK_DELETE_BATCH_SIZE") {
            self.delete_batch_size = parse("LFK_DELETE_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("LFK_UPDATE_BATCH_SIZE") {
            self.update_batch_size = parse("LFK_UPDATE_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("LFK_RECORDS_PER_TABLE") {
            self.records_per_table = parse("LFK_RECORDS_PER_TABLE", v)?;
        }
        if let Some(v) = lookup("LFK_SKIP_LOCKED_PASS") {
            self.skip_locked_pass = parse("LFK_SKIP_LOCKED_PASS", v)?;
        }
        if let Some(v) = lookup("LFK_MAX_PASSES_PER_PHASE") {
            self.max_passes_per_phase = Some(parse("LFK_MAX_PASSES_PER_PHASE", v)?);
        }
        if let Some(v) = lookup("LFK_DEFINITIONS_PATH") {
            self.definitions_path = Some(PathBuf::from(v));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), LfkError> {
        if self.max_modifications == 0 {
            return Err(LfkError::Config(
                "max_modifications must be greater than zero".into(),
            ));
        }
        if self.delete_batch_size <= 0 || self.update_batch_size <= 0 {
            return Err(LfkError::Config(
                "batch sizes must be greater than zero".into(),
            ));
        }
        if self.records_per_table <= 0 {
            return Err(LfkError::Config(
                "records_per_table must be greater than zero".into(),
            ));
        }
        if self.max_passes_per_phase == Some(0) {
            return Err(LfkError::Config(
                "max_passes_per_phase must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_secs > 0).then(|| Duration::from_secs(self.max_runtime_secs))
    }
}
