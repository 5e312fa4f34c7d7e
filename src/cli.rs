//! Command-line and environment settings for the worker binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lfk_core::CleanupConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "loose-fk-worker", about = "Drain the loose foreign key deleted-records log")]
pub struct Cli {
    /// Postgres connection string
    #[arg(long, env = "LFK_DATABASE_URL")]
    pub database_url: String,

    /// YAML cleanup configuration (budget, batch sizes, toggles)
    #[arg(long, env = "LFK_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// YAML relation definitions; overrides `definitions_path` from the config file
    #[arg(long, env = "LFK_DEFINITIONS_PATH")]
    pub definitions: Option<PathBuf>,

    /// Pause between invocations when the log is drained
    #[arg(long, env = "LFK_INTERVAL_MS", default_value_t = 60_000)]
    pub interval_ms: u64,

    /// Pause after a failed invocation
    #[arg(long, env = "LFK_ERROR_BACKOFF_MS", default_value_t = 5_000)]
    pub error_backoff_ms: u64,

    /// Apply the bundled deleted-records migration on startup
    #[arg(long, env = "LFK_RUN_MIGRATIONS")]
    pub migrate: bool,

    /// Run a single invocation and exit
    #[arg(long)]
    pub once: bool,

    #[arg(long, env = "LFK_MAX_CONNECTIONS", default_value_t = 2)]
    pub max_connections: u32,
}

impl Cli {
    /// Load the cleanup config from file (if any), then apply `LFK_*`
    /// environment overrides and the `--definitions` flag.
    pub fn cleanup_config(&self) -> Result<CleanupConfig> {
        let config = match &self.config {
            Some(path) => CleanupConfig::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => CleanupConfig::default(),
        };
        let mut config = config
            .with_env_overrides()
            .context("Invalid LFK_* environment override")?;

        if let Some(definitions) = &self.definitions {
            config.definitions_path = Some(definitions.clone());
        }
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
