//! loose-fk-worker: drains the loose foreign key deleted-records log.
//!
//! Reads config from flags or env vars:
//!   LFK_DATABASE_URL     Postgres connection string (required)
//!   LFK_DEFINITIONS_PATH relation definitions YAML (required unless set in config)
//!   LFK_CONFIG_PATH      cleanup config YAML (optional)
//!   LFK_INTERVAL_MS      pause between invocations (default: 60000)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lfk_core::{DeletedRecordsProcessor, RelationRegistry};
use lfk_postgres::PgCleanupStore;
use loose_fk::{Cli, CleanupWorker};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loose_fk=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.cleanup_config()?;

    let definitions_path = config
        .definitions_path
        .clone()
        .context("No relation definitions: pass --definitions or set LFK_DEFINITIONS_PATH")?;
    let registry = RelationRegistry::from_path(&definitions_path)
        .with_context(|| format!("Failed to load {}", definitions_path.display()))?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    let store = PgCleanupStore::new(pool);
    if cli.migrate {
        store.migrate().await.context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }
    store
        .verify_schema(&registry)
        .await
        .context("Relation definitions do not match the database schema")?;

    let processor = DeletedRecordsProcessor::new(Arc::new(store), Arc::new(registry), config);
    let worker = CleanupWorker::new(processor, cli.interval(), cli.error_backoff());

    if cli.once {
        let report = worker.run_once().await?;
        tracing::info!(
            records_processed = report.records_processed(),
            deleted_rows = report.deleted_rows(),
            updated_rows = report.updated_rows(),
            over_limit = report.over_limit(),
            "Single invocation finished"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
    Ok(())
}
