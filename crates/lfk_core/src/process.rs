//! Scheduler-facing entry point: drain pending deleted records for every
//! parent table that declares relations, under one shared budget.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchCleaner, BatchOutcome};
use crate::config::CleanupConfig;
use crate::definition::RelationRegistry;
use crate::hooks::{CleanupHook, NoopHook};
use crate::ports::{CleanupStore, Result};
use crate::tracker::{ModificationTracker, TrackerStats};
use crate::types::DeletedParentBatch;

/// Summary of one processor invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub batches: Vec<BatchOutcome>,
    pub stats: TrackerStats,
    /// The invocation stopped on the budget with work possibly left over.
    pub over_limit: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProcessReport {
    pub fn deleted_rows(&self) -> u64 {
        self.stats.deletions.values().sum()
    }

    pub fn updated_rows(&self) -> u64 {
        self.stats.updates.values().sum()
    }

    pub fn over_limit(&self) -> bool {
        self.over_limit
    }

    pub fn records_processed(&self) -> u64 {
        self.batches.iter().map(|b| b.marked_processed).sum()
    }
}

pub struct DeletedRecordsProcessor {
    store: Arc<dyn CleanupStore>,
    registry: Arc<RelationRegistry>,
    config: CleanupConfig,
    hook: Arc<dyn CleanupHook>,
}

impl DeletedRecordsProcessor {
    pub fn new(
        store: Arc<dyn CleanupStore>,
        registry: Arc<RelationRegistry>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            hook: Arc::new(NoopHook),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn CleanupHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Run one invocation with a fresh tracker.
    pub async fn execute(&self) -> Result<ProcessReport> {
        let started_at = Utc::now();
        let mut tracker = ModificationTracker::from_config(&self.config);
        let mut batches = Vec::new();
        let mut over_limit = false;

        for parent_table in self.registry.parent_tables() {
            if tracker.over_limit() {
                over_limit = true;
                break;
            }

            let records = self
                .store
                .load_pending(parent_table, self.config.records_per_table)
                .await?;
            if records.is_empty() {
                continue;
            }

            let batch = DeletedParentBatch::new(parent_table, records)?;
            let outcome = BatchCleaner::new(
                self.store.as_ref(),
                &self.registry,
                &batch,
                &self.config,
            )
            .with_hook(self.hook.as_ref())
            .execute(&mut tracker)
            .await?;

            let stop = outcome.over_limit;
            batches.push(outcome);
            if stop {
                over_limit = true;
                break;
            }
        }

        let report = ProcessReport {
            batches,
            stats: tracker.stats(),
            over_limit,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            target: "loose_fk.process",
            tables = report.batches.len(),
            records_processed = report.records_processed(),
            deleted_rows = report.deleted_rows(),
            updated_rows = report.updated_rows(),
            over_limit = report.over_limit(),
            "loose foreign key cleanup completed"
        );
        if let Ok(stats) = serde_json::to_string(&report.stats) {
            tracing::debug!(target: "loose_fk.process", stats = %stats, "modifications by table");
        }

        Ok(report)
    }
}
