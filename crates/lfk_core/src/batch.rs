//! Batch cleanup for one parent table.
//!
//! For every relation declared by the parent table, in declaration order:
//! skip-locked passes until drained, then blocking passes until drained.
//! The modification tracker is consulted after every pass; once it reports
//! over-limit no further pass starts and nothing is marked processed.
//! Only when every relation drained within budget are the batch's deleted
//! records marked processed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cleaner::RelationCleaner;
use crate::config::CleanupConfig;
use crate::definition::{RelationDefinition, RelationRegistry};
use crate::hooks::{CleanupHook, NoopHook, RelationSummary};
use crate::ports::{CleanupStore, Result};
use crate::tracker::ModificationTracker;
use crate::types::{DeletedParentBatch, LockMode};

static NOOP_HOOK: NoopHook = NoopHook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    RunningRelations,
    Finalizing,
    Done,
}

/// How a phase of passes ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseEnd {
    Drained,
    OverLimit,
    PassLimit,
}

/// Result of one batch cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub parent_table: String,
    pub state: BatchState,
    pub finalized: bool,
    pub marked_processed: u64,
    pub over_limit: bool,
    pub relations: Vec<RelationSummary>,
}

pub struct BatchCleaner<'a> {
    store: &'a dyn CleanupStore,
    registry: &'a RelationRegistry,
    batch: &'a DeletedParentBatch,
    config: &'a CleanupConfig,
    hook: &'a dyn CleanupHook,
}

impl<'a> BatchCleaner<'a> {
    pub fn new(
        store: &'a dyn CleanupStore,
        registry: &'a RelationRegistry,
        batch: &'a DeletedParentBatch,
        config: &'a CleanupConfig,
    ) -> Self {
        Self {
            store,
            registry,
            batch,
            config,
            hook: &NOOP_HOOK,
        }
    }

    pub fn with_hook(mut self, hook: &'a dyn CleanupHook) -> Self {
        self.hook = hook;
        self
    }

    pub async fn execute(&self, tracker: &mut ModificationTracker) -> Result<BatchOutcome> {
        let parent_table = self.batch.parent_table().to_string();
        let mut outcome = BatchOutcome {
            parent_table: parent_table.clone(),
            state: BatchState::RunningRelations,
            finalized: false,
            marked_processed: 0,
            over_limit: false,
            relations: Vec::new(),
        };

        let Some((first_id, last_id)) = self.batch.id_range() else {
            outcome.state = BatchState::Done;
            return Ok(outcome);
        };

        let mut incomplete = false;

        for relation in self.registry.definitions_for(&parent_table) {
            self.hook.before_relation(relation).await;

            let mut summary = RelationSummary::new(relation);
            let end = self.clean_relation(relation, tracker, &mut summary).await?;
            summary.drained = end == PhaseEnd::Drained;

            self.hook.after_relation(relation, &summary).await;
            outcome.relations.push(summary);

            match end {
                PhaseEnd::Drained => {}
                PhaseEnd::PassLimit => incomplete = true,
                PhaseEnd::OverLimit => {
                    outcome.over_limit = true;
                    outcome.state = BatchState::Done;
                    info!(
                        target: "loose_fk.batch",
                        parent_table = %parent_table,
                        child_table = %relation.child_table,
                        total = tracker.total(),
                        "modification budget exhausted, leaving batch pending"
                    );
                    return Ok(outcome);
                }
            }
        }

        if incomplete {
            outcome.state = BatchState::Done;
            info!(
                target: "loose_fk.batch",
                parent_table = %parent_table,
                "pass limit reached, leaving batch pending"
            );
            return Ok(outcome);
        }

        outcome.state = BatchState::Finalizing;
        outcome.marked_processed = self
            .store
            .mark_processed_between(&parent_table, first_id, last_id)
            .await?;
        outcome.finalized = true;
        self.hook
            .on_finalized(&parent_table, outcome.marked_processed)
            .await;

        debug!(
            target: "loose_fk.batch",
            parent_table = %parent_table,
            first_id,
            last_id,
            marked = outcome.marked_processed,
            "deleted records processed"
        );

        outcome.state = BatchState::Done;
        Ok(outcome)
    }

    async fn clean_relation(
        &self,
        relation: &RelationDefinition,
        tracker: &mut ModificationTracker,
        summary: &mut RelationSummary,
    ) -> Result<PhaseEnd> {
        // A pass limit in the skip-locked phase only hands over to the blocking
        // phase, which decides whether the relation is drained.
        if self.config.skip_locked_pass {
            let end = self
                .run_phase(relation, LockMode::SkipLocked, tracker, summary)
                .await?;
            if end == PhaseEnd::OverLimit {
                return Ok(end);
            }
        }

        self.run_phase(relation, LockMode::Blocking, tracker, summary)
            .await
    }

    async fn run_phase(
        &self,
        relation: &RelationDefinition,
        lock_mode: LockMode,
        tracker: &mut ModificationTracker,
        summary: &mut RelationSummary,
    ) -> Result<PhaseEnd> {
        let cleaner = RelationCleaner::new(self.store, relation, self.batch, lock_mode, self.config);
        let mut non_empty_passes = 0u32;

        loop {
            let result = cleaner.execute().await?;
            tracker.record(&result);

            summary.passes += 1;
            match lock_mode {
                LockMode::SkipLocked => summary.skip_locked_rows += result.affected_rows,
                LockMode::Blocking => summary.blocking_rows += result.affected_rows,
            }

            if tracker.over_limit() {
                return Ok(PhaseEnd::OverLimit);
            }
            if result.affected_rows == 0 {
                return Ok(PhaseEnd::Drained);
            }

            non_empty_passes += 1;
            if self
                .config
                .max_passes_per_phase
                .is_some_and(|max| non_empty_passes >= max)
            {
                return Ok(PhaseEnd::PassLimit);
            }
        }
    }
}
