//! Extension points around batch cleanup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::definition::{RelationDefinition, Strategy};

/// Per-relation totals for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSummary {
    pub child_table: String,
    pub column: String,
    pub strategy: Strategy,
    pub skip_locked_rows: u64,
    pub blocking_rows: u64,
    pub passes: u32,
    /// No matching child rows were left behind.
    pub drained: bool,
}

impl RelationSummary {
    pub fn new(relation: &RelationDefinition) -> Self {
        Self {
            child_table: relation.child_table.clone(),
            column: relation.column.clone(),
            strategy: relation.strategy,
            skip_locked_rows: 0,
            blocking_rows: 0,
            passes: 0,
            drained: false,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.skip_locked_rows + self.blocking_rows
    }
}

/// Observer invoked by the batch cleaner. All methods default to no-ops.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn before_relation(&self, _relation: &RelationDefinition) {}

    async fn after_relation(&self, _relation: &RelationDefinition, _summary: &RelationSummary) {}

    async fn on_finalized(&self, _parent_table: &str, _marked_processed: u64) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl CleanupHook for NoopHook {}
