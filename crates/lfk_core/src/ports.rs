//! Storage port for loose foreign key cleanup.
//! Implemented by lfk_postgres; cleanup logic depends only on this trait.

use async_trait::async_trait;

use crate::definition::RelationDefinition;
use crate::error::LfkError;
use crate::types::{DeletedRecord, LockMode};

pub type Result<T> = std::result::Result<T, LfkError>;

/// Storage operations needed to drain the deleted-records log.
///
/// Every mutating call is one bounded statement in its own transaction.
/// Errors are returned as-is; callers never retry internally.
#[async_trait]
pub trait CleanupStore: Send + Sync {
    /// Delete up to `limit` child rows whose `relation.column` references any
    /// of `parent_ids`. Returns the number of rows deleted.
    async fn delete_children(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
    ) -> Result<u64>;

    /// Set `relation.column` to NULL on up to `limit` child rows referencing
    /// any of `parent_ids`. Returns the number of rows updated.
    async fn nullify_children(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
    ) -> Result<u64>;

    /// Mark pending deleted records of `parent_table` with log ids in
    /// `first_id..=last_id` as processed. Returns the number marked.
    async fn mark_processed_between(
        &self,
        parent_table: &str,
        first_id: i64,
        last_id: i64,
    ) -> Result<u64>;

    /// Load up to `limit` pending deleted records for `parent_table`,
    /// ordered by log id.
    async fn load_pending(&self, parent_table: &str, limit: i64) -> Result<Vec<DeletedRecord>>;
}
