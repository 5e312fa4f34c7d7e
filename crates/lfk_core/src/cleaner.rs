//! One bounded cleanup pass over a single child table.

use crate::config::CleanupConfig;
use crate::definition::{RelationDefinition, Strategy};
use crate::ports::{CleanupStore, Result};
use crate::types::{CleanupResult, DeletedParentBatch, LockMode};

/// Deletes or nullifies child rows of one relation, at most `batch_size`
/// rows per call. Callers loop until a pass affects nothing.
pub struct RelationCleaner<'a> {
    store: &'a dyn CleanupStore,
    relation: &'a RelationDefinition,
    parent_ids: Vec<i64>,
    lock_mode: LockMode,
    batch_size: i64,
}

impl<'a> RelationCleaner<'a> {
    pub fn new(
        store: &'a dyn CleanupStore,
        relation: &'a RelationDefinition,
        batch: &DeletedParentBatch,
        lock_mode: LockMode,
        config: &CleanupConfig,
    ) -> Self {
        let batch_size = match relation.strategy {
            Strategy::AsyncDelete => config.delete_batch_size,
            Strategy::AsyncNullify => config.update_batch_size,
        };

        Self {
            store,
            relation,
            parent_ids: batch.parent_ids(),
            lock_mode,
            batch_size,
        }
    }

    pub fn relation(&self) -> &RelationDefinition {
        self.relation
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    pub fn async_delete(&self) -> bool {
        self.relation.strategy == Strategy::AsyncDelete
    }

    pub fn async_nullify(&self) -> bool {
        self.relation.strategy == Strategy::AsyncNullify
    }

    /// Run one pass. Storage errors propagate unchanged.
    pub async fn execute(&self) -> Result<CleanupResult> {
        let affected_rows = if self.parent_ids.is_empty() {
            0
        } else {
            match self.relation.strategy {
                Strategy::AsyncDelete => {
                    self.store
                        .delete_children(
                            self.relation,
                            &self.parent_ids,
                            self.lock_mode,
                            self.batch_size,
                        )
                        .await?
                }
                Strategy::AsyncNullify => {
                    self.store
                        .nullify_children(
                            self.relation,
                            &self.parent_ids,
                            self.lock_mode,
                            self.batch_size,
                        )
                        .await?
                }
            }
        };

        tracing::trace!(
            target: "loose_fk.cleaner",
            table = %self.relation.child_table,
            column = %self.relation.column,
            lock_mode = %self.lock_mode,
            affected_rows,
            "cleanup pass"
        );

        Ok(CleanupResult {
            table: self.relation.child_table.clone(),
            affected_rows,
            kind: self.relation.strategy.modification_kind(),
            lock_mode: self.lock_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCleanupStore;
    use crate::types::ModificationKind;

    async fn seeded_store() -> (InMemoryCleanupStore, DeletedParentBatch) {
        let store = InMemoryCleanupStore::new();
        for _ in 0..3 {
            store.insert_row("issues", &[("project_id", Some(1))]).await;
        }
        store.insert_row("issues", &[("project_id", Some(7))]).await;
        let record = store.record_deletion("projects", 1).await;
        let batch = DeletedParentBatch::new("public.projects", vec![record]).unwrap();
        (store, batch)
    }

    #[tokio::test]
    async fn delete_pass_is_bounded_by_batch_size() {
        let (store, batch) = seeded_store().await;
        let relation = RelationDefinition::new("projects", "issues", "project_id", Strategy::AsyncDelete);
        let config = CleanupConfig {
            delete_batch_size: 2,
            ..CleanupConfig::default()
        };
        let cleaner = RelationCleaner::new(&store, &relation, &batch, LockMode::SkipLocked, &config);

        let first = cleaner.execute().await.unwrap();
        assert_eq!(first.affected_rows, 2);
        assert_eq!(first.kind, ModificationKind::Deletion);
        assert_eq!(first.lock_mode, LockMode::SkipLocked);

        assert_eq!(cleaner.execute().await.unwrap().affected_rows, 1);
        assert_eq!(cleaner.execute().await.unwrap().affected_rows, 0);
        assert_eq!(store.count_where("issues", "project_id", Some(7)).await, 1);
    }

    #[tokio::test]
    async fn nullify_pass_reports_updates() {
        let (store, batch) = seeded_store().await;
        let relation = RelationDefinition::new("projects", "issues", "project_id", Strategy::AsyncNullify);
        let cleaner = RelationCleaner::new(
            &store,
            &relation,
            &batch,
            LockMode::Blocking,
            &CleanupConfig::default(),
        );

        let result = cleaner.execute().await.unwrap();
        assert!(cleaner.async_nullify());
        assert_eq!(result.affected_rows, 3);
        assert_eq!(result.kind, ModificationKind::Update);
        assert_eq!(store.row_count("issues").await, 4);
        assert_eq!(store.count_where("issues", "project_id", None).await, 3);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let (store, _) = seeded_store().await;
        let relation = RelationDefinition::new("projects", "issues", "project_id", Strategy::AsyncDelete);
        let empty = DeletedParentBatch::new("public.projects", vec![]).unwrap();
        let cleaner = RelationCleaner::new(
            &store,
            &relation,
            &empty,
            LockMode::SkipLocked,
            &CleanupConfig::default(),
        );

        assert_eq!(cleaner.execute().await.unwrap().affected_rows, 0);
        assert!(store.passes().await.is_empty());
        assert_eq!(store.row_count("issues").await, 4);
    }

    #[tokio::test]
    async fn storage_errors_propagate() {
        let (store, batch) = seeded_store().await;
        store.fail_next("deadlock detected").await;
        let relation = RelationDefinition::new("projects", "issues", "project_id", Strategy::AsyncDelete);
        let cleaner = RelationCleaner::new(
            &store,
            &relation,
            &batch,
            LockMode::Blocking,
            &CleanupConfig::default(),
        );

        let err = cleaner.execute().await.unwrap_err();
        assert_eq!(err.to_string(), "storage: deadlock detected");
    }
}
