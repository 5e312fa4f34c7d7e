//! In-memory `CleanupStore`.
//!
//! Child tables hold integer columns only. Rows can be marked as locked by a
//! "concurrent transaction": skip-locked passes leave them alone, blocking
//! passes wait for them, which here means the lock is released and the row is
//! taken.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::definition::RelationDefinition;
use crate::error::LfkError;
use crate::ports::{CleanupStore, Result};
use crate::types::{DeletedRecord, LockMode, RecordStatus};

#[derive(Debug, Default)]
struct MemoryTable {
    next_id: i64,
    rows: BTreeMap<i64, HashMap<String, Option<i64>>>,
    locked: BTreeSet<i64>,
}

/// Call made against the store, kept for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassLog {
    pub table: String,
    pub lock_mode: LockMode,
    pub affected_rows: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    deleted_records: Vec<DeletedRecord>,
    passes: Vec<PassLog>,
    waited_on_locks: u64,
    fail_next: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCleanupStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryCleanupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_table(&self, table: &str) {
        let mut state = self.state.write().await;
        state.tables.entry(table.to_string()).or_default();
    }

    /// Insert a row and return its generated id.
    pub async fn insert_row(&self, table: &str, values: &[(&str, Option<i64>)]) -> i64 {
        let mut state = self.state.write().await;
        let table = state.tables.entry(table.to_string()).or_default();
        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(
            id,
            values
                .iter()
                .map(|(column, value)| (column.to_string(), *value))
                .collect(),
        );
        id
    }

    pub async fn lock_row(&self, table: &str, row_id: i64) {
        let mut state = self.state.write().await;
        if let Some(table) = state.tables.get_mut(table) {
            table.locked.insert(row_id);
        }
    }

    pub async fn is_locked(&self, table: &str, row_id: i64) -> bool {
        let state = self.state.read().await;
        state
            .tables
            .get(table)
            .is_some_and(|t| t.locked.contains(&row_id))
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.read().await;
        state.tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Number of rows whose `column` equals `value`.
    pub async fn count_where(&self, table: &str, column: &str, value: Option<i64>) -> usize {
        let state = self.state.read().await;
        state.tables.get(table).map_or(0, |t| {
            t.rows
                .values()
                .filter(|row| row.get(column).copied().flatten() == value)
                .count()
        })
    }

    /// Append a pending record to the deleted-records log.
    pub async fn record_deletion(&self, parent_table: &str, primary_key_value: i64) -> DeletedRecord {
        let mut state = self.state.write().await;
        let record = DeletedRecord {
            id: state.deleted_records.len() as i64 + 1,
            fully_qualified_table_name: crate::definition::qualify(parent_table),
            primary_key_value,
            status: RecordStatus::Pending,
            created_at: Utc::now(),
        };
        state.deleted_records.push(record.clone());
        record
    }

    pub async fn deleted_records(&self) -> Vec<DeletedRecord> {
        self.state.read().await.deleted_records.clone()
    }

    pub async fn passes(&self) -> Vec<PassLog> {
        self.state.read().await.passes.clone()
    }

    /// Locks released by blocking passes so far.
    pub async fn waited_on_locks(&self) -> u64 {
        self.state.read().await.waited_on_locks
    }

    /// Make the next mutating call fail with a storage error.
    pub async fn fail_next(&self, message: &str) {
        self.state.write().await.fail_next = Some(message.to_string());
    }

    async fn clean(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
        nullify: bool,
    ) -> Result<u64> {
        let mut state = self.state.write().await;

        if let Some(message) = state.fail_next.take() {
            return Err(LfkError::Storage(anyhow::anyhow!(message)));
        }

        let table = state
            .tables
            .get_mut(&relation.child_table)
            .ok_or_else(|| LfkError::UnknownTable(relation.child_table.clone()))?;

        let mut waited = 0;
        let matching: Vec<i64> = table
            .rows
            .iter()
            .filter(|(_, row)| {
                row.get(&relation.column)
                    .copied()
                    .flatten()
                    .is_some_and(|v| parent_ids.contains(&v))
            })
            .map(|(id, _)| *id)
            .filter(|id| !(lock_mode.skips_locked() && table.locked.contains(id)))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect();

        for id in &matching {
            if table.locked.remove(id) {
                waited += 1;
            }
            if nullify {
                if let Some(row) = table.rows.get_mut(id) {
                    row.insert(relation.column.clone(), None);
                }
            } else {
                table.rows.remove(id);
            }
        }

        let affected_rows = matching.len() as u64;
        state.waited_on_locks += waited;
        state.passes.push(PassLog {
            table: relation.child_table.clone(),
            lock_mode,
            affected_rows,
        });
        Ok(affected_rows)
    }
}

#[async_trait]
impl CleanupStore for InMemoryCleanupStore {
    async fn delete_children(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
    ) -> Result<u64> {
        self.clean(relation, parent_ids, lock_mode, limit, false).await
    }

    async fn nullify_children(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
    ) -> Result<u64> {
        self.clean(relation, parent_ids, lock_mode, limit, true).await
    }

    async fn mark_processed_between(
        &self,
        parent_table: &str,
        first_id: i64,
        last_id: i64,
    ) -> Result<u64> {
        let mut state = self.state.write().await;

        if let Some(message) = state.fail_next.take() {
            return Err(LfkError::Storage(anyhow::anyhow!(message)));
        }

        let mut marked = 0;
        for record in state.deleted_records.iter_mut().filter(|r| {
            r.fully_qualified_table_name == parent_table
                && r.status == RecordStatus::Pending
                && (first_id..=last_id).contains(&r.id)
        }) {
            record.status = RecordStatus::Processed;
            marked += 1;
        }
        Ok(marked)
    }

    async fn load_pending(&self, parent_table: &str, limit: i64) -> Result<Vec<DeletedRecord>> {
        let state = self.state.read().await;
        Ok(state
            .deleted_records
            .iter()
            .filter(|r| r.fully_qualified_table_name == parent_table && r.status == RecordStatus::Pending)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}
