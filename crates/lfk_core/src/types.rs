//! Domain types shared by the tracker, cleaner and orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LfkError;

/// Status of a row in the deleted-records log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for RecordStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            _ => Err(format!("Unknown deleted record status: {}", s)),
        }
    }
}

/// One parent row removed upstream, as captured by the deletion trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    /// Log sequence; orders records within a table.
    pub id: i64,
    pub fully_qualified_table_name: String,
    pub primary_key_value: i64,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

/// A contiguous run of pending deleted records for a single parent table,
/// ordered by log id.
#[derive(Debug, Clone, Default)]
pub struct DeletedParentBatch {
    parent_table: String,
    records: Vec<DeletedRecord>,
}

impl DeletedParentBatch {
    pub fn new(
        parent_table: impl Into<String>,
        mut records: Vec<DeletedRecord>,
    ) -> Result<Self, LfkError> {
        let parent_table = parent_table.into();

        if let Some(stray) = records
            .iter()
            .find(|r| r.fully_qualified_table_name != parent_table)
        {
            return Err(LfkError::InvalidInput(format!(
                "deleted record {} belongs to {}, not {}",
                stray.id, stray.fully_qualified_table_name, parent_table
            )));
        }

        records.sort_by_key(|r| r.id);

        Ok(Self {
            parent_table,
            records,
        })
    }

    pub fn parent_table(&self) -> &str {
        &self.parent_table
    }

    pub fn records(&self) -> &[DeletedRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn first(&self) -> Option<&DeletedRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&DeletedRecord> {
        self.records.last()
    }

    /// Inclusive log-id range spanning the batch.
    pub fn id_range(&self) -> Option<(i64, i64)> {
        Some((self.first()?.id, self.last()?.id))
    }

    /// Distinct parent primary keys referenced by the batch.
    pub fn parent_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.records.iter().map(|r| r.primary_key_value).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Row-locking behaviour of a bounded cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Wait for locks held by concurrent writers.
    Blocking,
    /// Exclude rows locked by concurrent writers from the pass.
    SkipLocked,
}

impl LockMode {
    pub fn skips_locked(&self) -> bool {
        matches!(self, Self::SkipLocked)
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::SkipLocked => write!(f, "skip_locked"),
        }
    }
}

/// Whether a pass removed rows or rewrote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Deletion,
    Update,
}

/// Outcome of one bounded pass against one child table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub table: String,
    pub affected_rows: u64,
    pub kind: ModificationKind,
    pub lock_mode: LockMode,
}
