//! Per-invocation modification budget.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::CleanupConfig;
use crate::types::{CleanupResult, ModificationKind};

/// Counts rows deleted and updated during one invocation.
///
/// Totals only ever grow; a tracker is created per invocation and dropped
/// afterwards.
#[derive(Debug, Clone)]
pub struct ModificationTracker {
    max_modifications: u64,
    max_runtime: Option<Duration>,
    started_at: Instant,
    deletions: BTreeMap<String, u64>,
    updates: BTreeMap<String, u64>,
}

/// Snapshot of a tracker, suitable for structured logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub deletions: BTreeMap<String, u64>,
    pub updates: BTreeMap<String, u64>,
    pub total: u64,
}

impl ModificationTracker {
    pub fn new(max_modifications: u64) -> Self {
        Self {
            max_modifications,
            max_runtime: None,
            started_at: Instant::now(),
            deletions: BTreeMap::new(),
            updates: BTreeMap::new(),
        }
    }

    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = Some(max_runtime);
        self
    }

    pub fn from_config(config: &CleanupConfig) -> Self {
        let tracker = Self::new(config.max_modifications);
        match config.max_runtime() {
            Some(runtime) => tracker.with_max_runtime(runtime),
            None => tracker,
        }
    }

    pub fn add_deletions(&mut self, table: &str, count: u64) {
        if count == 0 {
            return;
        }
        *self.deletions.entry(table.to_string()).or_default() += count;
    }

    pub fn add_updates(&mut self, table: &str, count: u64) {
        if count == 0 {
            return;
        }
        *self.updates.entry(table.to_string()).or_default() += count;
    }

    /// Route a pass result to the matching bucket.
    pub fn record(&mut self, result: &CleanupResult) {
        match result.kind {
            ModificationKind::Deletion => self.add_deletions(&result.table, result.affected_rows),
            ModificationKind::Update => self.add_updates(&result.table, result.affected_rows),
        }
    }

    pub fn deletions(&self) -> u64 {
        self.deletions.values().sum()
    }

    pub fn updates(&self) -> u64 {
        self.updates.values().sum()
    }

    pub fn deletions_for(&self, table: &str) -> u64 {
        self.deletions.get(table).copied().unwrap_or(0)
    }

    pub fn updates_for(&self, table: &str) -> u64 {
        self.updates.get(table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.deletions() + self.updates()
    }

    pub fn max_modifications(&self) -> u64 {
        self.max_modifications
    }

    pub fn over_limit(&self) -> bool {
        self.total() >= self.max_modifications || self.runtime_exceeded()
    }

    fn runtime_exceeded(&self) -> bool {
        self.max_runtime
            .is_some_and(|limit| self.started_at.elapsed() >= limit)
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            deletions: self.deletions.clone(),
            updates: self.updates.clone(),
            total: self.total(),
        }
    }
}
