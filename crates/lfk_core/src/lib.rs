//! Loose foreign key cleanup core.
//!
//! Parent rows deleted upstream are captured in a deleted-records log. This
//! crate drains that log: child rows referencing deleted parents are removed
//! or nullified in bounded passes, under a per-invocation modification budget,
//! and log records are marked processed only once every relation is clean.
//!
//! Storage is reached through [`ports::CleanupStore`]; `lfk_postgres`
//! provides the Postgres adapter and [`memory::InMemoryCleanupStore`] backs
//! the tests.

pub mod batch;
pub mod cleaner;
pub mod config;
pub mod definition;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod ports;
pub mod process;
pub mod tracker;
pub mod types;

pub use batch::{BatchCleaner, BatchOutcome, BatchState};
pub use cleaner::RelationCleaner;
pub use config::CleanupConfig;
pub use definition::{RelationDefinition, RelationRegistry, Strategy};
pub use error::LfkError;
pub use hooks::{CleanupHook, NoopHook, RelationSummary};
pub use ports::CleanupStore;
pub use process::{DeletedRecordsProcessor, ProcessReport};
pub use tracker::{ModificationTracker, TrackerStats};
pub use types::{
    CleanupResult, DeletedParentBatch, DeletedRecord, LockMode, ModificationKind, RecordStatus,
};
