//! PostgreSQL adapter for loose foreign key cleanup.
//!
//! Implements [`lfk_core::ports::CleanupStore`] on a `PgPool`. Bounded passes
//! use `FOR UPDATE SKIP LOCKED` or `FOR UPDATE` depending on the lock mode.

pub mod queries;
pub mod store;

pub use store::PgCleanupStore;
