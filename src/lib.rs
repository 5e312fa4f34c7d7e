//! Loose foreign key cleanup worker.
//!
//! Wires [`lfk_postgres::PgCleanupStore`] into the [`lfk_core`] processor and
//! runs it on an interval.

pub mod cli;
pub mod worker;

pub use cli::Cli;
pub use worker::CleanupWorker;
