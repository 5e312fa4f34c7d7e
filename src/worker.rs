//! CleanupWorker: background loop that repeatedly invokes the deleted-records
//! processor.
//!
//! An invocation that stops on the modification budget is followed by another
//! one straight away; a drained log waits `interval` before polling again.
//! Failed invocations are logged and retried after `error_backoff`. Retrying
//! is safe because a rerun only matches child rows that still exist.

use std::time::Duration;

use lfk_core::{DeletedRecordsProcessor, ProcessReport};
use tokio::sync::watch;
use tracing::{debug, error, info};

pub struct CleanupWorker {
    processor: DeletedRecordsProcessor,
    interval: Duration,
    error_backoff: Duration,
}

impl CleanupWorker {
    pub fn new(processor: DeletedRecordsProcessor, interval: Duration, error_backoff: Duration) -> Self {
        Self {
            processor,
            interval,
            error_backoff,
        }
    }

    /// Run one invocation.
    pub async fn run_once(&self) -> lfk_core::ports::Result<ProcessReport> {
        self.processor.execute().await
    }

    /// Run until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Cleanup worker started (interval={:?}, error_backoff={:?})",
            self.interval, self.error_backoff
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_once().await {
                Ok(report) if report.over_limit() => {
                    debug!(
                        deleted_rows = report.deleted_rows(),
                        updated_rows = report.updated_rows(),
                        "Budget exhausted, continuing immediately"
                    );
                    continue;
                }
                Ok(_) => self.interval,
                Err(e) => {
                    error!(error = %e, "Loose foreign key cleanup failed");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Cleanup worker shutting down");
    }
}
