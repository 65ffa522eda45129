//! Expiry reaper: runs the content sweep at startup and then periodically.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::store::{ContentStore, SweepReport};
use crate::background::PeriodicTask;
use crate::metrics;

/// Periodic driver for [`ContentStore::sweep_expired`].
#[derive(Clone)]
pub struct ExpiryReaper {
    store: ContentStore,
    interval: Duration,
}

impl ExpiryReaper {
    /// Create a reaper sweeping `store` every `interval`.
    pub const fn new(store: ContentStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run one sweep and record its outcome.
    pub async fn run_once(&self) -> SweepReport {
        let report = self.store.sweep_expired().await;
        metrics::record_sweep(&report);

        if report.is_clean() {
            info!(
                examined = report.examined,
                records_removed = report.records_removed,
                files_removed = report.files_removed,
                files_missing = report.files_missing,
                "Expiry sweep finished"
            );
        } else {
            warn!(
                examined = report.examined,
                records_removed = report.records_removed,
                file_errors = report.file_errors,
                record_errors = report.record_errors,
                query_failed = report.query_failed,
                "Expiry sweep finished with failures"
            );
        }
        report
    }

    /// Start sweeping: once immediately, then every interval until `shutdown`.
    pub fn start(self, shutdown: &CancellationToken) -> PeriodicTask {
        let interval = self.interval;
        PeriodicTask::spawn("expiry-reaper", interval, true, shutdown, move || {
            let reaper = self.clone();
            async move {
                reaper.run_once().await;
            }
        })
    }
}
