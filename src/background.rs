//! Cancellable periodic background tasks.
//!
//! Both the expiry reaper and the rate-limit eviction sweep are loops that
//! tick on a fixed period until shutdown. [`PeriodicTask`] wraps such a loop
//! with an explicit stop handle so tests can start and stop it
//! deterministically.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a spawned periodic task.
pub struct PeriodicTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period` until `shutdown` is cancelled.
    ///
    /// With `run_immediately` the first tick fires right away; otherwise it
    /// fires one `period` after spawning. A tick that overruns its period
    /// delays the next one instead of bursting to catch up.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        run_immediately: bool,
        shutdown: &CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = shutdown.child_token();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let start = if run_immediately {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(task = name, period_secs = period.as_secs(), "Background task started");

            loop {
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }

            debug!(task = name, "Background task stopped");
        });

        Self {
            name,
            token,
            handle,
        }
    }

    /// Returns the task name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the task and wait for the loop to exit.
    ///
    /// A tick already in progress runs to completion first.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "Background task ended abnormally");
        }
    }
}
