//! Periodic recovery of jobs whose worker went away.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::JobRunner;

/// Re-runs the restartable-jobs query on an interval and starts whatever
/// it finds. Stops when the runner shuts down.
pub struct RecoveryScanner {
    runner: JobRunner,
    interval: Duration,
}

impl RecoveryScanner {
    pub fn new(runner: JobRunner, interval: Duration) -> Self {
        Self { runner, interval }
    }

    /// One scan. Returns how many jobs were started.
    pub async fn scan_once(&self) -> usize {
        match self.runner.resume_restartable_jobs().await {
            Ok(started) => started,
            Err(e) => {
                warn!("Recovery scan failed: {}", e);
                0
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let shutdown = self.runner.shutdown_token();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!("Recovery scanner stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.scan_once().await;
                    }
                }
            }
        })
    }
}
