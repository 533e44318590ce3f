use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::store::JobStore;
use crate::models::job::Job;

/// §4.4. A startup sweep plus a periodic sweep, both running the same
/// rule: any `running` job whose lease has expired goes back to `queued`.
/// Implemented as a plain `tokio::time::interval` loop rather than
/// `tokio-cron-scheduler` (see DESIGN.md) since there is exactly one
/// fixed-period condition to check, not a calendar schedule.
#[derive(Clone)]
pub struct Recovery {
    store: JobStore,
    interval: Duration,
}

impl Recovery {
    pub fn new(store: JobStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub async fn sweep_once(&self) -> Result<usize, AppError> {
        let stuck = self.store.list_stuck(Utc::now()).await?;
        let mut reclaimed = 0;
        for job in stuck {
            match self.store.requeue_stuck(job.id).await {
                Ok(true) => {
                    reclaimed += 1;
                    info!(job_id = %job.id, "recovery: requeued orphaned job");
                }
                Ok(false) => {
                    // Raced with the owning worker's own finalize/heartbeat; not an error.
                }
                Err(e) => warn!(job_id = %job.id, error = %e, "recovery: requeue failed"),
            }
        }
        Ok(reclaimed)
    }

    /// Runs the startup sweep once, then spawns the periodic sweep as a
    /// background task for the lifetime of the process.
    pub fn spawn(self) {
        tokio::spawn(async move {
            if let Err(e) = self.sweep_once().await {
                warn!(error = %e, "recovery: startup sweep failed");
            }
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await; // skip the immediate first tick; startup sweep already ran
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    warn!(error = %e, "recovery: periodic sweep failed");
                }
            }
        });
    }

    /// Operator override (§4.4, POST /admin/jobs/{id}/recover): force a
    /// specific job back to `queued` or to `failed` regardless of lease
    /// state.
    pub async fn force_one(&self, job_id: Uuid, to_failed: bool) -> Result<Job, AppError> {
        self.store.force_override(job_id, to_failed).await
    }

    /// POST /admin/jobs/recover-all: force every currently-stuck job back
    /// to `queued`.
    pub async fn force_all(&self) -> Result<usize, AppError> {
        self.sweep_once().await
    }
}
