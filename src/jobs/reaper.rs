//! Periodic cleanup: stuck jobs, old jobs, expired archived sites.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::ReaperConfig;
use crate::store::{Store, StoreError};
use crate::types::ScanStatus;

/// What one sweep did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub stuck_jobs_failed: u64,
    pub old_jobs_deleted: u64,
    pub archived_sites_deleted: u64,
}

pub struct Reaper {
    store: Arc<dyn Store>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(store: Arc<dyn Store>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Sweep on the configured interval until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        info!("reaper running every {}ms", self.config.interval_ms);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) => {
                            if report.stuck_jobs_failed > 0
                                || report.old_jobs_deleted > 0
                                || report.archived_sites_deleted > 0
                            {
                                info!(
                                    "reaper sweep: {} stuck jobs failed, {} old jobs deleted, {} archived sites deleted",
                                    report.stuck_jobs_failed,
                                    report.old_jobs_deleted,
                                    report.archived_sites_deleted
                                );
                            }
                        }
                        Err(e) => warn!("reaper sweep failed: {}", e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("reaper shutting down");
                    return;
                }
            }
        }
    }

    /// One full sweep. Also callable through a `cleanup` job.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        // Stuck jobs: running past the hard cap, failed without retry
        let threshold = now - Duration::hours(self.config.stuck_job_hours as i64);
        let message = format!("timed out after {} hours", self.config.stuck_job_hours);
        for job in self.store.find_stuck_jobs(threshold).await? {
            if let Err(e) = self.store.fail_job(job.id, &message).await {
                warn!("stuck job {} could not be failed: {}", job.id, e);
                continue;
            }
            report.stuck_jobs_failed += 1;

            // A scan left running by the dead job goes down with it
            for mut scan in self.store.list_running_scans(job.site_id).await? {
                scan.status = ScanStatus::Failed;
                scan.completed_at = Some(now);
                scan.error = Some(message.clone());
                if let Err(e) = self.store.update_scan(scan).await {
                    warn!("stuck scan for job {} could not be failed: {}", job.id, e);
                }
            }
        }

        let job_cutoff = now - Duration::days(self.config.old_job_days as i64);
        report.old_jobs_deleted = self.store.delete_old_jobs(job_cutoff).await?;

        let site_cutoff = now - Duration::days(self.config.archive_retention_days as i64);
        report.archived_sites_deleted = self.store.delete_archived_sites(site_cutoff).await?;

        Ok(report)
    }
}
