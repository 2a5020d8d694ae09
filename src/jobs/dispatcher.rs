//! Polling job dispatcher.
//!
//! A single logical dispatcher polls the queue, claims jobs through the
//! store's CAS lease, and runs each claimed job on its own task under a
//! concurrency cap. Failures come back here: the dispatcher alone decides
//! between re-queue and terminal failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::compare;
use crate::config::{CrawlerConfig, DispatcherConfig, ReaperConfig};
use crate::metrics::MonitorMetrics;
use crate::scan::{run_scan_job, ScanOutcome};
use crate::store::Store;
use crate::types::{Job, JobId, JobType, SiteId};

/// Payload delivered by an external work queue. The dispatcher treats it as
/// a hint: the lease CAS still decides who runs the job, so duplicate
/// deliveries are harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMessage {
    pub job_id: JobId,
    pub site_id: SiteId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    crawler_config: CrawlerConfig,
    reaper_config: ReaperConfig,
    config: DispatcherConfig,
    metrics: Arc<MonitorMetrics>,
    slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        crawler_config: CrawlerConfig,
        reaper_config: ReaperConfig,
        config: DispatcherConfig,
        metrics: Arc<MonitorMetrics>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_scans));
        Self {
            store,
            crawler_config,
            reaper_config,
            config,
            metrics,
            slots,
        }
    }

    /// Poll until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        info!(
            "dispatcher polling every {}ms, {} concurrent scans",
            self.config.poll_ms, self.config.max_concurrent_scans
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("dispatcher poll failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("dispatcher shutting down");
                    return;
                }
            }
        }
    }

    /// One poll: claim and launch as many due jobs as free slots allow.
    pub async fn poll_once(&self) -> Result<(), crate::store::StoreError> {
        if self.slots.available_permits() == 0 {
            return Ok(());
        }

        let queued = self.store.list_queued_jobs(self.config.poll_batch).await?;
        for job in queued {
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };

            if !self.store.acquire_job_lease(job.id).await? {
                // Another instance got there first
                debug!("job {} already leased", job.id);
                drop(permit);
                continue;
            }

            self.metrics.jobs_started.inc();
            let store = Arc::clone(&self.store);
            let crawler_config = self.crawler_config.clone();
            let reaper_config = self.reaper_config.clone();
            let retry_cap = self.config.retry_attempts;
            let metrics = Arc::clone(&self.metrics);

            tokio::spawn(async move {
                let _permit = permit;
                execute_job(store, crawler_config, reaper_config, retry_cap, job, metrics).await;
            });
        }

        Ok(())
    }

    /// Handle a message pushed by an external queue: idempotently acquire
    /// the lease and run the job. Returns false when the job was already
    /// claimed or does not exist.
    pub async fn dispatch_message(
        &self,
        message: WorkMessage,
    ) -> Result<bool, crate::store::StoreError> {
        let Some(job) = self.store.get_job(message.job_id).await? else {
            warn!("work message for unknown job {}", message.job_id);
            return Ok(false);
        };
        if !self.store.acquire_job_lease(job.id).await? {
            debug!("work message for already-claimed job {}", job.id);
            return Ok(false);
        }

        self.metrics.jobs_started.inc();
        let store = Arc::clone(&self.store);
        let crawler_config = self.crawler_config.clone();
        let reaper_config = self.reaper_config.clone();
        let retry_cap = self.config.retry_attempts;
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            execute_job(store, crawler_config, reaper_config, retry_cap, job, metrics).await;
        });
        Ok(true)
    }
}

/// Run one leased job to a terminal (or re-queued) state.
async fn execute_job(
    store: Arc<dyn Store>,
    crawler_config: CrawlerConfig,
    reaper_config: ReaperConfig,
    retry_cap: u32,
    job: Job,
    metrics: Arc<MonitorMetrics>,
) {
    info!("job {} ({:?}) started for site {}", job.id, job.job_type, job.site_id);
    metrics.scans_running.inc();
    let result = run_job(&store, &crawler_config, &reaper_config, &job).await;
    metrics.scans_running.dec();

    match result {
        Ok(Some(result_payload)) => {
            if let Err(e) = store.complete_job(job.id, result_payload).await {
                // A cancel can land between the last batch and here
                warn!("job {} could not be completed: {}", job.id, e);
            } else {
                metrics.jobs_completed.inc();
            }
        }
        Ok(None) => {
            // Cancelled mid-run; the cancel endpoint already counted it and
            // the job row is already terminal
            info!("job {} observed cancellation", job.id);
        }
        Err(JobError { message, terminal }) => {
            let retriable = !terminal
                && store
                    .get_job(job.id)
                    .await
                    .ok()
                    .flatten()
                    .map(|j| j.retry_count < retry_cap.min(j.max_retries))
                    .unwrap_or(false);

            if retriable {
                match store.requeue_job(job.id).await {
                    Ok(()) => {
                        metrics.jobs_retried.inc();
                        info!("job {} re-queued after error: {}", job.id, message);
                    }
                    Err(e) => warn!("job {} could not be re-queued: {}", job.id, e),
                }
            } else {
                match store.fail_job(job.id, &message).await {
                    Ok(()) => {
                        metrics.jobs_failed.inc();
                        error!("job {} failed: {}", job.id, message);
                    }
                    Err(e) => warn!("job {} could not be failed: {}", job.id, e),
                }
            }
        }
    }
}

struct JobError {
    message: String,
    terminal: bool,
}

/// Dispatch on job type. `Ok(None)` means the run was cancelled.
async fn run_job(
    store: &Arc<dyn Store>,
    crawler_config: &CrawlerConfig,
    reaper_config: &ReaperConfig,
    job: &Job,
) -> Result<Option<serde_json::Value>, JobError> {
    match job.job_type {
        // Discovery and extraction re-run the same pipeline; the site's
        // settings snapshot decides what is enumerated and captured
        JobType::Scan | JobType::Discovery | JobType::Extraction => {
            match run_scan_job(store, crawler_config, job).await {
                Ok(ScanOutcome::Completed(report)) => Ok(Some(
                    serde_json::to_value(&report).unwrap_or(serde_json::Value::Null),
                )),
                Ok(ScanOutcome::Cancelled) => Ok(None),
                Err(e) => Err(JobError {
                    message: e.to_string(),
                    terminal: e.is_terminal(),
                }),
            }
        }
        JobType::Comparison => {
            let base = job_scan_id(job, "base_scan_id");
            let other = job_scan_id(job, "compare_scan_id");
            match (base, other) {
                (Some(base), Some(other)) => {
                    match compare::compare_scans(store.as_ref(), base, other).await {
                        Ok(comparison) => Ok(Some(
                            serde_json::to_value(&comparison.summary)
                                .unwrap_or(serde_json::Value::Null),
                        )),
                        Err(e) => Err(JobError {
                            message: e.to_string(),
                            terminal: matches!(
                                e,
                                compare::CompareError::ScanNotFound(_)
                                    | compare::CompareError::SiteMismatch
                            ),
                        }),
                    }
                }
                _ => Err(JobError {
                    message: "comparison job missing base_scan_id/compare_scan_id metadata"
                        .to_string(),
                    terminal: true,
                }),
            }
        }
        JobType::Cleanup => {
            let reaper = crate::jobs::Reaper::new(Arc::clone(store), reaper_config.clone());
            match reaper.sweep().await {
                Ok(report) => Ok(Some(
                    serde_json::to_value(&report).unwrap_or(serde_json::Value::Null),
                )),
                Err(e) => Err(JobError {
                    message: e.to_string(),
                    terminal: false,
                }),
            }
        }
    }
}

fn job_scan_id(job: &Job, key: &str) -> Option<uuid::Uuid> {
    job.metadata
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::JobStatus;

    fn dispatcher(store: Arc<dyn Store>) -> Dispatcher {
        Dispatcher::new(
            store,
            CrawlerConfig::default(),
            ReaperConfig::default(),
            DispatcherConfig {
                max_concurrent_scans: 2,
                ..Default::default()
            },
            Arc::new(MonitorMetrics::default()),
        )
    }

    #[tokio::test]
    async fn poll_leases_due_jobs_up_to_the_cap() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        // Site does not exist, so the jobs fail terminally downstream; the
        // lease itself is what this test watches
        for _ in 0..3 {
            store
                .create_job(Job::new(uuid::Uuid::new_v4(), JobType::Scan))
                .await
                .unwrap();
        }

        let d = dispatcher(Arc::clone(&store));
        d.poll_once().await.unwrap();

        // With a cap of 2, at most 2 jobs can be past queued immediately
        // after a single poll
        let stats = store.job_stats().await.unwrap();
        assert!(stats.queued >= 1);

        // Let the spawned tasks finish; site-less jobs fail terminally
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let stats = store.job_stats().await.unwrap();
        assert_eq!(stats.running, 0);
    }

    #[tokio::test]
    async fn site_less_scan_job_fails_without_retry() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();

        let d = dispatcher(Arc::clone(&store));
        d.poll_once().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
        assert!(job.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn duplicate_work_messages_run_the_job_once() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job.clone()).await.unwrap();

        let d = dispatcher(Arc::clone(&store));
        let message = WorkMessage {
            job_id,
            site_id: job.site_id,
            job_type: JobType::Scan,
            metadata: Default::default(),
            timestamp: chrono::Utc::now(),
        };

        assert!(d.dispatch_message(message.clone()).await.unwrap());
        // Redelivery loses the lease CAS
        assert!(!d.dispatch_message(message).await.unwrap());
    }

    #[tokio::test]
    async fn comparison_job_without_metadata_fails_terminally() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Comparison);
        let job_id = store.create_job(job).await.unwrap();

        let d = dispatcher(Arc::clone(&store));
        d.poll_once().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("metadata"));
    }
}
