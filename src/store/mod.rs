//! Persistence adapter consumed by the core.
//!
//! The scan orchestrator, dispatcher, reaper, and comparison engine all talk
//! to this trait; a concrete backend lives behind it. [`MemoryStore`] is the
//! in-process reference implementation used by the default wiring and the
//! test suite.
//!
//! Job state transitions are store operations rather than whole-row writes
//! so the backend can enforce the state machine atomically: a lease is a CAS
//! from queued to running, cancellation only ever applies to queued/running
//! rows, and progress updates cannot resurrect a terminal job.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Job, JobId, JobStatus, Page, PageId, PageSnapshot, PageStatus, Scan, ScanId, Site, SiteId,
};

/// Errors surfaced by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Fields written on every page sighting; `first_seen` is owned by the store
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Canonicalized URL; upsert key together with the site ID
    pub url: String,
    pub status: PageStatus,
    pub content_hash: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub response_code: u16,
    pub load_time_ms: u64,
    pub seen_at: DateTime<Utc>,
}

/// Listing filter for the jobs API
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub site_id: Option<SiteId>,
    /// Hard response cap
    pub limit: usize,
}

/// Queue-depth counts exposed through the stats API
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub queued: u64,
    pub running: u64,
    pub failed: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- sites ---

    async fn create_site(&self, site: Site) -> Result<SiteId, StoreError>;
    async fn get_site(&self, site_id: SiteId) -> Result<Option<Site>, StoreError>;
    /// Whole-row update; used by the orchestrator for rollup counters
    async fn update_site(&self, site: Site) -> Result<(), StoreError>;
    /// Delete archived sites whose `archived_at` is before the cutoff,
    /// cascading to scans, pages, snapshots, and jobs. Returns the count.
    async fn delete_archived_sites(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    // --- pages ---

    /// Insert or update the (site, url) page row. Fields are overwritten,
    /// `first_seen` is preserved. Idempotent; returns the stable page ID.
    async fn upsert_page(&self, site_id: SiteId, record: PageRecord) -> Result<PageId, StoreError>;
    async fn list_pages(&self, site_id: SiteId) -> Result<Vec<Page>, StoreError>;
    async fn set_page_status(&self, page_id: PageId, status: PageStatus) -> Result<(), StoreError>;

    // --- scans ---

    async fn create_scan(&self, scan: Scan) -> Result<ScanId, StoreError>;
    async fn get_scan(&self, scan_id: ScanId) -> Result<Option<Scan>, StoreError>;
    /// Whole-row update; scans have a single writer (the orchestrator)
    async fn update_scan(&self, scan: Scan) -> Result<(), StoreError>;
    /// Most recent completed scan for the site, excluding `exclude`
    async fn latest_completed_scan(
        &self,
        site_id: SiteId,
        exclude: Option<ScanId>,
    ) -> Result<Option<Scan>, StoreError>;
    /// Scans still marked running for the site (reaper cleanup path)
    async fn list_running_scans(&self, site_id: SiteId) -> Result<Vec<Scan>, StoreError>;

    // --- snapshots ---

    /// Append-only; never deduplicates across scans
    async fn insert_snapshots(&self, snapshots: Vec<PageSnapshot>) -> Result<(), StoreError>;
    async fn snapshots_for_scan(&self, scan_id: ScanId) -> Result<Vec<PageSnapshot>, StoreError>;

    // --- jobs ---

    async fn create_job(&self, job: Job) -> Result<JobId, StoreError>;
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;
    /// Queued jobs eligible to run now (`scheduled_for` absent or due),
    /// ordered by priority descending then creation time ascending
    async fn list_queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError>;
    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError>;
    /// CAS queued -> running with `started_at = now`. False when the job was
    /// already claimed (or is in any other state).
    async fn acquire_job_lease(&self, job_id: JobId) -> Result<bool, StoreError>;
    /// Progress write; ignored once the job is terminal
    async fn update_job_progress(&self, job_id: JobId, progress: u8) -> Result<(), StoreError>;
    /// running -> completed with progress 100 and a result payload
    async fn complete_job(
        &self,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<(), StoreError>;
    /// running -> failed with an error message
    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<(), StoreError>;
    /// running -> queued with `retry_count` incremented (dispatcher retry)
    async fn requeue_job(&self, job_id: JobId) -> Result<(), StoreError>;
    /// queued/running -> cancelled. False when the job was already terminal.
    async fn cancel_job(&self, job_id: JobId) -> Result<bool, StoreError>;
    /// failed -> queued with `retry_count` incremented (API retry). False
    /// when the job is not failed or is out of retries.
    async fn retry_job(&self, job_id: JobId) -> Result<bool, StoreError>;
    /// Running jobs whose `started_at` predates the threshold
    async fn find_stuck_jobs(&self, threshold: DateTime<Utc>) -> Result<Vec<Job>, StoreError>;
    /// Delete terminal jobs completed before the cutoff. Returns the count.
    async fn delete_old_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
    async fn job_stats(&self) -> Result<JobStats, StoreError>;

    // --- health ---

    /// Liveness probe for the health endpoint
    async fn ping(&self) -> Result<(), StoreError>;
}
