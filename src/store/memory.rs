//! In-memory reference implementation of the persistence adapter.
//!
//! Backs the default wiring and the test suite. Job transitions run under
//! the row's shard lock, which is what makes the lease a real CAS.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{JobFilter, JobStats, PageRecord, Store, StoreError};
use crate::types::{
    Job, JobId, JobStatus, Page, PageId, PageSnapshot, PageStatus, Scan, ScanId, ScanStatus, Site,
    SiteId, SiteStatus,
};

/// DashMap-backed store; cheap to clone via `Arc` at the call sites
#[derive(Default)]
pub struct MemoryStore {
    sites: DashMap<SiteId, Site>,
    scans: DashMap<ScanId, Scan>,
    pages: DashMap<PageId, Page>,
    /// (site, canonical url) -> page row
    page_index: DashMap<(SiteId, String), PageId>,
    snapshots: DashMap<ScanId, Vec<PageSnapshot>>,
    jobs: DashMap<JobId, Job>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw job table access so tests can backdate leases
    #[cfg(test)]
    pub(crate) fn jobs_table(&self) -> &DashMap<JobId, Job> {
        &self.jobs
    }

    fn cascade_delete_site(&self, site_id: SiteId) {
        self.sites.remove(&site_id);

        let scan_ids: Vec<ScanId> = self
            .scans
            .iter()
            .filter(|r| r.site_id == site_id)
            .map(|r| r.id)
            .collect();
        for scan_id in scan_ids {
            self.scans.remove(&scan_id);
            self.snapshots.remove(&scan_id);
        }

        let page_ids: Vec<PageId> = self
            .pages
            .iter()
            .filter(|r| r.site_id == site_id)
            .map(|r| r.id)
            .collect();
        for page_id in page_ids {
            self.pages.remove(&page_id);
        }
        self.page_index.retain(|(sid, _), _| *sid != site_id);

        let job_ids: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|r| r.site_id == site_id)
            .map(|r| r.id)
            .collect();
        for job_id in job_ids {
            self.jobs.remove(&job_id);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_site(&self, site: Site) -> Result<SiteId, StoreError> {
        let id = site.id;
        self.sites.insert(id, site);
        Ok(id)
    }

    async fn get_site(&self, site_id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.sites.get(&site_id).map(|r| r.clone()))
    }

    async fn update_site(&self, site: Site) -> Result<(), StoreError> {
        if !self.sites.contains_key(&site.id) {
            return Err(StoreError::NotFound("site"));
        }
        self.sites.insert(site.id, site);
        Ok(())
    }

    async fn delete_archived_sites(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let expired: Vec<SiteId> = self
            .sites
            .iter()
            .filter(|r| {
                r.status == SiteStatus::Archived
                    && r.archived_at.map(|at| at < cutoff).unwrap_or(false)
            })
            .map(|r| r.id)
            .collect();

        let count = expired.len() as u64;
        for site_id in expired {
            self.cascade_delete_site(site_id);
        }
        Ok(count)
    }

    async fn upsert_page(&self, site_id: SiteId, record: PageRecord) -> Result<PageId, StoreError> {
        let key = (site_id, record.url.clone());

        if let Some(page_id) = self.page_index.get(&key).map(|r| *r) {
            if let Some(mut page) = self.pages.get_mut(&page_id) {
                page.status = record.status;
                page.content_hash = record.content_hash;
                page.title = record.title;
                page.meta_description = record.meta_description;
                page.canonical_url = record.canonical_url;
                page.response_code = record.response_code;
                page.load_time_ms = record.load_time_ms;
                page.last_seen = record.seen_at;
                return Ok(page_id);
            }
        }

        let page = Page {
            id: uuid::Uuid::new_v4(),
            site_id,
            url: record.url,
            status: record.status,
            content_hash: record.content_hash,
            title: record.title,
            meta_description: record.meta_description,
            canonical_url: record.canonical_url,
            response_code: record.response_code,
            load_time_ms: record.load_time_ms,
            first_seen: record.seen_at,
            last_seen: record.seen_at,
        };
        let page_id = page.id;
        self.page_index.insert((site_id, page.url.clone()), page_id);
        self.pages.insert(page_id, page);
        Ok(page_id)
    }

    async fn list_pages(&self, site_id: SiteId) -> Result<Vec<Page>, StoreError> {
        Ok(self
            .pages
            .iter()
            .filter(|r| r.site_id == site_id)
            .map(|r| r.clone())
            .collect())
    }

    async fn set_page_status(&self, page_id: PageId, status: PageStatus) -> Result<(), StoreError> {
        let mut page = self
            .pages
            .get_mut(&page_id)
            .ok_or(StoreError::NotFound("page"))?;
        page.status = status;
        Ok(())
    }

    async fn create_scan(&self, scan: Scan) -> Result<ScanId, StoreError> {
        let id = scan.id;
        self.scans.insert(id, scan);
        Ok(id)
    }

    async fn get_scan(&self, scan_id: ScanId) -> Result<Option<Scan>, StoreError> {
        Ok(self.scans.get(&scan_id).map(|r| r.clone()))
    }

    async fn update_scan(&self, scan: Scan) -> Result<(), StoreError> {
        if !self.scans.contains_key(&scan.id) {
            return Err(StoreError::NotFound("scan"));
        }
        self.scans.insert(scan.id, scan);
        Ok(())
    }

    async fn latest_completed_scan(
        &self,
        site_id: SiteId,
        exclude: Option<ScanId>,
    ) -> Result<Option<Scan>, StoreError> {
        Ok(self
            .scans
            .iter()
            .filter(|r| {
                r.site_id == site_id
                    && r.status == ScanStatus::Completed
                    && Some(r.id) != exclude
            })
            .map(|r| r.clone())
            .max_by_key(|s| s.started_at))
    }

    async fn list_running_scans(&self, site_id: SiteId) -> Result<Vec<Scan>, StoreError> {
        Ok(self
            .scans
            .iter()
            .filter(|r| r.site_id == site_id && r.status == ScanStatus::Running)
            .map(|r| r.clone())
            .collect())
    }

    async fn insert_snapshots(&self, snapshots: Vec<PageSnapshot>) -> Result<(), StoreError> {
        for snapshot in snapshots {
            self.snapshots
                .entry(snapshot.scan_id)
                .or_default()
                .push(snapshot);
        }
        Ok(())
    }

    async fn snapshots_for_scan(&self, scan_id: ScanId) -> Result<Vec<PageSnapshot>, StoreError> {
        Ok(self
            .snapshots
            .get(&scan_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn create_job(&self, job: Job) -> Result<JobId, StoreError> {
        let id = job.id;
        self.jobs.insert(id, job);
        Ok(id)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.get(&job_id).map(|r| r.clone()))
    }

    async fn list_queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let now = Utc::now();
        let mut queued: Vec<Job> = self
            .jobs
            .iter()
            .filter(|r| {
                r.status == JobStatus::Queued
                    && r.scheduled_for.map(|t| t <= now).unwrap_or(true)
            })
            .map(|r| r.clone())
            .collect();
        queued.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        queued.truncate(limit);
        Ok(queued)
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|r| {
                filter.status.map(|s| r.status == s).unwrap_or(true)
                    && filter.site_id.map(|s| r.site_id == s).unwrap_or(true)
            })
            .map(|r| r.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            jobs.truncate(filter.limit);
        }
        Ok(jobs)
    }

    async fn acquire_job_lease(&self, job_id: JobId) -> Result<bool, StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        Ok(true)
    }

    async fn update_job_progress(&self, job_id: JobId, progress: u8) -> Result<(), StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if !job.status.is_terminal() {
            job.progress = progress.min(99);
        }
        Ok(())
    }

    async fn complete_job(
        &self,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if job.status != JobStatus::Running {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Completed,
            });
        }
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        job.result = Some(result);
        Ok(())
    }

    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<(), StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if job.status != JobStatus::Running {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Failed,
            });
        }
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error = Some(error.to_string());
        Ok(())
    }

    async fn requeue_job(&self, job_id: JobId) -> Result<(), StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if job.status != JobStatus::Running {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Queued,
            });
        }
        job.status = JobStatus::Queued;
        job.retry_count += 1;
        job.progress = 0;
        job.started_at = None;
        Ok(())
    }

    async fn cancel_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn retry_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        if job.status != JobStatus::Failed || job.retry_count >= job.max_retries {
            return Ok(false);
        }
        job.status = JobStatus::Queued;
        job.retry_count += 1;
        job.progress = 0;
        job.started_at = None;
        job.completed_at = None;
        job.error = None;
        Ok(true)
    }

    async fn find_stuck_jobs(&self, threshold: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .iter()
            .filter(|r| {
                r.status == JobStatus::Running
                    && r.started_at.map(|at| at < threshold).unwrap_or(false)
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn delete_old_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status.is_terminal()
                && job.completed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        Ok((before - self.jobs.len()) as u64)
    }

    async fn job_stats(&self) -> Result<JobStats, StoreError> {
        let mut by_status: HashMap<JobStatus, u64> = HashMap::new();
        for job in self.jobs.iter() {
            *by_status.entry(job.status).or_default() += 1;
        }
        Ok(JobStats {
            queued: by_status.get(&JobStatus::Queued).copied().unwrap_or(0),
            running: by_status.get(&JobStatus::Running).copied().unwrap_or(0),
            failed: by_status.get(&JobStatus::Failed).copied().unwrap_or(0),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscoveryMethod, JobType, ScanSettings};
    use chrono::Duration;

    fn record(url: &str, hash: &str) -> PageRecord {
        PageRecord {
            url: url.to_string(),
            status: PageStatus::Active,
            content_hash: hash.to_string(),
            title: Some("t".to_string()),
            meta_description: None,
            canonical_url: None,
            response_code: 200,
            load_time_ms: 5,
            seen_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_page_is_idempotent_and_preserves_first_seen() {
        let store = MemoryStore::new();
        let site_id = uuid::Uuid::new_v4();

        let first = store
            .upsert_page(site_id, record("https://a.example/x", "h1"))
            .await
            .unwrap();
        let first_seen = store.list_pages(site_id).await.unwrap()[0].first_seen;

        let second = store
            .upsert_page(site_id, record("https://a.example/x", "h2"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let pages = store.list_pages(site_id).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content_hash, "h2");
        assert_eq!(pages[0].first_seen, first_seen);
        assert!(pages[0].last_seen >= first_seen);
    }

    #[tokio::test]
    async fn lease_is_acquired_exactly_once() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.acquire_job_lease(job_id).await },
            ));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
    }

    #[tokio::test]
    async fn queued_jobs_order_by_priority_then_age() {
        let store = MemoryStore::new();
        let site = uuid::Uuid::new_v4();

        let mut low = Job::new(site, JobType::Scan);
        low.priority = 0;
        let mut high = Job::new(site, JobType::Scan);
        high.priority = 5;
        high.created_at = low.created_at + Duration::seconds(10);
        let mut old_low = Job::new(site, JobType::Scan);
        old_low.priority = 0;
        old_low.created_at = low.created_at - Duration::seconds(10);

        let low_id = store.create_job(low).await.unwrap();
        let high_id = store.create_job(high).await.unwrap();
        let old_low_id = store.create_job(old_low).await.unwrap();

        let queued = store.list_queued_jobs(10).await.unwrap();
        let ids: Vec<JobId> = queued.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![high_id, old_low_id, low_id]);
    }

    #[tokio::test]
    async fn scheduled_for_defers_dispatch() {
        let store = MemoryStore::new();
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan)
            .with_scheduled_for(Utc::now() + Duration::hours(1));
        store.create_job(job).await.unwrap();

        assert!(store.list_queued_jobs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_only_applies_to_active_jobs() {
        let store = MemoryStore::new();
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();

        assert!(store.cancel_job(job_id).await.unwrap());
        // Second cancel hits a terminal row
        assert!(!store.cancel_job(job_id).await.unwrap());

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn retry_requires_failed_state_and_remaining_budget() {
        let store = MemoryStore::new();
        let mut job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        job.max_retries = 1;
        let job_id = store.create_job(job).await.unwrap();

        // Not failed yet
        assert!(!store.retry_job(job_id).await.unwrap());

        assert!(store.acquire_job_lease(job_id).await.unwrap());
        store.fail_job(job_id, "boom").await.unwrap();
        assert!(store.retry_job(job_id).await.unwrap());

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.error.is_none());

        // Budget exhausted now
        assert!(store.acquire_job_lease(job_id).await.unwrap());
        store.fail_job(job_id, "boom again").await.unwrap();
        assert!(!store.retry_job(job_id).await.unwrap());
    }

    #[tokio::test]
    async fn progress_updates_never_touch_terminal_jobs() {
        let store = MemoryStore::new();
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();

        store.acquire_job_lease(job_id).await.unwrap();
        store.update_job_progress(job_id, 50).await.unwrap();
        store
            .complete_job(job_id, serde_json::json!({"pages": 3}))
            .await
            .unwrap();
        store.update_job_progress(job_id, 10).await.unwrap();

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, 100);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn complete_requires_running_state() {
        let store = MemoryStore::new();
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();

        let err = store
            .complete_job(job_id, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn stuck_jobs_are_found_by_started_at() {
        let store = MemoryStore::new();
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();
        store.acquire_job_lease(job_id).await.unwrap();

        // Backdate the lease
        store.jobs.get_mut(&job_id).unwrap().started_at = Some(Utc::now() - Duration::hours(3));

        let stuck = store
            .find_stuck_jobs(Utc::now() - Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, job_id);
    }

    #[tokio::test]
    async fn archived_site_deletion_cascades() {
        let store = MemoryStore::new();
        let mut site = Site::new(uuid::Uuid::new_v4(), "old", "https://old.example/");
        site.status = SiteStatus::Archived;
        site.archived_at = Some(Utc::now() - Duration::days(60));
        let site_id = store.create_site(site).await.unwrap();

        let scan = Scan::new(
            site_id,
            DiscoveryMethod::Sitemap,
            ScanSettings {
                discovery: Default::default(),
                extraction: Default::default(),
            },
        );
        let scan_id = store.create_scan(scan).await.unwrap();
        let page_id = store
            .upsert_page(site_id, record("https://old.example/", "h"))
            .await
            .unwrap();
        store
            .insert_snapshots(vec![PageSnapshot {
                id: uuid::Uuid::new_v4(),
                scan_id,
                page_id,
                url: "https://old.example/".to_string(),
                title: None,
                meta_description: None,
                canonical_url: None,
                breadcrumbs: Vec::new(),
                headings: Vec::new(),
                custom_data: Default::default(),
                content_hash: "h".to_string(),
                response_code: 200,
                load_time_ms: 1,
                extraction_config_id: "default".to_string(),
            }])
            .await
            .unwrap();
        store
            .create_job(Job::new(site_id, JobType::Scan))
            .await
            .unwrap();

        let deleted = store
            .delete_archived_sites(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_site(site_id).await.unwrap().is_none());
        assert!(store.get_scan(scan_id).await.unwrap().is_none());
        assert!(store.list_pages(site_id).await.unwrap().is_empty());
        assert!(store.snapshots_for_scan(scan_id).await.unwrap().is_empty());
        assert_eq!(store.job_stats().await.unwrap().queued, 0);
    }

    #[tokio::test]
    async fn old_terminal_jobs_are_deleted() {
        let store = MemoryStore::new();
        let job = Job::new(uuid::Uuid::new_v4(), JobType::Scan);
        let job_id = store.create_job(job).await.unwrap();
        store.acquire_job_lease(job_id).await.unwrap();
        store.fail_job(job_id, "x").await.unwrap();
        store.jobs.get_mut(&job_id).unwrap().completed_at =
            Some(Utc::now() - Duration::days(45));

        // A fresh queued job must survive
        store
            .create_job(Job::new(uuid::Uuid::new_v4(), JobType::Scan))
            .await
            .unwrap();

        let deleted = store
            .delete_old_jobs(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.job_stats().await.unwrap().queued, 1);
        assert!(store.get_job(job_id).await.unwrap().is_none());
    }
}
