//! Scan orchestration: one job of type `scan` drives one full pass.
//!
//! Sequence: read site -> create scan row -> discover URLs -> fetch and
//! extract through the worker pool -> persist pages and snapshots in
//! batches -> compute counters against the previous completed scan ->
//! finalize scan, site rollups, and job progress.
//!
//! The orchestrator is the only place unexpected errors become `failed`
//! transitions; the dispatcher decides whether a failure is retried.
//! Cancellation is observed between URL batches by re-reading the job row.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::CrawlerConfig;
use crate::discovery::{DiscoveryOutcome, LinkCrawler, SitemapParser};
use crate::fetcher::PageFetcher;
use crate::store::{PageRecord, Store, StoreError};
use crate::types::{
    DiscoveryMethod, Job, JobStatus, PageSnapshot, PageStatus, Scan, ScanSettings, ScanStatus,
    SiteId, SCANNED_URL_PREVIEW_CAP,
};
use crate::worker::{PageResult, UrlTask, WorkerPool};

/// Pages persisted per store round-trip
const PERSIST_BATCH_SIZE: usize = 100;

/// URLs processed between cancellation checks
const CANCEL_CHECK_BATCH: usize = 100;

/// A successful scan is rescheduled this far out
const RESCAN_INTERVAL_HOURS: i64 = 6;

#[derive(Debug, Error)]
pub enum ScanJobError {
    /// Terminal: a job for a deleted site is never retried
    #[error("site {0} not found")]
    SiteNotFound(SiteId),
    /// Terminal: a misconfigured root URL cannot succeed on retry
    #[error("site root URL '{0}' is not a valid absolute URL")]
    InvalidRootUrl(String),
    #[error("fetcher setup failed: {0}")]
    Fetcher(#[from] crate::fetcher::FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScanJobError {
    /// Terminal errors are failed without retry
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SiteNotFound(_) | Self::InvalidRootUrl(_))
    }
}

/// What a finished orchestrator run reports back to the dispatcher
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// The job row was cancelled mid-run; the scan row is finalized
    Cancelled,
}

/// Summary persisted as the job result payload
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: uuid::Uuid,
    pub total_pages: u64,
    pub new_pages: u64,
    pub changed_pages: u64,
    pub removed_pages: u64,
    pub error_pages: u64,
    pub duration_ms: i64,
}

/// Run one scan job end to end.
pub async fn run_scan_job(
    store: &Arc<dyn Store>,
    crawler_config: &CrawlerConfig,
    job: &Job,
) -> Result<ScanOutcome, ScanJobError> {
    let site = store
        .get_site(job.site_id)
        .await?
        .ok_or(ScanJobError::SiteNotFound(job.site_id))?;

    let root = Url::parse(&site.root_url)
        .map_err(|_| ScanJobError::InvalidRootUrl(site.root_url.clone()))?;

    let method = site.discovery.method;
    let mut scan = Scan::new(
        site.id,
        method,
        ScanSettings {
            discovery: site.discovery.clone(),
            extraction: site.extraction.clone(),
        },
    );
    store.create_scan(scan.clone()).await?;
    info!("scan {} started for site {} ({})", scan.id, site.name, site.root_url);

    match drive_scan(store, crawler_config, job, &site, &root, &mut scan).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            // Best-effort: the scan row must not dangle in `running`
            scan.status = ScanStatus::Failed;
            scan.completed_at = Some(Utc::now());
            scan.error = Some(e.to_string());
            if let Err(update_err) = store.update_scan(scan.clone()).await {
                warn!("scan {} could not be marked failed: {}", scan.id, update_err);
            }
            Err(e)
        }
    }
}

async fn drive_scan(
    store: &Arc<dyn Store>,
    crawler_config: &CrawlerConfig,
    job: &Job,
    site: &crate::types::Site,
    root: &Url,
    scan: &mut Scan,
) -> Result<ScanOutcome, ScanJobError> {
    // Cloned so the scan row can be mutated while settings are in use
    let settings = scan.settings.clone();
    let crawl = &settings.discovery.crawl;

    let fetcher = PageFetcher::new(
        &crawler_config.user_agent,
        crawler_config.request_timeout(),
        crawl.follow_redirects,
        crawler_config.max_redirects,
    )?;

    // --- discovery ---
    let discovery = match scan.method {
        DiscoveryMethod::Sitemap => {
            SitemapParser::new(&fetcher)
                .collect(root, &settings.discovery)
                .await
        }
        DiscoveryMethod::Crawling => {
            LinkCrawler::new(&fetcher, root.clone(), crawl, &crawler_config.user_agent)
                .crawl()
                .await
        }
    };
    scan.warnings.extend(discovery.warnings.iter().cloned());
    store.update_job_progress(job.id, 25).await?;
    info!("scan {} discovered {} URLs", scan.id, discovery.urls.len());

    if check_cancelled(store, job).await? {
        return finalize_cancelled(store, scan).await;
    }

    // --- fetch + extract ---
    let tasks = build_tasks(&discovery, &settings);
    let total = tasks.len();
    let pool = WorkerPool::new(
        fetcher.clone(),
        crawler_config.max_concurrency,
        crawler_config.crawl_delay(),
    );

    let mut results: Vec<PageResult> = Vec::with_capacity(total);
    for chunk in tasks.chunks(CANCEL_CHECK_BATCH) {
        let mut batch = pool.run(chunk.to_vec()).await;
        results.append(&mut batch);

        // Progress climbs the 25-75 band with URLs processed
        let progress = 25 + (results.len() * 50 / total.max(1)) as u8;
        store.update_job_progress(job.id, progress.min(75)).await?;

        if check_cancelled(store, job).await? {
            return finalize_cancelled(store, scan).await;
        }
    }

    // --- persist ---
    let seen_at = Utc::now();
    let mut current_hashes: HashMap<String, String> = HashMap::new();
    let mut persisted = 0usize;
    for chunk in results.chunks(PERSIST_BATCH_SIZE) {
        let mut snapshots = Vec::with_capacity(chunk.len());
        for result in chunk {
            let url = result.url.to_string();
            let page_status = if result.is_success() {
                PageStatus::Active
            } else {
                PageStatus::Error
            };
            let page_id = store
                .upsert_page(
                    site.id,
                    PageRecord {
                        url: url.clone(),
                        status: page_status,
                        content_hash: result.content_hash.clone(),
                        title: result.extracted.title.clone(),
                        meta_description: result.extracted.meta_description.clone(),
                        canonical_url: result.extracted.canonical_url.clone(),
                        response_code: result.status,
                        load_time_ms: result.load_time_ms,
                        seen_at,
                    },
                )
                .await?;

            current_hashes.insert(url.clone(), result.content_hash.clone());
            scan.warnings.extend(result.extracted.warnings.iter().cloned());
            snapshots.push(PageSnapshot {
                id: uuid::Uuid::new_v4(),
                scan_id: scan.id,
                page_id,
                url,
                title: result.extracted.title.clone(),
                meta_description: result.extracted.meta_description.clone(),
                canonical_url: result.extracted.canonical_url.clone(),
                breadcrumbs: result.extracted.breadcrumbs.clone(),
                headings: result.extracted.headings.clone(),
                custom_data: result.extracted.custom_data.clone(),
                content_hash: result.content_hash.clone(),
                response_code: result.status,
                load_time_ms: result.load_time_ms,
                extraction_config_id: result.config_id.clone(),
            });
        }
        store.insert_snapshots(snapshots).await?;

        persisted += chunk.len();
        let progress = 75 + (persisted * 20 / total.max(1)) as u8;
        store.update_job_progress(job.id, progress.min(95)).await?;

        if check_cancelled(store, job).await? {
            return finalize_cancelled(store, scan).await;
        }
    }

    // --- counters against the previous completed scan ---
    let previous_hashes: HashMap<String, String> = match store
        .latest_completed_scan(site.id, Some(scan.id))
        .await?
    {
        Some(previous) => store
            .snapshots_for_scan(previous.id)
            .await?
            .into_iter()
            .map(|s| (s.url, s.content_hash))
            .collect(),
        None => HashMap::new(),
    };

    let current_urls: HashSet<&String> = current_hashes.keys().collect();
    let new_pages = current_hashes
        .keys()
        .filter(|url| !previous_hashes.contains_key(*url))
        .count() as u64;
    let removed_pages = previous_hashes
        .keys()
        .filter(|url| !current_urls.contains(url))
        .count() as u64;
    let changed_pages = current_hashes
        .iter()
        .filter(|(url, hash)| {
            previous_hashes
                .get(*url)
                .map(|prev| prev != *hash)
                .unwrap_or(false)
        })
        .count() as u64;
    let error_pages = results.iter().filter(|r| !r.is_success()).count() as u64;

    // Pages absent from this completed scan flip to removed
    for page in store.list_pages(site.id).await? {
        if page.status != PageStatus::Removed && !current_urls.contains(&page.url) {
            store.set_page_status(page.id, PageStatus::Removed).await?;
        }
    }

    // --- finalize scan row ---
    let now = Utc::now();
    scan.status = ScanStatus::Completed;
    scan.completed_at = Some(now);
    scan.total_pages = results.len() as u64;
    scan.new_pages = new_pages;
    scan.changed_pages = changed_pages;
    scan.removed_pages = removed_pages;
    scan.error_pages = error_pages;
    scan.scanned_urls = results
        .iter()
        .take(SCANNED_URL_PREVIEW_CAP)
        .map(|r| r.url.to_string())
        .collect();
    store.update_scan(scan.clone()).await?;

    // --- site rollups ---
    let mut site = site.clone();
    site.total_pages = scan.total_pages;
    site.new_pages = new_pages;
    site.changed_pages = changed_pages;
    site.removed_pages = removed_pages;
    site.last_scan = Some(now);
    site.next_scan = Some(now + ChronoDuration::hours(RESCAN_INTERVAL_HOURS));
    store.update_site(site).await?;

    store.update_job_progress(job.id, 95).await?;

    let report = ScanReport {
        scan_id: scan.id,
        total_pages: scan.total_pages,
        new_pages,
        changed_pages,
        removed_pages,
        error_pages,
        duration_ms: (now - scan.started_at).num_milliseconds(),
    };
    info!(
        "scan {} completed: {} pages ({} new, {} changed, {} removed, {} errors)",
        scan.id, report.total_pages, new_pages, changed_pages, removed_pages, error_pages
    );
    Ok(ScanOutcome::Completed(report))
}

/// Resolve the extraction config for every discovered URL up front
fn build_tasks(discovery: &DiscoveryOutcome, settings: &ScanSettings) -> Vec<UrlTask> {
    discovery
        .urls
        .iter()
        .map(|url| {
            let url_str = url.as_str();
            if let Some(&index) = discovery.entry_overrides.get(url_str) {
                if let Some(entry) = settings.discovery.sitemaps.get(index) {
                    if let Some(config) = &entry.extraction {
                        let config_id = entry
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("sitemap-{}", index));
                        return UrlTask {
                            url: url.clone(),
                            config: config.clone(),
                            config_id,
                        };
                    }
                }
            }
            let (config, config_id) = settings.extraction.effective_config(url_str);
            UrlTask {
                url: url.clone(),
                config: config.clone(),
                config_id: config_id.to_string(),
            }
        })
        .collect()
}

/// Re-read the job row; true when an API cancel has landed
async fn check_cancelled(store: &Arc<dyn Store>, job: &Job) -> Result<bool, StoreError> {
    Ok(store
        .get_job(job.id)
        .await?
        .map(|j| j.status == JobStatus::Cancelled)
        .unwrap_or(true))
}

async fn finalize_cancelled(
    store: &Arc<dyn Store>,
    scan: &mut Scan,
) -> Result<ScanOutcome, ScanJobError> {
    scan.status = ScanStatus::Cancelled;
    scan.completed_at = Some(Utc::now());
    store.update_scan(scan.clone()).await?;
    info!("scan {} cancelled", scan.id);
    Ok(ScanOutcome::Cancelled)
}
