//! Core entities shared across the monitoring pipeline.
//!
//! Everything persisted through the [`Store`](crate::store::Store) seam is
//! defined here: sites, scans, pages, per-scan snapshots, jobs, and the
//! comparison result types produced by the diff engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::discovery::DiscoverySettings;
use crate::extract::ExtractionSettings;

pub type SiteId = Uuid;
pub type ScanId = Uuid;
pub type PageId = Uuid;
pub type SnapshotId = Uuid;
pub type JobId = Uuid;

/// Lifecycle status of a monitored site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Active,
    Paused,
    Error,
    Archived,
}

/// How the URL set of a site is enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Sitemap,
    Crawling,
}

/// A registered external web property the system monitors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub owner_id: Uuid,
    pub name: String,
    /// Absolute http/https root URL
    pub root_url: String,
    pub discovery: DiscoverySettings,
    pub extraction: ExtractionSettings,
    pub status: SiteStatus,
    /// Set iff status is `Archived`
    pub archived_at: Option<DateTime<Utc>>,
    /// Rollup counters from the last completed scan
    pub total_pages: u64,
    pub new_pages: u64,
    pub changed_pages: u64,
    pub removed_pages: u64,
    pub last_scan: Option<DateTime<Utc>>,
    /// Advisory next scheduled scan time; actual dispatch uses job `scheduled_for`
    pub next_scan: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    pub fn new(owner_id: Uuid, name: impl Into<String>, root_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            root_url: root_url.into(),
            discovery: DiscoverySettings::default(),
            extraction: ExtractionSettings::default(),
            status: SiteStatus::Active,
            archived_at: None,
            total_pages: 0,
            new_pages: 0,
            changed_pages: 0,
            removed_pages: 0,
            last_scan: None,
            next_scan: None,
            created_at: Utc::now(),
        }
    }
}

/// Status of one scan pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Settings captured at scan start so later edits to the site do not
/// change what a historical scan meant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    pub discovery: DiscoverySettings,
    pub extraction: ExtractionSettings,
}

/// One end-to-end discovery + fetch + extract + persist pass over a site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub site_id: SiteId,
    pub method: DiscoveryMethod,
    pub settings: ScanSettings,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    /// Set iff status is terminal
    pub completed_at: Option<DateTime<Utc>>,
    pub total_pages: u64,
    pub new_pages: u64,
    pub changed_pages: u64,
    pub removed_pages: u64,
    pub error_pages: u64,
    /// Capped URL list for UI preview (see [`SCANNED_URL_PREVIEW_CAP`])
    pub scanned_urls: Vec<String>,
    /// Configuration problems encountered mid-scan (unknown preset, bad selector)
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

/// Maximum number of URLs retained on a scan row for preview
pub const SCANNED_URL_PREVIEW_CAP: usize = 1000;

impl Scan {
    pub fn new(site_id: SiteId, method: DiscoveryMethod, settings: ScanSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id,
            method,
            settings,
            status: ScanStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            total_pages: 0,
            new_pages: 0,
            changed_pages: 0,
            removed_pages: 0,
            error_pages: 0,
            scanned_urls: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Wall-clock duration, available once the scan is terminal
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Latest known state of a page across scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Active,
    Removed,
    Error,
}

/// Per-site page identity: one row per (site, canonical URL), never deleted
/// by the core (only by site deletion cascade)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    pub url: String,
    pub status: PageStatus,
    pub content_hash: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub response_code: u16,
    pub load_time_ms: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A heading in document outline order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1..=6
    pub level: u8,
    pub text: String,
}

/// The extracted structured record for one URL within one scan. Immutable
/// once written; multiple scans of the same page yield multiple rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub id: SnapshotId,
    pub scan_id: ScanId,
    pub page_id: PageId,
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub breadcrumbs: Vec<String>,
    pub headings: Vec<Heading>,
    pub custom_data: BTreeMap<String, serde_json::Value>,
    /// SHA-256 over the raw response body, hex-encoded; empty for error pages
    pub content_hash: String,
    pub response_code: u16,
    pub load_time_ms: u64,
    /// Which extraction config produced this snapshot ("default" or an override name)
    pub extraction_config_id: String,
}

/// Kind of work a job drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Scan,
    Discovery,
    Extraction,
    Comparison,
    Cleanup,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Default number of retries before a job is failed for good
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A scheduled or in-flight unit of work executed by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub site_id: SiteId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Higher first
    pub priority: i32,
    /// 0..=100; 100 iff completed
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    /// Optional earliest-start constraint
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Set iff the job has left `Queued`
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff status is terminal
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(site_id: SiteId, job_type: JobType) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id,
            job_type,
            status: JobStatus::Queued,
            priority: 0,
            progress: 0,
            created_at: Utc::now(),
            scheduled_for: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            metadata: BTreeMap::new(),
            result: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scheduled_for(mut self, when: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(when);
        self
    }
}

/// How a field or page changed between two scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// Qualitative weight of a change, ordered low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// One classified difference in a single snapshot field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub change: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub impact: Impact,
}

/// Comparison verdict for one URL across two scans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageComparisonResult {
    pub url: String,
    pub base: Option<PageSnapshot>,
    pub compare: Option<PageSnapshot>,
    pub change: ChangeType,
    pub changes: Vec<FieldChange>,
    /// Max impact over `changes`; absent when nothing changed
    pub severity: Option<Impact>,
}

/// Aggregate counts for a two-scan comparison
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_base: u64,
    pub total_compare: u64,
    pub added: u64,
    pub removed: u64,
    pub modified: u64,
    pub unchanged: u64,
    pub base_error_pages: u64,
    pub compare_error_pages: u64,
}

/// Full output of the run comparison engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunComparison {
    pub base_scan_id: ScanId,
    pub compare_scan_id: ScanId,
    pub summary: ComparisonSummary,
    pub pages: Vec<PageComparisonResult>,
}

/// Canonicalize a URL for page identity: lowercases scheme and host,
/// preserves path and query order as-is. Returns `None` for unparseable
/// or non-http(s) input.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_ordering() {
        assert!(Impact::Low < Impact::Medium);
        assert!(Impact::Medium < Impact::High);
        assert_eq!(Impact::High.max(Impact::Low), Impact::High);
    }

    #[test]
    fn job_status_terminality() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn scan_duration_requires_terminal_state() {
        let mut scan = Scan::new(
            Uuid::new_v4(),
            DiscoveryMethod::Sitemap,
            ScanSettings {
                discovery: DiscoverySettings::default(),
                extraction: ExtractionSettings::default(),
            },
        );
        assert!(scan.duration().is_none());

        scan.completed_at = Some(scan.started_at + Duration::seconds(42));
        assert_eq!(scan.duration(), Some(Duration::seconds(42)));
    }

    #[test]
    fn canonicalize_lowercases_scheme_and_host_only() {
        let canonical = canonicalize_url("HTTPS://Example.COM/Path?b=2&a=1").unwrap();
        assert_eq!(canonical, "https://example.com/Path?b=2&a=1");
    }

    #[test]
    fn canonicalize_rejects_non_http_schemes() {
        assert!(canonicalize_url("ftp://example.com/file").is_none());
        assert!(canonicalize_url("not a url").is_none());
    }
}
