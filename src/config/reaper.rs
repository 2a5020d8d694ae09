//! Reaper and retention configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Periodic cleanup tuning: stuck jobs, old jobs, archived sites
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// How often the reaper runs (milliseconds)
    pub interval_ms: u64,
    /// A running job older than this is considered stuck
    pub stuck_job_hours: u64,
    /// Terminal jobs older than this are deleted
    pub old_job_days: u64,
    /// Archived sites older than this are deleted
    pub archive_retention_days: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_ms: 300_000,
            stuck_job_hours: 2,
            old_job_days: 30,
            archive_retention_days: 30,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
