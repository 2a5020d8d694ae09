//! Job dispatcher configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling dispatcher tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How often the queue is polled (milliseconds)
    pub poll_ms: u64,
    /// Concurrent scans per dispatcher instance
    pub max_concurrent_scans: usize,
    /// Queue rows fetched per poll
    pub poll_batch: usize,
    /// Retries before a failing job is failed for good
    pub retry_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_ms: 2_000,
            max_concurrent_scans: 3,
            poll_batch: 10,
            retry_attempts: 3,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}
