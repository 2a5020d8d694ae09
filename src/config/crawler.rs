//! Worker pool and outbound HTTP configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DEFAULT_USER_AGENT;

/// Fetch and worker-pool tuning shared by discovery and extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Worker pool size per scan
    pub max_concurrency: usize,
    /// Global pacing between fetches across the pool (milliseconds)
    pub crawl_delay_ms: u64,
    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Maximum redirects a single fetch will follow
    pub max_redirects: usize,
    /// User agent sent on every outbound request
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            crawl_delay_ms: 500,
            request_timeout_ms: 30_000,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }
}
