//! Fetch-and-extract worker pool.
//!
//! Fans a URL list across a bounded set of workers. Pacing is global: one
//! shared clock hands out fetch slots `crawl_delay` apart across the whole
//! pool. Every task produces a result record; fetch failures become records
//! with the observed status and zero-valued extracted fields.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;
use url::Url;

use crate::extract::{self, ExtractedPage, ExtractionConfig};
use crate::fetcher::PageFetcher;

/// One unit of work: a URL plus the extraction config resolved for it
#[derive(Debug, Clone)]
pub struct UrlTask {
    pub url: Url,
    pub config: ExtractionConfig,
    pub config_id: String,
}

/// Per-URL outcome of fetch + extract
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: Url,
    /// HTTP status; 0 for transport failures
    pub status: u16,
    /// Empty when the page was not successfully fetched as HTML
    pub content_hash: String,
    pub load_time_ms: u64,
    /// Zero-valued for non-HTML and error responses
    pub extracted: ExtractedPage,
    pub config_id: String,
    pub error: Option<String>,
}

impl PageResult {
    /// Status in [200, 400)
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Hands out fetch start times `delay` apart across all workers
struct Pacer {
    next_allowed: Mutex<Instant>,
    delay: Duration,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            next_allowed: Mutex::new(Instant::now()),
            delay,
        }
    }

    async fn wait_turn(&self) {
        if self.delay.is_zero() {
            return;
        }
        let wait = {
            let mut next = self.next_allowed.lock().await;
            let now = Instant::now();
            let start = (*next).max(now);
            *next = start + self.delay;
            start.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

/// Bounded worker pool driving fetch + extract per URL
pub struct WorkerPool {
    fetcher: PageFetcher,
    semaphore: Arc<Semaphore>,
    pacer: Arc<Pacer>,
}

impl WorkerPool {
    pub fn new(fetcher: PageFetcher, max_concurrency: usize, crawl_delay: Duration) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            pacer: Arc::new(Pacer::new(crawl_delay)),
        }
    }

    /// Process every task; results come back in input order.
    pub async fn run(&self, tasks: Vec<UrlTask>) -> Vec<PageResult> {
        let futures = tasks.into_iter().map(|task| {
            let fetcher = self.fetcher.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let pacer = Arc::clone(&self.pacer);
            async move {
                // Closed only on pool drop; treat as an empty slot
                let _permit = semaphore.acquire().await;
                pacer.wait_turn().await;
                process_one(&fetcher, task).await
            }
        });
        join_all(futures).await
    }
}

async fn process_one(fetcher: &PageFetcher, task: UrlTask) -> PageResult {
    let outcome = fetcher.fetch(&task.url).await;

    if outcome.is_success() && outcome.is_html() {
        let extracted = extract::extract(&outcome.body, &task.config, &task.url);
        PageResult {
            url: task.url,
            status: outcome.status,
            content_hash: outcome.content_hash,
            load_time_ms: outcome.load_time_ms,
            extracted,
            config_id: task.config_id,
            error: outcome.error,
        }
    } else {
        debug!(
            "page {} not extracted: status {} type '{}'",
            task.url, outcome.status, outcome.content_type
        );
        PageResult {
            url: task.url,
            status: outcome.status,
            content_hash: String::new(),
            load_time_ms: outcome.load_time_ms,
            extracted: ExtractedPage::default(),
            config_id: task.config_id,
            error: outcome.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_slots_by_delay() {
        let pacer = Pacer::new(Duration::from_millis(100));
        let start = Instant::now();

        pacer.wait_turn().await;
        pacer.wait_turn().await;
        pacer.wait_turn().await;

        // Third slot starts two delays after the first
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn zero_delay_pacer_is_free() {
        let pacer = Pacer::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            pacer.wait_turn().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
