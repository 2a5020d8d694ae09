//! Single-request HTTP fetching.
//!
//! One GET with timeout, user agent, and redirect policy. The fetcher never
//! surfaces errors upward: transport failures become a `FetchOutcome` with
//! status 0 and the error message recorded, so callers always get a record
//! per URL.

use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;

use crate::extract::content_hash;

/// Errors constructing the fetcher itself (never per-request)
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client build failed: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// The complete record of one fetch attempt
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The requested URL
    pub url: Url,
    /// Final URL after redirects (same as `url` when none were followed)
    pub final_url: Url,
    /// HTTP status; 0 for transport-level failures
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    /// Raw response body bytes; empty on failure
    pub body: Vec<u8>,
    /// Wall-clock from request start to body complete
    pub load_time_ms: u64,
    /// SHA-256 over `body`, hex-encoded; empty when there is no body
    pub content_hash: String,
    /// Transport error message when `status == 0`
    pub error: Option<String>,
}

impl FetchOutcome {
    /// Status in [200, 400)
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type.contains("text/html") || self.content_type.contains("application/xhtml")
    }

    fn transport_failure(url: &Url, error: String, load_time_ms: u64) -> Self {
        Self {
            url: url.clone(),
            final_url: url.clone(),
            status: 0,
            headers: Vec::new(),
            content_type: String::new(),
            body: Vec::new(),
            load_time_ms,
            content_hash: String::new(),
            error: Some(error),
        }
    }
}

/// Reusable GET client shared by discovery and the worker pool
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    /// Build a fetcher with the given user agent, per-request timeout, and
    /// redirect policy.
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        follow_redirects: bool,
        max_redirects: usize,
    ) -> Result<Self, FetchError> {
        let redirect_policy = if follow_redirects {
            reqwest::redirect::Policy::limited(max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(redirect_policy)
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch one URL. Infallible by contract: any failure is encoded in the
    /// returned outcome.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let start = Instant::now();

        let response = match self.client.get(url.as_str()).send().await {
            Ok(r) => r,
            Err(e) => {
                return FetchOutcome::transport_failure(
                    url,
                    e.to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().clone();

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        let content_type = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        let body = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                return FetchOutcome::transport_failure(
                    url,
                    format!("body read failed: {}", e),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let hash = if body.is_empty() {
            String::new()
        } else {
            content_hash(&body)
        };

        FetchOutcome {
            url: url.clone(),
            final_url,
            status,
            headers,
            content_type,
            body,
            load_time_ms: start.elapsed().as_millis() as u64,
            content_hash: hash,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_is_200_to_399() {
        let mut outcome = FetchOutcome::transport_failure(
            &Url::parse("https://a.example/").unwrap(),
            "x".to_string(),
            0,
        );
        assert!(!outcome.is_success());

        outcome.status = 200;
        assert!(outcome.is_success());
        outcome.status = 301;
        assert!(outcome.is_success());
        outcome.status = 404;
        assert!(!outcome.is_success());
        outcome.status = 500;
        assert!(!outcome.is_success());
    }

    #[test]
    fn html_detection_reads_content_type() {
        let mut outcome = FetchOutcome::transport_failure(
            &Url::parse("https://a.example/").unwrap(),
            "x".to_string(),
            0,
        );
        outcome.content_type = "text/html; charset=utf-8".to_string();
        assert!(outcome.is_html());
        outcome.content_type = "application/json".to_string();
        assert!(!outcome.is_html());
    }

    #[test]
    fn transport_failure_has_zero_status_and_empty_hash() {
        let url = Url::parse("https://unreachable.invalid/").unwrap();
        let outcome = FetchOutcome::transport_failure(&url, "dns error".to_string(), 12);
        assert_eq!(outcome.status, 0);
        assert!(outcome.content_hash.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("dns error"));
        assert_eq!(outcome.load_time_ms, 12);
    }

    #[tokio::test]
    async fn connection_refused_becomes_status_zero() {
        let fetcher =
            PageFetcher::new("test-agent/1.0", Duration::from_millis(500), true, 5).unwrap();
        // Reserved port on localhost with nothing listening
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let outcome = fetcher.fetch(&url).await;
        assert_eq!(outcome.status, 0);
        assert!(outcome.error.is_some());
    }
}
