//! Breadth-first link crawler.
//!
//! Discovers a site's URL set by following links from the root, bounded by
//! depth and page caps. Fetches run in batches of the configured
//! concurrency; the configured crawl delay (or the host's robots.txt
//! crawl-delay, whichever is longer) paces the batches.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;
use url::Url;

use super::robots::RobotsCache;
use super::{same_registered_domain, CrawlSettings, DiscoveryOutcome};
use crate::extract;
use crate::fetcher::PageFetcher;
use crate::patterns::should_include;

/// Breadth-first URL discovery for one scan
pub struct LinkCrawler<'a> {
    fetcher: &'a PageFetcher,
    robots: RobotsCache,
    root: Url,
    settings: &'a CrawlSettings,
}

impl<'a> LinkCrawler<'a> {
    pub fn new(
        fetcher: &'a PageFetcher,
        root: Url,
        settings: &'a CrawlSettings,
        user_agent: &str,
    ) -> Self {
        let robots = RobotsCache::new(fetcher.clone(), user_agent);
        Self {
            fetcher,
            robots,
            root,
            settings,
        }
    }

    /// Run the crawl to exhaustion or until `max_pages` URLs are discovered.
    pub async fn crawl(&mut self) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let mut frontier: VecDeque<(Url, u8)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut discovered: HashSet<String> = HashSet::new();

        frontier.push_back((self.root.clone(), 0));

        while !frontier.is_empty() && discovered.len() < self.settings.max_pages {
            let batch = self.next_batch(&mut frontier, &mut visited).await;
            if batch.is_empty() {
                continue;
            }

            let fetches = batch
                .iter()
                .map(|(url, _)| self.fetcher.fetch(url))
                .collect::<Vec<_>>();
            let results = join_all(fetches).await;

            for ((url, depth), fetched) in batch.into_iter().zip(results) {
                if !fetched.is_success() || !fetched.is_html() {
                    debug!(
                        "crawl skip {}: status {} type '{}'",
                        url, fetched.status, fetched.content_type
                    );
                    continue;
                }

                // The seed is always traversed, but only include-passing
                // URLs join the discovered set
                let admitted = should_include(
                    url.as_str(),
                    &self.settings.include_patterns,
                    &self.settings.exclude_patterns,
                );
                if admitted && discovered.insert(url.as_str().to_string()) {
                    outcome.urls.push(url.clone());
                    if discovered.len() >= self.settings.max_pages {
                        break;
                    }
                }

                if depth < self.settings.max_depth {
                    for link in extract::extract(&fetched.body, &minimal_link_config(), &url).links
                    {
                        if !self.settings.follow_external
                            && !same_registered_domain(&self.root, &link)
                        {
                            continue;
                        }
                        if !visited.contains(link.as_str()) {
                            frontier.push_back((link, depth + 1));
                        }
                    }
                }
            }

            let delay = self.effective_delay().await;
            if delay > Duration::ZERO && !frontier.is_empty() {
                tokio::time::sleep(delay).await;
            }
        }

        outcome
    }

    /// Pop up to `max_concurrency` crawlable items off the frontier,
    /// applying visited/depth/pattern/robots filters.
    async fn next_batch(
        &mut self,
        frontier: &mut VecDeque<(Url, u8)>,
        visited: &mut HashSet<String>,
    ) -> Vec<(Url, u8)> {
        let mut batch = Vec::new();

        while batch.len() < self.settings.max_concurrency {
            let Some((url, depth)) = frontier.pop_front() else {
                break;
            };
            if depth > self.settings.max_depth || !visited.insert(url.as_str().to_string()) {
                continue;
            }
            // Seeds (depth 0) are fetched regardless of include patterns so
            // their links can be followed; excludes still apply everywhere
            let include_filter: &[crate::patterns::UrlPattern] = if depth == 0 {
                &[]
            } else {
                &self.settings.include_patterns
            };
            if !should_include(url.as_str(), include_filter, &self.settings.exclude_patterns) {
                continue;
            }
            if self.settings.respect_robots && !self.robots.is_allowed(&url).await {
                debug!("crawl skip {}: disallowed by robots.txt", url);
                continue;
            }
            batch.push((url, depth));
        }

        batch
    }

    /// The configured delay, stretched to the root host's robots.txt
    /// crawl-delay when that is longer.
    async fn effective_delay(&mut self) -> Duration {
        let configured = Duration::from_millis(self.settings.crawl_delay_ms);
        if !self.settings.respect_robots {
            return configured;
        }
        let root = self.root.clone();
        match self.robots.rules_for(&root).await.crawl_delay() {
            Some(robots_delay) => configured.max(robots_delay),
            None => configured,
        }
    }
}

/// Link extraction needs none of the field capture machinery
fn minimal_link_config() -> crate::extract::ExtractionConfig {
    crate::extract::ExtractionConfig {
        capture_title: false,
        capture_meta_description: false,
        capture_canonical: false,
        capture_meta_keywords: false,
        headings: crate::extract::HeadingsConfig {
            enabled: false,
            ..Default::default()
        },
        navigation: crate::extract::NavigationConfig {
            breadcrumbs: crate::extract::BreadcrumbConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}
