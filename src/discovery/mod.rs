//! URL discovery: sitemap resolution and breadth-first link crawling.

mod crawler;
mod robots;
mod sitemap;

pub use crawler::LinkCrawler;
pub use robots::{RobotsCache, RobotsRules};
pub use sitemap::SitemapParser;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::extract::ExtractionConfig;
use crate::patterns::UrlPattern;

/// One configured sitemap source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub name: Option<String>,
    /// Extraction override applied to URLs discovered through this entry
    #[serde(default)]
    pub extraction: Option<ExtractionConfig>,
}

/// Link-following crawl configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub max_depth: u8,
    pub max_pages: usize,
    pub crawl_delay_ms: u64,
    pub max_concurrency: usize,
    pub timeout_s: u64,
    pub follow_external: bool,
    pub follow_redirects: bool,
    pub respect_robots: bool,
    #[serde(default)]
    pub include_patterns: Vec<UrlPattern>,
    #[serde(default)]
    pub exclude_patterns: Vec<UrlPattern>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 1000,
            crawl_delay_ms: 500,
            max_concurrency: 10,
            timeout_s: 30,
            follow_external: false,
            follow_redirects: true,
            respect_robots: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Per-site discovery configuration: sitemap sources or a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Which discovery path a scan takes
    pub method: crate::types::DiscoveryMethod,
    #[serde(default)]
    pub sitemaps: Vec<SitemapEntry>,
    /// Probe well-known sitemap locations when the list is empty
    #[serde(default = "default_true")]
    pub auto_detect: bool,
    /// Recurse into sitemap-index documents
    #[serde(default = "default_true")]
    pub follow_sitemap_index: bool,
    #[serde(default)]
    pub crawl: CrawlSettings,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            method: crate::types::DiscoveryMethod::Sitemap,
            sitemaps: Vec::new(),
            auto_detect: true,
            follow_sitemap_index: true,
            crawl: CrawlSettings::default(),
        }
    }
}

/// The result of the discovery phase
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Deduped URL set in first-seen order
    pub urls: Vec<Url>,
    /// URL -> index into `DiscoverySettings::sitemaps`, recorded for entries
    /// that carry an extraction override
    pub entry_overrides: HashMap<String, usize>,
    /// Per-source failures that did not abort discovery
    pub warnings: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// True when `candidate` belongs to the same registered domain as `root`:
/// the same host, or a subdomain of it, with any `www.` prefix ignored.
pub(crate) fn same_registered_domain(root: &Url, candidate: &Url) -> bool {
    let root_host = match root.host_str() {
        Some(h) => h.trim_start_matches("www."),
        None => return false,
    };
    let candidate_host = match candidate.host_str() {
        Some(h) => h.trim_start_matches("www."),
        None => return false,
    };
    candidate_host == root_host || candidate_host.ends_with(&format!(".{}", root_host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_domain_ignores_www_and_accepts_subdomains() {
        let root = url("https://www.a.example/");
        assert!(same_registered_domain(&root, &url("https://a.example/x")));
        assert!(same_registered_domain(&root, &url("https://shop.a.example/x")));
        assert!(!same_registered_domain(&root, &url("https://b.example/x")));
        assert!(!same_registered_domain(&root, &url("https://nota.example/x")));
    }

    #[test]
    fn crawl_settings_defaults() {
        let crawl = CrawlSettings::default();
        assert_eq!(crawl.max_depth, 3);
        assert_eq!(crawl.max_pages, 1000);
        assert!(crawl.respect_robots);
        assert!(!crawl.follow_external);
    }
}
