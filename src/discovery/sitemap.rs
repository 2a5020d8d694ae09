//! XML sitemap resolution, including sitemap-index recursion.
//!
//! Individual sitemap failures are logged and skipped; the parent call
//! keeps going with its other sources. When no sitemaps are configured and
//! auto-detect is on, `robots.txt` `Sitemap:` hints and the well-known
//! locations are probed.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};
use url::Url;

use super::robots::RobotsRules;
use super::{DiscoveryOutcome, DiscoverySettings};
use crate::fetcher::PageFetcher;

/// Recursion guard for sitemap-index chains
const MAX_SITEMAP_DEPTH: usize = 8;

/// Well-known sitemap locations probed during auto-detection
const AUTO_DETECT_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemaps.xml"];

/// What kind of document a sitemap URL served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SitemapKind {
    UrlSet,
    Index,
    Unknown,
}

/// A parsed sitemap document: its kind plus every `<loc>` at that level
#[derive(Debug)]
struct SitemapDocument {
    kind: SitemapKind,
    locs: Vec<String>,
}

/// Parse sitemap XML into its kind and `<loc>` entries. Tolerant: anything
/// unparseable simply stops contributing entries.
fn parse_sitemap_xml(xml: &str) -> SitemapDocument {
    let mut reader = Reader::from_reader(xml.as_bytes());

    let mut kind = SitemapKind::Unknown;
    let mut saw_root = false;
    let mut in_loc = false;
    let mut locs = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if !saw_root {
                    saw_root = true;
                    kind = match name.as_str() {
                        "sitemapindex" => SitemapKind::Index,
                        "urlset" => SitemapKind::UrlSet,
                        _ => SitemapKind::Unknown,
                    };
                }
                in_loc = name == "loc";
            }
            Ok(Event::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim();
                    if !text.is_empty() {
                        locs.push(text.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => in_loc = false,
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("sitemap XML parse stopped: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    SitemapDocument { kind, locs }
}

/// Resolves configured (or auto-detected) sitemaps into a page URL set
pub struct SitemapParser<'a> {
    fetcher: &'a PageFetcher,
}

impl<'a> SitemapParser<'a> {
    pub fn new(fetcher: &'a PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Resolve every enabled sitemap source for a site into a deduped URL
    /// list, preserving first-seen order.
    pub async fn collect(&self, site_root: &Url, settings: &DiscoverySettings) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        let enabled: Vec<(usize, &super::SitemapEntry)> = settings
            .sitemaps
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled)
            .collect();

        if enabled.is_empty() {
            if settings.auto_detect {
                let sources = self.auto_detect_sources(site_root).await;
                for source in sources {
                    let urls = self
                        .resolve_source(&source, settings.follow_sitemap_index, &mut outcome.warnings)
                        .await;
                    for url in urls {
                        self.admit(url, None, &mut seen, &mut outcome);
                    }
                }
            }
            return outcome;
        }

        for (index, entry) in enabled {
            let urls = self
                .resolve_source(&entry.url, settings.follow_sitemap_index, &mut outcome.warnings)
                .await;
            let override_index = entry.extraction.as_ref().map(|_| index);
            for url in urls {
                self.admit(url, override_index, &mut seen, &mut outcome);
            }
        }

        outcome
    }

    fn admit(
        &self,
        raw: String,
        override_index: Option<usize>,
        seen: &mut HashSet<String>,
        outcome: &mut DiscoveryOutcome,
    ) {
        let Ok(url) = Url::parse(&raw) else { return };
        if url.scheme() != "http" && url.scheme() != "https" {
            return;
        }
        if seen.insert(url.as_str().to_string()) {
            if let Some(index) = override_index {
                outcome
                    .entry_overrides
                    .insert(url.as_str().to_string(), index);
            }
            outcome.urls.push(url);
        }
    }

    /// Resolve one sitemap URL, recursing into index documents
    async fn resolve_source(
        &self,
        source: &str,
        follow_index: bool,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let Ok(url) = Url::parse(source) else {
            warnings.push(format!("sitemap '{}' is not a valid URL", source));
            return Vec::new();
        };

        let mut visited = HashSet::new();
        self.resolve_recursive(url, follow_index, 0, &mut visited, warnings)
            .await
    }

    fn resolve_recursive<'s>(
        &'s self,
        url: Url,
        follow_index: bool,
        depth: usize,
        visited: &'s mut HashSet<String>,
        warnings: &'s mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + 's>> {
        Box::pin(async move {
            if depth >= MAX_SITEMAP_DEPTH || !visited.insert(url.as_str().to_string()) {
                return Vec::new();
            }

            let outcome = self.fetcher.fetch(&url).await;
            if !outcome.is_success() {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| format!("HTTP {}", outcome.status));
                warn!("sitemap {} skipped: {}", url, reason);
                warnings.push(format!("sitemap {} skipped: {}", url, reason));
                return Vec::new();
            }

            let xml = String::from_utf8_lossy(&outcome.body);
            let document = parse_sitemap_xml(&xml);

            match document.kind {
                SitemapKind::Index if follow_index => {
                    let mut urls = Vec::new();
                    for child in document.locs {
                        let Ok(child_url) = Url::parse(&child) else {
                            continue;
                        };
                        let mut child_urls = self
                            .resolve_recursive(child_url, follow_index, depth + 1, visited, warnings)
                            .await;
                        urls.append(&mut child_urls);
                    }
                    urls
                }
                SitemapKind::Index => {
                    debug!("sitemap {} is an index but follow_sitemap_index is off", url);
                    Vec::new()
                }
                SitemapKind::UrlSet | SitemapKind::Unknown => document.locs,
            }
        })
    }

    /// Probe robots.txt `Sitemap:` hints and the well-known locations
    async fn auto_detect_sources(&self, site_root: &Url) -> Vec<String> {
        let mut sources = Vec::new();

        if let Ok(robots_url) = site_root.join("/robots.txt") {
            let outcome = self.fetcher.fetch(&robots_url).await;
            if outcome.status == 200 {
                let content = String::from_utf8_lossy(&outcome.body);
                let rules = RobotsRules::parse(&content, "*");
                for hint in rules.sitemaps() {
                    if !sources.contains(hint) {
                        sources.push(hint.clone());
                    }
                }
            }
        }

        for path in AUTO_DETECT_PATHS {
            if let Ok(candidate) = site_root.join(path) {
                let candidate = candidate.to_string();
                if !sources.contains(&candidate) {
                    sources.push(candidate);
                }
            }
        }

        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlset_locs_are_extracted() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://a.example/</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>https://a.example/about</loc></url>
</urlset>"#;
        let doc = parse_sitemap_xml(xml);
        assert_eq!(doc.kind, SitemapKind::UrlSet);
        assert_eq!(doc.locs, vec!["https://a.example/", "https://a.example/about"]);
    }

    #[test]
    fn sitemapindex_root_is_detected() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://a.example/sitemap-1.xml</loc></sitemap>
  <sitemap><loc>https://a.example/sitemap-2.xml</loc></sitemap>
</sitemapindex>"#;
        let doc = parse_sitemap_xml(xml);
        assert_eq!(doc.kind, SitemapKind::Index);
        assert_eq!(doc.locs.len(), 2);
    }

    #[test]
    fn truncated_xml_yields_the_complete_entries() {
        let xml = "<urlset><url><loc>https://a.example/ok</loc></url><url><lo";
        let doc = parse_sitemap_xml(xml);
        assert_eq!(doc.kind, SitemapKind::UrlSet);
        assert_eq!(doc.locs, vec!["https://a.example/ok"]);
    }

    #[test]
    fn whitespace_in_loc_is_trimmed() {
        let xml = "<urlset><url><loc>\n  https://a.example/page \n</loc></url></urlset>";
        let doc = parse_sitemap_xml(xml);
        assert_eq!(doc.locs, vec!["https://a.example/page"]);
    }

    #[test]
    fn non_sitemap_xml_is_unknown_kind() {
        let doc = parse_sitemap_xml("<rss><channel></channel></rss>");
        assert_eq!(doc.kind, SitemapKind::Unknown);
        assert!(doc.locs.is_empty());
    }
}
