//! robots.txt handling, scoped to one scan.
//!
//! Each host is fetched at most once per scan; fetch failures fall back to
//! allow-all so an unreachable robots.txt never blocks discovery.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::fetcher::PageFetcher;

/// Parsed rules for one host
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<Duration>,
    /// `Sitemap:` hints, host-wide regardless of user agent
    sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Parse robots.txt content for the given user agent. Wildcard groups
    /// apply unless a group naming our agent was seen.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let mut rules = RobotsRules::default();
        let ua_lower = user_agent.to_lowercase();
        let mut current_applies = false;
        let mut found_specific = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if agent == "*" {
                        current_applies = !found_specific;
                    } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                        current_applies = true;
                        if !found_specific {
                            // Specific group replaces wildcard rules
                            rules.disallow.clear();
                            rules.allow.clear();
                            rules.crawl_delay = None;
                        }
                        found_specific = true;
                    } else {
                        current_applies = false;
                    }
                }
                "disallow" if current_applies && !value.is_empty() => {
                    rules.disallow.push(value.to_string());
                }
                "allow" if current_applies && !value.is_empty() => {
                    rules.allow.push(value.to_string());
                }
                "crawl-delay" if current_applies => {
                    if let Ok(secs) = value.parse::<f64>() {
                        rules.crawl_delay = Some(Duration::from_secs_f64(secs));
                    }
                }
                "sitemap" if !value.is_empty() => {
                    rules.sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        rules
    }

    /// Longest-match semantics; equal lengths favor allow
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest_allow = self
            .allow
            .iter()
            .filter(|p| path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let longest_disallow = self
            .disallow
            .iter()
            .filter(|p| path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        longest_allow >= longest_disallow
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Match a path against a robots pattern with `*` wildcards and `$` anchor
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let (pattern, must_end) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        let mut pos = 0;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            match path[pos..].find(part) {
                Some(found) => {
                    if i == 0 && found != 0 {
                        return false;
                    }
                    pos += found + part.len();
                }
                None => return false,
            }
        }
        return !must_end || pos == path.len();
    }

    if must_end {
        return path == pattern;
    }
    path.starts_with(pattern)
}

/// One-fetch-per-host robots cache, alive for the duration of a scan
pub struct RobotsCache {
    fetcher: PageFetcher,
    user_agent: String,
    rules: HashMap<String, RobotsRules>,
}

impl RobotsCache {
    pub fn new(fetcher: PageFetcher, user_agent: impl Into<String>) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.into(),
            rules: HashMap::new(),
        }
    }

    /// Rules for the host of `url`, fetching them on first sight
    pub async fn rules_for(&mut self, url: &Url) -> &RobotsRules {
        let host = url.host_str().unwrap_or_default().to_string();
        if !self.rules.contains_key(&host) {
            let fetched = self.fetch_rules(url).await;
            self.rules.insert(host.clone(), fetched);
        }
        &self.rules[&host]
    }

    /// Whether fetching `url` is permitted
    pub async fn is_allowed(&mut self, url: &Url) -> bool {
        let path = url.path().to_string();
        self.rules_for(url).await.is_allowed(&path)
    }

    async fn fetch_rules(&self, url: &Url) -> RobotsRules {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(_) => return RobotsRules::default(),
        };

        let outcome = self.fetcher.fetch(&robots_url).await;
        if outcome.status == 200 {
            let content = String::from_utf8_lossy(&outcome.body);
            RobotsRules::parse(&content, &self.user_agent)
        } else {
            debug!(
                "robots.txt at {} returned {}, allowing all",
                robots_url, outcome.status
            );
            RobotsRules::default()
        }
    }
}
