//! Tolerant HTML snapshot extraction.
//!
//! Takes raw response bytes, an effective extraction config, and the page's
//! base URL; produces the structured fields a snapshot persists. Pure and
//! best-effort: malformed HTML never fails, missing fields come back absent.

mod breadcrumbs;
mod custom;
mod settings;

pub use settings::{
    BreadcrumbConfig, BreadcrumbPreset, CategorySelectors, ContentConfig, CustomSelector,
    DataType, EcommerceConfig, ExtractionConfig, ExtractionOverride, ExtractionSettings,
    HeadingsConfig, NavigationConfig, OpenGraphConfig, ProductSelectors, DEFAULT_CONFIG_ID,
};

use std::collections::{BTreeMap, HashSet};

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::types::Heading;

/// Ellipsis marker appended to truncated heading text
const TRUNCATION_MARKER: &str = "...";

/// Everything the extractor can pull out of one page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub breadcrumbs: Vec<String>,
    pub headings: Vec<Heading>,
    pub custom_data: BTreeMap<String, serde_json::Value>,
    /// All resolvable `<a href>` targets, for the link crawler
    pub links: Vec<Url>,
    /// Soft configuration errors encountered along the way
    pub warnings: Vec<String>,
}

/// SHA-256 over raw body bytes, hex-encoded
pub fn content_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Extract a structured snapshot from raw response bytes.
pub fn extract(body: &[u8], config: &ExtractionConfig, base: &Url) -> ExtractedPage {
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);
    let mut page = ExtractedPage::default();

    if config.capture_title {
        page.title = extract_title(&document);
    }
    if config.capture_meta_description {
        page.meta_description = meta_content(&document, "description");
    }
    if config.capture_canonical {
        page.canonical_url = extract_canonical(&document, base);
    }
    if config.capture_meta_keywords {
        if let Some(keywords) = meta_content(&document, "keywords") {
            page.custom_data
                .insert("keywords".to_string(), serde_json::Value::String(keywords));
        }
    }

    if config.open_graph.enabled {
        for subfield in &config.open_graph.subfields {
            let property = format!("og:{}", subfield);
            if let Some(value) = meta_property(&document, &property) {
                page.custom_data
                    .insert(property, serde_json::Value::String(value));
            }
        }
    }

    if config.headings.enabled {
        page.headings = extract_headings(&document, &config.headings);
    }

    if config.navigation.breadcrumbs.enabled {
        let (trail, mut warnings) = breadcrumbs::extract(&document, &config.navigation.breadcrumbs);
        page.breadcrumbs = trail;
        page.warnings.append(&mut warnings);
    }

    if config.ecommerce.enabled {
        let (values, mut warnings) = custom::evaluate_ecommerce(&document, &config.ecommerce, base);
        for (name, value) in values {
            page.custom_data.insert(name, value);
        }
        page.warnings.append(&mut warnings);
    }

    for selector in config.custom_selectors.iter().filter(|s| s.enabled) {
        match custom::evaluate(&document, selector, base) {
            Ok(Some(value)) => {
                page.custom_data.insert(selector.name.clone(), value);
            }
            Ok(None) => {}
            Err(warning) => page.warnings.push(warning),
        }
    }

    page.links = extract_links(&document, base);
    page
}

/// Contents of the first `<title>`, whitespace-collapsed
fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let element = document.select(&selector).next()?;
    let title = collapse_whitespace(&element.text().collect::<String>());
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// `content` of the first `<meta name=...>`
fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[name=\"{}\"]", name)).ok()?;
    let element = document.select(&selector).next()?;
    let content = element.value().attr("content")?.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// `content` of the first `<meta property=...>` (Open Graph style)
fn meta_property(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[property=\"{}\"]", property)).ok()?;
    let element = document.select(&selector).next()?;
    let content = element.value().attr("content")?.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// `href` of the first `<link rel="canonical">`, resolved against the base
fn extract_canonical(document: &Html, base: &Url) -> Option<String> {
    let selector = Selector::parse("link[rel=\"canonical\"]").ok()?;
    let element = document.select(&selector).next()?;
    let href = element.value().attr("href")?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Collect headings for the enabled levels.
///
/// Headings are read in document order; with `include_structure` set the
/// final list is stable-sorted by level so the outline groups by depth
/// while preserving document order within each level.
fn extract_headings(document: &Html, config: &HeadingsConfig) -> Vec<Heading> {
    let mut levels: Vec<u8> = config
        .levels
        .iter()
        .copied()
        .filter(|l| (1..=6).contains(l))
        .collect();
    levels.sort_unstable();
    levels.dedup();
    if levels.is_empty() {
        return Vec::new();
    }

    let combined = levels
        .iter()
        .map(|l| format!("h{}", l))
        .collect::<Vec<_>>()
        .join(", ");
    let selector = match Selector::parse(&combined) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut headings: Vec<Heading> = document
        .select(&selector)
        .filter_map(|el| {
            let level: u8 = el.value().name().strip_prefix('h')?.parse().ok()?;
            let text = collapse_whitespace(&el.text().collect::<String>());
            if text.is_empty() {
                return None;
            }
            Some(Heading {
                level,
                text: truncate(&text, config.max_length),
            })
        })
        .collect();

    if config.include_structure {
        headings.sort_by_key(|h| h.level);
    }
    headings
}

/// All `<a href>` values resolved against the base; invalid and non-http
/// URLs are discarded, duplicates keep first-seen order
fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Ok(url) = base.join(href) {
                if (url.scheme() == "http" || url.scheme() == "https")
                    && seen.insert(url.as_str().to_string())
                {
                    urls.push(url);
                }
            }
        }
    }
    urls
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_length).collect();
    format!("{}{}", cut, TRUNCATION_MARKER)
}
