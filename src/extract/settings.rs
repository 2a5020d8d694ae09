//! Extraction configuration: which fields to capture, and per-URL-pattern
//! overrides.
//!
//! Settings are immutable explicit structs with default-fill at load time:
//! an override section in a config file only needs the fields it changes,
//! serde fills the rest from the defaults below.

use serde::{Deserialize, Serialize};

use crate::patterns::glob_to_regex;

/// Identifier used on snapshots produced by the default config
pub const DEFAULT_CONFIG_ID: &str = "default";

/// Typed cast applied to a custom selector value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Number,
    Url,
    Date,
    Boolean,
}

impl Default for DataType {
    fn default() -> Self {
        Self::Text
    }
}

/// One caller-defined extraction target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSelector {
    pub name: String,
    pub selector: String,
    /// Attribute to read; text content when absent
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Heading outline capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingsConfig {
    pub enabled: bool,
    /// Which levels to collect, 1..=6
    pub levels: Vec<u8>,
    /// Keep outline structure (level ordering) in the snapshot
    pub include_structure: bool,
    /// Heading text longer than this is truncated with an ellipsis marker
    pub max_length: usize,
}

impl Default for HeadingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: vec![1, 2, 3],
            include_structure: true,
            max_length: 200,
        }
    }
}

/// Known breadcrumb markup presets; `Schema` means JSON-LD only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadcrumbPreset {
    Schema,
    Bootstrap,
    Foundation,
    Bulma,
    Tailwind,
    Material,
    Custom,
}

impl Default for BreadcrumbPreset {
    fn default() -> Self {
        Self::Schema
    }
}

/// Breadcrumb trail capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreadcrumbConfig {
    pub enabled: bool,
    pub preset: BreadcrumbPreset,
    /// Used when preset is `Custom`, and as a last-resort fallback otherwise
    #[serde(default)]
    pub custom_selectors: Vec<String>,
    /// Join separator used when breadcrumbs are compared as a single string
    pub separator: String,
    /// Drop a leading "Home" entry
    pub remove_home: bool,
    /// Maximum trail length
    pub max_depth: usize,
}

impl Default for BreadcrumbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: BreadcrumbPreset::Schema,
            custom_selectors: Vec::new(),
            separator: " > ".to_string(),
            remove_home: false,
            max_depth: 10,
        }
    }
}

/// Site navigation capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default)]
    pub main_selector: Option<String>,
    #[serde(default)]
    pub footer_selector: Option<String>,
    #[serde(default)]
    pub sidebar_selector: Option<String>,
    #[serde(default)]
    pub breadcrumbs: BreadcrumbConfig,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            main_selector: None,
            footer_selector: None,
            sidebar_selector: None,
            breadcrumbs: BreadcrumbConfig::default(),
        }
    }
}

/// Main content capture settings. The snapshot itself does not persist the
/// body text (content identity is the SHA-256 hash); these settings bound
/// what the extractor walks when resolving selector-relative fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub exclude_selectors: Vec<String>,
    pub max_length: usize,
    pub include_images: bool,
    pub include_links: bool,
    pub preserve_formatting: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            selector: None,
            exclude_selectors: Vec::new(),
            max_length: 10_000,
            include_images: false,
            include_links: false,
            preserve_formatting: false,
        }
    }
}

/// Open Graph subfield capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenGraphConfig {
    pub enabled: bool,
    /// Subfields read as `og:<name>` meta properties
    pub subfields: Vec<String>,
}

impl Default for OpenGraphConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            subfields: vec![
                "title".to_string(),
                "description".to_string(),
                "image".to_string(),
                "type".to_string(),
            ],
        }
    }
}

/// Product page selector set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductSelectors {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

/// Category page selector set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySelectors {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub product_count: Option<String>,
}

/// E-commerce field capture; extracted values land in snapshot custom data
/// under their selector names (`price`, `sku`, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcommerceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub product: ProductSelectors,
    #[serde(default)]
    pub category: CategorySelectors,
}

/// A complete description of which fields to capture from a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub capture_title: bool,
    #[serde(default = "default_true")]
    pub capture_meta_description: bool,
    #[serde(default = "default_true")]
    pub capture_canonical: bool,
    #[serde(default)]
    pub capture_meta_keywords: bool,
    #[serde(default)]
    pub open_graph: OpenGraphConfig,
    #[serde(default)]
    pub headings: HeadingsConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub ecommerce: EcommerceConfig,
    #[serde(default)]
    pub custom_selectors: Vec<CustomSelector>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            capture_title: true,
            capture_meta_description: true,
            capture_canonical: true,
            capture_meta_keywords: false,
            open_graph: OpenGraphConfig::default(),
            headings: HeadingsConfig::default(),
            navigation: NavigationConfig::default(),
            content: ContentConfig::default(),
            ecommerce: EcommerceConfig::default(),
            custom_selectors: Vec::new(),
        }
    }
}

/// A named per-URL-pattern override of the default config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOverride {
    pub name: String,
    /// Glob pattern the URL must match
    pub pattern: String,
    /// Higher wins; ties broken by list order
    #[serde(default)]
    pub priority: i32,
    pub config: ExtractionConfig,
}

/// Default extraction config plus ordered overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSettings {
    #[serde(default)]
    pub default: ExtractionConfig,
    #[serde(default)]
    pub overrides: Vec<ExtractionOverride>,
}

impl ExtractionSettings {
    /// Resolve the config to use for a URL. Returns the config and its
    /// identifier for the snapshot row.
    pub fn effective_config(&self, url: &str) -> (&ExtractionConfig, &str) {
        let mut best: Option<&ExtractionOverride> = None;
        for ov in &self.overrides {
            let hit = glob_to_regex(&ov.pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false);
            if !hit {
                continue;
            }
            // Strictly-greater keeps the earliest override on priority ties
            match best {
                Some(current) if ov.priority <= current.priority => {}
                _ => best = Some(ov),
            }
        }
        match best {
            Some(ov) => (&ov.config, ov.name.as_str()),
            None => (&self.default, DEFAULT_CONFIG_ID),
        }
    }
}

fn default_true() -> bool {
    true
}
