//! Breadcrumb trail extraction.
//!
//! Resolution order: JSON-LD `BreadcrumbList` first (always, regardless of
//! the configured preset), then the preset's selector list, then any custom
//! selectors. The first source yielding at least one entry wins.

use scraper::{Html, Selector};
use serde_json::Value;

use super::settings::{BreadcrumbConfig, BreadcrumbPreset};

/// Selector lists for the known breadcrumb markup presets
fn preset_selectors(preset: BreadcrumbPreset) -> &'static [&'static str] {
    match preset {
        // JSON-LD only; handled before selectors run
        BreadcrumbPreset::Schema => &[],
        BreadcrumbPreset::Bootstrap => &[".breadcrumb .breadcrumb-item", ".breadcrumb li"],
        BreadcrumbPreset::Foundation => &[".breadcrumbs li"],
        BreadcrumbPreset::Bulma => &[".breadcrumb li"],
        BreadcrumbPreset::Tailwind => &["nav[aria-label=\"breadcrumb\"] a"],
        BreadcrumbPreset::Material => &[".mdc-breadcrumb__item", ".mdc-breadcrumb li"],
        BreadcrumbPreset::Custom => &[],
    }
}

/// Extract a breadcrumb trail from a parsed document.
///
/// Returns the trail plus any configuration warnings (invalid custom
/// selectors). Never fails; an empty trail is a valid result.
pub(super) fn extract(document: &Html, config: &BreadcrumbConfig) -> (Vec<String>, Vec<String>) {
    let mut warnings = Vec::new();

    let mut trail = from_json_ld(document);

    if trail.is_empty() {
        trail = from_selectors(document, preset_selectors(config.preset), &mut warnings);
    }

    if trail.is_empty() && !config.custom_selectors.is_empty() {
        let custom: Vec<&str> = config.custom_selectors.iter().map(|s| s.as_str()).collect();
        trail = from_selectors(document, &custom, &mut warnings);
    }

    if config.remove_home {
        if let Some(first) = trail.first() {
            if first.eq_ignore_ascii_case("home") {
                trail.remove(0);
            }
        }
    }

    trail.truncate(config.max_depth);
    (trail, warnings)
}

/// Collect `itemListElement[*].name` from the first JSON-LD `BreadcrumbList`
fn from_json_ld(document: &Html) -> Vec<String> {
    let selector = match Selector::parse("script[type=\"application/ld+json\"]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    for script in document.select(&selector) {
        let json_text = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(&json_text) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let names = find_breadcrumb_list(&value);
        if !names.is_empty() {
            return names;
        }
    }

    Vec::new()
}

/// Walk a JSON-LD value (including `@graph` arrays) looking for a
/// `BreadcrumbList` node
fn find_breadcrumb_list(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => {
            let is_breadcrumb = map
                .get("@type")
                .and_then(|t| t.as_str())
                .map(|t| t == "BreadcrumbList")
                .unwrap_or(false);

            if is_breadcrumb {
                if let Some(Value::Array(items)) = map.get("itemListElement") {
                    return items.iter().filter_map(item_name).collect();
                }
            }

            // Recurse into @graph and other nested containers
            for nested in map.values() {
                let names = find_breadcrumb_list(nested);
                if !names.is_empty() {
                    return names;
                }
            }
            Vec::new()
        }
        Value::Array(items) => {
            for item in items {
                let names = find_breadcrumb_list(item);
                if !names.is_empty() {
                    return names;
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// A ListItem's display name: `name` directly, or `item.name`
fn item_name(item: &Value) -> Option<String> {
    let obj = item.as_object()?;
    let name = obj
        .get("name")
        .and_then(|n| n.as_str())
        .or_else(|| {
            obj.get("item")
                .and_then(|i| i.as_object())
                .and_then(|i| i.get("name"))
                .and_then(|n| n.as_str())
        })?
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// First selector in the list that yields a non-empty trail
fn from_selectors(document: &Html, selectors: &[&str], warnings: &mut Vec<String>) -> Vec<String> {
    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(_) => {
                warnings.push(format!("invalid breadcrumb selector '{}'", raw));
                continue;
            }
        };

        let trail: Vec<String> = document
            .select(&selector)
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|t| !t.is_empty())
            .collect();

        if !trail.is_empty() {
            return trail;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn json_ld_breadcrumb_list_is_used() {
        let html = r#"
        <html><head><script type="application/ld+json">
        {"@type":"BreadcrumbList","itemListElement":[
          {"@type":"ListItem","position":1,"name":"Home"},
          {"@type":"ListItem","position":2,"name":"Products"},
          {"@type":"ListItem","position":3,"item":{"name":"Widget"}}
        ]}
        </script></head><body></body></html>"#;

        let (trail, warnings) = extract(&doc(html), &BreadcrumbConfig::default());
        assert_eq!(trail, vec!["Home", "Products", "Widget"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn json_ld_wins_over_selector_markup() {
        let html = r#"
        <html><head><script type="application/ld+json">
        {"@type":"BreadcrumbList","itemListElement":[{"name":"FromJsonLd"}]}
        </script></head>
        <body><ul class="breadcrumb"><li>FromMarkup</li></ul></body></html>"#;

        let config = BreadcrumbConfig {
            preset: BreadcrumbPreset::Bootstrap,
            ..Default::default()
        };
        let (trail, _) = extract(&doc(html), &config);
        assert_eq!(trail, vec!["FromJsonLd"]);
    }

    #[test]
    fn json_ld_inside_graph_is_found() {
        let html = r#"
        <html><head><script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
          {"@type":"WebSite","name":"x"},
          {"@type":"BreadcrumbList","itemListElement":[{"name":"A"},{"name":"B"}]}
        ]}
        </script></head><body></body></html>"#;

        let (trail, _) = extract(&doc(html), &BreadcrumbConfig::default());
        assert_eq!(trail, vec!["A", "B"]);
    }

    #[test]
    fn bootstrap_preset_reads_list_items() {
        let html = r#"<nav><ol class="breadcrumb">
            <li class="breadcrumb-item">Home</li>
            <li class="breadcrumb-item">Library</li>
            <li class="breadcrumb-item">Data</li>
        </ol></nav>"#;

        let config = BreadcrumbConfig {
            preset: BreadcrumbPreset::Bootstrap,
            ..Default::default()
        };
        let (trail, _) = extract(&doc(html), &config);
        assert_eq!(trail, vec!["Home", "Library", "Data"]);
    }

    #[test]
    fn remove_home_drops_leading_home_only() {
        let html = r#"<ul class="breadcrumbs"><li>HOME</li><li>Shop</li><li>Home Decor</li></ul>"#;
        let config = BreadcrumbConfig {
            preset: BreadcrumbPreset::Foundation,
            remove_home: true,
            ..Default::default()
        };
        let (trail, _) = extract(&doc(html), &config);
        assert_eq!(trail, vec!["Shop", "Home Decor"]);
    }

    #[test]
    fn max_depth_caps_the_trail() {
        let html = r#"<ul class="breadcrumb"><li>a</li><li>b</li><li>c</li><li>d</li></ul>"#;
        let config = BreadcrumbConfig {
            preset: BreadcrumbPreset::Bulma,
            max_depth: 2,
            ..Default::default()
        };
        let (trail, _) = extract(&doc(html), &config);
        assert_eq!(trail, vec!["a", "b"]);
    }

    #[test]
    fn custom_selectors_are_last_resort() {
        let html = r#"<div id="crumbs"><span>One</span><span>Two</span></div>"#;
        let config = BreadcrumbConfig {
            preset: BreadcrumbPreset::Custom,
            custom_selectors: vec!["#crumbs span".to_string()],
            ..Default::default()
        };
        let (trail, _) = extract(&doc(html), &config);
        assert_eq!(trail, vec!["One", "Two"]);
    }

    #[test]
    fn invalid_custom_selector_warns_and_continues() {
        let html = r#"<div class="path"><span>X</span></div>"#;
        let config = BreadcrumbConfig {
            preset: BreadcrumbPreset::Custom,
            custom_selectors: vec!["[[broken".to_string(), ".path span".to_string()],
            ..Default::default()
        };
        let (trail, warnings) = extract(&doc(html), &config);
        assert_eq!(trail, vec!["X"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("invalid breadcrumb selector"));
    }

    #[test]
    fn no_breadcrumbs_yields_empty_trail() {
        let (trail, warnings) = extract(&doc("<p>nothing</p>"), &BreadcrumbConfig::default());
        assert!(trail.is_empty());
        assert!(warnings.is_empty());
    }
}
