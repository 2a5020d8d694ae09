//! Custom selector evaluation and typed value casting.
//!
//! Selector failures are soft: an invalid selector or an uncastable value
//! produces a warning on the page result, never an abort.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::settings::{CustomSelector, DataType, EcommerceConfig};

/// Evaluate one custom selector against a parsed document.
///
/// Returns `Ok(None)` when the selector matches nothing, `Err` with a
/// warning message when the selector or cast is broken.
pub(super) fn evaluate(
    document: &Html,
    custom: &CustomSelector,
    base: &Url,
) -> Result<Option<Value>, String> {
    let selector = Selector::parse(&custom.selector)
        .map_err(|_| format!("invalid selector '{}' for field '{}'", custom.selector, custom.name))?;

    let element = match document.select(&selector).next() {
        Some(el) => el,
        None => return Ok(None),
    };

    let raw = match &custom.attribute {
        Some(attr) => match element.value().attr(attr) {
            Some(v) => v.trim().to_string(),
            None => return Ok(None),
        },
        None => element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    };

    if raw.is_empty() {
        return Ok(None);
    }

    cast(&raw, custom.data_type, base)
        .map(Some)
        .map_err(|e| format!("field '{}': {}", custom.name, e))
}

/// Evaluate the e-commerce selector sets into (name, value) pairs.
/// Values land under their plain selector names so the comparison engine's
/// `price` rule applies.
pub(super) fn evaluate_ecommerce(
    document: &Html,
    config: &EcommerceConfig,
    base: &Url,
) -> (Vec<(String, Value)>, Vec<String>) {
    let mut values = Vec::new();
    let mut warnings = Vec::new();

    let fields: [(&str, &Option<String>, DataType); 7] = [
        ("name", &config.product.name, DataType::Text),
        ("price", &config.product.price, DataType::Number),
        ("currency", &config.product.currency, DataType::Text),
        ("availability", &config.product.availability, DataType::Text),
        ("sku", &config.product.sku, DataType::Text),
        ("category", &config.category.name, DataType::Text),
        ("product_count", &config.category.product_count, DataType::Number),
    ];

    for (name, selector, data_type) in fields {
        let Some(selector) = selector else { continue };
        let probe = CustomSelector {
            name: name.to_string(),
            selector: selector.clone(),
            attribute: None,
            data_type,
            enabled: true,
        };
        match evaluate(document, &probe, base) {
            Ok(Some(value)) => values.push((name.to_string(), value)),
            Ok(None) => {}
            Err(warning) => warnings.push(warning),
        }
    }

    (values, warnings)
}

/// Cast a raw string per the configured data type
fn cast(raw: &str, data_type: DataType, base: &Url) -> Result<Value, String> {
    match data_type {
        DataType::Text => Ok(Value::String(raw.to_string())),
        DataType::Number => {
            // Tolerate currency symbols and thousands separators
            let cleaned: String = raw
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            let n: f64 = cleaned
                .parse()
                .map_err(|_| format!("'{}' is not a number", raw))?;
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a finite number", raw))
        }
        DataType::Url => {
            let resolved = base
                .join(raw)
                .map_err(|_| format!("'{}' is not a URL", raw))?;
            Ok(Value::String(resolved.to_string()))
        }
        DataType::Date => parse_date(raw)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .ok_or_else(|| format!("'{}' is not a date", raw)),
        DataType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" | "in stock" | "instock" => Ok(Value::Bool(true)),
            "false" | "no" | "0" | "off" | "out of stock" | "outofstock" => Ok(Value::Bool(false)),
            _ => Err(format!("'{}' is not a boolean", raw)),
        },
    }
}

/// Parse a date string across the formats seen in the wild
fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%Y-%m-%dT%H:%M:%S",
    ];

    for format in &formats {
        if let Ok(naive) = NaiveDate::parse_from_str(date_str, format) {
            if let Some(naive_dt) = naive.and_hms_opt(0, 0, 0) {
                return Some(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(date_str, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    None
}
