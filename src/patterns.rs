//! Glob-style URL pattern matching for include/exclude filtering.
//!
//! Patterns use `*` (any run of characters) and `?` (one character); they are
//! translated into anchored regular expressions with every other regex
//! metacharacter escaped.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// An include/exclude pattern as configured on a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub pattern: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl UrlPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: true,
        }
    }

    pub fn disabled(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: false,
        }
    }
}

/// Translate a glob pattern to an anchored regex
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            // Escape everything regex considers special
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                expr.push('\\');
                expr.push(ch);
            }
            other => expr.push(other),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}

/// A single pattern tried against the full URL string and, for absolute
/// URLs, against the path component alone, so site configs can use either
/// `https://a.example/products/*` or just `/products/*`.
fn pattern_hits(url: &str, path: Option<&str>, pattern: &str) -> bool {
    glob_to_regex(pattern)
        .map(|re| re.is_match(url) || path.map(|p| re.is_match(p)).unwrap_or(false))
        .unwrap_or(false)
}

/// True iff any pattern in the list matches the URL
pub fn matches(url: &str, patterns: &[UrlPattern]) -> bool {
    let path = url::Url::parse(url).ok().map(|u| u.path().to_string());
    patterns
        .iter()
        .any(|p| pattern_hits(url, path.as_deref(), &p.pattern))
}

/// Decide whether a URL passes the configured include/exclude filters.
///
/// Exclude always wins, and an exclude applies whether or not it is marked
/// enabled. An empty include list admits everything; otherwise at least one
/// *enabled* include pattern must match.
pub fn should_include(url: &str, include: &[UrlPattern], exclude: &[UrlPattern]) -> bool {
    let path = url::Url::parse(url).ok().map(|u| u.path().to_string());

    if exclude
        .iter()
        .any(|p| pattern_hits(url, path.as_deref(), &p.pattern))
    {
        return false;
    }

    if include.is_empty() {
        return true;
    }

    include
        .iter()
        .filter(|p| p.enabled)
        .any(|p| pattern_hits(url, path.as_deref(), &p.pattern))
}
