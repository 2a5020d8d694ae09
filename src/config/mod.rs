//! Process configuration for the monitor.
//!
//! Loaded from a TOML file, overridable through environment variables, and
//! validated in one pass so operators see every problem at once.

mod crawler;
mod dispatcher;
mod http;
mod logging;
mod reaper;

pub use crawler::CrawlerConfig;
pub use dispatcher::DispatcherConfig;
pub use http::HttpConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use reaper::ReaperConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for all outbound HTTP requests
pub const DEFAULT_USER_AGENT: &str = "WebMonitor-Crawler/1.0";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from defaults plus environment overrides only.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply the documented environment variable overrides.
    pub fn apply_env(&mut self) {
        read_env("MAX_CONCURRENCY", &mut self.crawler.max_concurrency);
        read_env("CRAWL_DELAY_MS", &mut self.crawler.crawl_delay_ms);
        read_env("REQUEST_TIMEOUT_MS", &mut self.crawler.request_timeout_ms);
        read_env("RETRY_ATTEMPTS", &mut self.dispatcher.retry_attempts);
        read_env("DISPATCHER_POLL_MS", &mut self.dispatcher.poll_ms);
        read_env("REAPER_INTERVAL_MS", &mut self.reaper.interval_ms);
        read_env("STUCK_JOB_HOURS", &mut self.reaper.stuck_job_hours);
        read_env("OLD_JOB_DAYS", &mut self.reaper.old_job_days);
        read_env("ARCHIVE_RETENTION_DAYS", &mut self.reaper.archive_retention_days);
        if let Ok(ua) = std::env::var("WEBMONITOR_USER_AGENT") {
            if !ua.is_empty() {
                self.crawler.user_agent = ua;
            }
        }
    }

    /// Validate all configuration fields, collecting every error.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.crawler.max_concurrency == 0 {
            errors.push("crawler max_concurrency must be positive".to_string());
        }
        if self.crawler.request_timeout_ms == 0 {
            errors.push("crawler request_timeout_ms must be positive".to_string());
        }
        if self.crawler.user_agent.is_empty() {
            errors.push("crawler user_agent must not be empty".to_string());
        }

        if self.dispatcher.poll_ms == 0 {
            errors.push("dispatcher poll_ms must be positive".to_string());
        }
        if self.dispatcher.max_concurrent_scans == 0 {
            errors.push("dispatcher max_concurrent_scans must be positive".to_string());
        }

        if self.reaper.interval_ms == 0 {
            errors.push("reaper interval_ms must be positive".to_string());
        }
        if self.reaper.stuck_job_hours == 0 {
            errors.push("reaper stuck_job_hours must be positive".to_string());
        }

        if self.http.enabled {
            if let Some(port_str) = self.http.listen_addr.rsplit(':').next() {
                match port_str.parse::<u32>() {
                    Ok(port) if port == 0 || port > 65535 => {
                        errors.push(format!(
                            "HTTP listen port must be between 1 and 65535, got {}",
                            port
                        ));
                    }
                    Ok(_) => {}
                    Err(_) => {
                        errors.push(format!(
                            "HTTP listen address '{}' has no parseable port",
                            self.http.listen_addr
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn read_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        if let Ok(value) = raw.parse::<T>() {
            *target = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn default_values_match_documented_knobs() {
        let cfg = valid_config();
        assert_eq!(cfg.crawler.max_concurrency, 20);
        assert_eq!(cfg.crawler.crawl_delay_ms, 500);
        assert_eq!(cfg.crawler.request_timeout_ms, 30_000);
        assert_eq!(cfg.crawler.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(cfg.dispatcher.poll_ms, 2_000);
        assert_eq!(cfg.dispatcher.max_concurrent_scans, 3);
        assert_eq!(cfg.dispatcher.retry_attempts, 3);
        assert_eq!(cfg.reaper.interval_ms, 300_000);
        assert_eq!(cfg.reaper.stuck_job_hours, 2);
        assert_eq!(cfg.reaper.old_job_days, 30);
        assert_eq!(cfg.reaper.archive_retention_days, 30);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = valid_config();
        cfg.crawler.max_concurrency = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrency must be positive"));
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut cfg = valid_config();
        cfg.crawler.user_agent = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("user_agent must not be empty"));
    }

    #[test]
    fn validate_rejects_bad_http_port_when_enabled() {
        let mut cfg = valid_config();
        cfg.http.enabled = true;
        cfg.http.listen_addr = "0.0.0.0:0".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("HTTP listen port"));
    }

    #[test]
    fn validate_skips_http_port_check_when_disabled() {
        let mut cfg = valid_config();
        cfg.http.enabled = false;
        cfg.http.listen_addr = "0.0.0.0:0".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.crawler.max_concurrency = 0;
        cfg.dispatcher.poll_ms = 0;
        cfg.reaper.interval_ms = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("max_concurrency must be positive"));
        assert!(msg.contains("poll_ms must be positive"));
        assert!(msg.contains("interval_ms must be positive"));
    }

    #[test]
    fn toml_round_trip_preserves_overrides() {
        let toml_src = r#"
[crawler]
max_concurrency = 4
crawl_delay_ms = 100

[dispatcher]
max_concurrent_scans = 1
"#;
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.crawler.max_concurrency, 4);
        assert_eq!(cfg.crawler.crawl_delay_ms, 100);
        assert_eq!(cfg.dispatcher.max_concurrent_scans, 1);
        // Unspecified sections keep their defaults
        assert_eq!(cfg.reaper.old_job_days, 30);
    }
}
