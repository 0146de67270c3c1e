//! Configuration management.
//!
//! Settings carry the effective runtime values; Config mirrors the
//! optional TOML file and overlays onto Settings. A missing or broken
//! config file never stops a run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::LlmConfig;
use crate::models::SourceEndpoint;
use crate::scrapers::ScrapePolicy;

/// How long a URL sighting counts as "already seen", in days.
pub const DEFAULT_URL_TTL_DAYS: i64 = 7;
/// How long a content fingerprint suppresses near-identical articles, in hours.
pub const DEFAULT_FINGERPRINT_TTL_HOURS: i64 = 48;
/// Consecutive failures before a URL is blocklisted.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Fetch attempts per URL.
pub const DEFAULT_RETRY_COUNT: u32 = 2;
/// Rows per archive write batch.
pub const DEFAULT_ARCHIVE_BATCH_SIZE: usize = 50;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// User agent override; None uses the builtin agent, "impersonate"
    /// picks a random browser agent.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between article fetches in milliseconds.
    pub request_delay_ms: u64,
    /// Delay between retry attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Fetch attempts per URL.
    pub retry_count: u32,
    /// Consecutive failures before blocklisting.
    pub failure_threshold: u32,
    pub url_ttl_days: i64,
    pub fingerprint_ttl_hours: i64,
    pub archive_batch_size: usize,
    /// Sources scraped concurrently.
    pub source_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("citydigest");

        Self {
            data_dir,
            database_filename: "citydigest.db".to_string(),
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 1000,
            retry_delay_ms: 2000,
            retry_count: DEFAULT_RETRY_COUNT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            url_ttl_days: DEFAULT_URL_TTL_DAYS,
            fingerprint_ttl_hours: DEFAULT_FINGERPRINT_TTL_HOURS,
            archive_batch_size: DEFAULT_ARCHIVE_BATCH_SIZE,
            source_concurrency: 4,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    pub fn url_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.url_ttl_days)
    }

    pub fn fingerprint_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.fingerprint_ttl_hours)
    }

    pub fn scrape_policy(&self) -> ScrapePolicy {
        ScrapePolicy {
            retry_count: self.retry_count,
            retry_delay: std::time::Duration::from_millis(self.retry_delay_ms),
            request_delay: std::time::Duration::from_millis(self.request_delay_ms),
            failure_threshold: self.failure_threshold,
            source_concurrency: self.source_concurrency,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (supports ~ expansion).
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    /// User agent string ("impersonate" rotates browser agents).
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    #[serde(default)]
    pub url_ttl_days: Option<i64>,
    #[serde(default)]
    pub fingerprint_ttl_hours: Option<i64>,
    #[serde(default)]
    pub archive_batch_size: Option<usize>,
    #[serde(default)]
    pub source_concurrency: Option<usize>,
    /// Source endpoint definitions, keyed by source id.
    #[serde(default)]
    pub sources: HashMap<String, SourceEndpoint>,
    /// LLM configuration for digest generation.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from the given path, or the default location.
    ///
    /// A missing file yields defaults. A malformed file logs a warning
    /// and yields defaults rather than aborting.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Self::default(),
            },
        };

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };

        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "malformed config file, using defaults");
                Self::default()
            }
        }
    }

    /// Default config location: `<config_dir>/citydigest/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("citydigest").join("config.toml"))
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref data_dir) = self.data_dir {
            let path = shellexpand::tilde(data_dir);
            settings.data_dir = PathBuf::from(path.as_ref());
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(delay) = self.retry_delay_ms {
            settings.retry_delay_ms = delay;
        }
        if let Some(count) = self.retry_count {
            settings.retry_count = count;
        }
        if let Some(threshold) = self.failure_threshold {
            settings.failure_threshold = threshold;
        }
        if let Some(days) = self.url_ttl_days {
            settings.url_ttl_days = days;
        }
        if let Some(hours) = self.fingerprint_ttl_hours {
            settings.fingerprint_ttl_hours = hours;
        }
        if let Some(size) = self.archive_batch_size {
            settings.archive_batch_size = size;
        }
        if let Some(concurrency) = self.source_concurrency {
            settings.source_concurrency = concurrency;
        }
    }
}

/// Load settings with the config file applied.
pub fn load_settings(path: Option<&Path>) -> (Config, Settings) {
    let config = Config::load(path);
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    (config, settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.database_filename, "citydigest.db");
        assert_eq!(settings.retry_count, 2);
        assert_eq!(settings.failure_threshold, 5);
        assert_eq!(settings.url_ttl(), chrono::Duration::days(7));
        assert_eq!(settings.fingerprint_ttl(), chrono::Duration::hours(48));
        assert_eq!(settings.archive_batch_size, 50);
    }

    #[test]
    fn test_config_overlays_settings_and_parses_sources() {
        let raw = r#"
            data_dir = "/tmp/citydigest-test"
            request_delay_ms = 250
            failure_threshold = 3

            [sources.gazette]
            name = "Daily Gazette"
            base_url = "https://gazette.example.com/"
            link_selectors = [".headline a"]
            title_selectors = ["h1.story-title"]
            content_selectors = [".story-body"]

            [llm]
            model = "llama3.2:1b"
        "#;
        let config: Config = toml::from_str(raw).unwrap();

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);

        assert_eq!(settings.data_dir, PathBuf::from("/tmp/citydigest-test"));
        assert_eq!(settings.request_delay_ms, 250);
        assert_eq!(settings.failure_threshold, 3);
        // Untouched fields keep their defaults
        assert_eq!(settings.retry_count, 2);

        let gazette = config.sources.get("gazette").unwrap();
        assert_eq!(gazette.name, "Daily Gazette");
        assert_eq!(gazette.title_selectors, vec!["h1.story-title"]);
        assert!(gazette.active);
        assert_eq!(gazette.max_articles, 15);

        assert_eq!(config.llm.model, "llama3.2:1b");
        // Defaults fill the rest of the llm table
        assert_eq!(config.llm.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(config.sources.is_empty());
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_load_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is { not toml").unwrap();

        let config = Config::load(Some(&path));
        assert!(config.sources.is_empty());
        assert_eq!(config.llm.model, "llama3.2:3b");
    }
}
