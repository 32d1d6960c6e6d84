//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ProgressPolicy, QuotaScope, RetryPolicy};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upstream post API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Link bases used when formatting notifications
    #[serde(default)]
    pub links: LinksConfig,

    /// Global exclusion rules
    #[serde(default)]
    pub filter: FilterConfig,

    /// Webhook delivery behavior
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Outer polling loop settings
    #[serde(default)]
    pub run: RunConfig,

    /// Locations of the feed list and progress file
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        if self.api.page_size == 0 {
            return Err(AppError::validation("api.page_size must be > 0"));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| AppError::validation(format!("api.base_url: {e}")))?;
        if self.delivery.retry.max_attempts == 0 {
            return Err(AppError::validation(
                "delivery.retry.max_attempts must be > 0",
            ));
        }
        if self.delivery.retry.backoff_factor < 1.0 {
            return Err(AppError::validation(
                "delivery.retry.backoff_factor must be >= 1",
            ));
        }
        if self.run.interval_secs == 0 {
            return Err(AppError::validation("run.interval_secs must be > 0"));
        }
        Ok(())
    }

    /// Feed list path, resolved against `base`.
    pub fn feeds_path(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.feeds_file)
    }

    /// Progress file path, resolved against `base`.
    pub fn progress_path(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.progress_file)
    }

    /// Stop file path, resolved against `base`.
    pub fn stop_path(&self, base: &Path) -> Option<PathBuf> {
        self.run.stop_file.as_ref().map(|f| base.join(f))
    }
}

/// Upstream API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Booru root, e.g. `https://danbooru.donmai.us`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Account name for HTTP basic auth (empty disables auth)
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub api_key: String,

    /// Posts requested per page
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            username: String::new(),
            api_key: String::new(),
            page_size: defaults::page_size(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Link bases and media rules for notification embeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Prefix for a post's canonical page; the post id is appended
    #[serde(default = "defaults::post_url_base")]
    pub post_url_base: String,

    /// Prefix for pixiv artwork pages; the pixiv id is appended
    #[serde(default = "defaults::pixiv_url_base")]
    pub pixiv_url_base: String,

    /// File extensions embeddable as images; other media use the preview
    #[serde(default = "defaults::image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            post_url_base: defaults::post_url_base(),
            pixiv_url_base: defaults::pixiv_url_base(),
            image_extensions: defaults::image_extensions(),
        }
    }
}

/// Exclusion rules shared by every feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Tags that exclude a post from every feed
    #[serde(default)]
    pub tag_blacklist: Vec<String>,

    /// Substrings that exclude a post when found in its source
    #[serde(default)]
    pub source_blacklist: Vec<String>,

    /// Apply the feed `nsfw` / `nsfw_only` rating rules
    #[serde(default = "defaults::enabled")]
    pub rating_filter: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            tag_blacklist: Vec::new(),
            source_blacklist: Vec::new(),
            rating_filter: true,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub quota_scope: QuotaScope,

    #[serde(default)]
    pub progress_policy: ProgressPolicy,
}

/// Outer loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seconds to sleep between cycles
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// The loop stops before the next cycle once this file exists
    #[serde(default)]
    pub stop_file: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            stop_file: None,
        }
    }
}

/// File locations, relative to the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::feeds_file")]
    pub feeds_file: String,

    #[serde(default = "defaults::progress_file")]
    pub progress_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            feeds_file: defaults::feeds_file(),
            progress_file: defaults::progress_file(),
        }
    }
}

mod defaults {
    // API defaults
    pub fn base_url() -> String {
        "https://danbooru.donmai.us".into()
    }
    pub fn page_size() -> u32 {
        200
    }
    pub fn user_agent() -> String {
        "booru-relay/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Link defaults
    pub fn post_url_base() -> String {
        "https://danbooru.donmai.us/posts/".into()
    }
    pub fn pixiv_url_base() -> String {
        "https://www.pixiv.net/en/artworks/".into()
    }
    pub fn image_extensions() -> Vec<String> {
        ["jpg", "jpeg", "png", "gif", "webp"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn enabled() -> bool {
        true
    }

    // Run defaults
    pub fn interval() -> u64 {
        60
    }
    pub fn feeds_file() -> String {
        "feeds.toml".into()
    }
    pub fn progress_file() -> String {
        "recents.json".into()
    }
}
