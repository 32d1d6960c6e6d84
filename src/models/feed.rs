// src/models/feed.rs

//! Feed definitions and the feed list file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One independently polled feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Unique feed name, also the progress key
    pub name: String,

    /// Upstream tag search expression
    pub tags: String,

    /// Webhook URL receiving this feed's notifications
    pub webhook: String,

    /// Embed color as a hex string (`"ff8800"` or `"#ff8800"`)
    pub color: String,

    /// Feed-specific tag exclusions
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Whether questionable/explicit posts may be delivered
    #[serde(default)]
    pub nsfw: bool,

    /// Whether safe posts are withheld (only meaningful with `nsfw`)
    #[serde(default)]
    pub nsfw_only: bool,
}

impl FeedConfig {
    /// Embed color parsed from the hex string.
    pub fn color_value(&self) -> Result<u32> {
        let hex = self.color.trim().trim_start_matches('#');
        u32::from_str_radix(hex, 16).map_err(|e| {
            AppError::config(format!(
                "feed {}: invalid color '{}': {}",
                self.name, self.color, e
            ))
        })
    }

    /// Check that the feed can be processed at all.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::config("feed name is empty"));
        }
        self.color_value()?;
        url::Url::parse(&self.webhook).map_err(|e| {
            AppError::config(format!("feed {}: invalid webhook URL: {}", self.name, e))
        })?;
        Ok(())
    }
}

/// Raw shape of the feeds file; entries are parsed one by one.
#[derive(Debug, Deserialize)]
struct FeedFile {
    #[serde(default)]
    feeds: Vec<toml::Value>,
}

/// Result of reading the feed list.
#[derive(Debug, Default)]
pub struct FeedList {
    /// Entries that parsed, in file order
    pub feeds: Vec<FeedConfig>,
    /// Entries that did not, with their position in the file
    pub rejected: Vec<(usize, AppError)>,
}

impl FeedList {
    /// Load the feed list from a TOML file with a `[[feeds]]` array.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse feed list content. A malformed entry only rejects that entry.
    pub fn parse(content: &str) -> Result<Self> {
        let file: FeedFile = toml::from_str(content)?;
        let mut list = FeedList::default();

        for (index, value) in file.feeds.into_iter().enumerate() {
            match value.try_into::<FeedConfig>() {
                Ok(feed) => list.feeds.push(feed),
                Err(e) => list.rejected.push((index, AppError::from(e))),
            }
        }

        Ok(list)
    }
}
