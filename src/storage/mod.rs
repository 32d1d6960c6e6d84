//! Storage abstractions for feed progress.
//!
//! Progress is a map from feed name to the high-water mark: the largest post
//! id already handled for that feed. The whole map is loaded at the start of
//! a cycle and rewritten once at its end.
//!
//! ## File Layout
//!
//! ```text
//! {data_dir}/
//! ├── config.toml           # Relay configuration
//! ├── feeds.toml            # Feed list (reloaded every cycle)
//! └── recents.json          # {"feed name": 7001234, ...}
//! ```
//!
//! One process owns the progress file at a time. Nothing locks it.

pub mod local;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// Re-export for convenience
pub use local::LocalProgressStore;

/// High-water marks for every known feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Progress {
    marks: BTreeMap<String, u64>,
}

impl Progress {
    /// Stored mark for a feed, `None` if the feed was never seen.
    pub fn mark(&self, feed: &str) -> Option<u64> {
        self.marks.get(feed).copied()
    }

    /// Whether a mark was ever recorded for the feed.
    pub fn has_mark(&self, feed: &str) -> bool {
        self.marks.contains_key(feed)
    }

    /// Record a mark, returning the previous one.
    pub fn set_mark(&mut self, feed: impl Into<String>, id: u64) -> Option<u64> {
        self.marks.insert(feed.into(), id)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Iterate over `(feed, mark)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.marks.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u64)> for Progress {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            marks: iter.into_iter().collect(),
        }
    }
}

/// Trait for progress storage backends.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load all marks. A store that was never written yields empty progress.
    async fn load(&self) -> Result<Progress>;

    /// Replace all marks at once.
    async fn save(&self, progress: &Progress) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_mark_is_distinct_from_zero() {
        let mut progress = Progress::default();
        assert_eq!(progress.mark("new"), None);
        assert!(!progress.has_mark("new"));

        progress.set_mark("zero", 0);
        assert_eq!(progress.mark("zero"), Some(0));
        assert!(progress.has_mark("zero"));
    }

    #[test]
    fn test_set_mark_returns_previous() {
        let mut progress = Progress::default();
        assert_eq!(progress.set_mark("a", 10), None);
        assert_eq!(progress.set_mark("a", 12), Some(10));
        assert_eq!(progress.len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let progress: Progress = [("cats".to_string(), 105), ("dogs".to_string(), 7)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&progress).unwrap();
        assert_eq!(json, r#"{"cats":105,"dogs":7}"#);

        let back: Progress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, progress);
    }
}
