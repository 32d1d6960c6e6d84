// src/models/post.rs

//! Post records returned by the booru API.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Content rating of a post, using Danbooru's four letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    /// General content; the only rating safe for work
    #[serde(rename = "g")]
    Safe,
    /// Sensitive: borderline, not safe for work
    #[serde(rename = "s")]
    Sensitive,
    #[serde(rename = "q")]
    Questionable,
    /// Explicit content
    #[serde(rename = "e")]
    Explicit,
}

impl Rating {
    /// Whether this rating is safe for work.
    pub fn is_safe(self) -> bool {
        matches!(self, Rating::Safe)
    }
}

/// A single post, as fetched from the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// Upstream id; larger ids are newer
    pub id: u64,

    /// Space-separated tags
    #[serde(default)]
    pub tag_string: String,

    /// Source string as entered on the booru
    #[serde(default)]
    pub source: String,

    /// Pixiv artwork id, when the source is a pixiv upload
    #[serde(default)]
    pub pixiv_id: Option<u64>,

    pub rating: Rating,

    /// Full-size media URL (absent for restricted posts)
    #[serde(default)]
    pub file_url: Option<String>,

    /// Preview image URL
    #[serde(default)]
    pub preview_file_url: Option<String>,

    pub created_at: DateTime<FixedOffset>,
}

impl Post {
    /// Iterate over the post's tags.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tag_string.split_whitespace()
    }

    /// Whether the post carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().any(|t| t == tag)
    }
}
