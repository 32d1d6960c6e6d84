//! Exclusion rules applied to every fetched post.
//!
//! Rules are checked in a fixed order and the first match wins:
//!
//! 1. a global or feed-blacklisted tag is present
//! 2. a blacklisted source substring occurs in the post source
//! 3. a non-safe post in a feed that is not NSFW
//! 4. a safe post in an NSFW-only feed

use std::fmt;

use crate::models::{FeedConfig, FilterConfig, Post, Rating};

/// Why a post was withheld from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    Tag(String),
    Source(String),
    /// Non-safe post in a feed that only accepts safe posts
    Nsfw(Rating),
    /// Safe post in a feed that only accepts NSFW posts
    Sfw,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::Tag(tag) => write!(f, "contains blacklisted tag {tag}"),
            Exclusion::Source(source) => write!(f, "contains blacklisted source {source}"),
            Exclusion::Nsfw(rating) => write!(f, "rating {rating:?} not allowed in SFW feed"),
            Exclusion::Sfw => write!(f, "safe post in NSFW-only feed"),
        }
    }
}

/// Decide whether `post` is withheld from `feed`.
pub fn exclude(post: &Post, feed: &FeedConfig, rules: &FilterConfig) -> Option<Exclusion> {
    if let Some(tag) = rules
        .tag_blacklist
        .iter()
        .chain(feed.blacklist.iter())
        .find(|tag| post.has_tag(tag))
    {
        return Some(Exclusion::Tag(tag.clone()));
    }

    if let Some(source) = rules
        .source_blacklist
        .iter()
        .find(|s| post.source.contains(s.as_str()))
    {
        return Some(Exclusion::Source(source.clone()));
    }

    if rules.rating_filter {
        if !post.rating.is_safe() && !feed.nsfw {
            return Some(Exclusion::Nsfw(post.rating));
        }
        if post.rating.is_safe() && feed.nsfw && feed.nsfw_only {
            return Some(Exclusion::Sfw);
        }
    }

    None
}
