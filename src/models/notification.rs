// src/models/notification.rs

//! Webhook payloads built from posts.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{FeedConfig, LinksConfig, Post};

/// Webhook request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub embeds: Vec<Embed>,
}

/// A single rich embed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub color: u32,
    /// UTC, second precision, `Z` suffix
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub footer: EmbedFooter,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

impl Notification {
    /// Build the notification announcing `post` in `feed`.
    pub fn for_post(post: &Post, feed: &FeedConfig, links: &LinksConfig) -> Result<Self> {
        let embed = Embed {
            title: format!("New post in {}", feed.name),
            url: format!("{}{}", links.post_url_base, post.id),
            color: feed.color_value()?,
            timestamp: post
                .created_at
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            image: media_url(post, links).map(|url| EmbedImage { url }),
            footer: EmbedFooter {
                text: format!("ID: {}", post.id),
            },
            fields: vec![EmbedField {
                name: "Source".into(),
                value: source_link(post, links),
            }],
        };

        Ok(Self {
            embeds: vec![embed],
        })
    }

    /// Post id recorded in the footer, if any.
    pub fn post_id(&self) -> Option<u64> {
        self.embeds
            .first()?
            .footer
            .text
            .strip_prefix("ID: ")?
            .parse()
            .ok()
    }
}

/// Source link for a post.
///
/// Pixiv sources on the booru point at the raw image, so a post with a pixiv
/// id links to the artwork page instead.
pub fn source_link(post: &Post, links: &LinksConfig) -> String {
    match post.pixiv_id {
        Some(id) => format!("{}{}", links.pixiv_url_base, id),
        None if post.source.trim().is_empty() => "Unknown".into(),
        None => post.source.clone(),
    }
}

/// Image to embed: the full file when it is an image, otherwise the preview.
fn media_url(post: &Post, links: &LinksConfig) -> Option<String> {
    match &post.file_url {
        Some(file) if is_image(file, &links.image_extensions) => Some(file.clone()),
        _ => post.preview_file_url.clone(),
    }
}

fn is_image(file_url: &str, extensions: &[String]) -> bool {
    let path = url::Url::parse(file_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| file_url.to_string());

    path.rsplit_once('.')
        .map(|(_, ext)| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
