// src/services/booru.rs

//! Booru post API client.
//!
//! Pages are requested newest-first. The next (older) page is selected with
//! a `page=b{id}` cursor: only posts with an id below `{id}` are returned.

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ApiConfig, FeedConfig, Post};
use crate::utils::endpoint;

/// Source of post pages for a feed.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch one page of the feed's search, newest first.
    ///
    /// `before` restricts the page to posts with a smaller id.
    async fn fetch_page(&self, feed: &FeedConfig, before: Option<u64>) -> Result<Vec<Post>>;
}

/// HTTP client for a Danbooru-compatible `posts.json` endpoint.
pub struct BooruClient {
    client: Client,
    posts_url: Url,
    credentials: Option<(String, String)>,
    page_size: u32,
}

impl BooruClient {
    /// Create a client for the configured API.
    pub fn new(client: Client, config: &ApiConfig) -> Result<Self> {
        let posts_url = endpoint(&config.base_url, "posts.json")?;
        let credentials = (!config.username.is_empty())
            .then(|| (config.username.clone(), config.api_key.clone()));

        Ok(Self {
            client,
            posts_url,
            credentials,
            page_size: config.page_size,
        })
    }

    /// Query parameters for one page request.
    fn query(&self, feed: &FeedConfig, before: Option<u64>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("tags", feed.tags.clone()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(id) = before {
            query.push(("page", format!("b{id}")));
        }
        query
    }
}

#[async_trait]
impl PostSource for BooruClient {
    async fn fetch_page(&self, feed: &FeedConfig, before: Option<u64>) -> Result<Vec<Post>> {
        let mut request = self
            .client
            .get(self.posts_url.clone())
            .query(&self.query(feed, before));
        if let Some((user, key)) = &self.credentials {
            request = request.basic_auth(user, Some(key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(
                &feed.name,
                format!("HTTP {} from {}", status, self.posts_url),
            ));
        }

        let posts: Vec<Post> = response.json().await?;
        log::debug!(
            "Fetched {} post(s) for {} (before {:?})",
            posts.len(),
            feed.name,
            before
        );
        Ok(posts)
    }
}
