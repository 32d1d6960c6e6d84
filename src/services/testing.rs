//! In-memory fakes for the upstream API and webhooks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{FeedConfig, LinksConfig, Notification, Post, Rating};
use crate::services::booru::PostSource;
use crate::services::webhook::{WebhookResponse, WebhookTransport};

pub fn feed(name: &str) -> FeedConfig {
    FeedConfig {
        name: name.into(),
        tags: format!("{name}_tag"),
        webhook: format!("https://discord.com/api/webhooks/1/{name}"),
        color: "ff8800".into(),
        blacklist: vec![],
        nsfw: false,
        nsfw_only: false,
    }
}

pub fn post(id: u64, tags: &str) -> Post {
    Post {
        id,
        tag_string: tags.into(),
        source: format!("https://example.com/art/{id}"),
        pixiv_id: None,
        rating: Rating::Safe,
        file_url: Some(format!("https://cdn.example.com/{id}.png")),
        preview_file_url: None,
        created_at: "2024-01-01T00:00:00Z".parse().unwrap(),
    }
}

pub fn notification(id: u64) -> Notification {
    Notification::for_post(&post(id, ""), &feed("test"), &LinksConfig::default()).unwrap()
}

/// One recorded webhook call.
#[derive(Debug, Clone)]
pub struct Call {
    pub webhook: String,
    pub post_id: Option<u64>,
    pub at: Instant,
}

/// Webhook answering from a script; answers 204 once the script runs out.
pub struct ScriptedWebhook {
    script: Mutex<VecDeque<Result<WebhookResponse>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedWebhook {
    pub fn new(script: Vec<Result<WebhookResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A webhook that accepts everything.
    pub fn accepting() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Post ids delivered, in call order.
    pub fn delivered_ids(&self) -> Vec<u64> {
        self.calls().iter().filter_map(|c| c.post_id).collect()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedWebhook {
    async fn send(&self, webhook: &str, notification: &Notification) -> Result<WebhookResponse> {
        self.calls.lock().unwrap().push(Call {
            webhook: webhook.to_string(),
            post_id: notification.post_id(),
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(WebhookResponse {
                    status: 204,
                    ..Default::default()
                })
            })
    }
}

/// Upstream with a fixed post list per feed, served in pages.
pub struct PagedSource {
    posts: HashMap<String, Vec<Post>>,
    page_size: usize,
    failing: HashSet<String>,
    failing_next_pages: HashSet<String>,
    fetches: Mutex<Vec<(String, Option<u64>)>>,
}

impl PagedSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            posts: HashMap::new(),
            page_size,
            failing: HashSet::new(),
            failing_next_pages: HashSet::new(),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Set a feed's posts; they are served newest (largest id) first.
    pub fn with_posts(mut self, feed: &str, mut posts: Vec<Post>) -> Self {
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        self.posts.insert(feed.to_string(), posts);
        self
    }

    /// Make every fetch for the feed fail.
    pub fn failing(mut self, feed: &str) -> Self {
        self.failing.insert(feed.to_string());
        self
    }

    /// Serve the feed's first page, then fail every fetch with a cursor.
    pub fn failing_next_pages(mut self, feed: &str) -> Self {
        self.failing_next_pages.insert(feed.to_string());
        self
    }

    /// `(feed, cursor)` of every fetch so far.
    pub fn fetches(&self) -> Vec<(String, Option<u64>)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, feed: &str) -> usize {
        self.fetches().iter().filter(|(f, _)| f == feed).count()
    }
}

#[async_trait]
impl PostSource for PagedSource {
    async fn fetch_page(&self, feed: &FeedConfig, before: Option<u64>) -> Result<Vec<Post>> {
        self.fetches
            .lock()
            .unwrap()
            .push((feed.name.clone(), before));

        if self.failing.contains(&feed.name)
            || (before.is_some() && self.failing_next_pages.contains(&feed.name))
        {
            return Err(AppError::upstream(&feed.name, "HTTP 503 Service Unavailable"));
        }

        let page = self
            .posts
            .get(&feed.name)
            .map(|posts| {
                posts
                    .iter()
                    .filter(|p| before.is_none_or(|b| p.id < b))
                    .take(self.page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }
}
