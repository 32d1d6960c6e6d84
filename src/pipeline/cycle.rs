//! One polling cycle over every configured feed.
//!
//! Per feed: `Fetching -> Filtering -> (NewFeed | Dispatching) -> Updated`,
//! or `Failed` from any state. A failing feed is logged and skipped; the
//! progress store is rewritten once after all feeds, whatever happened.
//!
//! Delivery guarantee is at-least-once: posts delivered during a cycle whose
//! progress never reaches the store are delivered again by the next cycle.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Config, FeedConfig, FilterConfig, LinksConfig, Notification, ProgressPolicy};
use crate::pipeline::paginate::collect_new;
use crate::services::{Dispatcher, PostSource, WebhookTransport};
use crate::storage::{Progress, ProgressStore};

/// Where a feed is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Fetching,
    Filtering,
    NewFeed,
    Dispatching,
    Updated,
    Failed,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a feed's cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// First sighting: baseline recorded, nothing delivered
    NewFeed { baseline: u64 },
    /// Every queued post delivered
    Updated { delivered: usize },
    /// The search returned nothing; progress untouched
    Unchanged,
    /// Stopped in `state`; `delivered` posts went out before that
    Failed {
        state: FeedState,
        delivered: usize,
        error: String,
    },
}

/// Per-feed result of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub feed: String,
    pub mark_before: Option<u64>,
    pub mark_after: Option<u64>,
    pub outcome: FeedOutcome,
}

/// Result of a whole cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub feeds: Vec<FeedReport>,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.feeds
            .iter()
            .map(|r| match r.outcome {
                FeedOutcome::Updated { delivered } | FeedOutcome::Failed { delivered, .. } => {
                    delivered
                }
                _ => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.feeds
            .iter()
            .filter(|r| matches!(r.outcome, FeedOutcome::Failed { .. }))
            .count()
    }

    pub fn get(&self, feed: &str) -> Option<&FeedReport> {
        self.feeds.iter().find(|r| r.feed == feed)
    }
}

/// Runs cycles: fetch, filter, dispatch, record progress.
pub struct Orchestrator {
    source: Arc<dyn PostSource>,
    dispatcher: Dispatcher,
    store: Arc<dyn ProgressStore>,
    filter: FilterConfig,
    links: LinksConfig,
    policy: ProgressPolicy,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        source: Arc<dyn PostSource>,
        transport: Arc<dyn WebhookTransport>,
        store: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            source,
            dispatcher: Dispatcher::new(
                transport,
                config.delivery.retry.clone(),
                config.delivery.quota_scope,
            ),
            store,
            filter: config.filter.clone(),
            links: config.links.clone(),
            policy: config.delivery.progress_policy,
        }
    }

    /// Process every feed once and rewrite the progress store.
    ///
    /// Only store errors fail the cycle; feed errors end up in the report.
    pub async fn run_cycle(&mut self, feeds: &[FeedConfig]) -> Result<CycleReport> {
        log::info!("Beginning new cycle");
        let mut progress = self.store.load().await?;
        let mut report = CycleReport::default();
        let mut seen = HashSet::new();

        for feed in feeds {
            let mark_before = progress.mark(&feed.name);

            let outcome = if !seen.insert(feed.name.as_str()) {
                log::error!("Duplicate feed name {}, skipped", feed.name);
                FeedOutcome::Failed {
                    state: FeedState::Fetching,
                    delivered: 0,
                    error: format!("duplicate feed name {}", feed.name),
                }
            } else {
                let mut state = FeedState::Fetching;
                match self.process_feed(feed, &mut progress, &mut state).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        log::error!("Feed {} failed while {}: {}", feed.name, state, e);
                        FeedOutcome::Failed {
                            state,
                            delivered: 0,
                            error: e.to_string(),
                        }
                    }
                }
            };

            report.feeds.push(FeedReport {
                feed: feed.name.clone(),
                mark_before,
                mark_after: progress.mark(&feed.name),
                outcome,
            });
        }

        self.store.save(&progress).await?;
        log::info!(
            "Cycle complete, recents file updated ({} delivered, {} feed(s) failed)",
            report.delivered(),
            report.failed()
        );
        Ok(report)
    }

    async fn process_feed(
        &mut self,
        feed: &FeedConfig,
        progress: &mut Progress,
        state: &mut FeedState,
    ) -> Result<FeedOutcome> {
        log::info!("Checking new posts for {}", feed.name);
        feed.validate()?;

        let first_page = self.source.fetch_page(feed, None).await?;
        let Some(newest) = first_page.first().map(|p| p.id) else {
            log::info!("No posts found for {}", feed.name);
            return Ok(FeedOutcome::Unchanged);
        };

        let Some(mark) = progress.mark(&feed.name) else {
            *state = FeedState::NewFeed;
            log::info!("Adding new feed {} at post {}", feed.name, newest);
            progress.set_mark(&feed.name, newest);
            return Ok(FeedOutcome::NewFeed { baseline: newest });
        };
        // Never move a mark backwards, even if the newest post was removed
        let newest = newest.max(mark);

        *state = FeedState::Filtering;
        let posts = collect_new(self.source.as_ref(), feed, &self.filter, first_page, mark).await?;

        *state = FeedState::Dispatching;
        let mut delivered = 0;
        let mut last_delivered = None;
        for post in posts.iter().rev() {
            let result = match Notification::for_post(post, feed, &self.links) {
                Ok(notification) => self.dispatcher.deliver(feed, &notification).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(_) => {
                    delivered += 1;
                    last_delivered = Some(post.id);
                }
                Err(e) => {
                    let next_mark = match self.policy {
                        ProgressPolicy::Delivered => {
                            log::warn!(
                                "Post {} in {} is retried next cycle; newer posts wait behind it",
                                post.id,
                                feed.name
                            );
                            last_delivered.unwrap_or(mark)
                        }
                        ProgressPolicy::Fetched => newest,
                    };
                    progress.set_mark(&feed.name, next_mark);
                    *state = FeedState::Failed;
                    log::error!(
                        "Feed {} stopped at post {} after {} delivered: {}",
                        feed.name,
                        post.id,
                        delivered,
                        e
                    );
                    return Ok(FeedOutcome::Failed {
                        state: FeedState::Dispatching,
                        delivered,
                        error: e.to_string(),
                    });
                }
            }
        }

        *state = FeedState::Updated;
        progress.set_mark(&feed.name, newest);
        Ok(FeedOutcome::Updated { delivered })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::models::{Post, RetryPolicy};
    use crate::services::WebhookResponse;
    use crate::services::testing::{PagedSource, ScriptedWebhook, feed, post};

    /// In-memory store that can be told to fail its next saves.
    #[derive(Default)]
    struct MemoryStore {
        progress: Mutex<Progress>,
        saves: AtomicUsize,
        failing_saves: AtomicUsize,
    }

    impl MemoryStore {
        fn with(marks: &[(&str, u64)]) -> Arc<Self> {
            let store = Self::default();
            for (name, mark) in marks {
                store.progress.lock().unwrap().set_mark(*name, *mark);
            }
            Arc::new(store)
        }

        fn mark(&self, feed: &str) -> Option<u64> {
            self.progress.lock().unwrap().mark(feed)
        }
    }

    #[async_trait]
    impl ProgressStore for MemoryStore {
        async fn load(&self) -> Result<Progress> {
            Ok(self.progress.lock().unwrap().clone())
        }

        async fn save(&self, progress: &Progress) -> Result<()> {
            if self.failing_saves.load(Ordering::SeqCst) > 0 {
                self.failing_saves.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Io(std::io::Error::other("process killed")));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.progress.lock().unwrap() = progress.clone();
            Ok(())
        }
    }

    fn config(policy: ProgressPolicy) -> Config {
        let mut config = Config::default();
        config.filter.tag_blacklist = vec!["banned".into()];
        config.delivery.progress_policy = policy;
        config.delivery.retry = RetryPolicy {
            max_jitter_ms: 0,
            ..RetryPolicy::default()
        };
        config
    }

    fn orchestrator(
        policy: ProgressPolicy,
        source: Arc<PagedSource>,
        hook: Arc<ScriptedWebhook>,
        store: Arc<MemoryStore>,
    ) -> Orchestrator {
        Orchestrator::new(&config(policy), source, hook, store)
    }

    fn server_error() -> Result<WebhookResponse> {
        Ok(WebhookResponse {
            status: 500,
            ..Default::default()
        })
    }

    fn accepted() -> Result<WebhookResponse> {
        Ok(WebhookResponse {
            status: 204,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_example_scenario() {
        let source = Arc::new(PagedSource::new(200).with_posts(
            "test",
            vec![post(105, ""), post(104, "banned"), post(103, ""), post(100, "")],
        ));
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("test", 100)]);
        let mut relay = orchestrator(
            ProgressPolicy::Delivered,
            source,
            hook.clone(),
            store.clone(),
        );

        let report = relay.run_cycle(&[feed("test")]).await.unwrap();

        assert_eq!(hook.delivered_ids(), vec![103, 105]);
        assert_eq!(store.mark("test"), Some(105));
        let entry = report.get("test").unwrap();
        assert_eq!(entry.outcome, FeedOutcome::Updated { delivered: 2 });
        assert_eq!(entry.mark_before, Some(100));
        assert_eq!(entry.mark_after, Some(105));
        assert!(hook.calls().iter().all(|c| c.webhook == feed("test").webhook));
    }

    #[tokio::test]
    async fn test_new_feed_records_baseline_without_delivering() {
        let source = Arc::new(
            PagedSource::new(200).with_posts("fresh", (1..=30).map(|id| post(id, "")).collect()),
        );
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[]);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        let report = relay.run_cycle(&[feed("fresh")]).await.unwrap();

        assert!(hook.calls().is_empty());
        assert_eq!(store.mark("fresh"), Some(30));
        assert_eq!(
            report.get("fresh").unwrap().outcome,
            FeedOutcome::NewFeed { baseline: 30 }
        );
    }

    #[tokio::test]
    async fn test_stored_zero_is_not_a_new_feed() {
        let source =
            Arc::new(PagedSource::new(200).with_posts("zero", vec![post(2, ""), post(1, "")]));
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("zero", 0)]);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        relay.run_cycle(&[feed("zero")]).await.unwrap();

        assert_eq!(hook.delivered_ids(), vec![1, 2]);
        assert_eq!(store.mark("zero"), Some(2));
    }

    #[tokio::test]
    async fn test_delivery_order_is_increasing_across_pages() {
        let source = Arc::new(
            PagedSource::new(4).with_posts("test", (1..=20).map(|id| post(id, "")).collect()),
        );
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("test", 6)]);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        relay.run_cycle(&[feed("test")]).await.unwrap();

        let ids = hook.delivered_ids();
        assert_eq!(ids, (7..=20).collect::<Vec<_>>());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_empty_search_leaves_progress_alone() {
        let source = Arc::new(PagedSource::new(200));
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("known", 10)]);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        let report = relay.run_cycle(&[feed("known"), feed("unknown")]).await.unwrap();

        assert_eq!(store.mark("known"), Some(10));
        assert_eq!(store.mark("unknown"), None);
        assert_eq!(report.get("unknown").unwrap().outcome, FeedOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let source = Arc::new(
            PagedSource::new(200)
                .with_posts("good", vec![post(12, ""), post(11, ""), post(10, "")])
                .with_posts("bad", vec![post(99, "")])
                .failing("bad"),
        );
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("bad", 50), ("good", 10), ("retired", 7)]);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        let report = relay.run_cycle(&[feed("bad"), feed("good")]).await.unwrap();

        assert_eq!(hook.delivered_ids(), vec![11, 12]);
        assert_eq!(store.mark("bad"), Some(50));
        assert_eq!(store.mark("good"), Some(12));
        // Feeds no longer configured keep their mark
        assert_eq!(store.mark("retired"), Some(7));
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert!(matches!(
            report.get("bad").unwrap().outcome,
            FeedOutcome::Failed {
                state: FeedState::Fetching,
                ..
            }
        ));
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_next_page_failure_keeps_mark() {
        let source = Arc::new(
            PagedSource::new(2)
                .with_posts("deep", (100..=105).map(|id| post(id, "")).collect())
                .failing_next_pages("deep")
                .with_posts("good", vec![post(11, ""), post(10, "")]),
        );
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("deep", 100), ("good", 10)]);
        let mut relay = orchestrator(
            ProgressPolicy::Delivered,
            source.clone(),
            hook.clone(),
            store.clone(),
        );

        let report = relay.run_cycle(&[feed("deep"), feed("good")]).await.unwrap();

        // Page one arrived, the page before 104 did not; nothing is sent
        assert_eq!(source.fetches()[1], ("deep".to_string(), Some(104)));
        assert_eq!(hook.delivered_ids(), vec![11]);
        assert_eq!(store.mark("deep"), Some(100));
        assert_eq!(store.mark("good"), Some(11));
        assert!(matches!(
            report.get("deep").unwrap().outcome,
            FeedOutcome::Failed {
                state: FeedState::Filtering,
                delivered: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_feed_is_isolated() {
        let source = Arc::new(
            PagedSource::new(200)
                .with_posts("good", vec![post(3, "")])
                .with_posts("bad", vec![post(3, "")]),
        );
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("good", 2), ("bad", 2)]);
        let mut relay = orchestrator(
            ProgressPolicy::Delivered,
            source.clone(),
            hook.clone(),
            store.clone(),
        );

        let mut bad = feed("bad");
        bad.color = "not-a-color".into();
        let report = relay.run_cycle(&[bad, feed("good")]).await.unwrap();

        assert_eq!(source.fetch_count("bad"), 0);
        assert_eq!(store.mark("bad"), Some(2));
        assert_eq!(store.mark("good"), Some(3));
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_feed_name_is_rejected() {
        let source = Arc::new(PagedSource::new(200).with_posts("dup", vec![post(5, "")]));
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("dup", 4)]);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        let report = relay.run_cycle(&[feed("dup"), feed("dup")]).await.unwrap();

        assert_eq!(hook.delivered_ids(), vec![5]);
        assert_eq!(report.failed(), 1);
    }

    fn failing_third_post() -> Arc<ScriptedWebhook> {
        let mut script = vec![accepted(), accepted()];
        script.extend((0..5).map(|_| server_error()));
        ScriptedWebhook::new(script)
    }

    fn five_pending() -> Arc<PagedSource> {
        let posts: Vec<Post> = (100..=105).map(|id| post(id, "")).collect();
        Arc::new(PagedSource::new(200).with_posts("test", posts))
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_policy_retries_failed_posts_next_cycle() {
        let hook = failing_third_post();
        let store = MemoryStore::with(&[("test", 100)]);
        let mut relay = orchestrator(
            ProgressPolicy::Delivered,
            five_pending(),
            hook.clone(),
            store.clone(),
        );

        let report = relay.run_cycle(&[feed("test")]).await.unwrap();
        assert_eq!(store.mark("test"), Some(102));
        assert!(matches!(
            report.get("test").unwrap().outcome,
            FeedOutcome::Failed {
                state: FeedState::Dispatching,
                delivered: 2,
                ..
            }
        ));
        // Posts after the failed one are not sent out of order
        assert_eq!(hook.delivered_ids(), vec![101, 102, 103, 103, 103, 103, 103]);

        relay.run_cycle(&[feed("test")]).await.unwrap();
        assert_eq!(store.mark("test"), Some(105));
        assert_eq!(
            hook.delivered_ids()[7..].to_vec(),
            vec![103, 104, 105]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_policy_first_post_failing_keeps_mark() {
        let hook = ScriptedWebhook::new((0..5).map(|_| server_error()).collect());
        let store = MemoryStore::with(&[("test", 100)]);
        let mut relay = orchestrator(
            ProgressPolicy::Delivered,
            five_pending(),
            hook.clone(),
            store.clone(),
        );

        relay.run_cycle(&[feed("test")]).await.unwrap();
        assert_eq!(store.mark("test"), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_policy_rejected_post_blocks_feed() {
        let rejected = || {
            Ok(WebhookResponse {
                status: 400,
                ..Default::default()
            })
        };
        let hook = ScriptedWebhook::new((0..10).map(|_| rejected()).collect());
        let store = MemoryStore::with(&[("test", 100)]);
        let mut relay = orchestrator(
            ProgressPolicy::Delivered,
            five_pending(),
            hook.clone(),
            store.clone(),
        );

        relay.run_cycle(&[feed("test")]).await.unwrap();
        relay.run_cycle(&[feed("test")]).await.unwrap();

        assert_eq!(store.mark("test"), Some(100));
        assert!(hook.delivered_ids().iter().all(|id| *id == 101));
        assert_eq!(hook.calls().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetched_policy_drops_failed_posts() {
        let hook = failing_third_post();
        let store = MemoryStore::with(&[("test", 100)]);
        let mut relay = orchestrator(
            ProgressPolicy::Fetched,
            five_pending(),
            hook.clone(),
            store.clone(),
        );

        relay.run_cycle(&[feed("test")]).await.unwrap();
        assert_eq!(store.mark("test"), Some(105));

        relay.run_cycle(&[feed("test")]).await.unwrap();
        // 103, 104 and 105 are never delivered
        assert_eq!(hook.delivered_ids(), vec![101, 102, 103, 103, 103, 103, 103]);
    }

    #[tokio::test]
    async fn test_crash_before_save_redelivers() {
        let source = Arc::new(
            PagedSource::new(200)
                .with_posts("test", vec![post(105, ""), post(103, ""), post(100, "")]),
        );
        let hook = ScriptedWebhook::accepting();
        let store = MemoryStore::with(&[("test", 100)]);
        store.failing_saves.store(1, Ordering::SeqCst);
        let mut relay =
            orchestrator(ProgressPolicy::Delivered, source, hook.clone(), store.clone());

        // Deliveries happen, then the progress rewrite is lost
        assert!(relay.run_cycle(&[feed("test")]).await.is_err());
        assert_eq!(store.mark("test"), Some(100));

        // At-least-once: the same posts go out again
        relay.run_cycle(&[feed("test")]).await.unwrap();
        assert_eq!(hook.delivered_ids(), vec![103, 105, 103, 105]);
        assert_eq!(store.mark("test"), Some(105));
    }
}
