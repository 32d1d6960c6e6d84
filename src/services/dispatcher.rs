// src/services/dispatcher.rs

//! Rate-limited webhook dispatcher.
//!
//! Delivers one notification at a time and owns the rate-limit bookkeeping:
//!
//! - after a successful delivery the quota headers are recorded; when the
//!   quota is used up the dispatcher waits out the reset window before
//!   returning, so the next delivery never races it
//! - a 429 is a mandated wait: sleep for `Retry-After` and resend, without
//!   spending the retry budget
//! - any other failure is retried per [`RetryPolicy`], then reported
//!
//! All waits are `tokio::time::sleep`, awaited inline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{FeedConfig, Notification, QuotaScope, RetryPolicy};
use crate::services::webhook::{WebhookResponse, WebhookTransport};
use crate::utils::redact_webhook;

/// Wait used after a 429 that carries no usable duration.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Rate-limit state for one webhook (or for all of them, see [`QuotaScope`]).
#[derive(Debug, Clone, Copy)]
pub struct DeliveryQuota {
    remaining: i64,
    reset_after: Duration,
    observed_at: Instant,
}

impl DeliveryQuota {
    /// Build a quota from response headers, `None` if they were missing.
    fn from_response(response: &WebhookResponse, now: Instant) -> Option<Self> {
        let remaining = response.remaining?;
        let reset_after = response
            .reset_after_secs
            .filter(|s| *s >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default();

        Some(Self {
            remaining: remaining.floor() as i64,
            reset_after,
            observed_at: now,
        })
    }

    /// Deliveries left in the window when it was observed.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn reset_after(&self) -> Duration {
        self.reset_after
    }

    /// How long to wait before the next delivery, if at all.
    ///
    /// A quota whose reset window has already passed is stale and imposes
    /// nothing.
    pub fn wait_needed(&self, now: Instant) -> Option<Duration> {
        if self.remaining > 0 {
            return None;
        }
        let resets_at = self.observed_at + self.reset_after;
        (resets_at > now).then(|| resets_at - now)
    }
}

/// Result of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    /// Attempts spent from the retry budget (1 if the first try worked)
    pub attempts: u32,
    /// 429 answers waited out along the way
    pub rate_limited: u32,
}

/// Sends notifications one by one, honoring rate limits and retrying.
pub struct Dispatcher {
    transport: Arc<dyn WebhookTransport>,
    policy: RetryPolicy,
    scope: QuotaScope,
    quotas: HashMap<String, DeliveryQuota>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        policy: RetryPolicy,
        scope: QuotaScope,
    ) -> Self {
        Self {
            transport,
            policy,
            scope,
            quotas: HashMap::new(),
        }
    }

    /// Quota key for a feed under the configured scope.
    fn quota_key<'a>(&self, feed: &'a FeedConfig) -> &'a str {
        match self.scope {
            QuotaScope::Global => "",
            QuotaScope::PerFeed => &feed.name,
        }
    }

    /// Last quota observed for the feed (shared under [`QuotaScope::Global`]).
    pub fn quota(&self, feed: &FeedConfig) -> Option<&DeliveryQuota> {
        self.quotas.get(self.quota_key(feed))
    }

    /// Deliver one notification to the feed's webhook.
    pub async fn deliver(
        &mut self,
        feed: &FeedConfig,
        notification: &Notification,
    ) -> Result<Delivered> {
        let key = self.quota_key(feed).to_string();
        self.wait_for_quota(&key).await;

        let mut attempts = 0u32;
        let mut rate_limited = 0u32;
        let mut schedule = self.policy.schedule();

        loop {
            attempts += 1;
            let result = self.transport.send(&feed.webhook, notification).await;
            let failure = match result {
                Ok(response) if response.is_success() => {
                    log::info!(
                        "Response code {} for post in {}",
                        response.status,
                        feed.name
                    );
                    self.observe(&key, &response, feed).await;
                    return Ok(Delivered {
                        attempts,
                        rate_limited,
                    });
                }
                Ok(response) if response.is_rate_limited() => {
                    let wait = response
                        .retry_after_ms
                        .filter(|ms| *ms >= 0.0)
                        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
                        .or_else(|| {
                            response
                                .reset_after_secs
                                .filter(|s| *s >= 0.0)
                                .map(Duration::from_secs_f64)
                        })
                        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                    log::warn!(
                        "Rate limit reached for {}, waiting {:.3} seconds to next post...",
                        feed.name,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempts -= 1;
                    rate_limited += 1;
                    continue;
                }
                Ok(response) => format!("HTTP {}", response.status),
                Err(error) => error.to_string(),
            };

            if attempts >= self.policy.max_attempts {
                log::error!(
                    "Giving up on post in {} ({}) after {} attempt(s): {}",
                    feed.name,
                    redact_webhook(&feed.webhook),
                    attempts,
                    failure
                );
                return Err(AppError::delivery(&feed.name, attempts, failure));
            }

            let delay = schedule.next_delay();
            log::warn!(
                "{}, retrying post in {} in {:.3} seconds (attempt {}/{})",
                failure,
                feed.name,
                delay.as_secs_f64(),
                attempts,
                self.policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Wait out the recorded quota for `key` if it is exhausted and current.
    async fn wait_for_quota(&self, key: &str) {
        let pending = self
            .quotas
            .get(key)
            .and_then(|quota| quota.wait_needed(Instant::now()));
        if let Some(wait) = pending {
            log::info!("Quota exhausted, waiting {:.3} seconds...", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    /// Record quota headers and wait out an exhausted window.
    async fn observe(&mut self, key: &str, response: &WebhookResponse, feed: &FeedConfig) {
        let now = Instant::now();
        let Some(quota) = DeliveryQuota::from_response(response, now) else {
            log::debug!("No rate limit headers in response for {}", feed.name);
            return;
        };
        self.quotas.insert(key.to_string(), quota);

        if let Some(wait) = quota.wait_needed(now) {
            log::info!("Waiting {:.3} seconds to next post...", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}
