// src/services/webhook.rs

//! Webhook transport.
//!
//! A transport performs exactly one POST and reports what came back. It
//! never retries or sleeps; that is the dispatcher's job.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::Notification;
use crate::utils::http::header_f64;

/// Remaining deliveries in the current window.
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
/// Seconds until the window resets (may be fractional).
pub const RESET_AFTER_HEADER: &str = "X-RateLimit-Reset-After";
/// Required wait after a 429, in milliseconds.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// What a webhook answered to one delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    pub remaining: Option<f64>,
    pub reset_after_secs: Option<f64>,
    pub retry_after_ms: Option<f64>,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Something that can POST a notification to a webhook URL.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Send one notification. Network failures are errors; any HTTP answer,
    /// including 4xx/5xx, is a response.
    async fn send(&self, webhook: &str, notification: &Notification) -> Result<WebhookResponse>;
}

/// reqwest-backed webhook transport.
pub struct HttpWebhook {
    client: Client,
}

impl HttpWebhook {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhook {
    async fn send(&self, webhook: &str, notification: &Notification) -> Result<WebhookResponse> {
        // reqwest errors carry the request URL, and a webhook URL embeds its token
        let response = self
            .client
            .post(webhook)
            .json(notification)
            .send()
            .await
            .map_err(|e| AppError::Http(e.without_url()))?;
        let headers = response.headers();

        Ok(WebhookResponse {
            status: response.status().as_u16(),
            remaining: header_f64(headers, REMAINING_HEADER),
            reset_after_secs: header_f64(headers, RESET_AFTER_HEADER),
            retry_after_ms: header_f64(headers, RETRY_AFTER_HEADER),
        })
    }
}
