//! Service layer for the relay.
//!
//! This module contains the I/O facing parts:
//! - Post fetching (`PostSource`, `BooruClient`)
//! - Webhook transport (`WebhookTransport`, `HttpWebhook`)
//! - Rate-limited delivery (`Dispatcher`)

pub mod booru;
pub mod dispatcher;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use booru::{BooruClient, PostSource};
pub use dispatcher::{Delivered, DeliveryQuota, Dispatcher};
pub use webhook::{HttpWebhook, WebhookResponse, WebhookTransport};
