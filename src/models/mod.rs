// src/models/mod.rs

//! Domain models for the relay.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod delivery;
mod feed;
mod notification;
mod post;

// Re-export all public types
pub use config::{
    ApiConfig, Config, DeliveryConfig, FilterConfig, LinksConfig, PathsConfig, RunConfig,
};
pub use delivery::{ProgressPolicy, QuotaScope, RetryPolicy};
pub use feed::{FeedConfig, FeedList};
pub use notification::{Embed, EmbedField, EmbedFooter, EmbedImage, Notification, source_link};
pub use post::{Post, Rating};
