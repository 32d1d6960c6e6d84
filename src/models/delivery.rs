// src/models/delivery.rs

//! Delivery policies: retry schedule, quota sharing and progress advancement.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded retry schedule for transient webhook failures.
///
/// Attempt `n` (1-based) that fails waits
/// `base_delay * backoff_factor^(n-1) + jitter` before attempt `n + 1`,
/// where jitter is drawn from `[0, max_jitter]`. See [`RetrySchedule`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound of the random jitter, in milliseconds
    #[serde(default = "defaults::max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            backoff_factor: defaults::backoff_factor(),
            max_jitter_ms: defaults::max_jitter_ms(),
        }
    }
}

impl RetryPolicy {
    /// Fresh delay schedule for one delivery.
    pub fn schedule(&self) -> RetrySchedule {
        let base = Duration::from_millis(self.base_delay_ms);
        RetrySchedule {
            backoff: ExponentialBackoff {
                current_interval: base,
                initial_interval: base,
                multiplier: self.backoff_factor,
                randomization_factor: 0.0,
                max_interval: Duration::MAX,
                max_elapsed_time: None,
                ..Default::default()
            },
            max_jitter_ms: self.max_jitter_ms,
            previous: Duration::ZERO,
        }
    }

    /// Draw a jitter value in `[0, max_jitter]`.
    pub fn jitter(&self) -> Duration {
        jitter(self.max_jitter_ms)
    }
}

fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Delays between the attempts of one delivery.
///
/// The exponential part comes from [`ExponentialBackoff`] with its own
/// randomization off; the jitter is added on top, and a delay is never
/// shorter than the one before it.
pub struct RetrySchedule {
    backoff: ExponentialBackoff,
    max_jitter_ms: u64,
    previous: Duration,
}

impl RetrySchedule {
    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let scheduled = self
            .backoff
            .next_backoff()
            .unwrap_or(self.backoff.max_interval);
        let delay = scheduled
            .saturating_add(jitter(self.max_jitter_ms))
            .max(self.previous);
        self.previous = delay;
        delay
    }
}

/// Which deliveries share one rate-limit quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    /// One quota for the whole process
    Global,
    /// One quota per feed (each feed posts to its own webhook)
    #[default]
    PerFeed,
}

/// When a feed's high-water mark moves past fetched posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPolicy {
    /// Only past posts whose delivery was confirmed. A failed delivery is
    /// retried next cycle; a crash before the save re-delivers.
    #[default]
    Delivered,
    /// To the newest fetched id, whatever happened during delivery.
    /// Failed posts are never retried.
    Fetched,
}

mod defaults {
    pub fn max_attempts() -> u32 {
        5
    }
    pub fn base_delay_ms() -> u64 {
        1_000
    }
    pub fn backoff_factor() -> f64 {
        2.0
    }
    pub fn max_jitter_ms() -> u64 {
        2_000
    }
}
