// src/pipeline/run.rs

//! Relay entry points: a single cycle, or the polling loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Config, FeedConfig, FeedList};
use crate::pipeline::control::RunControl;
use crate::pipeline::cycle::{CycleReport, Orchestrator};
use crate::services::{BooruClient, HttpWebhook};
use crate::storage::LocalProgressStore;
use crate::utils::http;

/// Build an orchestrator wired to the real API, webhooks and progress file.
pub fn build_orchestrator(config: &Config, base_path: &Path) -> Result<Orchestrator> {
    let client = http::create_client(&config.api)?;
    let source = Arc::new(BooruClient::new(client.clone(), &config.api)?);
    let transport = Arc::new(HttpWebhook::new(client));
    let store = Arc::new(LocalProgressStore::new(config.progress_path(base_path)));

    Ok(Orchestrator::new(config, source, transport, store))
}

/// Read the feed list, logging and dropping entries that do not parse.
pub fn load_feeds(config: &Config, base_path: &Path) -> Result<Vec<FeedConfig>> {
    let path = config.feeds_path(base_path);
    let list = FeedList::load(&path)?;

    for (index, error) in &list.rejected {
        log::error!(
            "Skipping feed #{} in {}: {}",
            index + 1,
            path.display(),
            error
        );
    }
    log::debug!("Loaded {} feed(s) from {}", list.feeds.len(), path.display());
    Ok(list.feeds)
}

/// Run one cycle with a freshly loaded feed list.
pub async fn run_cycle_once(
    orchestrator: &mut Orchestrator,
    config: &Config,
    base_path: &Path,
) -> Result<CycleReport> {
    let feeds = load_feeds(config, base_path)?;
    orchestrator.run_cycle(&feeds).await
}

/// Run a single cycle.
pub async fn run_once(config: &Config, base_path: &Path) -> Result<CycleReport> {
    let mut orchestrator = build_orchestrator(config, base_path)?;
    run_cycle_once(&mut orchestrator, config, base_path).await
}

/// Poll until `control` says stop.
///
/// A failed cycle (unreadable feed list, unwritable progress file) is logged
/// and the loop carries on. The dispatcher, and with it the rate-limit
/// quotas, lives for the whole loop.
pub async fn run_forever(config: &Config, base_path: &Path, control: &RunControl) -> Result<()> {
    let mut orchestrator = build_orchestrator(config, base_path)?;
    let interval = Duration::from_secs(config.run.interval_secs);

    while !control.should_stop() {
        if let Err(e) = run_cycle_once(&mut orchestrator, config, base_path).await {
            log::error!("Cycle failed: {}", e);
        }

        if control.should_stop() {
            break;
        }
        log::info!("Waiting {} seconds to next cycle...", interval.as_secs());
        control.pause(interval).await;
    }

    log::info!("Stop requested, exiting");
    Ok(())
}
