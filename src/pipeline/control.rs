//! Stop signal for the polling loop.
//!
//! The loop checks it once per cycle. It trips when the configured stop
//! file exists or when [`RunControl::stop`] was called (the CLI does so on
//! Ctrl-C). A cycle in progress is never interrupted; the wait between
//! cycles is.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stop_file: Option<PathBuf>,
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl RunControl {
    pub fn new(stop_file: Option<PathBuf>) -> Self {
        Self {
            stop_file,
            ..Self::default()
        }
    }

    /// Request a stop; clones share the flag.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Sleep between cycles, returning early if a stop is requested.
    pub async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }

    /// Whether the loop should end before starting another cycle.
    pub fn should_stop(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return true;
        }
        match &self.stop_file {
            Some(path) if path.exists() => {
                log::info!("Stop file {} found", path.display());
                true
            }
            _ => false,
        }
    }
}
