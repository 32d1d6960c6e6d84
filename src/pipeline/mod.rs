//! Pipeline entry points and the polling engine.
//!
//! - `filter`: exclusion rules
//! - `paginate`: walk result pages back to the high-water mark
//! - `cycle`: per-feed state machine and progress bookkeeping
//! - `run_once` / `run_forever`: a single cycle or the polling loop

pub mod control;
pub mod cycle;
pub mod filter;
pub mod paginate;
pub mod run;

pub use control::RunControl;
pub use cycle::{CycleReport, FeedOutcome, FeedReport, FeedState, Orchestrator};
pub use filter::{Exclusion, exclude};
pub use paginate::collect_new;
pub use run::{build_orchestrator, load_feeds, run_forever, run_once};
