//! booru-relay CLI
//!
//! Polls the configured feeds and relays new posts to their webhooks.

use std::path::PathBuf;

use booru_relay::{
    error::Result,
    models::Config,
    pipeline::{self, FeedOutcome, RunControl},
    storage::{LocalProgressStore, ProgressStore},
};
use clap::{Parser, Subcommand};

/// booru-relay - booru feed to webhook relay
#[derive(Parser, Debug)]
#[command(name = "booru-relay", version, about = "Relay new booru posts to webhooks")]
struct Cli {
    /// Directory holding config.toml, the feed list and the progress file
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all feeds until stopped (Ctrl-C or the stop file)
    Run,

    /// Run a single cycle and exit
    Once,

    /// Validate configuration and feed list
    Validate,

    /// Show stored progress per feed
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.data_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    log::debug!("Loaded configuration from {}", cli.data_dir.display());

    match cli.command {
        Command::Run => {
            config.validate()?;
            let control = RunControl::new(config.stop_path(&cli.data_dir));

            let handle = control.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, stopping after the current cycle");
                    handle.stop();
                }
            });

            log::info!("booru-relay starting...");
            pipeline::run_forever(&config, &cli.data_dir, &control).await?;
        }

        Command::Once => {
            config.validate()?;
            let report = pipeline::run_once(&config, &cli.data_dir).await?;
            for entry in &report.feeds {
                match &entry.outcome {
                    FeedOutcome::Failed { state, error, .. } => {
                        log::warn!("{}: failed while {}: {}", entry.feed, state, error)
                    }
                    outcome => log::info!("{}: {:?}", entry.feed, outcome),
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let feeds_path = config.feeds_path(&cli.data_dir);
            let list = booru_relay::models::FeedList::load(&feeds_path)?;
            let mut invalid = list.rejected.len();
            for (index, error) in &list.rejected {
                log::error!("Feed #{} does not parse: {}", index + 1, error);
            }
            for feed in &list.feeds {
                if let Err(e) = feed.validate() {
                    log::error!("Feed {} is invalid: {}", feed.name, e);
                    invalid += 1;
                }
            }

            if invalid > 0 {
                return Err(booru_relay::error::AppError::validation(format!(
                    "{invalid} invalid feed(s) in {}",
                    feeds_path.display()
                )));
            }
            log::info!("✓ {} feed(s) OK", list.feeds.len());
        }

        Command::Info => {
            let store = LocalProgressStore::new(config.progress_path(&cli.data_dir));
            let progress = store.load().await?;

            log::info!("Progress file: {}", store.path().display());
            if progress.is_empty() {
                log::info!("No progress recorded yet.");
            }
            for (feed, mark) in progress.iter() {
                log::info!("{}: last post {}", feed, mark);
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
