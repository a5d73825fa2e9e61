// src/main.rs

//! jailwatch: Jail Custody Report Watcher CLI
//!
//! Watches the public jail custody report, keeps a durable history of
//! who appears on it, caches mug shots, and announces new population
//! records.

use clap::{Parser, Subcommand};

use jailwatch::error::Result;
use jailwatch::models::Config;
use jailwatch::pipeline::{CycleContext, CycleOutcome, Watcher};
use jailwatch::services::{Transport, TwitterNotifier};
use jailwatch::storage::HistoryStore;

/// jailwatch - Jail Custody Report Watcher
#[derive(Parser, Debug)]
#[command(
    name = "jailwatch",
    version,
    about = "Watches a public jail custody report for changes"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the report continuously until interrupted
    Run,

    /// Run a single cycle and exit
    Once,
}

/// Initialize logging from the configured level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Resolves when the process receives an interrupt.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Interrupt received"),
        Err(error) => {
            log::error!("Could not listen for the interrupt signal: {error}");
            std::future::pending::<()>().await;
        }
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config);
    init_logging(&config.logging.level);
    config.validate()?;

    log::info!("Watching {}", config.report_url);

    let transport = Transport::new(&config)?;
    let store = HistoryStore::new(&config.path);
    let notifier = TwitterNotifier::from_config(&config)?;
    let ctx = CycleContext::new(&config, &transport, &store, &notifier)?;
    let watcher = Watcher::new(ctx);

    match cli.command {
        Command::Run => watcher.run(shutdown_signal()).await,
        Command::Once => {
            if let Some(CycleOutcome::Abandoned { error, .. }) = watcher.run_once().await {
                return Err(error);
            }
        }
    }

    Ok(())
}
