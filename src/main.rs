use std::path::PathBuf;

use chrono::{Duration, Utc};
use clap::Parser;
use log::{error, info};
use thiserror::Error;

use edenbot::clock::Clock;
use edenbot::config::Config;

/// Number of poll cycles a demo run performs before exiting.
const DEMO_TICKS: u32 = 48;
/// Virtual chain height a demo run starts at.
const DEMO_START_HEIGHT: u32 = 1_000_000;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "Edenbot.toml")]
    config: PathBuf,
    /// Run against a simulated clock and chain height instead of wall time.
    #[arg(long)]
    demo: bool,
}

/// Errors that are critical to the entire bot.
#[derive(Debug, Error)]
enum Error {
    #[error("Failed to load configuration: {0}")]
    ConfigError(#[from] figment::Error),
    #[error(transparent)]
    BotError(#[from] edenbot::error::Error),
}

async fn run(args: Args) -> Result<(), Error> {
    info!("Loading configuration from {}", args.config.display());
    let config = Config::load(&args.config)?;

    let clock = if args.demo {
        // Start the virtual clock one day before a made-up election so a
        // demo run walks through the interesting part of the calendar.
        Clock::simulated(Utc::now() - Duration::days(1), DEMO_START_HEIGHT)
    } else {
        Clock::wall()
    };

    let runner = edenbot::build(config, clock).await?;
    if args.demo {
        runner.run_ticks(DEMO_TICKS).await?;
    } else {
        runner.run().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Set up logging.
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .expect("Failed to initialise logging");
    info!("Initialised logging");

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
