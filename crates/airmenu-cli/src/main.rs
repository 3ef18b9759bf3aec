use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use airmenu_core::client::AirthingsClientFactory;
use airmenu_core::{AirMenu, ClientOutcome};

mod config;
mod host;
mod prompt;
mod settings;

use config::Config;
use host::ConsoleHost;
use prompt::DialoguerPrompt;
use settings::FileSettingsStore;

#[derive(Parser)]
#[command(name = "airmenu")]
#[command(author, version, about = "Airthings air quality readings in a terminal menu", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, env = "AIRMENU_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so they do not interleave with the menu.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    config.validate()?;

    let settings = FileSettingsStore::open(&config.settings.path)?;
    info!("Using settings file {}", settings.path().display());

    let engine = Arc::new(AirMenu::new(
        Arc::new(settings),
        Arc::new(DialoguerPrompt::new()),
        Arc::new(AirthingsClientFactory::new(config.endpoints()?)),
    ));
    engine.start().await;

    let outcome = engine
        .ensure_client()
        .await
        .context("Failed to create API client")?;
    if outcome == ClientOutcome::Cancelled {
        warn!("No credentials entered, choose \"Reset credentials\" to add them");
    }

    let color = !cli.no_color && io::stdout().is_terminal();
    ConsoleHost::new(Arc::clone(&engine), color).run().await?;

    engine.shutdown().await;
    Ok(())
}
