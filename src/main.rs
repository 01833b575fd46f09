use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sluice::app::AppContext;
use sluice::cli::{commands, Cli, Commands};
use sluice::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(workers) = cli.workers {
        config.fetcher.workers = workers;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("sluice=info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Add { url, interval } => {
            commands::add_feed(&ctx, &url, interval).await?;
        }
        Commands::List { items } => match items {
            Some(url) => commands::list_items(&ctx, &url)?,
            None => commands::list_feeds(&ctx)?,
        },
        Commands::Update { all } => {
            commands::update_feeds(&ctx, all).await?;
        }
        Commands::Parse { path } => {
            commands::parse_file(&ctx, &path)?;
        }
        Commands::Errors { url, limit } => {
            commands::list_errors(&ctx, &url, limit)?;
        }
    }

    Ok(())
}
