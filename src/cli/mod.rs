pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Tolerant RSS/RDF/Atom/JSON Feed ingestion", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/sluice/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of parallel workers for fetching feeds (overrides config)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a feed and run its first cycle
    Add {
        /// URL of the feed to add
        url: String,
        /// Seconds between cycles (default from config)
        #[arg(short, long)]
        interval: Option<i64>,
    },
    /// List feeds, or the stored items of one feed
    List {
        /// Show items of the feed with this URL
        #[arg(long, value_name = "URL")]
        items: Option<String>,
    },
    /// Run cycles for due feeds
    Update {
        /// Include feeds that are not due yet
        #[arg(long)]
        all: bool,
    },
    /// Detect, parse and standardize a local file without storing anything
    Parse {
        /// Path to the feed document
        path: PathBuf,
    },
    /// Show recent errors recorded for a feed
    Errors {
        /// URL of the feed
        url: String,
        /// Maximum number of rows
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}
