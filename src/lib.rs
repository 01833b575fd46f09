//! # sluice
//!
//! Tolerant ingestion of RSS 2.0, RSS 1.0/RDF, Atom and JSON Feed documents.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → FormatDetector → Parser (structured → regex → manual)
//!         → ItemStandardizer → PersistenceCoordinator → FeedState
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Register a feed and ingest it once
//! sluice add https://blog.rust-lang.org/feed.xml
//!
//! # Run cycles for every feed whose interval elapsed
//! sluice update
//!
//! # Inspect how a local document would be ingested
//! sluice parse ./feed.xml
//! ```

/// Application context, error types and the observer logging seam.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// TOML configuration loaded from `~/.config/sluice/config.toml`.
pub mod config;

/// Per-feed cycle orchestration and transactional persistence.
///
/// - [`CycleRunner`](coordinator::CycleRunner): fetch result → parse → standardize → persist
/// - [`PersistenceCoordinator`](coordinator::PersistenceCoordinator): idempotent upsert with rollback rule
pub mod coordinator;

/// Core domain models.
///
/// - [`Feed`](domain::Feed): registered feed and its schedule
/// - [`CanonicalItem`](domain::CanonicalItem): format-independent item
/// - [`PersistedItem`](domain::PersistedItem): storage row keyed by `(feed_id, guid)`
/// - [`FeedState`](domain::FeedState): per-feed cycle state machine
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for feed fetching
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): Concurrent fetching with semaphore
pub mod fetcher;

/// Format detection and per-format parsers with fallback strategies.
pub mod parser;

/// Field resolution tables and date parsing into canonical items.
pub mod standardizer;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
