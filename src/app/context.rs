use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{Result, SluiceError};
use crate::app::observer::{tracing_observer, Observer};
use crate::config::Config;
use crate::coordinator::CycleRunner;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::Fetcher;
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub parallel_fetcher: ParallelFetcher,
    pub runner: CycleRunner<SqliteStore>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = match &config.database.path {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::build(config, store, tracing_observer())
    }

    pub fn in_memory() -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::build(Config::default(), store, tracing_observer())
    }

    fn build(config: Config, store: Arc<SqliteStore>, observer: Arc<dyn Observer>) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::from_config(&config.fetcher)?);
        let parallel_fetcher = ParallelFetcher::with_workers(fetcher.clone(), config.fetcher.workers);
        let runner = CycleRunner::new(store.clone(), observer);

        Ok(Self {
            config,
            store,
            fetcher,
            parallel_fetcher,
            runner,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| SluiceError::Config("Could not find data directory".into()))?;
        let sluice_dir = data_dir.join("sluice");
        std::fs::create_dir_all(&sluice_dir)?;
        Ok(sluice_dir.join("sluice.db"))
    }
}
