pub mod http_fetcher;
pub mod parallel;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::HttpFetcher;
pub use parallel::ParallelFetcher;

/// Fetch collaborator: returns the raw response body for a feed URL.
#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
