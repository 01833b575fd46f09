use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::coordinator::CycleInput;
use crate::domain::Feed;
use crate::fetcher::Fetcher;

pub const DEFAULT_WORKERS: usize = 10;

/// Fetches many feeds concurrently, bounded by a worker count.
///
/// Only the network step is concurrent. Callers run each feed's cycle on
/// the returned inputs.
pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    semaphore: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Results come back in the order of `feeds`.
    pub async fn fetch_all(&self, feeds: Vec<Feed>) -> Vec<(Feed, CycleInput)> {
        let mut handles = Vec::new();

        for feed in feeds {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let task_feed = feed.clone();

            let handle = tokio::spawn(async move {
                match semaphore.acquire().await {
                    Ok(_permit) => fetch_single_feed(&fetcher, &task_feed).await,
                    Err(e) => CycleInput::FetchFailed(format!("worker pool closed: {}", e)),
                }
            });

            handles.push((feed, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (feed, handle) in handles {
            let input = match handle.await {
                Ok(input) => input,
                Err(e) => {
                    tracing::error!("Fetch task for {} failed: {}", feed.url, e);
                    CycleInput::FetchFailed(format!("fetch task failed: {}", e))
                }
            };
            results.push((feed, input));
        }

        results
    }
}

async fn fetch_single_feed(fetcher: &Arc<dyn Fetcher + Send + Sync>, feed: &Feed) -> CycleInput {
    if feed.url.trim().is_empty() {
        return CycleInput::FetchFailed("feed has no URL".into());
    }

    match fetcher.fetch(&feed.url).await {
        Ok(body) => CycleInput::Content(body),
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}", feed.url, e);
            CycleInput::FetchFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::app::{Result, SluiceError};

    struct StubFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("crash") {
                panic!("fetcher crashed");
            }
            if url.contains("broken") {
                Err(SluiceError::Other("HTTP 500".into()))
            } else {
                Ok(format!("<rss>{}</rss>", url).into_bytes())
            }
        }
    }

    fn feed(url: &str) -> Feed {
        Feed::new(url.into())
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order_and_maps_failures() {
        let fetcher = Arc::new(StubFetcher::new());
        let parallel = ParallelFetcher::with_workers(fetcher, 4);

        let results = parallel
            .fetch_all(vec![
                feed("https://a.example/feed"),
                feed("https://broken.example/feed"),
                feed(""),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0.url, "https://a.example/feed");
        assert!(matches!(&results[0].1, CycleInput::Content(body) if body.starts_with(b"<rss>")));
        assert!(matches!(&results[1].1, CycleInput::FetchFailed(msg) if msg.contains("HTTP 500")));
        assert!(matches!(&results[2].1, CycleInput::FetchFailed(msg) if msg == "feed has no URL"));
    }

    #[tokio::test]
    async fn test_crashed_fetch_task_becomes_fetch_failure() {
        let parallel = ParallelFetcher::with_workers(Arc::new(StubFetcher::new()), 2);

        let results = parallel
            .fetch_all(vec![feed("https://crash.example/feed"), feed("https://b.example/feed")])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.url, "https://crash.example/feed");
        assert!(matches!(&results[0].1, CycleInput::FetchFailed(msg) if msg.starts_with("fetch task failed")));
        assert!(matches!(&results[1].1, CycleInput::Content(_)));
    }

    #[test]
    fn test_worker_limit_bounds_concurrency() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fetcher = Arc::new(StubFetcher::new());
        let parallel = ParallelFetcher::with_workers(fetcher.clone(), 2);

        let feeds = (0..8).map(|i| feed(&format!("https://{}.example/feed", i))).collect();
        let results = runtime.block_on(parallel.fetch_all(feeds));

        assert_eq!(results.len(), 8);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_empty_feed_list() {
        let parallel = ParallelFetcher::new(Arc::new(StubFetcher::new()));
        let results = tokio_test::block_on(parallel.fetch_all(Vec::new()));
        assert!(results.is_empty());
    }
}
