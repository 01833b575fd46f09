use std::path::Path;

use serde::Serialize;

use crate::app::{AppContext, Result, SluiceError};
use crate::coordinator::{CycleInput, CycleOutcome};
use crate::domain::{CanonicalItem, Feed};
use crate::parser::{FeedFormat, Strategy};
use crate::store::Store;

pub async fn add_feed(ctx: &AppContext, url: &str, interval: Option<i64>) -> Result<()> {
    url::Url::parse(url)?;

    if ctx.store.get_feed_by_url(url)?.is_some() {
        println!("Feed already exists: {}", url);
        return Ok(());
    }

    let interval = interval.unwrap_or(ctx.config.feeds.default_update_interval);
    let mut feed = Feed::new(url.to_string()).with_interval(interval);
    feed.id = ctx.store.add_feed(&feed)?;
    println!("Added feed: {}", url);

    let input = match ctx.fetcher.fetch(url).await {
        Ok(body) => CycleInput::Content(body),
        Err(e) => CycleInput::FetchFailed(e.to_string()),
    };
    let outcome = ctx.runner.run_cycle(&feed, input);
    print_outcome(&feed, &outcome);

    Ok(())
}

/// Fetch due feeds concurrently, then run their cycles one by one.
pub async fn update_feeds(ctx: &AppContext, all: bool) -> Result<Vec<CycleOutcome>> {
    let feeds = if all {
        ctx.store.get_all_feeds()?
    } else {
        ctx.store.get_due_feeds(chrono::Utc::now())?
    };

    if feeds.is_empty() {
        println!("No feeds to update");
        return Ok(Vec::new());
    }

    println!("Updating {} feeds...", feeds.len());

    let fetched = ctx.parallel_fetcher.fetch_all(feeds).await;

    let mut outcomes = Vec::with_capacity(fetched.len());
    let mut total_new = 0;
    let mut errors = 0;

    for (feed, input) in fetched {
        let outcome = ctx.runner.run_cycle(&feed, input);
        total_new += outcome.stats.new;
        if !outcome.is_success() {
            errors += 1;
        }
        print_outcome(&feed, &outcome);
        outcomes.push(outcome);
    }

    println!("Update complete: {} new items, {} errors", total_new, errors);
    Ok(outcomes)
}

fn print_outcome(feed: &Feed, outcome: &CycleOutcome) {
    if outcome.is_busy() {
        eprintln!("  {} is already being processed", feed.display_title());
        return;
    }

    match &outcome.error {
        None => println!(
            "  {} [{}/{}]: {} new, {} existing, {} skipped",
            feed.display_title(),
            outcome.format.map(|f| f.to_string()).unwrap_or_default(),
            outcome.strategy.map(|s| s.to_string()).unwrap_or_default(),
            outcome.stats.new,
            outcome.stats.existing,
            outcome.stats.errors
        ),
        Some(failure) => eprintln!("  Error updating {}: {}", feed.display_title(), failure),
    }
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let count = ctx.store.count_items(feed.id)?;
        let checked = feed
            .last_checked
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} ({} items, checked {})\n  {}",
            feed.display_title(),
            count,
            checked,
            feed.url
        );
        if let Some(error) = &feed.last_error {
            println!("  last error: {}", error);
        }
    }

    Ok(())
}

pub fn list_items(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| SluiceError::FeedNotFound(url.to_string()))?;

    let rows = ctx.store.get_items_by_feed(feed.id)?;
    if rows.is_empty() {
        println!("No items");
        return Ok(());
    }

    for row in rows {
        let item = row.item()?;
        println!("{} {}", row.pub_date.format("%Y-%m-%d"), item.display_title());
    }

    Ok(())
}

pub fn list_errors(ctx: &AppContext, url: &str, limit: usize) -> Result<()> {
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| SluiceError::FeedNotFound(url.to_string()))?;

    let errors = ctx.store.get_errors(feed.id, limit)?;
    if errors.is_empty() {
        println!("No errors recorded");
        return Ok(());
    }

    for error in errors {
        println!(
            "{} {:<17} {}",
            error.created.format("%Y-%m-%d %H:%M:%S"),
            error.error_code.as_str(),
            error.error_message
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct DryRun {
    pub format: FeedFormat,
    pub strategy: Strategy,
    pub raw_items: usize,
    pub items: Vec<CanonicalItem>,
}

/// Run detection, parsing and standardization over a document without persisting it.
pub fn dry_run(ctx: &AppContext, body: &[u8]) -> Result<DryRun> {
    let parsed = ctx.runner.registry().parse_bytes(body)?;
    let items = ctx.runner.standardizer().standardize(&parsed.items);

    Ok(DryRun {
        format: parsed.format,
        strategy: parsed.strategy,
        raw_items: parsed.items.len(),
        items,
    })
}

pub fn parse_file(ctx: &AppContext, path: &Path) -> Result<()> {
    let body = std::fs::read(path)?;
    let report = dry_run(ctx, &body)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::domain::ErrorCode;
    use crate::fetcher::{Fetcher, ParallelFetcher};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
<item><title>One</title><link>https://example.com/1</link><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
<item><title>Two</title><link>https://example.com/2</link></item>
</channel></rss>"#;

    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            if url.contains("down") {
                Err(SluiceError::Other("connection refused".into()))
            } else {
                Ok(RSS.as_bytes().to_vec())
            }
        }
    }

    fn context() -> AppContext {
        let mut ctx = AppContext::in_memory().unwrap();
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(StubFetcher);
        ctx.parallel_fetcher = ParallelFetcher::with_workers(fetcher.clone(), 2);
        ctx.fetcher = fetcher;
        ctx
    }

    #[test]
    fn test_dry_run_reports_format_and_items() {
        let ctx = context();
        let report = dry_run(&ctx, RSS.as_bytes()).unwrap();

        assert_eq!(report.format, FeedFormat::Rss);
        assert_eq!(report.strategy, Strategy::Structured);
        assert_eq!(report.raw_items, 2);
        assert_eq!(report.items[0].guid, "https://example.com/1");
        assert_eq!(ctx.store.get_all_feeds().unwrap().len(), 0);
    }

    #[test]
    fn test_dry_run_rejects_blank_document() {
        let ctx = context();
        assert!(matches!(dry_run(&ctx, b"   "), Err(SluiceError::Parse(_))));
    }

    #[tokio::test]
    async fn test_add_runs_first_cycle() {
        let ctx = context();
        add_feed(&ctx, "https://example.com/feed.xml", Some(600)).await.unwrap();

        let feed = ctx.store.get_feed_by_url("https://example.com/feed.xml").unwrap().unwrap();
        assert_eq!(feed.update_interval, 600);
        assert!(feed.last_checked.is_some());
        assert_eq!(ctx.store.count_items(feed.id).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_url() {
        let ctx = context();
        let result = add_feed(&ctx, "not a url", None).await;
        assert!(matches!(result, Err(SluiceError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_update_only_runs_due_feeds() {
        let ctx = context();
        add_feed(&ctx, "https://example.com/feed.xml", None).await.unwrap();
        ctx.store.add_feed(&Feed::new("https://down.example/feed.xml".into())).unwrap();

        let outcomes = update_feeds(&ctx, false).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].error.as_ref().unwrap().code, ErrorCode::FetchError);

        let outcomes = update_feeds(&ctx, true).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        let ok = outcomes.iter().find(|o| o.is_success()).unwrap();
        assert_eq!(ok.stats.new, 0);
        assert_eq!(ok.stats.existing, 2);
    }

    #[test]
    fn test_listing_unknown_feed_is_not_found() {
        let ctx = context();
        assert!(matches!(
            list_items(&ctx, "https://nowhere.example/feed"),
            Err(SluiceError::FeedNotFound(_))
        ));
        assert!(matches!(
            list_errors(&ctx, "https://nowhere.example/feed", 5),
            Err(SluiceError::FeedNotFound(_))
        ));
    }
}
