pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{ErrorCode, Feed, FeedErrorRecord, FeedMetadata, PersistedItem};

pub use sqlite::SqliteStore;

/// Outcome the caller picks for a batch before the transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    Commit,
    Rollback,
}

/// Item writes scoped to one open transaction.
pub trait ItemTransaction {
    /// Create the feed's metadata row if it does not exist yet.
    fn ensure_metadata(&mut self, feed_id: i64, now: DateTime<Utc>) -> Result<()>;
    /// Look up by natural key.
    fn find_item_hash(&mut self, feed_id: i64, guid: &str) -> Result<Option<String>>;
    fn insert_item(&mut self, item: &PersistedItem) -> Result<()>;
    fn update_item(&mut self, item_hash: &str, item: &PersistedItem) -> Result<()>;
}

pub trait Store {
    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;
    fn get_due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<Feed>>;
    fn mark_checked(&self, feed_id: i64, at: DateTime<Utc>, last_error: Option<&str>) -> Result<()>;

    // Metadata and error log
    fn get_metadata(&self, feed_id: i64) -> Result<Option<FeedMetadata>>;
    fn record_success(&self, feed_id: i64, at: DateTime<Utc>, new_items: usize) -> Result<()>;
    fn record_failure(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
        code: ErrorCode,
        message: &str,
    ) -> Result<()>;
    fn append_error(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
        code: ErrorCode,
        message: &str,
    ) -> Result<()>;
    fn get_errors(&self, feed_id: i64, limit: usize) -> Result<Vec<FeedErrorRecord>>;

    // Item operations
    fn get_item(&self, feed_id: i64, guid: &str) -> Result<Option<PersistedItem>>;
    fn get_items_by_feed(&self, feed_id: i64) -> Result<Vec<PersistedItem>>;
    fn count_items(&self, feed_id: i64) -> Result<i64>;

    /// Run `f` inside one transaction. The verdict it returns decides
    /// commit or rollback; an `Err` always rolls back.
    fn in_transaction<T, F>(&self, f: F) -> Result<(BatchVerdict, T)>
    where
        F: FnOnce(&mut dyn ItemTransaction) -> Result<(BatchVerdict, T)>;
}
