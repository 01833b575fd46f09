use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, SluiceError};
use crate::domain::{ErrorCode, Feed, FeedErrorRecord, FeedMetadata, PersistedItem};
use crate::store::{BatchVerdict, ItemTransaction, Store};

const FEED_COLUMNS: &str =
    "id, url, title, update_interval, active, last_checked, last_error, created_at";

const ITEM_COLUMNS: &str = "item_hash, feed_id, guid, pub_date, raw_content, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| SluiceError::Other(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            SluiceError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn required_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        Ok(row
            .get::<_, String>(idx)
            .ok()
            .and_then(|s| Self::parse_datetime(&s))
            .unwrap_or_else(Utc::now))
    }

    fn optional_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row
            .get::<_, Option<String>>(idx)?
            .and_then(|s| Self::parse_datetime(&s)))
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            update_interval: row.get(3)?,
            active: row.get::<_, i32>(4)? != 0,
            last_checked: Self::optional_datetime(row, 5)?,
            last_error: row.get(6)?,
            created_at: Self::required_datetime(row, 7)?,
        })
    }

    fn item_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedItem> {
        Ok(PersistedItem {
            item_hash: row.get(0)?,
            feed_id: row.get(1)?,
            guid: row.get(2)?,
            pub_date: Self::required_datetime(row, 3)?,
            raw_content: row.get(4)?,
            created_at: Self::required_datetime(row, 5)?,
        })
    }

    fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<FeedMetadata> {
        Ok(FeedMetadata {
            feed_id: row.get(0)?,
            last_fetched: Self::optional_datetime(row, 1)?,
            fetch_interval: row.get(2)?,
            fetch_count: row.get(3)?,
            item_count: row.get(4)?,
            last_error_date: Self::optional_datetime(row, 5)?,
            last_error_message: row.get(6)?,
            created_at: Self::required_datetime(row, 7)?,
            updated_at: Self::required_datetime(row, 8)?,
        })
    }

    fn error_from_row(row: &Row<'_>) -> rusqlite::Result<FeedErrorRecord> {
        let code: String = row.get(2)?;
        let error_code = code.parse::<ErrorCode>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(FeedErrorRecord {
            error_id: row.get(0)?,
            feed_id: row.get(1)?,
            error_code,
            error_message: row.get(3)?,
            created: Self::required_datetime(row, 4)?,
        })
    }
}

fn insert_error(
    conn: &Connection,
    feed_id: i64,
    at: DateTime<Utc>,
    code: ErrorCode,
    message: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO feed_errors (feed_id, error_code, error_message, created)
         VALUES (?1, ?2, ?3, ?4)",
        params![feed_id, code.as_str(), message, at.to_rfc3339()],
    )
}

fn ensure_metadata_row(conn: &Connection, feed_id: i64, now: DateTime<Utc>) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO feed_metadata (feed_id, fetch_interval, created_at, updated_at)
         VALUES (?1, COALESCE((SELECT update_interval FROM feeds WHERE id = ?1), 3600), ?2, ?2)",
        params![feed_id, now.to_rfc3339()],
    )
}

impl Store for SqliteStore {
    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feeds (url, title, update_interval, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feed.url,
                feed.title,
                feed.update_interval,
                feed.active as i32,
                feed.created_at.to_rfc3339()
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE url = ?1", FEED_COLUMNS),
                params![url],
                Self::feed_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds ORDER BY title, url",
            FEED_COLUMNS
        ))?;
        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feeds)
    }

    fn get_due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<Feed>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds WHERE active = 1 ORDER BY last_checked IS NOT NULL, last_checked, id",
            FEED_COLUMNS
        ))?;
        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feeds.into_iter().filter(|f| f.is_due(now)).collect())
    }

    fn mark_checked(&self, feed_id: i64, at: DateTime<Utc>, last_error: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE feeds SET last_checked = ?1, last_error = ?2 WHERE id = ?3",
            params![at.to_rfc3339(), last_error, feed_id],
        )?;
        if updated == 0 {
            return Err(SluiceError::FeedNotFound(feed_id.to_string()));
        }
        Ok(())
    }

    fn get_metadata(&self, feed_id: i64) -> Result<Option<FeedMetadata>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT feed_id, last_fetched, fetch_interval, fetch_count, item_count,
                        last_error_date, last_error_message, created_at, updated_at
                 FROM feed_metadata WHERE feed_id = ?1",
                params![feed_id],
                Self::metadata_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn record_success(&self, feed_id: i64, at: DateTime<Utc>, new_items: usize) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        ensure_metadata_row(&tx, feed_id, at)?;
        tx.execute(
            "UPDATE feed_metadata
             SET last_fetched = ?1,
                 fetch_count = fetch_count + 1,
                 item_count = item_count + ?2,
                 last_error_date = NULL,
                 last_error_message = NULL,
                 updated_at = ?1
             WHERE feed_id = ?3",
            params![at.to_rfc3339(), new_items as i64, feed_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn record_failure(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
        code: ErrorCode,
        message: &str,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        ensure_metadata_row(&tx, feed_id, at)?;
        tx.execute(
            "UPDATE feed_metadata
             SET last_error_date = ?1, last_error_message = ?2, updated_at = ?1
             WHERE feed_id = ?3",
            params![at.to_rfc3339(), message, feed_id],
        )?;
        insert_error(&tx, feed_id, at, code, message)?;

        tx.commit()?;
        Ok(())
    }

    fn append_error(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
        code: ErrorCode,
        message: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        insert_error(&conn, feed_id, at, code, message)?;
        Ok(())
    }

    fn get_errors(&self, feed_id: i64, limit: usize) -> Result<Vec<FeedErrorRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT error_id, feed_id, error_code, error_message, created
             FROM feed_errors WHERE feed_id = ?1
             ORDER BY created DESC, error_id DESC LIMIT ?2",
        )?;
        let errors = stmt
            .query_map(params![feed_id, limit as i64], Self::error_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(errors)
    }

    fn get_item(&self, feed_id: i64, guid: &str) -> Result<Option<PersistedItem>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM feed_raw_items WHERE feed_id = ?1 AND guid = ?2",
                    ITEM_COLUMNS
                ),
                params![feed_id, guid],
                Self::item_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn get_items_by_feed(&self, feed_id: i64) -> Result<Vec<PersistedItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feed_raw_items WHERE feed_id = ?1 ORDER BY pub_date DESC, created_at DESC",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![feed_id], Self::item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn count_items(&self, feed_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM feed_raw_items WHERE feed_id = ?1",
            params![feed_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn in_transaction<T, F>(&self, f: F) -> Result<(BatchVerdict, T)>
    where
        F: FnOnce(&mut dyn ItemTransaction) -> Result<(BatchVerdict, T)>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let (verdict, value) = {
            let mut batch = SqliteItemTransaction { conn: &tx };
            f(&mut batch)?
        };

        match verdict {
            BatchVerdict::Commit => tx.commit()?,
            BatchVerdict::Rollback => tx.rollback()?,
        }
        Ok((verdict, value))
    }
}

struct SqliteItemTransaction<'a> {
    conn: &'a Connection,
}

impl ItemTransaction for SqliteItemTransaction<'_> {
    fn ensure_metadata(&mut self, feed_id: i64, now: DateTime<Utc>) -> Result<()> {
        ensure_metadata_row(self.conn, feed_id, now)?;
        Ok(())
    }

    fn find_item_hash(&mut self, feed_id: i64, guid: &str) -> Result<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT item_hash FROM feed_raw_items WHERE feed_id = ?1 AND guid = ?2",
                params![feed_id, guid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn insert_item(&mut self, item: &PersistedItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO feed_raw_items (item_hash, feed_id, guid, pub_date, raw_content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                item.item_hash,
                item.feed_id,
                item.guid,
                item.pub_date.to_rfc3339(),
                item.raw_content,
                item.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn update_item(&mut self, item_hash: &str, item: &PersistedItem) -> Result<()> {
        self.conn.execute(
            "UPDATE feed_raw_items SET pub_date = ?1, raw_content = ?2, updated_at = ?3
             WHERE item_hash = ?4",
            params![
                item.pub_date.to_rfc3339(),
                item.raw_content,
                item.created_at.to_rfc3339(),
                item_hash
            ],
        )?;
        Ok(())
    }
}
