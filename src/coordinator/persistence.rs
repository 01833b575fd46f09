use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::observer::{Event, Level, Observer};
use crate::coordinator::CycleFailure;
use crate::domain::{CanonicalItem, ErrorCode, Feed, PersistedItem};
use crate::store::{BatchVerdict, Store};

const COMPONENT: &str = "persistence";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub processed: usize,
    pub new: usize,
    pub existing: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub stats: ProcessStats,
    pub failure: Option<CycleFailure>,
}

/// Writes one feed's canonical items in a single transaction.
///
/// Items are keyed by `(feed_id, guid)`. A batch commits only while item
/// errors stay below the number of processed items; otherwise nothing is
/// written and the failure is recorded against the feed.
pub struct PersistenceCoordinator<S: Store> {
    store: Arc<S>,
    observer: Arc<dyn Observer>,
}

impl<S: Store> PersistenceCoordinator<S> {
    pub fn new(store: Arc<S>, observer: Arc<dyn Observer>) -> Self {
        Self { store, observer }
    }

    pub fn process(&self, feed: &Feed, items: &[CanonicalItem]) -> ProcessReport {
        self.process_at(feed, items, Utc::now())
    }

    pub fn process_at(&self, feed: &Feed, items: &[CanonicalItem], now: DateTime<Utc>) -> ProcessReport {
        let result = self.store.in_transaction(|tx| {
            tx.ensure_metadata(feed.id, now)?;

            let mut stats = ProcessStats::default();
            let mut first_error: Option<String> = None;

            for item in items {
                stats.processed += 1;

                let row = match PersistedItem::from_canonical(feed.id, item, now) {
                    Ok(row) => row,
                    Err(e) => {
                        stats.errors += 1;
                        first_error.get_or_insert_with(|| format!("{}: {}", item.display_title(), e));
                        continue;
                    }
                };

                match tx.find_item_hash(feed.id, &row.guid)? {
                    Some(hash) => {
                        tx.update_item(&hash, &row)?;
                        stats.existing += 1;
                    }
                    None => {
                        tx.insert_item(&row)?;
                        stats.new += 1;
                    }
                }
            }

            let verdict = if stats.errors < stats.processed {
                BatchVerdict::Commit
            } else {
                BatchVerdict::Rollback
            };
            Ok((verdict, (stats, first_error)))
        });

        match result {
            Ok((BatchVerdict::Commit, (stats, first_error))) => self.committed(feed, stats, first_error, now),
            Ok((BatchVerdict::Rollback, (stats, first_error))) => {
                let message = match first_error {
                    _ if stats.processed == 0 => "no items to process".to_string(),
                    Some(first) => format!(
                        "all {} items failed, batch rolled back (first: {})",
                        stats.processed, first
                    ),
                    None => format!("all {} items failed, batch rolled back", stats.processed),
                };
                let stats = ProcessStats {
                    new: 0,
                    existing: 0,
                    ..stats
                };
                let failure = CycleFailure::new(ErrorCode::ProcessingError, message);
                self.record_failure(feed, &failure, now);
                ProcessReport {
                    stats,
                    failure: Some(failure),
                }
            }
            Err(e) => {
                let failure = CycleFailure::new(ErrorCode::PersistenceError, e.to_string());
                self.record_failure(feed, &failure, now);
                ProcessReport {
                    stats: ProcessStats {
                        processed: items.len(),
                        ..Default::default()
                    },
                    failure: Some(failure),
                }
            }
        }
    }

    fn committed(
        &self,
        feed: &Feed,
        stats: ProcessStats,
        first_error: Option<String>,
        now: DateTime<Utc>,
    ) -> ProcessReport {
        if let Err(e) = self.store.record_success(feed.id, now, stats.new) {
            let failure = CycleFailure::new(ErrorCode::PersistenceError, e.to_string());
            self.record_failure(feed, &failure, now);
            return ProcessReport {
                stats,
                failure: Some(failure),
            };
        }

        if stats.errors > 0 {
            let message = format!(
                "{} of {} items skipped (first: {})",
                stats.errors,
                stats.processed,
                first_error.unwrap_or_default()
            );
            if let Err(e) = self.store.append_error(feed.id, now, ErrorCode::ItemError, &message) {
                self.observer.record(
                    Event::new(Level::Error, COMPONENT, "failed to record item errors")
                        .field("feed_id", feed.id)
                        .field("error", e),
                );
            }
        }

        self.observer.record(
            Event::new(Level::Info, COMPONENT, "batch committed")
                .field("feed_id", feed.id)
                .field("processed", stats.processed)
                .field("new", stats.new)
                .field("existing", stats.existing)
                .field("errors", stats.errors),
        );

        ProcessReport {
            stats,
            failure: None,
        }
    }

    /// Record a failed cycle on the feed's metadata and error log.
    /// Storage failures here are reported to the observer, never returned.
    pub fn record_failure(&self, feed: &Feed, failure: &CycleFailure, now: DateTime<Utc>) {
        self.observer.record(
            Event::new(Level::Warn, COMPONENT, "feed cycle failed")
                .field("feed_id", feed.id)
                .field("code", failure.code)
                .field("message", &failure.message),
        );

        if let Err(e) = self
            .store
            .record_failure(feed.id, now, failure.code, &failure.message)
        {
            self.observer.record(
                Event::new(Level::Error, COMPONENT, "failed to record feed error")
                    .field("feed_id", feed.id)
                    .field("error", e),
            );
        }
    }
}
