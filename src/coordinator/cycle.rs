use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::observer::{Event, Level, Observer};
use crate::coordinator::{CycleFailure, PersistenceCoordinator, ProcessStats};
use crate::domain::{ErrorCode, Feed, FeedState, StateError};
use crate::parser::{normalize, FeedFormat, ParserRegistry, Strategy};
use crate::standardizer::ItemStandardizer;
use crate::store::Store;

const COMPONENT: &str = "cycle";

/// What the fetch collaborator handed over for one feed.
#[derive(Debug, Clone)]
pub enum CycleInput {
    Content(Vec<u8>),
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub feed_id: i64,
    /// State the cycle ended in before settling back to idle.
    pub state: FeedState,
    pub busy: bool,
    pub stats: ProcessStats,
    pub format: Option<FeedFormat>,
    pub strategy: Option<Strategy>,
    pub error: Option<CycleFailure>,
}

impl CycleOutcome {
    fn new(feed_id: i64) -> Self {
        Self {
            feed_id,
            state: FeedState::Fetching,
            busy: false,
            stats: ProcessStats::default(),
            format: None,
            strategy: None,
            error: None,
        }
    }

    fn busy(feed_id: i64, state: FeedState) -> Self {
        Self {
            state,
            busy: true,
            ..Self::new(feed_id)
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_success(&self) -> bool {
        !self.busy && self.error.is_none()
    }
}

/// Runs fetch result → parse → standardize → persist for one feed at a time.
///
/// Each feed's [`FeedState`] lives here; a cycle only starts from `Idle`,
/// so a feed is never processed by two cycles at once.
pub struct CycleRunner<S: Store> {
    store: Arc<S>,
    registry: ParserRegistry,
    standardizer: ItemStandardizer,
    coordinator: PersistenceCoordinator<S>,
    observer: Arc<dyn Observer>,
    states: Mutex<HashMap<i64, FeedState>>,
}

impl<S: Store> CycleRunner<S> {
    pub fn new(store: Arc<S>, observer: Arc<dyn Observer>) -> Self {
        let registry = ParserRegistry::new(observer.clone());
        Self::with_registry(store, registry, observer)
    }

    pub fn with_registry(store: Arc<S>, registry: ParserRegistry, observer: Arc<dyn Observer>) -> Self {
        Self {
            coordinator: PersistenceCoordinator::new(store.clone(), observer.clone()),
            standardizer: ItemStandardizer::new(observer.clone()),
            store,
            registry,
            observer,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn standardizer(&self) -> &ItemStandardizer {
        &self.standardizer
    }

    pub fn state(&self, feed_id: i64) -> FeedState {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&feed_id)
            .copied()
            .unwrap_or_default()
    }

    /// Run one cycle. Expected failures are reported in the outcome, never returned.
    pub fn run_cycle(&self, feed: &Feed, input: CycleInput) -> CycleOutcome {
        if let Err(e) = self.transition(feed.id, FeedState::start) {
            self.observer.record(
                Event::new(Level::Warn, COMPONENT, "feed cycle already running")
                    .field("feed_id", feed.id),
            );
            return CycleOutcome::busy(feed.id, e.from);
        }
        let _idle = IdleGuard {
            states: &self.states,
            feed_id: feed.id,
        };

        let now = Utc::now();
        let mut outcome = self.execute(feed, input, now);

        let finished = match &outcome.error {
            None => self.transition(feed.id, FeedState::succeed),
            Some(failure) => {
                let code = failure.code;
                self.transition(feed.id, move |s| s.fail(code))
            }
        };
        outcome.state = finished.unwrap_or_else(|e| e.from);

        let last_error = outcome.error.as_ref().map(|f| f.to_string());
        if let Err(e) = self.store.mark_checked(feed.id, now, last_error.as_deref()) {
            self.observer.record(
                Event::new(Level::Error, COMPONENT, "failed to mark feed checked")
                    .field("feed_id", feed.id)
                    .field("error", e),
            );
        }

        if let Err(e) = self.transition(feed.id, FeedState::settle) {
            self.observer.record(
                Event::new(Level::Error, COMPONENT, "rejected state transition")
                    .field("feed_id", feed.id)
                    .field("from", format!("{:?}", e.from))
                    .field("to", "Idle"),
            );
        }

        self.observer.record(
            Event::new(
                if outcome.error.is_some() { Level::Warn } else { Level::Info },
                COMPONENT,
                "feed cycle finished",
            )
            .field("feed_id", feed.id)
            .field("url", &feed.url)
            .field("state", format!("{:?}", outcome.state))
            .field("processed", outcome.stats.processed)
            .field("new", outcome.stats.new)
            .field("existing", outcome.stats.existing)
            .field("errors", outcome.stats.errors),
        );

        outcome
    }

    fn execute(&self, feed: &Feed, input: CycleInput, now: DateTime<Utc>) -> CycleOutcome {
        let mut outcome = CycleOutcome::new(feed.id);

        if feed.url.trim().is_empty() {
            return self.fail(feed, outcome, ErrorCode::FetchError, "feed has no URL", now);
        }

        let body = match input {
            CycleInput::FetchFailed(message) => {
                return self.fail(feed, outcome, ErrorCode::FetchError, message, now)
            }
            CycleInput::Content(body) => body,
        };

        let content = normalize::decode(&body);
        if content.trim().is_empty() {
            return self.fail(feed, outcome, ErrorCode::FetchError, "empty content", now);
        }

        let parsed = match self.registry.parse(&content) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail(feed, outcome, ErrorCode::ParseError, e.to_string(), now),
        };
        outcome.format = Some(parsed.format);
        outcome.strategy = Some(parsed.strategy);

        let items = self.standardizer.standardize_at(&parsed.items, now);
        let report = self.coordinator.process_at(feed, &items, now);
        outcome.stats = report.stats;
        outcome.error = report.failure;
        outcome
    }

    fn fail(
        &self,
        feed: &Feed,
        mut outcome: CycleOutcome,
        code: ErrorCode,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let failure = CycleFailure::new(code, message);
        self.coordinator.record_failure(feed, &failure, now);
        outcome.error = Some(failure);
        outcome
    }

    /// Apply a transition to the feed's state. A rejected transition leaves the state unchanged.
    fn transition<F>(&self, feed_id: i64, f: F) -> Result<FeedState, StateError>
    where
        F: FnOnce(FeedState) -> Result<FeedState, StateError>,
    {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = states.get(&feed_id).copied().unwrap_or_default();
        let next = f(current)?;
        if next == FeedState::Idle {
            states.remove(&feed_id);
        } else {
            states.insert(feed_id, next);
        }
        Ok(next)
    }
}

/// Returns a feed to `Idle` when its cycle ends, including by unwinding.
struct IdleGuard<'a> {
    states: &'a Mutex<HashMap<i64, FeedState>>,
    feed_id: i64,
}

impl Drop for IdleGuard<'_> {
    fn drop(&mut self) {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.feed_id);
    }
}
