use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_UPDATE_INTERVAL: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    /// Seconds between scheduled cycles.
    pub update_interval: i64,
    pub active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(url: String) -> Self {
        Self {
            id: 0,
            url,
            title: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            active: true,
            last_checked: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_interval(mut self, seconds: i64) -> Self {
        self.update_interval = seconds;
        self
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    /// A feed is due when it has never been checked or its interval elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_checked {
            None => true,
            Some(checked) => now - checked >= Duration::seconds(self.update_interval),
        }
    }
}
