use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable error codes written to `feed_errors.error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    FetchError,
    ParseError,
    ItemError,
    ProcessingError,
    PersistenceError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FetchError => "fetch_error",
            ErrorCode::ParseError => "parse_error",
            ErrorCode::ItemError => "item_error",
            ErrorCode::ProcessingError => "processing_error",
            ErrorCode::PersistenceError => "persistence_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch_error" => Ok(ErrorCode::FetchError),
            "parse_error" => Ok(ErrorCode::ParseError),
            "item_error" => Ok(ErrorCode::ItemError),
            "processing_error" => Ok(ErrorCode::ProcessingError),
            "persistence_error" => Ok(ErrorCode::PersistenceError),
            other => Err(format!("unknown error code: {}", other)),
        }
    }
}

/// Per-feed bookkeeping owned by the coordinator. Created lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMetadata {
    pub feed_id: i64,
    pub last_fetched: Option<DateTime<Utc>>,
    pub fetch_interval: i64,
    pub fetch_count: i64,
    pub item_count: i64,
    pub last_error_date: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedMetadata {
    pub fn has_error(&self) -> bool {
        self.last_error_message.is_some()
    }
}

/// Append-only diagnostic row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedErrorRecord {
    pub error_id: i64,
    pub feed_id: i64,
    pub error_code: ErrorCode,
    pub error_message: String,
    pub created: DateTime<Utc>,
}
