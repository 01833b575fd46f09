//! Per-feed cycle orchestration and transactional persistence.

pub mod cycle;
pub mod persistence;

use std::fmt;

use serde::Serialize;

use crate::domain::ErrorCode;

pub use cycle::{CycleInput, CycleOutcome, CycleRunner};
pub use persistence::{PersistenceCoordinator, ProcessReport, ProcessStats};

/// Stable code plus a human-readable message, attached to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl CycleFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
