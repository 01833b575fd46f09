use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ErrorCode;

/// Lifecycle of one feed cycle: `Idle -> Fetching -> {Success, Error} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedState {
    #[default]
    Idle,
    Fetching,
    Success,
    Error(ErrorCode),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid feed state transition from {from:?} on {event}")]
pub struct StateError {
    pub from: FeedState,
    pub event: &'static str,
}

impl FeedState {
    pub fn start(self) -> Result<Self, StateError> {
        match self {
            FeedState::Idle => Ok(FeedState::Fetching),
            from => Err(StateError {
                from,
                event: "start",
            }),
        }
    }

    pub fn succeed(self) -> Result<Self, StateError> {
        match self {
            FeedState::Fetching => Ok(FeedState::Success),
            from => Err(StateError {
                from,
                event: "succeed",
            }),
        }
    }

    pub fn fail(self, code: ErrorCode) -> Result<Self, StateError> {
        match self {
            FeedState::Fetching => Ok(FeedState::Error(code)),
            from => Err(StateError { from, event: "fail" }),
        }
    }

    /// Return to `Idle` once the outcome has been recorded.
    pub fn settle(self) -> Result<Self, StateError> {
        match self {
            FeedState::Success | FeedState::Error(_) => Ok(FeedState::Idle),
            from => Err(StateError {
                from,
                event: "settle",
            }),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, FeedState::Fetching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path() {
        let state = FeedState::default().start().unwrap();
        assert!(state.is_busy());
        let state = state.succeed().unwrap();
        assert_eq!(state, FeedState::Success);
        assert_eq!(state.settle().unwrap(), FeedState::Idle);
    }

    #[test]
    fn test_error_path_keeps_code() {
        let state = FeedState::Idle
            .start()
            .unwrap()
            .fail(ErrorCode::ParseError)
            .unwrap();
        assert_eq!(state, FeedState::Error(ErrorCode::ParseError));
        assert_eq!(state.settle().unwrap(), FeedState::Idle);
    }

    #[test]
    fn test_cannot_start_twice() {
        let state = FeedState::Idle.start().unwrap();
        let err = state.start().unwrap_err();
        assert_eq!(err.from, FeedState::Fetching);
    }

    #[test]
    fn test_cannot_finish_without_start() {
        assert!(FeedState::Idle.succeed().is_err());
        assert!(FeedState::Idle.fail(ErrorCode::FetchError).is_err());
        assert!(FeedState::Fetching.settle().is_err());
    }
}
