//! Error kinds for the acquisition engine.
//!
//! Plumbing (I/O, SQLite, config) uses `anyhow` with context like the rest of
//! the workspace. The kinds below are the ones callers need to tell apart;
//! their `Display` text is what ends up in a failed task's `failure_reason`.

use crate::models::TaskStatus;
use std::time::Duration;
use thiserror::Error;

/// Why an acquisition did not (or must not) succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    /// Normal outcome: the provider had nothing that passed the match decision.
    #[error("no matching candidate found")]
    NoMatchFound,

    #[error("search provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("search provider timed out after {}s", .0.as_secs())]
    ProviderTimeout(Duration),

    #[error("search provider rate limited: {0}")]
    ProviderRateLimited(String),

    /// Cooperative cancellation observed at a checkpoint.
    #[error("cancelled")]
    Cancelled,

    /// Malformed target data, rejected before a task exists.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Attempted transition the state machine does not allow. Programming error.
    #[error("contract violation: task {task_id} cannot move from {from} to {to}")]
    ContractViolation {
        task_id: i64,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl AcquisitionError {
    /// Failures reported by the search collaborator.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            AcquisitionError::ProviderUnavailable(_)
                | AcquisitionError::ProviderTimeout(_)
                | AcquisitionError::ProviderRateLimited(_)
        )
    }
}

/// Failure modes of the external search collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<SearchError> for AcquisitionError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Unavailable(msg) => AcquisitionError::ProviderUnavailable(msg),
            SearchError::RateLimited(msg) => AcquisitionError::ProviderRateLimited(msg),
            SearchError::Timeout(after) => AcquisitionError::ProviderTimeout(after),
        }
    }
}
