//! Shared library for the track acquisition engine.
//!
//! This crate provides common functionality used across the workspace:
//! - Configuration management
//! - Database schema and migrations
//! - Acquisition task models and lifecycle
//! - Task queue persistence (atomic claims, terminal write-back)
//! - Logging infrastructure
//! - Shared error kinds
//! - Name folding for comparison and target identity

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod text;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{AcquisitionError, SearchError};
pub use logging::LogConfig;
pub use models::*;
pub use queue::{ClaimOutcome, TaskQueue, TaskStore};

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
