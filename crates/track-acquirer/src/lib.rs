//! Track acquisition engine.
//!
//! Turns acquisition tasks into matched candidates:
//! - Search collaborator contract and a `yt-dlp` backed provider
//! - Runner applying the match decision to search results
//! - Bounded worker pool with cooperative cancellation
//! - Review hand-off for completed tasks

pub mod review;
pub mod runner;
pub mod scheduler;
pub mod search;

pub use review::{ReviewItem, ReviewSink, SqliteReviewQueue};
pub use runner::{search_query, RunReport, TaskRunner};
pub use scheduler::{Scheduler, SchedulerStats, TaskRun};
pub use search::{CandidateStream, SearchProvider, YtDlpSearchProvider};
