//! External search collaborator.

pub mod rate_limiter;
pub mod yt_dlp;

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::{CandidateVideo, SearchError};

pub use rate_limiter::RateLimiter;
pub use yt_dlp::YtDlpSearchProvider;

/// Lazy, finite, non-restartable sequence of search results
pub type CandidateStream = BoxStream<'static, Result<CandidateVideo, SearchError>>;

/// Source of candidates for a target.
///
/// Results arrive in the provider's relevance order; the runner relies on
/// that order as the tie-break between passing candidates.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Start a search returning at most `limit` results.
    async fn search(&self, query: &str, limit: usize) -> Result<CandidateStream, SearchError>;
}
