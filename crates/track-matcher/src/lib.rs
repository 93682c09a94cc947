//! Candidate matching for track acquisition.
//!
//! Decides whether an external search result is the track being acquired:
//! - Normalization of raw titles and artist credits
//! - Artist set coverage
//! - Duration tolerance
//! - The combined match decision

pub mod artists;
pub mod decision;
pub mod duration;
pub mod normalize;

pub use artists::{artists_match, missing_artists};
pub use decision::{is_valid_match, title_matches, MatchPolicy, MatchResult, Rejection};
pub use duration::{duration_matches, DEFAULT_TOLERANCE_SECONDS};
pub use normalize::{normalize, normalize_video_title, NormalizedCandidate};
