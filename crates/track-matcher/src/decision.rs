//! The candidate match decision.
//!
//! A hard boolean gate over three checks: the target's name must appear in
//! the candidate title, every required artist must be credited, and the
//! durations must agree within the tolerance. Checks run in that order and
//! the first failure decides the rejection reason.

use crate::artists::missing_artists;
use crate::duration::{duration_difference, DEFAULT_TOLERANCE_SECONDS};
use crate::normalize::{normalize_video_title, title_tokens, NormalizedCandidate};
use serde::Serialize;
use shared::{CandidateVideo, TargetTrack};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Why a candidate was turned down
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The target name is not a subsequence of the candidate title
    TitleMismatch,
    /// Required artists the candidate does not credit
    MissingArtists(Vec<String>),
    /// Durations differ by more than the tolerance
    DurationOutOfRange { difference: u32, tolerance: u32 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TitleMismatch => write!(f, "title does not contain the track name"),
            Rejection::MissingArtists(names) => write!(f, "missing artists: {}", names.join(", ")),
            Rejection::DurationOutOfRange {
                difference,
                tolerance,
            } => write!(f, "duration differs by {}s (tolerance {}s)", difference, tolerance),
        }
    }
}

/// Outcome of evaluating one candidate, with the normalized forms used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub is_match: bool,
    pub rejection: Option<Rejection>,
    /// Normalized target name
    pub target_tokens: Vec<String>,
    /// Normalized candidate title
    pub title_tokens: Vec<String>,
    /// Normalized candidate artist set
    pub artist_tokens: BTreeSet<String>,
}

/// `needle` appears in `haystack` in order, gaps allowed. Empty never matches.
pub fn title_matches(needle: &[String], haystack: &[String]) -> bool {
    if needle.is_empty() {
        return false;
    }

    let mut remaining = haystack.iter();
    needle.iter().all(|word| remaining.any(|candidate| candidate == word))
}

/// Matching policy; only the duration tolerance is tunable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub tolerance_seconds: u32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }
}

impl MatchPolicy {
    pub fn new(tolerance_seconds: u32) -> Self {
        Self { tolerance_seconds }
    }

    /// Evaluate a candidate, keeping the normalized inputs for diagnosis.
    pub fn evaluate(&self, target: &TargetTrack, candidate: &CandidateVideo) -> MatchResult {
        let target_tokens = title_tokens(&target.name);
        let NormalizedCandidate {
            title_tokens,
            artist_tokens,
        } = normalize_video_title(&candidate.title);

        let rejection = if !title_matches(&target_tokens, &title_tokens) {
            Some(Rejection::TitleMismatch)
        } else {
            let missing = missing_artists(&target.artist_names, &artist_tokens);
            if !missing.is_empty() {
                Some(Rejection::MissingArtists(missing))
            } else {
                let difference =
                    duration_difference(target.length_seconds, candidate.duration_seconds);
                (difference > self.tolerance_seconds).then_some(Rejection::DurationOutOfRange {
                    difference,
                    tolerance: self.tolerance_seconds,
                })
            }
        };

        if let Some(reason) = &rejection {
            debug!(
                target = %target.name,
                candidate = %candidate.title,
                source_id = %candidate.source_id,
                reason = %reason,
                "Candidate rejected"
            );
        }

        MatchResult {
            is_match: rejection.is_none(),
            rejection,
            target_tokens,
            title_tokens,
            artist_tokens,
        }
    }

    pub fn is_valid_match(&self, target: &TargetTrack, candidate: &CandidateVideo) -> bool {
        self.evaluate(target, candidate).is_match
    }
}

/// Match decision under the default tolerance
pub fn is_valid_match(target: &TargetTrack, candidate: &CandidateVideo) -> bool {
    MatchPolicy::default().is_valid_match(target, candidate)
}
