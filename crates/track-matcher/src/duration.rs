//! Duration tolerance check.

pub use shared::config::DEFAULT_TOLERANCE_SECONDS;

/// Absolute difference between two lengths in seconds
pub fn duration_difference(target_seconds: u32, candidate_seconds: u32) -> u32 {
    target_seconds.abs_diff(candidate_seconds)
}

/// `|target - candidate| <= tolerance`, inclusive at the boundary.
pub fn duration_matches(target_seconds: u32, candidate_seconds: u32, tolerance_seconds: u32) -> bool {
    duration_difference(target_seconds, candidate_seconds) <= tolerance_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_inclusive() {
        assert!(duration_matches(219, 214, DEFAULT_TOLERANCE_SECONDS));
        assert!(duration_matches(219, 224, DEFAULT_TOLERANCE_SECONDS));
        assert!(!duration_matches(219, 213, DEFAULT_TOLERANCE_SECONDS));
        assert!(!duration_matches(219, 225, DEFAULT_TOLERANCE_SECONDS));
    }

    #[test]
    fn test_zero_tolerance() {
        assert!(duration_matches(200, 200, 0));
        assert!(!duration_matches(200, 201, 0));
    }

    #[test]
    fn test_difference_is_symmetric() {
        assert_eq!(duration_difference(245, 231), 14);
        assert_eq!(duration_difference(231, 245), 14);
        assert_eq!(duration_difference(0, u32::MAX), u32::MAX);
    }

    #[test]
    fn test_wider_tolerance_never_rejects_more() {
        for candidate in 180..260 {
            for tolerance in 0..30 {
                if duration_matches(219, candidate, tolerance) {
                    assert!(duration_matches(219, candidate, tolerance + 1));
                }
            }
        }
    }
}
