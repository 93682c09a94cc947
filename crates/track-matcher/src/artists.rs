//! Artist set matching.

use crate::normalize::split_artists;
use std::collections::BTreeSet;

/// True when `needle` occurs as a contiguous run of words in `haystack`.
fn contains_run(haystack: &[String], needle: &[&str]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack
            .windows(needle.len())
            .any(|window| window.iter().zip(needle).all(|(a, b)| a == b))
}

/// Whether one folded artist name is credited by the candidate.
///
/// Only credits count: the byline and any "feat." clause. A name that shows
/// up in the track title text ("Jolene Dolly Parton Cover") is not a credit.
/// Matching is on whole words: "magic" is not found in "slowmagic", and the
/// words of a multi-word name must appear together.
fn artist_present(name: &str, artist_tokens: &BTreeSet<String>) -> bool {
    if artist_tokens.contains(name) {
        return true;
    }

    // A multi-word name may sit inside a longer credit, e.g. "slow magic official"
    let words: Vec<&str> = name.split(' ').collect();
    words.len() > 1
        && artist_tokens.iter().any(|token| {
            let token_words: Vec<String> = token.split(' ').map(str::to_string).collect();
            contains_run(&token_words, &words)
        })
}

/// Required artists that the candidate does not credit, in input order.
///
/// Each required entry is split on the usual credit separators first, so
/// "Simon & Garfunkel" requires both names. An entry that folds to nothing
/// cannot be verified and is reported missing.
pub fn missing_artists(required: &[String], artist_tokens: &BTreeSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|raw| {
            let names = split_artists(raw);
            names.is_empty()
                || !names
                    .iter()
                    .all(|name| artist_present(name, artist_tokens))
        })
        .cloned()
        .collect()
}

/// Every required artist is credited in the candidate's artist tokens.
pub fn artists_match(required: &[String], artist_tokens: &BTreeSet<String>) -> bool {
    missing_artists(required, artist_tokens).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, normalize_video_title};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_artists_in_byline_and_feat() {
        let n = normalize_video_title("Slow Magic - Breathless (feat. Runn) [Official Audio]");
        assert!(artists_match(&strings(&["Slow Magic", "RUNN"]), &n.artist_tokens));
    }

    #[test]
    fn test_missing_artist_is_reported() {
        let n = normalize_video_title("Gareth Emery & Ashley Wallbridge - CVNT5 Of The Caribbean");
        let required = strings(&["Gareth Emery", "Ashley Wallbridge", "Omnia"]);

        assert!(!artists_match(&required, &n.artist_tokens));
        assert_eq!(missing_artists(&required, &n.artist_tokens), strings(&["Omnia"]));
    }

    #[test]
    fn test_diacritics_and_case_are_ignored() {
        let n = normalize_video_title("Rufus Du Sol - Innerbloom");
        assert!(artists_match(&strings(&["RÜFÜS DU SOL"]), &n.artist_tokens));
    }

    #[test]
    fn test_artist_in_title_text_is_not_a_credit() {
        let n = normalize_video_title("Slow Magic Breathless (feat. RUNN)");
        assert_eq!(
            missing_artists(&strings(&["Slow Magic", "Runn"]), &n.artist_tokens),
            strings(&["Slow Magic"])
        );
    }

    #[test]
    fn test_cover_naming_the_original_artist_is_rejected() {
        let n = normalize_video_title("Miley Cyrus - Jolene Dolly Parton Cover");
        assert_eq!(n.title_tokens, strings(&["jolene", "dolly", "parton", "cover"]));
        assert!(!artists_match(&strings(&["Dolly Parton"]), &n.artist_tokens));
    }

    #[test]
    fn test_partial_word_does_not_match() {
        let n = normalize("Breathless", "SlowMagic");
        assert!(!artists_match(&strings(&["Magic"]), &n.artist_tokens));

        let n = normalize("Magical Night", "");
        assert!(!artists_match(&strings(&["Magic"]), &n.artist_tokens));
    }

    #[test]
    fn test_single_word_inside_longer_credit_does_not_match() {
        let n = normalize("Breathless", "Slow Magic");
        assert!(!artists_match(&strings(&["Magic"]), &n.artist_tokens));
    }

    #[test]
    fn test_multi_word_name_inside_channel_credit() {
        let n = normalize("Breathless", "Slow Magic Official");
        assert!(artists_match(&strings(&["Slow Magic"]), &n.artist_tokens));
    }

    #[test]
    fn test_compound_required_entry() {
        let n = normalize("The Boxer", "Simon & Garfunkel");
        assert!(artists_match(&strings(&["Simon & Garfunkel"]), &n.artist_tokens));

        let solo = normalize("The Boxer", "Simon");
        assert!(!artists_match(
            &strings(&["Simon & Garfunkel"]),
            &solo.artist_tokens
        ));
    }

    #[test]
    fn test_unverifiable_artist_is_missing() {
        let n = normalize("Song", "!!!");
        assert_eq!(
            missing_artists(&strings(&["!!!"]), &n.artist_tokens),
            strings(&["!!!"])
        );
    }

    #[test]
    fn test_no_required_artists() {
        let n = normalize("Song", "");
        assert!(artists_match(&[], &n.artist_tokens));
    }
}
