//! Title and artist normalization.
//!
//! Raw strings from the external catalog are folded into comparable tokens:
//! diacritics and case are removed, bracketed noise ("[Official Audio]") is
//! dropped, and "feat." clauses are moved from the title into the artist set.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
pub use shared::text::fold;
use shared::text::prepare;
use std::collections::BTreeSet;

/// A bracketed segment: (...), [...] or {...}
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[(\[{]([^)\]}]*)[)\]}]").expect("bracket pattern"));

/// Contents of a bracketed featuring clause, e.g. "feat. Runn"
static FEAT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:featuring|feat|ft)(?:[^\p{L}\p{N}]+)(.+)$").expect("feat clause pattern")
});

/// A featuring clause outside brackets; everything after it is artists.
/// At least one word must precede it, so "Ft. Lauderdale" stays a title.
static TRAILING_FEAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}][^\p{L}\p{N}]*?([^\p{L}\p{N}](?:featuring|feat|ft)[^\p{L}\p{N}]+(.+))$")
        .expect("trailing feat pattern")
});

/// Separators between artists in a credit line
static ARTIST_SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*[,&/+;]\s*|\s+(?:and|x|vs\.?|with)\s+").expect("artist separator pattern")
});

/// Separator between "Artist - Title" in a video title
static BYLINE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–—]\s+").expect("byline separator pattern"));

/// Comparable form of a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedCandidate {
    /// Title words in order (the track name must appear as a subsequence)
    pub title_tokens: Vec<String>,
    /// One entry per credited artist, e.g. "slow magic"
    pub artist_tokens: BTreeSet<String>,
}

/// Title with noise removed and featured artists pulled out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CleanTitle {
    text: String,
    featured: Vec<String>,
}

/// Folded words of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    fold(text).split(' ').filter(|w| !w.is_empty()).map(str::to_string).collect()
}

/// Strip bracketed segments, keeping the contents of featuring clauses.
fn clean_title(raw: &str) -> CleanTitle {
    let prepared = prepare(raw);
    let mut featured = Vec::new();

    for segment in BRACKETED.captures_iter(&prepared) {
        if let Some(artists) = FEAT_CLAUSE.captures(&segment[1]).and_then(|c| c.get(1)) {
            featured.push(artists.as_str().to_string());
        }
    }

    let mut text = BRACKETED.replace_all(&prepared, " ").trim().to_string();

    if let Some(clause) = TRAILING_FEAT.captures(&text) {
        if let (Some(whole), Some(artists)) = (clause.get(1), clause.get(2)) {
            featured.push(artists.as_str().to_string());
            text = text[..whole.start()].trim().to_string();
        }
    }

    CleanTitle { text, featured }
}

/// Split a credit line into folded artist names, in order, without duplicates.
///
/// `"Gareth Emery & Ashley Wallbridge"` gives `["gareth emery", "ashley wallbridge"]`.
/// A "feat." clause inside the line contributes its artists too.
pub fn split_artists(raw: &str) -> Vec<String> {
    let clean = clean_title(raw);
    let mut names = Vec::new();

    let parts = std::iter::once(clean.text.as_str()).chain(clean.featured.iter().map(String::as_str));
    for part in parts {
        for piece in ARTIST_SEPARATORS.split(part) {
            let name = fold(piece);
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }

    names
}

/// Folded words of a track name, without bracketed noise or featuring clauses.
pub fn title_tokens(raw_title: &str) -> Vec<String> {
    tokenize(&clean_title(raw_title).text)
}

/// Normalize a raw title and a raw artist credit line.
///
/// Never fails: empty or whitespace-only input gives empty token sets.
pub fn normalize(raw_title: &str, raw_artists: &str) -> NormalizedCandidate {
    let title = clean_title(raw_title);

    let mut artist_tokens: BTreeSet<String> = split_artists(raw_artists).into_iter().collect();
    for clause in &title.featured {
        artist_tokens.extend(split_artists(clause));
    }

    NormalizedCandidate {
        title_tokens: tokenize(&title.text),
        artist_tokens,
    }
}

/// Split "Artist - Title" on the first dash separator.
pub fn split_byline(full_title: &str) -> (Option<&str>, &str) {
    match BYLINE_SEPARATOR.find(full_title) {
        Some(sep) => (Some(&full_title[..sep.start()]), &full_title[sep.end()..]),
        None => (None, full_title),
    }
}

/// Normalize a video title of the usual "Artist - Title (feat. X) [noise]" shape.
pub fn normalize_video_title(full_title: &str) -> NormalizedCandidate {
    let (byline, track) = split_byline(full_title);
    normalize(track, byline.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_byline() {
        assert_eq!(
            split_byline("Slow Magic - Breathless (feat. Runn)"),
            (Some("Slow Magic"), "Breathless (feat. Runn)")
        );
        assert_eq!(split_byline("Artist – Song – Live"), (Some("Artist"), "Song – Live"));
        assert_eq!(split_byline("Jay-Z Song"), (None, "Jay-Z Song"));
    }

    #[test]
    fn test_normalize_feat_in_brackets() {
        let n = normalize("Breathless (feat. Runn) [Official Audio]", "Slow Magic");
        assert_eq!(n.title_tokens, strings(&["breathless"]));
        assert_eq!(n.artist_tokens, set(&["runn", "slow magic"]));
    }

    #[test]
    fn test_normalize_feat_variants() {
        for title in [
            "Breathless (ft. RUNN)",
            "Breathless [featuring Runn]",
            "Breathless feat. Runn",
            "Breathless ft Runn",
            "Breathless (Feat Runn) (Lyric Video)",
        ] {
            let n = normalize(title, "Slow Magic");
            assert_eq!(n.title_tokens, strings(&["breathless"]), "{}", title);
            assert!(n.artist_tokens.contains("runn"), "{}", title);
        }
    }

    #[test]
    fn test_feat_word_inside_title_is_kept() {
        let n = normalize("Left Feet Dancing", "");
        assert_eq!(n.title_tokens, strings(&["left", "feet", "dancing"]));
        assert!(n.artist_tokens.is_empty());
    }

    #[test]
    fn test_leading_feat_word_is_part_of_the_title() {
        assert_eq!(title_tokens("Ft. Lauderdale"), strings(&["ft", "lauderdale"]));
        assert_eq!(title_tokens("Feat of Strength"), strings(&["feat", "of", "strength"]));

        let n = normalize("Ft. Lauderdale feat. Runn", "Slow Magic");
        assert_eq!(n.title_tokens, strings(&["ft", "lauderdale"]));
        assert_eq!(n.artist_tokens, set(&["runn", "slow magic"]));
    }

    #[test]
    fn test_split_artists_separators() {
        assert_eq!(
            split_artists("Gareth Emery, Ashley Wallbridge & CVNT5"),
            strings(&["gareth emery", "ashley wallbridge", "cvnt5"])
        );
        assert_eq!(split_artists("Slow Magic x RUNN"), strings(&["slow magic", "runn"]));
        assert_eq!(split_artists("Slow Magic / RUNN"), strings(&["slow magic", "runn"]));
        assert_eq!(
            split_artists("Florence and the Machine"),
            strings(&["florence", "the machine"])
        );
        assert_eq!(split_artists("Slow Magic feat. RUNN"), strings(&["slow magic", "runn"]));
        assert_eq!(split_artists("RUNN & runn"), strings(&["runn"]));
    }

    #[test]
    fn test_x_inside_name_is_not_a_separator() {
        assert_eq!(split_artists("Charli XCX"), strings(&["charli xcx"]));
        assert_eq!(split_artists("Xavier Rudd"), strings(&["xavier rudd"]));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize("", ""), NormalizedCandidate::default());
        assert_eq!(normalize("   ", " \n "), NormalizedCandidate::default());
        assert_eq!(normalize("[]", "()"), NormalizedCandidate::default());
    }

    #[test]
    fn test_normalize_video_title() {
        let n = normalize_video_title("Slow Magic - Breathless (feat. Runn) [Official Audio]");
        assert_eq!(n.title_tokens, strings(&["breathless"]));
        assert_eq!(n.artist_tokens, set(&["runn", "slow magic"]));

        let bare = normalize_video_title("Breathless");
        assert_eq!(bare.title_tokens, strings(&["breathless"]));
        assert!(bare.artist_tokens.is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            ("Breathless (feat. Runn) [Official Audio]", "Slow Magic"),
            ("CVNT5 Of The Caribbean", "Gareth Emery & Ashley Wallbridge"),
            ("Song ft-Remix", "A"),
            ("Song feat (Live)", "B / C"),
            ("Ünïcödé — Tïtle", "Sigur Rós"),
            ("", ""),
        ];

        for (title, artists) in inputs {
            let once = normalize(title, artists);
            let joined_artists = once.artist_tokens.iter().cloned().collect::<Vec<_>>().join(", ");
            let twice = normalize(&once.title_tokens.join(" "), &joined_artists);
            assert_eq!(once, twice, "{} / {}", title, artists);

            assert_eq!(fold(&fold(title)), fold(title));
        }
    }

    #[test]
    fn test_title_tokens() {
        assert_eq!(
            title_tokens("CVNT5 Of The Caribbean (Extended Mix)"),
            strings(&["cvnt5", "of", "the", "caribbean"])
        );
        assert!(title_tokens("(Official Video)").is_empty());
    }
}
