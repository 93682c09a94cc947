//! Text folding shared by the matcher and target identity.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Decompose, drop combining marks and lowercase. Punctuation is kept.
pub fn prepare(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Case-fold, strip diacritics and punctuation, collapse whitespace.
///
/// `"RÜFÜS DU SOL"` and `"rufus du sol"` fold to the same string, as do
/// `"CVNT5"` and `"cvnt5"`. Apostrophes are dropped rather than split on so
/// `"Don't"` stays one word.
pub fn fold(text: &str) -> String {
    let cleaned: String = prepare(text)
        .chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
