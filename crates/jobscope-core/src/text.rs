//! Text folding and tokenization shared by filters, keyword search,
//! deduplication keys, and the hash encoder.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase and strip diacritics (`"Télétravail"` → `"teletravail"`).
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split folded text into alphanumeric tokens.
///
/// `+`, `#` and `.` are kept inside a token when they follow an
/// alphanumeric character so that `c++`, `c#` and `node.js` survive.
pub fn tokens(text: &str) -> Vec<String> {
    let folded = fold(text);
    let mut out = Vec::new();
    let mut current = String::new();

    for c in folded.chars() {
        if c.is_alphanumeric() || (!current.is_empty() && matches!(c, '+' | '#' | '.')) {
            current.push(c);
        } else if !current.is_empty() {
            out.push(trim_token(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        out.push(trim_token(current));
    }
    out.retain(|t| !t.is_empty());
    out
}

fn trim_token(mut token: String) -> String {
    while token.ends_with('.') {
        token.pop();
    }
    token
}

/// Number of tokens in `text`.
pub fn token_count(text: &str) -> usize {
    tokens(text).len()
}

/// Canonical form used for exact-match keys: folded tokens joined by one space.
pub fn normalize_key(text: &str) -> String {
    tokens(text).join(" ")
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case- and accent-insensitive substring test.
pub fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    if folded_needle.is_empty() {
        return false;
    }
    fold(haystack).contains(folded_needle)
}
