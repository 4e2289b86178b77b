use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lookup key for player and team names
/// - Strips diacritics via Unicode NFD decomposition
/// - Lowercases
/// - Treats whitespace, dots, hyphens and apostrophes as word separators
/// - Collapses separators to a single space and trims both ends
///
/// "MS  Dhoni" and "ms dhoni" share the key "ms dhoni", so stored names and
/// typed queries can be compared directly.
pub fn name_key(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.nfd() {
        if is_combining_mark(ch) {
            continue;
        }

        if ch.is_alphanumeric() {
            if pending_space && !result.is_empty() {
                result.push(' ');
            }
            pending_space = false;
            result.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || matches!(ch, '.' | '-' | '\'' | '_') {
            pending_space = true;
        }
        // Everything else is dropped
    }

    result
}

/// True when two names resolve to the same lookup key
pub fn same_name(a: &str, b: &str) -> bool {
    name_key(a) == name_key(b)
}
