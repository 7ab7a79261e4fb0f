//! Environment variable configuration for deb-toolkit.
//!
//! This module reads the `WPKG_SUBST` variable: a colon-separated list of
//! `letter=path` entries providing repository URI substitutions of the form
//! `<letter>:<suffix>` -> `<path>/<suffix>`.

use std::collections::BTreeMap;

use crate::error::{DebToolkitError, Result};

/// Characters rejected inside substitution paths: wildcards and quoting
/// metacharacters have no business in a repository location.
const FORBIDDEN_PATH_CHARS: &[char] = &['*', '?', '[', ']', '"', '\'', '`', ';', '|', '&'];

/// What: Parse a `WPKG_SUBST`-style substitution list.
///
/// Inputs:
/// - `text`: Raw variable value, e.g. `r=/var/repo:s=/srv/packages`.
///
/// Output:
/// - Returns the letter-to-path map, or a `Parse` error.
///
/// Details:
/// - Entries are colon separated; empty entries are skipped.
/// - The substitution letter must be a single alphabetic character.
/// - The path must be non-empty and free of wildcard or quoting
///   metacharacters.
/// - A letter defined twice is an error.
pub fn parse_subst(text: &str) -> Result<BTreeMap<char, String>> {
    let mut map = BTreeMap::new();
    for entry in text.split(':') {
        if entry.is_empty() {
            continue;
        }
        let Some((letter_text, path)) = entry.split_once('=') else {
            return Err(DebToolkitError::Parse(format!(
                "invalid WPKG_SUBST entry \"{entry}\": expected letter=path"
            )));
        };
        let mut letters = letter_text.chars();
        let letter = match (letters.next(), letters.next()) {
            (Some(letter), None) if letter.is_ascii_alphabetic() => letter,
            _ => {
                return Err(DebToolkitError::Parse(format!(
                    "invalid WPKG_SUBST letter \"{letter_text}\": \
                     expected a single alphabetic character"
                )));
            }
        };
        if path.is_empty() || path.contains(FORBIDDEN_PATH_CHARS) {
            return Err(DebToolkitError::Parse(format!(
                "invalid WPKG_SUBST path \"{path}\" for letter '{letter}'"
            )));
        }
        if map.insert(letter, path.to_string()).is_some() {
            return Err(DebToolkitError::Parse(format!(
                "WPKG_SUBST letter '{letter}' defined twice"
            )));
        }
    }
    Ok(map)
}

/// What: Read the substitution map from `WPKG_SUBST`.
///
/// Inputs: None
///
/// Output:
/// - Returns the parsed map, empty when the variable is not set, or a
///   `Parse` error for a malformed value.
pub fn env_subst() -> Result<BTreeMap<char, String>> {
    match std::env::var("WPKG_SUBST") {
        Ok(value) if !value.is_empty() => parse_subst(&value),
        _ => Ok(BTreeMap::new()),
    }
}

/// What: Apply path substitutions to a repository URI.
///
/// Inputs:
/// - `uri`: Repository URI, possibly of the form `<letter>:<suffix>`.
/// - `map`: Letter-to-path substitutions.
///
/// Output:
/// - Returns `<path>/<suffix>` when the URI's leading letter is mapped,
///   the URI unchanged otherwise.
///
/// Details:
/// - Only single-letter prefixes are candidates, so `http://...` and
///   `file://...` pass through untouched.
#[must_use]
pub fn substitute_uri(uri: &str, map: &BTreeMap<char, String>) -> String {
    let mut chars = uri.chars();
    if let (Some(letter), Some(':')) = (chars.next(), chars.next())
        && letter.is_ascii_alphabetic()
        && let Some(path) = map.get(&letter)
    {
        let suffix = chars.as_str().trim_start_matches('/');
        return format!("{}/{suffix}", path.trim_end_matches('/'));
    }
    uri.to_string()
}
