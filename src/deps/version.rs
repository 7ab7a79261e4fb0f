//! Debian-style version parsing and comparison.
//!
//! Versions have the shape `[epoch:]upstream[-revision]`. Ordering is by
//! epoch first, then the upstream segment, then the revision segment.
//! Within a segment, runs of digits compare numerically and runs of
//! non-digits compare lexicographically with `~` (tilde) sorting before
//! everything, including the empty string.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{DebToolkitError, Result};
use crate::types::dependency::DepOperator;

/// Parsed Debian-style version `[epoch:]upstream[-revision]`.
///
/// The parsed form keeps the three pieces separate so equality and ordering
/// follow packaging semantics instead of raw string comparison: `1.0` and
/// `0:1.0-` order the same even though the strings differ.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebVersion {
    /// Epoch, defaulting to 0 when absent.
    pub epoch: u32,
    /// Upstream version segment.
    pub upstream: String,
    /// Debian revision segment (empty when absent).
    pub revision: String,
}

impl DebVersion {
    /// What: Parse and validate a version string.
    ///
    /// Inputs:
    /// - `text`: Raw version text from a control file or filename.
    ///
    /// Output:
    /// - Returns the parsed version, or a `Parse` error for malformed input.
    ///
    /// Details:
    /// - The epoch is everything before the first `:` and must be numeric.
    /// - The revision is everything after the last `-`.
    /// - Both upstream and revision accept alphanumerics plus `.+~`; the
    ///   upstream additionally accepts embedded `-`.
    /// - An empty upstream segment is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DebToolkitError::Parse("empty version string".to_string()));
        }

        let (epoch, rest) = match text.split_once(':') {
            Some((epoch_text, rest)) => {
                let epoch = epoch_text.parse::<u32>().map_err(|_| {
                    DebToolkitError::Parse(format!(
                        "invalid epoch \"{epoch_text}\" in version \"{text}\""
                    ))
                })?;
                (epoch, rest)
            }
            None => (0, text),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, revision),
            None => (rest, ""),
        };

        if upstream.is_empty() {
            return Err(DebToolkitError::Parse(format!(
                "empty upstream segment in version \"{text}\""
            )));
        }
        let segment_ok = |segment: &str, allow_dash: bool| {
            segment.chars().all(|c| {
                c.is_ascii_alphanumeric() || c == '.' || c == '+' || c == '~' || (allow_dash && c == '-')
            })
        };
        if !segment_ok(upstream, true) || !segment_ok(revision, false) {
            return Err(DebToolkitError::Parse(format!(
                "illegal character in version \"{text}\""
            )));
        }

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision: revision.to_string(),
        })
    }
}

impl std::fmt::Display for DebVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if !self.revision.is_empty() {
            write!(f, "-{}", self.revision)?;
        }
        Ok(())
    }
}

impl PartialEq for DebVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DebVersion {}

impl PartialOrd for DebVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DebVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| segment_cmp(&self.upstream, &other.upstream))
            .then_with(|| segment_cmp(&self.revision, &other.revision))
    }
}

/// What: Rank a non-digit character for segment comparison.
///
/// Inputs:
/// - `c`: The character to rank, or `None` at end of input.
///
/// Output:
/// - Returns a sort key where `~` orders before end-of-string, letters
///   order before every other character, and the rest order by code point.
fn char_order(c: Option<char>) -> i32 {
    match c {
        Some('~') => -1,
        None => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c as u8),
        Some(c) => i32::from(c as u8) + 256,
    }
}

/// What: Compare two version segments.
///
/// Inputs:
/// - `a`, `b`: The two segments (upstream or revision).
///
/// Output:
/// - Returns the ordering between `a` and `b`.
///
/// Details:
/// - Alternates between a non-digit pass (character ranks via
///   `char_order`, so `~` sorts before the empty string) and a digit pass
///   (leading zeros stripped, longer run of digits wins, equal lengths
///   compare lexically which equals numeric comparison).
fn segment_cmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut i = 0;
    let mut j = 0;

    while i < a.len() || j < b.len() {
        // non-digit pass
        loop {
            let ac = a.get(i).copied().filter(|c| !c.is_ascii_digit());
            let bc = b.get(j).copied().filter(|c| !c.is_ascii_digit());
            if ac.is_none() && bc.is_none() {
                // both sides stopped at a digit or at the end
                break;
            }
            // a digit ranks like end-of-string here: the digit pass below
            // takes over as soon as both sides reach one
            let order_a = char_order(ac);
            let order_b = char_order(bc);
            match order_a.cmp(&order_b) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                other => return other,
            }
        }

        // digit pass: skip leading zeros
        while a.get(i) == Some(&'0') {
            i += 1;
        }
        while b.get(j) == Some(&'0') {
            j += 1;
        }
        let start_a = i;
        let start_b = j;
        while a.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        while b.get(j).is_some_and(char::is_ascii_digit) {
            j += 1;
        }
        let run_a = &a[start_a..i];
        let run_b = &b[start_b..j];
        match run_a.len().cmp(&run_b.len()) {
            Ordering::Equal => match run_a.cmp(run_b) {
                Ordering::Equal => {}
                other => return other,
            },
            other => return other,
        }
    }

    Ordering::Equal
}

/// What: Compare two version strings with Debian ordering.
///
/// Inputs:
/// - `a`: Left-hand version string.
/// - `b`: Right-hand version string.
///
/// Output:
/// - Returns `Ordering::Less`, `Ordering::Equal`, or `Ordering::Greater`.
///
/// Details:
/// - Unparsable strings fall back to a raw segment comparison of the whole
///   text so the function stays total; validated inputs never hit that
///   path.
/// - The comparison is a total preorder: antisymmetric, transitive, and
///   reflexive (`versioncmp(a, a) == Equal`).
///
/// # Example
///
/// ```
/// use deb_toolkit::deps::versioncmp;
/// use std::cmp::Ordering;
///
/// assert_eq!(versioncmp("1.2.3", "1.2.4"), Ordering::Less);
/// assert_eq!(versioncmp("1.0", "1.0-1"), Ordering::Less);
/// assert_eq!(versioncmp("1.0~rc1", "1.0"), Ordering::Less);
/// assert_eq!(versioncmp("2:0.9", "1.9"), Ordering::Greater);
/// ```
#[must_use]
pub fn versioncmp(a: &str, b: &str) -> Ordering {
    match (DebVersion::parse(a), DebVersion::parse(b)) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => segment_cmp(a, b),
    }
}

/// What: Check whether a version satisfies an operator constraint.
///
/// Inputs:
/// - `version`: The candidate version string.
/// - `operator`: The constraint operator.
/// - `target`: The constraint's version string.
///
/// Output:
/// - Returns `true` when the candidate satisfies `operator target`.
///
/// Details:
/// - `DepOperator::Any` always matches regardless of `target`.
///
/// # Example
///
/// ```
/// use deb_toolkit::deps::version_satisfies;
/// use deb_toolkit::types::DepOperator;
///
/// assert!(version_satisfies("2.0", DepOperator::Ge, "1.5"));
/// assert!(!version_satisfies("1.0", DepOperator::Gt, "1.0"));
/// assert!(version_satisfies("1.0", DepOperator::Any, ""));
/// ```
#[must_use]
pub fn version_satisfies(version: &str, operator: DepOperator, target: &str) -> bool {
    let cmp = match operator {
        DepOperator::Any => return true,
        _ => versioncmp(version, target),
    };
    match operator {
        DepOperator::Any => true,
        DepOperator::Lt => cmp == Ordering::Less,
        DepOperator::Le => cmp != Ordering::Greater,
        DepOperator::Eq => cmp == Ordering::Equal,
        DepOperator::Ne => cmp != Ordering::Equal,
        DepOperator::Ge => cmp != Ordering::Less,
        DepOperator::Gt => cmp == Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let v = DebVersion::parse("1.2.3").expect("parse should succeed");
        assert_eq!(v.epoch, 0);
        assert_eq!(v.upstream, "1.2.3");
        assert_eq!(v.revision, "");
    }

    #[test]
    fn parse_epoch_and_revision() {
        let v = DebVersion::parse("2:1.2.3-4sp1").expect("parse should succeed");
        assert_eq!(v.epoch, 2);
        assert_eq!(v.upstream, "1.2.3");
        assert_eq!(v.revision, "4sp1");
    }

    #[test]
    fn parse_revision_splits_on_last_dash() {
        let v = DebVersion::parse("1.2-rc1-3").expect("parse should succeed");
        assert_eq!(v.upstream, "1.2-rc1");
        assert_eq!(v.revision, "3");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(DebVersion::parse("").is_err());
        assert!(DebVersion::parse("a:1.0").is_err());
        assert!(DebVersion::parse("-1").is_err());
        assert!(DebVersion::parse("1.0 beta").is_err());
    }

    #[test]
    fn placeholder_version_parses() {
        // used for synthetic reject records
        let v = DebVersion::parse("0.0.0.1").expect("parse should succeed");
        assert_eq!(v.upstream, "0.0.0.1");
    }

    #[test]
    fn basic_numeric_ordering() {
        assert_eq!(versioncmp("1.0.0", "1.0.1"), Ordering::Less);
        assert_eq!(versioncmp("1.0.1", "1.0.0"), Ordering::Greater);
        assert_eq!(versioncmp("2.0.0", "1.9.9"), Ordering::Greater);
        assert_eq!(versioncmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(versioncmp("010", "10"), Ordering::Equal);
    }

    #[test]
    fn epoch_dominates() {
        assert_eq!(versioncmp("1:0.1", "2.0"), Ordering::Greater);
        assert_eq!(versioncmp("0:2.0", "2.0"), Ordering::Equal);
    }

    #[test]
    fn revision_breaks_ties() {
        assert_eq!(versioncmp("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(versioncmp("1.0", "1.0-1"), Ordering::Less);
        assert_eq!(versioncmp("1.0-1", "1.0-1"), Ordering::Equal);
    }

    #[test]
    fn tilde_sorts_before_everything() {
        assert_eq!(versioncmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(versioncmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(versioncmp("1.0~~", "1.0~"), Ordering::Less);
        assert_eq!(versioncmp("1.0", "1.0+b1"), Ordering::Less);
    }

    #[test]
    fn letters_sort_before_other_characters() {
        assert_eq!(versioncmp("1.0a", "1.0+"), Ordering::Less);
        assert_eq!(versioncmp("1.0alpha", "1.0beta"), Ordering::Less);
    }

    #[test]
    fn reflexive_for_all_samples() {
        for v in ["1.0", "2:3.4-5", "1.0~rc1", "0.0.0.1", "1.51"] {
            assert_eq!(versioncmp(v, v), Ordering::Equal, "versioncmp({v}, {v})");
        }
    }

    #[test]
    fn antisymmetric_on_samples() {
        let samples = ["0.9", "1.0~rc1", "1.0", "1.0-1", "1.0-2", "1.1", "2:0.1"];
        for a in samples {
            for b in samples {
                let forward = versioncmp(a, b);
                let backward = versioncmp(b, a);
                assert_eq!(forward, backward.reverse(), "({a}, {b})");
            }
        }
    }

    #[test]
    fn transitive_on_sorted_chain() {
        // the chain is strictly increasing; every pair must agree
        let chain = ["1.0~~", "1.0~rc1", "1.0", "1.0-1", "1.0.1", "1.51", "2.0", "1:0.1"];
        for (i, a) in chain.iter().enumerate() {
            for b in &chain[i + 1..] {
                assert_eq!(versioncmp(a, b), Ordering::Less, "({a}, {b})");
            }
        }
    }

    #[test]
    fn satisfies_operators() {
        assert!(version_satisfies("1.5", DepOperator::Ge, "1.5"));
        assert!(version_satisfies("1.6", DepOperator::Ge, "1.5"));
        assert!(!version_satisfies("1.4", DepOperator::Ge, "1.5"));
        assert!(version_satisfies("1.4", DepOperator::Lt, "1.5"));
        assert!(!version_satisfies("1.5", DepOperator::Lt, "1.5"));
        assert!(version_satisfies("1.5", DepOperator::Le, "1.5"));
        assert!(version_satisfies("1.5", DepOperator::Eq, "1.5"));
        assert!(!version_satisfies("1.5.1", DepOperator::Eq, "1.5"));
        assert!(version_satisfies("1.6", DepOperator::Gt, "1.5"));
        assert!(version_satisfies("1.6", DepOperator::Ne, "1.5"));
        assert!(!version_satisfies("1.5", DepOperator::Ne, "1.5"));
    }

    #[test]
    fn satisfies_any_ignores_target() {
        assert!(version_satisfies("1.0", DepOperator::Any, ""));
        assert!(version_satisfies("garbage", DepOperator::Any, "also garbage"));
    }
}
