//! Architecture triples and pattern matching for target compatibility.

use serde::{Deserialize, Serialize};

use crate::error::{DebToolkitError, Result};

/// Parsed architecture triple `(os, vendor?, processor)`.
///
/// Architectures appear in control files as `os-processor` or
/// `os-vendor-processor`, plus the special one-word forms `all` (package
/// works on every target), `any` (placeholder matching anything), and
/// `src`/`source` (source package).
///
/// Comparison is pattern based: a component equal to `any` matches any
/// value, a missing vendor matches any vendor unless strict vendor matching
/// is requested, and `all` matches every target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    /// Operating system component (e.g. `linux`, `mswindows`, `all`).
    pub os: String,
    /// Optional vendor component (e.g. `m2osw`).
    pub vendor: Option<String>,
    /// Processor component (e.g. `amd64`, `i386`).
    pub processor: String,
}

/// What: Validate one architecture component.
///
/// Inputs:
/// - `component`: Raw component text.
///
/// Output:
/// - Returns `true` when the component is non-empty and made of lowercase
///   letters, digits, `_`, or `+`.
fn valid_component(component: &str) -> bool {
    !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '+')
}

impl Architecture {
    /// What: Parse an architecture string into a triple.
    ///
    /// Inputs:
    /// - `text`: Architecture text from a control file or target record.
    ///
    /// Output:
    /// - Returns the parsed triple, or a `Parse` error for malformed input.
    ///
    /// Details:
    /// - One-word forms `all`, `any`, `src`, and `source` expand to a
    ///   triple with the word in both the os and processor slots.
    /// - `os-processor` leaves the vendor empty; `os-vendor-processor`
    ///   fills all three slots.
    /// - More than three components or an empty component is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if matches!(text, "all" | "any" | "src" | "source") {
            return Ok(Self {
                os: text.to_string(),
                vendor: None,
                processor: text.to_string(),
            });
        }

        let parts: Vec<&str> = text.split('-').collect();
        let (os, vendor, processor) = match parts.as_slice() {
            [os, processor] => ((*os).to_string(), None, (*processor).to_string()),
            [os, vendor, processor] => (
                (*os).to_string(),
                Some((*vendor).to_string()),
                (*processor).to_string(),
            ),
            _ => {
                return Err(DebToolkitError::Parse(format!(
                    "invalid architecture \"{text}\": expected os-processor or os-vendor-processor"
                )));
            }
        };

        if !valid_component(&os)
            || !valid_component(&processor)
            || vendor.as_deref().is_some_and(|v| !valid_component(v))
        {
            return Err(DebToolkitError::Parse(format!(
                "invalid architecture \"{text}\": empty or illegal component"
            )));
        }

        Ok(Self {
            os,
            vendor,
            processor,
        })
    }

    /// What: Check whether this architecture describes a source package.
    ///
    /// Inputs:
    /// - `self`: The architecture to check.
    ///
    /// Output:
    /// - Returns `true` for the `src` and `source` forms.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.os == "src" || self.os == "source"
    }

    /// What: Check whether this architecture is the `all` form.
    ///
    /// Inputs:
    /// - `self`: The architecture to check.
    ///
    /// Output:
    /// - Returns `true` when the package is architecture independent.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.os == "all"
    }

    /// What: Match this architecture against a target architecture.
    ///
    /// Inputs:
    /// - `target`: The architecture of the installation target.
    /// - `strict_vendor`: When `true`, a missing vendor only matches a
    ///   missing vendor; otherwise a missing vendor matches anything.
    ///
    /// Output:
    /// - Returns `true` when a package of this architecture may be
    ///   installed on the target.
    ///
    /// Details:
    /// - `all` on either side matches every target.
    /// - A component equal to `any` matches any value.
    /// - Matching is symmetric when neither side carries a wildcard.
    #[must_use]
    pub fn matches(&self, target: &Self, strict_vendor: bool) -> bool {
        if self.is_all() || target.is_all() {
            return true;
        }
        if !component_matches(&self.os, &target.os)
            || !component_matches(&self.processor, &target.processor)
        {
            return false;
        }
        match (&self.vendor, &target.vendor) {
            (Some(a), Some(b)) => component_matches(a, b),
            (None, None) => true,
            // one side has no vendor
            _ => !strict_vendor,
        }
    }
}

/// What: Match a single architecture component pair.
///
/// Inputs:
/// - `a`, `b`: The two component values.
///
/// Output:
/// - Returns `true` when either side is `any` or both are equal.
fn component_matches(a: &str, b: &str) -> bool {
    a == "any" || b == "any" || a == b
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_all() || self.os == "any" || self.is_source() {
            return write!(f, "{}", self.os);
        }
        match &self.vendor {
            Some(vendor) => write!(f, "{}-{}-{}", self.os, vendor, self.processor),
            None => write!(f, "{}-{}", self.os, self.processor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_two_components() {
        let arch = Architecture::parse("linux-amd64").expect("parse should succeed");
        assert_eq!(arch.os, "linux");
        assert_eq!(arch.vendor, None);
        assert_eq!(arch.processor, "amd64");
    }

    #[test]
    fn parse_three_components() {
        let arch = Architecture::parse("linux-m2osw-amd64").expect("parse should succeed");
        assert_eq!(arch.os, "linux");
        assert_eq!(arch.vendor.as_deref(), Some("m2osw"));
        assert_eq!(arch.processor, "amd64");
    }

    #[test]
    fn parse_special_forms() {
        assert!(Architecture::parse("all").expect("all parses").is_all());
        assert!(Architecture::parse("src").expect("src parses").is_source());
        assert!(
            Architecture::parse("source")
                .expect("source parses")
                .is_source()
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Architecture::parse("linux").is_err());
        assert!(Architecture::parse("linux--amd64").is_err());
        assert!(Architecture::parse("a-b-c-d").is_err());
        assert!(Architecture::parse("Linux-amd64").is_err());
        assert!(Architecture::parse("").is_err());
    }

    #[test]
    fn all_matches_everything() {
        let all = Architecture::parse("all").expect("parse");
        let target = Architecture::parse("linux-amd64").expect("parse");
        assert!(all.matches(&target, false));
        assert!(target.matches(&all, false));
        assert!(all.matches(&target, true));
    }

    #[test]
    fn any_component_matches() {
        let pattern = Architecture::parse("any-amd64").expect("parse");
        let target = Architecture::parse("linux-amd64").expect("parse");
        assert!(pattern.matches(&target, false));

        let pattern = Architecture::parse("linux-any").expect("parse");
        assert!(pattern.matches(&target, false));
    }

    #[test]
    fn mismatch_is_rejected() {
        let a = Architecture::parse("linux-amd64").expect("parse");
        let b = Architecture::parse("mswindows-amd64").expect("parse");
        assert!(!a.matches(&b, false));
        let c = Architecture::parse("linux-i386").expect("parse");
        assert!(!a.matches(&c, false));
    }

    #[test]
    fn matching_is_symmetric_without_wildcards() {
        let a = Architecture::parse("linux-m2osw-amd64").expect("parse");
        let b = Architecture::parse("linux-m2osw-amd64").expect("parse");
        assert_eq!(a.matches(&b, true), b.matches(&a, true));
        let c = Architecture::parse("linux-other-amd64").expect("parse");
        assert_eq!(a.matches(&c, true), c.matches(&a, true));
        assert!(!a.matches(&c, true));
    }

    #[test]
    fn empty_vendor_matches_unless_strict() {
        let no_vendor = Architecture::parse("linux-amd64").expect("parse");
        let with_vendor = Architecture::parse("linux-m2osw-amd64").expect("parse");
        assert!(no_vendor.matches(&with_vendor, false));
        assert!(!no_vendor.matches(&with_vendor, true));
    }

    #[test]
    fn display_round_trip() {
        for text in ["linux-amd64", "linux-m2osw-amd64", "all", "src"] {
            let arch = Architecture::parse(text).expect("parse");
            assert_eq!(arch.to_string(), text);
        }
    }
}
