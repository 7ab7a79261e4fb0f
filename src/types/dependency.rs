//! Dependency data types: operators, tuples, alternatives, and fields.
//!
//! A dependency *field* (`Depends`, `Pre-Depends`, `Conflicts`, `Breaks`,
//! `Built-Using`) is a comma-separated conjunction of *terms*; each term is
//! a pipe-separated disjunction of *tuples*; each tuple names one package
//! with an optional version constraint and optional architecture
//! qualifiers: `libfoo (>= 1.2) [linux-amd64 !mswindows-i386]`.

use serde::{Deserialize, Serialize};

use crate::error::{DebToolkitError, Result};

// === Enums ===

/// Version constraint operator of a dependency tuple.
///
/// The operator set in control files is `<<, <=, =, >=, >>`. The `!=`
/// operator is accepted in queries but forbidden in control files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepOperator {
    /// No version constraint.
    #[default]
    Any,
    /// Strictly less (`<<`).
    Lt,
    /// Less or equal (`<=`).
    Le,
    /// Exactly equal (`=`).
    Eq,
    /// Not equal (`!=`, queries only).
    Ne,
    /// Greater or equal (`>=`).
    Ge,
    /// Strictly greater (`>>`).
    Gt,
}

impl DepOperator {
    /// What: Return the operator's control-file spelling.
    ///
    /// Inputs:
    /// - `self`: The operator to render.
    ///
    /// Output:
    /// - Returns the canonical text, empty for `Any`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Lt => "<<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Gt => ">>",
        }
    }
}

// === Core structs ===

/// One architecture qualifier attached to a dependency tuple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchQualifier {
    /// When `true` the qualifier excludes the named architecture.
    pub negated: bool,
    /// Architecture text as written (matched via `Architecture::parse`).
    pub architecture: String,
}

/// A single dependency tuple `(name, operator, version, qualifiers)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the depended-upon package.
    pub name: String,
    /// Version constraint operator (`Any` when unconstrained).
    pub operator: DepOperator,
    /// Constraint version text (empty when unconstrained).
    pub version: String,
    /// Architecture qualifiers restricting where the tuple applies.
    pub architectures: Vec<ArchQualifier>,
}

impl Dependency {
    /// What: Create an unconstrained dependency on a package name.
    ///
    /// Inputs:
    /// - `name`: Package name (converted to `String`).
    ///
    /// Output:
    /// - Returns a tuple with no version constraint or qualifiers.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// What: Create a version-constrained dependency.
    ///
    /// Inputs:
    /// - `name`: Package name.
    /// - `operator`: Constraint operator.
    /// - `version`: Constraint version text.
    ///
    /// Output:
    /// - Returns the constrained tuple with no qualifiers.
    #[must_use]
    pub fn with_version(
        name: impl Into<String>,
        operator: DepOperator,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            operator,
            version: version.into(),
            architectures: Vec::new(),
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if self.operator != DepOperator::Any {
            write!(f, " ({} {})", self.operator.as_str(), self.version)?;
        }
        if !self.architectures.is_empty() {
            write!(f, " [")?;
            for (i, qualifier) in self.architectures.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                if qualifier.negated {
                    write!(f, "!")?;
                }
                write!(f, "{}", qualifier.architecture)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// One dependency line: a disjunction of alternative tuples.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTerm {
    /// The pipe-separated alternatives; satisfying any one satisfies the
    /// term.
    pub alternatives: Vec<Dependency>,
}

/// A full dependency field: a conjunction of terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyList {
    /// The comma-separated terms; every term must be satisfied.
    pub terms: Vec<DependencyTerm>,
}

impl DependencyList {
    /// What: Parse a dependency field from a control file.
    ///
    /// Inputs:
    /// - `text`: The raw field value.
    ///
    /// Output:
    /// - Returns the parsed list, or a `Parse` error.
    ///
    /// Details:
    /// - The `!=` operator is forbidden here; use `parse_query` for query
    ///   expressions where it is legal.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_inner(text, false)
    }

    /// What: Parse a dependency expression from a query.
    ///
    /// Inputs:
    /// - `text`: The raw expression.
    ///
    /// Output:
    /// - Returns the parsed list; `!=` is accepted.
    pub fn parse_query(text: &str) -> Result<Self> {
        Self::parse_inner(text, true)
    }

    fn parse_inner(text: &str, allow_not_equal: bool) -> Result<Self> {
        let mut terms = Vec::new();
        for term_text in text.split(',') {
            let term_text = term_text.trim();
            if term_text.is_empty() {
                continue;
            }
            let mut alternatives = Vec::new();
            for alt_text in term_text.split('|') {
                alternatives.push(parse_tuple(alt_text.trim(), allow_not_equal)?);
            }
            terms.push(DependencyTerm { alternatives });
        }
        Ok(Self { terms })
    }

    /// What: Iterate over every tuple in the field.
    ///
    /// Inputs:
    /// - `self`: The list to walk.
    ///
    /// Output:
    /// - Returns an iterator over all tuples of all terms.
    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.terms.iter().flat_map(|t| t.alternatives.iter())
    }

    /// What: Check whether the field is empty.
    ///
    /// Inputs:
    /// - `self`: The list to check.
    ///
    /// Output:
    /// - Returns `true` when no terms were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl std::fmt::Display for DependencyList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            for (j, alt) in term.alternatives.iter().enumerate() {
                if j > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{alt}")?;
            }
        }
        Ok(())
    }
}

/// What: Validate a package name token.
///
/// Inputs:
/// - `name`: The candidate name.
///
/// Output:
/// - Returns `true` for non-empty names starting with an alphanumeric and
///   containing only alphanumerics, `+`, `-`, `.`, or `_`.
fn valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_'))
}

/// What: Parse one dependency tuple.
///
/// Inputs:
/// - `text`: Tuple text, e.g. `libfoo (>= 1.2) [linux-amd64]`.
/// - `allow_not_equal`: Whether the `!=` operator is legal.
///
/// Output:
/// - Returns the parsed tuple or a `Parse` error.
///
/// Details:
/// - Operator spellings are matched longest first so `<` alone (an
///   ambiguous legacy form) is rejected rather than misread.
fn parse_tuple(text: &str, allow_not_equal: bool) -> Result<Dependency> {
    let mut rest = text;

    // trailing architecture qualifiers
    let mut architectures = Vec::new();
    if let Some(open) = rest.find('[') {
        let close = match rest.rfind(']') {
            Some(close) if close > open => close,
            _ => {
                return Err(DebToolkitError::Parse(format!(
                    "unterminated architecture qualifier in dependency \"{text}\""
                )));
            }
        };
        for token in rest[open + 1..close].split_whitespace() {
            let (negated, architecture) = token.strip_prefix('!').map_or((false, token), |t| (true, t));
            architectures.push(ArchQualifier {
                negated,
                architecture: architecture.to_string(),
            });
        }
        rest = rest[..open].trim_end();
    }

    // optional version constraint
    let (name_text, operator, version) = if let Some(open) = rest.find('(') {
        let close = match rest.rfind(')') {
            Some(close) if close > open => close,
            _ => {
                return Err(DebToolkitError::Parse(format!(
                    "unterminated version constraint in dependency \"{text}\""
                )));
            }
        };
        let constraint = rest[open + 1..close].trim();
        let (operator, version_text) = if let Some(v) = constraint.strip_prefix("<<") {
            (DepOperator::Lt, v)
        } else if let Some(v) = constraint.strip_prefix("<=") {
            (DepOperator::Le, v)
        } else if let Some(v) = constraint.strip_prefix(">=") {
            (DepOperator::Ge, v)
        } else if let Some(v) = constraint.strip_prefix(">>") {
            (DepOperator::Gt, v)
        } else if let Some(v) = constraint.strip_prefix("!=") {
            (DepOperator::Ne, v)
        } else if let Some(v) = constraint.strip_prefix('=') {
            (DepOperator::Eq, v)
        } else {
            return Err(DebToolkitError::Parse(format!(
                "missing operator in version constraint of dependency \"{text}\""
            )));
        };
        if operator == DepOperator::Ne && !allow_not_equal {
            return Err(DebToolkitError::Parse(format!(
                "the != operator is not legal in a control file: \"{text}\""
            )));
        }
        let version = version_text.trim();
        if version.is_empty() {
            return Err(DebToolkitError::Parse(format!(
                "empty version in constraint of dependency \"{text}\""
            )));
        }
        (rest[..open].trim_end(), operator, version.to_string())
    } else {
        (rest, DepOperator::Any, String::new())
    };

    if !valid_package_name(name_text) {
        return Err(DebToolkitError::Parse(format!(
            "invalid package name \"{name_text}\" in dependency \"{text}\""
        )));
    }

    Ok(Dependency {
        name: name_text.to_string(),
        operator,
        version,
        architectures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_name() {
        let list = DependencyList::parse("libfoo").expect("parse should succeed");
        assert_eq!(list.terms.len(), 1);
        assert_eq!(list.terms[0].alternatives[0], Dependency::new("libfoo"));
    }

    #[test]
    fn parse_version_constraints() {
        let list =
            DependencyList::parse("libfoo (>= 1.2), bar (<< 2.0)").expect("parse should succeed");
        assert_eq!(list.terms.len(), 2);
        assert_eq!(
            list.terms[0].alternatives[0],
            Dependency::with_version("libfoo", DepOperator::Ge, "1.2")
        );
        assert_eq!(
            list.terms[1].alternatives[0],
            Dependency::with_version("bar", DepOperator::Lt, "2.0")
        );
    }

    #[test]
    fn parse_alternatives() {
        let list = DependencyList::parse("mta | sendmail (>= 8.0)").expect("parse should succeed");
        assert_eq!(list.terms.len(), 1);
        assert_eq!(list.terms[0].alternatives.len(), 2);
        assert_eq!(list.terms[0].alternatives[0].name, "mta");
        assert_eq!(list.terms[0].alternatives[1].operator, DepOperator::Ge);
    }

    #[test]
    fn parse_architecture_qualifiers() {
        let list = DependencyList::parse("libfoo (= 1.0) [linux-amd64 !mswindows-i386]")
            .expect("parse should succeed");
        let dep = &list.terms[0].alternatives[0];
        assert_eq!(dep.architectures.len(), 2);
        assert!(!dep.architectures[0].negated);
        assert_eq!(dep.architectures[0].architecture, "linux-amd64");
        assert!(dep.architectures[1].negated);
        assert_eq!(dep.architectures[1].architecture, "mswindows-i386");
    }

    #[test]
    fn not_equal_forbidden_in_control_files() {
        assert!(DependencyList::parse("libfoo (!= 1.0)").is_err());
        let list = DependencyList::parse_query("libfoo (!= 1.0)").expect("queries accept !=");
        assert_eq!(list.terms[0].alternatives[0].operator, DepOperator::Ne);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(DependencyList::parse("libfoo (>= )").is_err());
        assert!(DependencyList::parse("libfoo (1.0)").is_err());
        assert!(DependencyList::parse("libfoo (>= 1.0").is_err());
        assert!(DependencyList::parse("-bad").is_err());
        assert!(DependencyList::parse("libfoo [linux-amd64").is_err());
    }

    #[test]
    fn empty_field_parses_empty() {
        let list = DependencyList::parse("").expect("parse should succeed");
        assert!(list.is_empty());
    }

    #[test]
    fn display_round_trip() {
        for text in [
            "libfoo",
            "libfoo (>= 1.2)",
            "mta | sendmail (>= 8.0), bar (<< 2.0)",
            "libfoo (= 1.0) [linux-amd64 !mswindows-i386]",
        ] {
            let list = DependencyList::parse(text).expect("parse should succeed");
            assert_eq!(list.to_string(), text);
        }
    }

    #[test]
    fn iter_walks_all_tuples() {
        let list = DependencyList::parse("a | b, c").expect("parse should succeed");
        let names: Vec<&str> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn serde_round_trip() {
        let list =
            DependencyList::parse("libfoo (>= 1.2) [linux-amd64]").expect("parse should succeed");
        let json = serde_json::to_string(&list).expect("serialization should succeed");
        let back: DependencyList =
            serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(list, back);
    }
}
