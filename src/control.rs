//! Control file parsing and serialization.
//!
//! Control files carry `Field: value` lines with indented continuation
//! lines. Field names are case insensitive; insertion order is preserved so
//! a rewritten file stays diffable against its source.

use serde::{Deserialize, Serialize};

use crate::error::{DebToolkitError, Result};
use crate::types::dependency::DependencyList;

/// One parsed control file: an ordered, case-insensitively keyed field map.
///
/// The same structure backs package `control` files, `wpkg-status` files,
/// and the target-wide `core/control` record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFile {
    /// Fields in insertion order as `(name, value)` pairs.
    fields: Vec<(String, String)>,
}

impl ControlFile {
    /// What: Create an empty control file.
    ///
    /// Inputs: None
    ///
    /// Output:
    /// - Returns a control file with no fields.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// What: Parse control file text.
    ///
    /// Inputs:
    /// - `text`: The raw file contents.
    ///
    /// Output:
    /// - Returns the parsed file, or a `Parse` error for malformed lines.
    ///
    /// Details:
    /// - A line starting with space or tab continues the previous field;
    ///   the continuation is stored joined by `\n`.
    /// - Blank lines are ignored (a control file holds a single paragraph).
    /// - A field name may not be empty and may not contain whitespace.
    /// - A duplicated field name is a `Parse` error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut file = Self::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                let Some(last) = file.fields.last_mut() else {
                    return Err(DebToolkitError::Parse(
                        "continuation line before any field".to_string(),
                    ));
                };
                last.1.push('\n');
                last.1.push_str(line.trim());
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(DebToolkitError::Parse(format!(
                    "control line without a colon: \"{line}\""
                )));
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(DebToolkitError::Parse(format!(
                    "invalid control field name: \"{name}\""
                )));
            }
            if file.is_defined(name) {
                return Err(DebToolkitError::Parse(format!(
                    "control field \"{name}\" defined twice"
                )));
            }
            file.fields.push((name.to_string(), value.trim().to_string()));
        }
        Ok(file)
    }

    /// What: Look up a field value case-insensitively.
    ///
    /// Inputs:
    /// - `name`: The field name.
    ///
    /// Output:
    /// - Returns the value, or `None` when the field is not defined.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// What: Check whether a field is defined.
    ///
    /// Inputs:
    /// - `name`: The field name.
    ///
    /// Output:
    /// - Returns `true` when the field exists.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// What: Set a field, replacing any existing value.
    ///
    /// Inputs:
    /// - `name`: The field name (kept with the caller's capitalization on
    ///   first insertion).
    /// - `value`: The new value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self
            .fields
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }

    /// What: Remove a field.
    ///
    /// Inputs:
    /// - `name`: The field name.
    ///
    /// Output:
    /// - Returns `true` when a field was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.fields.len() != before
    }

    /// What: Read a boolean field.
    ///
    /// Inputs:
    /// - `name`: The field name.
    ///
    /// Output:
    /// - Returns `true` for `yes`, `true`, or `1` (case insensitive);
    ///   `false` for anything else or when undefined.
    #[must_use]
    pub fn boolean(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| {
            matches!(v.to_ascii_lowercase().as_str(), "yes" | "true" | "1")
        })
    }

    /// What: Parse a field as a dependency list.
    ///
    /// Inputs:
    /// - `name`: The field name (e.g. `Depends`).
    ///
    /// Output:
    /// - Returns the parsed list, empty when the field is undefined, or a
    ///   `Parse` error when the field text is malformed.
    pub fn dependencies(&self, name: &str) -> Result<DependencyList> {
        match self.get(name) {
            Some(text) => DependencyList::parse(text),
            None => Ok(DependencyList::default()),
        }
    }

    /// What: Iterate over fields in insertion order.
    ///
    /// Inputs:
    /// - `self`: The control file.
    ///
    /// Output:
    /// - Returns an iterator of `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// What: Count the defined fields.
    ///
    /// Inputs:
    /// - `self`: The control file.
    ///
    /// Output:
    /// - Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// What: Check whether the file has no fields.
    ///
    /// Inputs:
    /// - `self`: The control file.
    ///
    /// Output:
    /// - Returns `true` when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// What: Serialize back to control file text.
    ///
    /// Inputs:
    /// - `self`: The control file.
    ///
    /// Output:
    /// - Returns the rendered text, continuation lines indented with one
    ///   space, ending with a newline.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.fields {
            out.push_str(name);
            out.push_str(": ");
            for (i, line) in value.split('\n').enumerate() {
                if i > 0 {
                    out.push_str("\n ");
                }
                out.push_str(line);
            }
            out.push('\n');
        }
        out
    }

    /// What: Verify the fields required of a binary package record.
    ///
    /// Inputs:
    /// - `self`: The control file.
    ///
    /// Output:
    /// - Returns an error naming the first missing field among `Package`,
    ///   `Version`, and `Architecture`.
    pub fn validate_package_fields(&self) -> Result<()> {
        for required in ["Package", "Version", "Architecture"] {
            if !self.is_defined(required) {
                return Err(DebToolkitError::Parse(format!(
                    "control file is missing the required {required} field"
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ControlFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_fields() {
        let file = ControlFile::parse("Package: t1\nVersion: 1.0\nArchitecture: all\n")
            .expect("parse should succeed");
        assert_eq!(file.get("Package"), Some("t1"));
        assert_eq!(file.get("Version"), Some("1.0"));
        assert_eq!(file.len(), 3);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let file = ControlFile::parse("Package: t1\n").expect("parse should succeed");
        assert_eq!(file.get("package"), Some("t1"));
        assert_eq!(file.get("PACKAGE"), Some("t1"));
        assert!(file.is_defined("pAcKaGe"));
    }

    #[test]
    fn continuation_lines_join() {
        let text = "Description: short summary\n long description line one\n line two\n";
        let file = ControlFile::parse(text).expect("parse should succeed");
        assert_eq!(
            file.get("Description"),
            Some("short summary\nlong description line one\nline two")
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ControlFile::parse(" leading continuation\n").is_err());
        assert!(ControlFile::parse("no colon here\n").is_err());
        assert!(ControlFile::parse("Package: a\nPackage: b\n").is_err());
        assert!(ControlFile::parse("Bad Name: x\n").is_err());
    }

    #[test]
    fn set_replaces_case_insensitively() {
        let mut file = ControlFile::parse("X-Status: ready\n").expect("parse should succeed");
        file.set("x-status", "installing");
        assert_eq!(file.get("X-Status"), Some("installing"));
        assert_eq!(file.len(), 1);
    }

    #[test]
    fn remove_field() {
        let mut file =
            ControlFile::parse("Package: t1\nEssential: yes\n").expect("parse should succeed");
        assert!(file.remove("essential"));
        assert!(!file.is_defined("Essential"));
        assert!(!file.remove("Essential"));
    }

    #[test]
    fn boolean_field_values() {
        let file = ControlFile::parse("A: yes\nB: True\nC: 1\nD: no\nE: banana\n")
            .expect("parse should succeed");
        assert!(file.boolean("A"));
        assert!(file.boolean("B"));
        assert!(file.boolean("C"));
        assert!(!file.boolean("D"));
        assert!(!file.boolean("E"));
        assert!(!file.boolean("F"));
    }

    #[test]
    fn dependencies_of_missing_field_are_empty() {
        let file = ControlFile::parse("Package: t1\n").expect("parse should succeed");
        let deps = file.dependencies("Depends").expect("empty list");
        assert!(deps.is_empty());
    }

    #[test]
    fn dependencies_parse() {
        let file = ControlFile::parse("Depends: t1 (>= 1.0), t2\n").expect("parse should succeed");
        let deps = file.dependencies("Depends").expect("parse should succeed");
        assert_eq!(deps.terms.len(), 2);
    }

    #[test]
    fn round_trip_preserves_order() {
        let text = "Package: t1\nVersion: 1.0\nArchitecture: all\nDescription: demo\n more\n";
        let file = ControlFile::parse(text).expect("parse should succeed");
        assert_eq!(file.to_text(), text);
    }

    #[test]
    fn validate_required_fields() {
        let good = ControlFile::parse("Package: t1\nVersion: 1.0\nArchitecture: all\n")
            .expect("parse should succeed");
        assert!(good.validate_package_fields().is_ok());

        let bad = ControlFile::parse("Package: t1\nArchitecture: all\n")
            .expect("parse should succeed");
        let err = bad.validate_package_fields().expect_err("missing Version");
        assert!(err.to_string().contains("Version"));
    }
}
