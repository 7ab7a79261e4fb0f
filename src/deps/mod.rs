//! Dependency handling: version comparison, universe trimming, tree
//! enumeration, and best-tree selection.
//!
//! # Overview
//!
//! The deps module provides:
//!
//! - **Version comparison**: Debian-style `[epoch:]upstream[-revision]`
//!   ordering with `~` sorting before everything.
//! - **Trimming**: pruning of the candidate universe by `Conflicts`,
//!   `Breaks`, and version-constrained dependency fields.
//! - **Tree enumeration**: lazy cartesian-product generation of candidate
//!   trees when alternative versions exist.
//! - **Best-tree selection**: pairwise competition between verified trees
//!   until one winner remains.
//!
//! # Examples
//!
//! ## Version comparison
//!
//! ```
//! use deb_toolkit::deps::versioncmp;
//! use std::cmp::Ordering;
//!
//! assert_eq!(versioncmp("1.2.3", "1.2.4"), Ordering::Less);
//! assert_eq!(versioncmp("1.0~rc1", "1.0"), Ordering::Less);
//! assert_eq!(versioncmp("2:0.9", "1.9"), Ordering::Greater);
//! ```
//!
//! ## Constraint checking
//!
//! ```
//! use deb_toolkit::deps::version_satisfies;
//! use deb_toolkit::types::DepOperator;
//!
//! assert!(version_satisfies("2.0", DepOperator::Ge, "1.5"));
//! assert!(!version_satisfies("1.0", DepOperator::Gt, "1.0"));
//! ```

pub mod resolve;
pub mod tree;
pub mod version;

pub use resolve::{
    DEPENDENCY_FIELDS, Resolver, compare_trees, match_dependency_version,
    trees_are_practically_identical,
};
pub use tree::TreeGenerator;
pub use version::{DebVersion, version_satisfies, versioncmp};
