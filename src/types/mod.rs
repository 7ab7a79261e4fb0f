//! Shared data types for deb-toolkit.

pub mod architecture;
pub mod dependency;
pub mod package;

pub use architecture::Architecture;
pub use dependency::{ArchQualifier, DepOperator, Dependency, DependencyList, DependencyTerm};
pub use package::{InstallFlags, LoadState, PackageKind, PackageStatus, Selection, Task};
