//! Convenient re-exports of the commonly used surface.
//!
//! # Example
//!
//! ```no_run
//! use deb_toolkit::prelude::*;
//!
//! # fn example() -> Result<()> {
//! let db = PackageDatabase::new("/target");
//! let store = PackageStore::new(db, Box::new(DirectoryCodec::new()));
//! let mut installer = Installer::new(store, Task::Install);
//! installer.add_package("/packages/t1_1.0_all.deb")?;
//! installer.run()?;
//! # Ok(())
//! # }
//! ```

pub use crate::archive::{ArchiveEntry, DirectoryCodec, EntryKind, PackageCodec};
pub use crate::control::ControlFile;
pub use crate::db::PackageDatabase;
pub use crate::deps::{DebVersion, version_satisfies, versioncmp};
pub use crate::disk::{FixedMounts, MountPoint, MountTable};
pub use crate::error::{DebToolkitError, Result, ValidationReport};
pub use crate::installer::Installer;
pub use crate::remover::{Remover, autoremove};
pub use crate::repository::{RemoteFetcher, RepositoryIndex, SourceEntry};
pub use crate::store::{Interrupt, NoInterrupt, PackageStore};
pub use crate::types::{
    Architecture, DepOperator, Dependency, DependencyList, InstallFlags, PackageKind,
    PackageStatus, Selection, Task,
};
