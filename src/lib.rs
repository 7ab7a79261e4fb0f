//! Complete Rust toolkit for Debian-style package installation.
//!
//! This crate provides the installation planner and executor at the heart
//! of a Debian-style binary package manager: dependency resolution over
//! explicit, installed, and repository-available packages, disk-space and
//! overwrite validation, and a transactional per-package lifecycle
//! (validate, preinst, unpack, postinst, configure) with hook invocation
//! and rollback on failure.
//!
//! # Overview
//!
//! - [`store::PackageStore`]: cached access to package archives and the
//!   on-disk database.
//! - [`deps`]: version comparison, universe trimming, lazy tree
//!   enumeration, and best-tree selection.
//! - [`disk`]: mount attribution, block-rounded size accumulation, and
//!   the overwrite policy.
//! - [`installer::Installer`]: the validation pipeline and the lifecycle
//!   executor with its rollback journal.
//! - [`remover`]: remove, purge, and autoremove.
//!
//! # Examples
//!
//! ## Creating a target database
//!
//! ```no_run
//! use deb_toolkit::control::ControlFile;
//! use deb_toolkit::db::PackageDatabase;
//!
//! # fn example() -> deb_toolkit::Result<()> {
//! let db = PackageDatabase::new("/target");
//! let mut core = ControlFile::new();
//! core.set("Architecture", "linux-amd64");
//! db.create(&core)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Installing packages
//!
//! ```no_run
//! use deb_toolkit::archive::DirectoryCodec;
//! use deb_toolkit::db::PackageDatabase;
//! use deb_toolkit::installer::Installer;
//! use deb_toolkit::store::PackageStore;
//! use deb_toolkit::types::Task;
//!
//! # fn example() -> deb_toolkit::Result<()> {
//! let db = PackageDatabase::new("/target");
//! let store = PackageStore::new(db, Box::new(DirectoryCodec::new()));
//! let mut installer = Installer::new(store, Task::Install);
//! installer.add_package("/packages/t1_1.0_all.deb")?;
//! installer.add_repository("/var/repository");
//! installer.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Removing packages
//!
//! ```no_run
//! use deb_toolkit::archive::DirectoryCodec;
//! use deb_toolkit::db::PackageDatabase;
//! use deb_toolkit::remover::Remover;
//! use deb_toolkit::store::PackageStore;
//!
//! # fn example() -> deb_toolkit::Result<()> {
//! let db = PackageDatabase::new("/target");
//! let store = PackageStore::new(db, Box::new(DirectoryCodec::new()));
//! let mut remover = Remover::new(store, false);
//! remover.add_package("t1");
//! remover.run()?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod control;
pub mod db;
pub mod deps;
pub mod disk;
pub mod env;
pub mod error;
pub mod installer;
pub mod remover;
pub mod repository;
pub mod store;
pub mod types;

/// Prelude module for convenient imports.
///
/// This module re-exports commonly used types, traits, and functions,
/// allowing you to import everything you need with a single
/// `use deb_toolkit::prelude::*;`.
pub mod prelude;

// Re-export commonly used types
pub use error::{DebToolkitError as Error, Result, ValidationReport};
pub use types::{
    Architecture, DepOperator, Dependency, DependencyList, InstallFlags, PackageKind,
    PackageStatus, Selection, Task,
};

pub use control::ControlFile;
pub use db::PackageDatabase;
pub use installer::Installer;
pub use remover::{Remover, autoremove};
pub use store::{Interrupt, NoInterrupt, PackageStore};
