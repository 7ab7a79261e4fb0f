//! Package store: cached access to archives and installed records.
//!
//! The store resolves a caller-supplied reference (an archive path or an
//! installed package name), parses control metadata once, and caches the
//! result. It also carries the interrupt seam polled by long-running
//! operations and the self-upgrade registry.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveEntry, PackageCodec, is_archive_path};
use crate::control::ControlFile;
use crate::db::PackageDatabase;
use crate::error::{DebToolkitError, Result};
use crate::types::package::{PackageStatus, Selection};

/// Interrupt hook polled at coarse-grained checkpoints.
///
/// When `stop_now` returns `true` the running operation raises
/// [`DebToolkitError::Interrupted`], which triggers rollback in the middle
/// of a mutating operation.
pub trait Interrupt {
    /// Return `true` to stop the current operation.
    fn stop_now(&self) -> bool;
}

/// Interrupt hook that never stops.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInterrupt;

impl Interrupt for NoInterrupt {
    fn stop_now(&self) -> bool {
        false
    }
}

/// Where a stored package's bytes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreSource {
    /// A package archive on disk.
    Archive(PathBuf),
    /// An installed record in the database.
    Database,
}

/// One cached package: control metadata plus its origin.
#[derive(Clone, Debug)]
pub struct StoredPackage {
    /// Package name.
    pub name: String,
    /// Origin of the package's bytes.
    pub source: StoreSource,
    /// Parsed control file.
    pub control: ControlFile,
}

/// Cached front end over archives and the package database.
pub struct PackageStore {
    db: PackageDatabase,
    codec: Box<dyn PackageCodec>,
    cache: HashMap<String, StoredPackage>,
    installed_cache: Option<Vec<String>>,
    selves: BTreeSet<String>,
    self_upgrade: bool,
}

impl std::fmt::Debug for PackageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageStore")
            .field("db", &self.db)
            .field("cached", &self.cache.len())
            .field("selves", &self.selves)
            .finish_non_exhaustive()
    }
}

impl PackageStore {
    /// What: Create a store over a database and an archive codec.
    ///
    /// Inputs:
    /// - `db`: The package database handle.
    /// - `codec`: Archive codec collaborator.
    ///
    /// Output:
    /// - Returns the empty store.
    #[must_use]
    pub fn new(db: PackageDatabase, codec: Box<dyn PackageCodec>) -> Self {
        Self {
            db,
            codec,
            cache: HashMap::new(),
            installed_cache: None,
            selves: BTreeSet::new(),
            self_upgrade: false,
        }
    }

    /// What: Return the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &PackageDatabase {
        &self.db
    }

    /// What: Return the archive codec.
    #[must_use]
    pub fn codec(&self) -> &dyn PackageCodec {
        self.codec.as_ref()
    }

    /// What: Load a package by archive path or installed name.
    ///
    /// Inputs:
    /// - `reference`: Either a path whose basename matches
    ///   `name_version[_arch].deb`, or an installed record name.
    /// - `force_reload`: Evict any cached copy first.
    ///
    /// Output:
    /// - Returns the cached package, or an error.
    ///
    /// Details:
    /// - Loading the same basename from two distinct full paths fails with
    ///   a `DatabaseCorrupt` conflicting-source error.
    pub fn load(&mut self, reference: &str, force_reload: bool) -> Result<&StoredPackage> {
        let path = Path::new(reference);
        if is_archive_path(path) {
            self.load_archive(path, force_reload)
        } else {
            self.load_installed(reference, force_reload)
        }
    }

    fn load_archive(&mut self, path: &Path, force_reload: bool) -> Result<&StoredPackage> {
        let control = self.codec.read_control(path)?;
        let name = control
            .get("Package")
            .ok_or_else(|| {
                DebToolkitError::Parse(format!("{} has no Package field", path.display()))
            })?
            .to_string();

        if force_reload {
            self.cache.remove(&name);
        }
        if let Some(existing) = self.cache.get(&name)
            && let StoreSource::Archive(existing_path) = &existing.source
            && existing_path != path
        {
            return Err(DebToolkitError::DatabaseCorrupt(format!(
                "package {name} loaded from conflicting sources {} and {}",
                existing_path.display(),
                path.display()
            )));
        }
        let entry = self.cache.entry(name.clone()).or_insert(StoredPackage {
            name,
            source: StoreSource::Archive(path.to_path_buf()),
            control,
        });
        Ok(entry)
    }

    fn load_installed(&mut self, name: &str, force_reload: bool) -> Result<&StoredPackage> {
        if force_reload {
            self.cache.remove(name);
        }
        if !self.cache.contains_key(name) {
            let control = self.db.read_control(name)?;
            self.cache.insert(
                name.to_string(),
                StoredPackage {
                    name: name.to_string(),
                    source: StoreSource::Database,
                    control,
                },
            );
        }
        Ok(&self.cache[name])
    }

    /// What: Evict one package from the cache.
    pub fn evict(&mut self, name: &str) {
        self.cache.remove(name);
    }

    /// What: Read a package's lifecycle status.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the database status; `NoPackage` when no record exists.
    pub fn package_status(&self, name: &str) -> Result<PackageStatus> {
        self.db.status(name)
    }

    /// What: Read a package's status, mapping errors to `NotInstalled`.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the status; any error becomes `NotInstalled`.
    #[must_use]
    pub fn safe_package_status(&self, name: &str) -> PackageStatus {
        self.package_status(name)
            .unwrap_or(PackageStatus::NotInstalled)
    }

    /// What: Read a package's selection.
    pub fn selection(&self, name: &str) -> Result<Selection> {
        self.db.selection(name)
    }

    /// What: List installed package records, sorted, cached.
    ///
    /// Inputs:
    /// - `self`: The store.
    ///
    /// Output:
    /// - Returns the sorted record names; the snapshot is cached until
    ///   [`PackageStore::invalidate_installed_cache`] is called.
    pub fn list_installed_packages(&mut self) -> Result<&[String]> {
        if self.installed_cache.is_none() {
            self.installed_cache = Some(self.db.records()?);
        }
        Ok(self.installed_cache.as_deref().unwrap_or_default())
    }

    /// What: Drop the installed-package snapshot.
    pub fn invalidate_installed_cache(&mut self) {
        self.installed_cache = None;
    }

    /// What: Read a package's shipped-file index.
    pub fn file_index(&self, name: &str) -> Result<Vec<ArchiveEntry>> {
        self.db.file_index(name)
    }

    /// What: Register a package name as "self".
    ///
    /// Inputs:
    /// - `package`: A package that, when upgraded, upgrades the running
    ///   process's own binary.
    pub fn add_self(&mut self, package: &str) {
        self.selves.insert(package.to_string());
    }

    /// What: Check whether a name is registered as self.
    #[must_use]
    pub fn exists_as_self(&self, package: &str) -> bool {
        self.selves.contains(package)
    }

    /// What: Mark that a self package is part of the running operation.
    pub fn mark_self_upgrade(&mut self) {
        self.self_upgrade = true;
    }

    /// What: Check whether a self-upgrade is in progress.
    #[must_use]
    pub const fn is_self(&self) -> bool {
        self.self_upgrade
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DirectoryCodec;
    use std::fs;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> PackageStore {
        let db = PackageDatabase::new(tmp.path().join("root"));
        let mut control = ControlFile::new();
        control.set("Architecture", "linux-amd64");
        db.create(&control).expect("create db");
        PackageStore::new(db, Box::new(DirectoryCodec::new()))
    }

    fn write_package(dir: &Path, basename: &str, name: &str) -> PathBuf {
        let pkg = dir.join(basename);
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(
            pkg.join("control"),
            format!("Package: {name}\nVersion: 1.0\nArchitecture: all\n"),
        )
        .expect("write control");
        pkg
    }

    #[test]
    fn load_archive_by_pattern() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = store(&tmp);
        let pkg = write_package(tmp.path(), "t1_1.0_all.deb", "t1");

        let loaded = store
            .load(pkg.to_str().expect("utf8 path"), false)
            .expect("load should succeed");
        assert_eq!(loaded.name, "t1");
        assert!(matches!(loaded.source, StoreSource::Archive(_)));
    }

    #[test]
    fn load_installed_by_name() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = store(&tmp);
        let mut control = ControlFile::new();
        control.set("Package", "t1");
        control.set("Version", "1.0");
        control.set("Architecture", "all");
        store.db().write_control("t1", &control).expect("write");
        store
            .db()
            .set_status("t1", PackageStatus::Installed)
            .expect("status");

        let loaded = store.load("t1", false).expect("load should succeed");
        assert_eq!(loaded.source, StoreSource::Database);
        assert_eq!(loaded.control.get("Version"), Some("1.0"));
    }

    #[test]
    fn conflicting_sources_fail() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = store(&tmp);
        let a = write_package(&tmp.path().join("a"), "t1_1.0_all.deb", "t1");
        let b = write_package(&tmp.path().join("b"), "t1_1.0_all.deb", "t1");

        store
            .load(a.to_str().expect("utf8"), false)
            .expect("first load");
        let err = store
            .load(b.to_str().expect("utf8"), false)
            .expect_err("conflicting source");
        assert!(matches!(err, DebToolkitError::DatabaseCorrupt(_)));

        // force_reload evicts the cached copy and accepts the new path
        store
            .load(b.to_str().expect("utf8"), true)
            .expect("forced reload");
    }

    #[test]
    fn unknown_name_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = store(&tmp);
        assert!(matches!(
            store.load("ghost", false),
            Err(DebToolkitError::NotFound(_))
        ));
    }

    #[test]
    fn status_queries() {
        let tmp = TempDir::new().expect("tempdir");
        let store = store(&tmp);
        assert_eq!(
            store.package_status("ghost").expect("status"),
            PackageStatus::NoPackage
        );
        assert_eq!(store.safe_package_status("ghost"), PackageStatus::NoPackage);
        store
            .db()
            .set_status("t1", PackageStatus::Unpacked)
            .expect("status");
        assert_eq!(
            store.package_status("t1").expect("status"),
            PackageStatus::Unpacked
        );
    }

    #[test]
    fn installed_list_is_cached_until_invalidated() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = store(&tmp);
        store
            .db()
            .set_status("t1", PackageStatus::Installed)
            .expect("status");
        assert_eq!(store.list_installed_packages().expect("list"), ["t1"]);

        store
            .db()
            .set_status("t2", PackageStatus::Installed)
            .expect("status");
        // snapshot still cached
        assert_eq!(store.list_installed_packages().expect("list"), ["t1"]);
        store.invalidate_installed_cache();
        assert_eq!(store.list_installed_packages().expect("list"), ["t1", "t2"]);
    }

    #[test]
    fn self_registry() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = store(&tmp);
        assert!(!store.exists_as_self("wpkg"));
        store.add_self("wpkg");
        assert!(store.exists_as_self("wpkg"));
        assert!(!store.is_self());
        store.mark_self_upgrade();
        assert!(store.is_self());
    }

    #[test]
    fn no_interrupt_never_stops() {
        assert!(!NoInterrupt.stop_now());
    }
}
