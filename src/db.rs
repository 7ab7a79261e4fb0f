//! On-disk package database: records, statuses, selections, hooks, and the
//! advisory lock.
//!
//! The database lives under `<root>/var/lib/wpkg/` by default. Every
//! installed package owns one directory holding its `control` file, a
//! `wpkg-status` file, an `index.wpkgar` file index, an optional
//! `conffiles` list, and its maintainer scripts. A distinguished `core/`
//! record carries the target-wide configuration, the `hooks/` directory,
//! the optional `sources.list`, and the `wpkg.lck` advisory lock file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveEntry;
use crate::control::ControlFile;
use crate::error::{DebToolkitError, Result};
use crate::types::package::{PackageStatus, Selection};

/// Default database location relative to the target root.
pub const DEFAULT_ADMINDIR: &str = "var/lib/wpkg";

/// Placeholder version written into synthetic records created when a
/// selection is applied to a package that was never installed.
pub const PLACEHOLDER_VERSION: &str = "0.0.0.1";

/// Handle to one package database under a target root.
///
/// The handle is cheap to clone; all state lives on disk. Callers that
/// mutate the database are expected to hold the advisory lock (see
/// [`PackageDatabase::lock`]).
#[derive(Clone, Debug)]
pub struct PackageDatabase {
    root: PathBuf,
    admindir: PathBuf,
}

impl PackageDatabase {
    /// What: Open a database handle with the default admindir.
    ///
    /// Inputs:
    /// - `root`: Target root filesystem path.
    ///
    /// Output:
    /// - Returns the handle; nothing is touched on disk yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let admindir = root.join(DEFAULT_ADMINDIR);
        Self { root, admindir }
    }

    /// What: Open a database handle with an explicit admindir.
    ///
    /// Inputs:
    /// - `root`: Target root filesystem path.
    /// - `admindir`: Database directory (absolute, or relative to `root`).
    ///
    /// Output:
    /// - Returns the handle.
    #[must_use]
    pub fn with_admindir(root: impl Into<PathBuf>, admindir: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let admindir = admindir.into();
        let admindir = if admindir.is_absolute() {
            admindir
        } else {
            root.join(admindir)
        };
        Self { root, admindir }
    }

    /// What: Return the target root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// What: Return the database directory path.
    #[must_use]
    pub fn admindir(&self) -> &Path {
        &self.admindir
    }

    /// What: Create a fresh database under the root.
    ///
    /// Inputs:
    /// - `self`: The handle naming the location.
    /// - `core_control`: Target-wide control fields (at least
    ///   `Architecture`; `Package: core` and a placeholder version are
    ///   filled in automatically).
    ///
    /// Output:
    /// - Returns an error when a database already exists there.
    ///
    /// Details:
    /// - Seeds `core/` with the control file, a `ready` status, an empty
    ///   file index, and the `hooks/` directory.
    pub fn create(&self, core_control: &ControlFile) -> Result<()> {
        let core = self.admindir.join("core");
        if core.join("control").exists() {
            return Err(DebToolkitError::InvalidInput(format!(
                "a package database already exists under {}",
                self.admindir.display()
            )));
        }
        if !core_control.is_defined("Architecture") {
            return Err(DebToolkitError::InvalidInput(
                "the core control file requires an Architecture field".to_string(),
            ));
        }
        fs::create_dir_all(core.join("hooks"))?;

        let mut control = core_control.clone();
        control.set("Package", "core");
        if !control.is_defined("Version") {
            control.set("Version", PLACEHOLDER_VERSION);
        }
        fs::write(core.join("control"), control.to_text())?;

        let mut status = ControlFile::new();
        status.set("Package", "core");
        status.set("X-Status", PackageStatus::Ready.as_str());
        fs::write(core.join("wpkg-status"), status.to_text())?;
        self.write_file_index("core", &[])?;

        tracing::info!("created package database under {}", self.admindir.display());
        Ok(())
    }

    /// What: Check whether a database exists at this location.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.admindir.join("core/control").is_file()
    }

    /// What: Return the record directory of a package.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns `<admindir>/<name>`.
    #[must_use]
    pub fn record_dir(&self, name: &str) -> PathBuf {
        self.admindir.join(name)
    }

    /// What: Check whether a package has a database record.
    #[must_use]
    pub fn has_record(&self, name: &str) -> bool {
        self.record_dir(name).join("wpkg-status").is_file()
    }

    /// What: Read a package's control file from the database.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the parsed control file, or `NotFound`.
    pub fn read_control(&self, name: &str) -> Result<ControlFile> {
        let path = self.record_dir(name).join("control");
        let text = fs::read_to_string(&path)
            .map_err(|_| DebToolkitError::NotFound(name.to_string()))?;
        ControlFile::parse(&text)
    }

    /// What: Write a package's control file into the database.
    pub fn write_control(&self, name: &str, control: &ControlFile) -> Result<()> {
        let dir = self.record_dir(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("control"), control.to_text())?;
        Ok(())
    }

    /// What: Read a package's status file.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the parsed `wpkg-status` file, or `NotFound` when the
    ///   package has no record.
    pub fn read_status_file(&self, name: &str) -> Result<ControlFile> {
        let path = self.record_dir(name).join("wpkg-status");
        let text = fs::read_to_string(&path)
            .map_err(|_| DebToolkitError::NotFound(name.to_string()))?;
        ControlFile::parse(&text)
    }

    fn write_status_file(&self, name: &str, status: &ControlFile) -> Result<()> {
        let dir = self.record_dir(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("wpkg-status"), status.to_text())?;
        Ok(())
    }

    /// What: Read a package's lifecycle status.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns `NoPackage` when no record exists, `Unknown` when the
    ///   status field is missing or unrecognized, the parsed status
    ///   otherwise.
    pub fn status(&self, name: &str) -> Result<PackageStatus> {
        if !self.has_record(name) {
            return Ok(PackageStatus::NoPackage);
        }
        let file = self.read_status_file(name)?;
        Ok(file
            .get("X-Status")
            .map_or(PackageStatus::Unknown, PackageStatus::parse))
    }

    /// What: Persist a package's lifecycle status.
    ///
    /// Inputs:
    /// - `name`: Package name.
    /// - `status`: New status.
    ///
    /// Output:
    /// - Returns an error on I/O failure.
    ///
    /// Details:
    /// - Creates the record on first write. Other status-file fields
    ///   (selection, install type) are preserved.
    pub fn set_status(&self, name: &str, status: PackageStatus) -> Result<()> {
        let mut file = self.read_status_file(name).unwrap_or_else(|_| {
            let mut file = ControlFile::new();
            file.set("Package", name);
            file
        });
        file.set("X-Status", status.as_str());
        tracing::debug!(package = name, status = %status, "status transition");
        self.write_status_file(name, &file)
    }

    /// What: Read a package's selection.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the selection, `Normal` when unset or without a record.
    pub fn selection(&self, name: &str) -> Result<Selection> {
        if !self.has_record(name) {
            return Ok(Selection::Normal);
        }
        let file = self.read_status_file(name)?;
        Ok(file.get("X-Selection").map_or(Selection::Normal, Selection::parse))
    }

    /// What: Persist a package's selection.
    ///
    /// Inputs:
    /// - `name`: Package name.
    /// - `selection`: New selection value.
    ///
    /// Output:
    /// - Returns an error on I/O failure.
    ///
    /// Details:
    /// - Setting `Reject` on a name with no record creates a synthetic
    ///   record (placeholder version, `not-installed` status) so the
    ///   selection persists. Other selections on unknown names are a
    ///   `NotFound` error.
    pub fn set_selection(&self, name: &str, selection: Selection) -> Result<()> {
        if !self.has_record(name) {
            if selection != Selection::Reject {
                return Err(DebToolkitError::NotFound(name.to_string()));
            }
            let mut control = ControlFile::new();
            control.set("Package", name);
            control.set("Version", PLACEHOLDER_VERSION);
            control.set("Architecture", "all");
            self.write_control(name, &control)?;
            self.set_status(name, PackageStatus::NotInstalled)?;
        }
        let mut file = self.read_status_file(name)?;
        file.set("X-Selection", selection.as_str());
        self.write_status_file(name, &file)
    }

    /// What: Read whether a package was installed explicitly.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns `true` unless the record says `X-Explicit: no`.
    pub fn is_explicit(&self, name: &str) -> Result<bool> {
        let file = self.read_status_file(name)?;
        Ok(file.get("X-Explicit") != Some("no"))
    }

    /// What: Record whether a package was installed explicitly.
    pub fn set_explicit(&self, name: &str, explicit: bool) -> Result<()> {
        let mut file = self.read_status_file(name)?;
        file.set("X-Explicit", if explicit { "yes" } else { "no" });
        self.write_status_file(name, &file)
    }

    /// What: List all package records, sorted by name.
    ///
    /// Inputs:
    /// - `self`: The database.
    ///
    /// Output:
    /// - Returns every record name except `core`, sorted.
    pub fn records(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.admindir.is_dir() {
            return Ok(names);
        }
        for entry in fs::read_dir(&self.admindir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "core" || !self.has_record(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// What: Read a package's conffile list.
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the listed paths, empty when no `conffiles` file exists.
    pub fn conffiles(&self, name: &str) -> Result<Vec<String>> {
        let path = self.record_dir(name).join("conffiles");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// What: Read a package's file index (`index.wpkgar`).
    ///
    /// Inputs:
    /// - `name`: Package name.
    ///
    /// Output:
    /// - Returns the shipped-file entries, or `DatabaseCorrupt` when the
    ///   index is missing for an existing record.
    pub fn file_index(&self, name: &str) -> Result<Vec<ArchiveEntry>> {
        let path = self.record_dir(name).join("index.wpkgar");
        if !path.is_file() {
            if self.has_record(name) {
                return Err(DebToolkitError::DatabaseCorrupt(format!(
                    "package {name} has a record but no index.wpkgar"
                )));
            }
            return Err(DebToolkitError::NotFound(name.to_string()));
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// What: Write a package's file index.
    pub fn write_file_index(&self, name: &str, entries: &[ArchiveEntry]) -> Result<()> {
        let dir = self.record_dir(name);
        fs::create_dir_all(&dir)?;
        let text = serde_json::to_string_pretty(entries)?;
        fs::write(dir.join("index.wpkgar"), text)?;
        Ok(())
    }

    /// What: Locate a maintainer script in a package's record.
    ///
    /// Inputs:
    /// - `name`: Package name.
    /// - `script`: Script stage name (e.g. `preinst`).
    /// - `batch`: When `true`, look for the `.bat` flavor.
    ///
    /// Output:
    /// - Returns the script path when the record ships it.
    #[must_use]
    pub fn script_path(&self, name: &str, script: &str, batch: bool) -> Option<PathBuf> {
        let file = if batch {
            format!("{script}.bat")
        } else {
            script.to_string()
        };
        let path = self.record_dir(name).join(file);
        path.is_file().then_some(path)
    }

    /// What: List global hooks for one lifecycle stage.
    ///
    /// Inputs:
    /// - `stage`: Stage name (e.g. `postinst`).
    /// - `batch`: When `true`, match the `.bat` flavor.
    ///
    /// Output:
    /// - Returns the matching `core/hooks/*_<stage>[.bat]` paths, sorted.
    pub fn hooks(&self, stage: &str, batch: bool) -> Result<Vec<PathBuf>> {
        let dir = self.admindir.join("core/hooks");
        let mut hooks = Vec::new();
        if !dir.is_dir() {
            return Ok(hooks);
        }
        let suffix = if batch {
            format!("_{stage}.bat")
        } else {
            format!("_{stage}")
        };
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) && entry.file_type()?.is_file() {
                hooks.push(entry.path());
            }
        }
        hooks.sort();
        Ok(hooks)
    }

    /// What: Delete a package's database record entirely.
    ///
    /// Inputs:
    /// - `name`: Package name (never `core`).
    ///
    /// Output:
    /// - Returns an error when asked to delete the core record.
    pub fn remove_record(&self, name: &str) -> Result<()> {
        if name == "core" {
            return Err(DebToolkitError::InvalidInput(
                "the core record cannot be removed".to_string(),
            ));
        }
        let dir = self.record_dir(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// What: Path of the optional `sources.list` file.
    #[must_use]
    pub fn sources_list_path(&self) -> PathBuf {
        self.admindir.join("core/sources.list")
    }

    fn lock_path(&self) -> PathBuf {
        self.admindir.join("core/wpkg.lck")
    }

    /// What: Check whether the advisory lock file exists.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock_path().is_file()
    }

    /// What: Acquire the database lock for a mutating operation.
    ///
    /// Inputs:
    /// - `status`: Human-readable operation status written into the core
    ///   record's `X-Status` field while the lock is held.
    ///
    /// Output:
    /// - Returns a scope guard that restores `ready` and removes the lock
    ///   file on drop; `Locked` when another process holds the lock;
    ///   `DatabaseCorrupt` when the core record is missing or not `ready`.
    ///
    /// Details:
    /// - The lock is an exclusive-create of `core/wpkg.lck`; its presence
    ///   alone blocks other processes.
    pub fn lock(&self, status: &str) -> Result<DatabaseLock> {
        if !self.exists() {
            return Err(DebToolkitError::DatabaseCorrupt(format!(
                "no package database under {}; create one first",
                self.admindir.display()
            )));
        }
        let path = self.lock_path();
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DebToolkitError::Locked(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        if self.status("core")? != PackageStatus::Ready {
            let _ = fs::remove_file(&path);
            return Err(DebToolkitError::DatabaseCorrupt(
                "the packager environment is not ready".to_string(),
            ));
        }
        let mut file = self.read_status_file("core")?;
        file.set("X-Status", status);
        self.write_status_file("core", &file)?;
        tracing::debug!(status, "database locked");
        Ok(DatabaseLock {
            db: self.clone(),
            released: false,
        })
    }

    /// What: Forcibly remove a stale lock left by a crashed process.
    ///
    /// Inputs:
    /// - `self`: The database.
    ///
    /// Output:
    /// - Returns `true` when a lock file was removed, `false` when none
    ///   existed.
    ///
    /// Details:
    /// - Also restores the core record's status to `ready`.
    pub fn remove_lock(&self) -> Result<bool> {
        let path = self.lock_path();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        self.set_status("core", PackageStatus::Ready)?;
        tracing::warn!("stale database lock removed");
        Ok(true)
    }
}

/// Scope guard over the database lock.
///
/// Dropping the guard restores the core record's `ready` status and
/// removes the lock file, including on error paths.
#[derive(Debug)]
pub struct DatabaseLock {
    db: PackageDatabase,
    released: bool,
}

impl DatabaseLock {
    /// What: Release the lock early.
    ///
    /// Inputs:
    /// - `self`: The guard (consumed).
    ///
    /// Output:
    /// - Returns any error from restoring the core status.
    pub fn unlock(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.db.set_status("core", PackageStatus::Ready)?;
        fs::remove_file(self.db.lock_path())?;
        tracing::debug!("database unlocked");
        Ok(())
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("failed to release database lock: {e}");
        }
    }
}
