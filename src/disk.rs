//! Disk-space planning and overwrite validation.
//!
//! The planner walks every package's data entries once, attributes each
//! target path to the mount point whose directory is the longest prefix of
//! the path, accumulates block-rounded sizes per mount (positive for the
//! install side, negative for the upgraded-out side), and applies the
//! overwrite policy against files already on the target.
//!
//! Enumerating mounts requires per-OS syscalls, which are an external
//! collaborator: the [`MountTable`] trait is the seam, and [`FixedMounts`]
//! is the built-in implementation used for tests and for targets where a
//! single writable mount is a good-enough model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveEntry, EntryKind};
use crate::error::{DebToolkitError, Result, ValidationReport};
use crate::installer::item::PackageItem;
use crate::types::package::InstallFlags;

/// Fraction of free space that may be consumed: the plan must fit within
/// nine tenths of every disk's free space.
const SAFETY_MARGIN_NUMERATOR: u64 = 9;
const SAFETY_MARGIN_DENOMINATOR: u64 = 10;

/// Non-regular entries are charged at least one block; blocks are assumed
/// to never be smaller than this.
const MIN_BLOCK_CHARGE: u64 = 512;

/// One mount point of the target system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    /// Mount directory.
    pub path: PathBuf,
    /// Block size in bytes.
    pub block_size: u64,
    /// Free space in bytes.
    pub free_space: u64,
    /// Whether the mount is read only.
    pub read_only: bool,
}

/// Enumeration interface over the target's mounts.
pub trait MountTable {
    /// List the target's mount points.
    fn mounts(&self) -> Result<Vec<MountPoint>>;
}

/// Static mount table.
///
/// Useful for tests and for callers that already know the target layout;
/// [`FixedMounts::single_root`] models the common one-big-disk case.
#[derive(Clone, Debug)]
pub struct FixedMounts {
    mounts: Vec<MountPoint>,
}

impl FixedMounts {
    /// What: Build a mount table from explicit mount points.
    ///
    /// Inputs:
    /// - `mounts`: The mount points to report.
    ///
    /// Output:
    /// - Returns the table.
    #[must_use]
    pub const fn new(mounts: Vec<MountPoint>) -> Self {
        Self { mounts }
    }

    /// What: Model the target as one large writable root mount.
    ///
    /// Inputs: None
    ///
    /// Output:
    /// - Returns a table with a single `/` mount whose free space is
    ///   effectively unlimited.
    #[must_use]
    pub fn single_root() -> Self {
        Self::new(vec![MountPoint {
            path: PathBuf::from("/"),
            block_size: 4096,
            free_space: u64::MAX / 2,
            read_only: false,
        }])
    }
}

impl MountTable for FixedMounts {
    fn mounts(&self) -> Result<Vec<MountPoint>> {
        Ok(self.mounts.clone())
    }
}

/// Accumulated planning state of one disk.
#[derive(Clone, Debug)]
pub struct DiskEntry {
    mount: MountPoint,
    accumulated_blocks: i64,
}

impl DiskEntry {
    /// What: Return the mount this entry tracks.
    #[must_use]
    pub const fn mount(&self) -> &MountPoint {
        &self.mount
    }

    /// What: Return the net accumulated blocks (may be negative).
    #[must_use]
    pub const fn accumulated_blocks(&self) -> i64 {
        self.accumulated_blocks
    }

    /// What: Check whether a target path belongs to this mount.
    fn matches(&self, path: &str) -> bool {
        Path::new(path).starts_with(&self.mount.path)
    }

    /// What: Charge a byte size to this disk.
    ///
    /// Inputs:
    /// - `size`: Signed byte count; negative on the upgraded-out side.
    ///
    /// Details:
    /// - Bytes convert to blocks with ceiling division.
    fn add_size(&mut self, size: i64) {
        let blocks = i64::try_from(
            size.unsigned_abs().div_ceil(self.mount.block_size.max(1)),
        )
        .unwrap_or(i64::MAX);
        self.accumulated_blocks += blocks * size.signum();
    }

    /// What: Validate this disk's accumulated plan.
    ///
    /// Inputs:
    /// - `self`: The disk entry.
    ///
    /// Output:
    /// - Returns an error message for a read-only mount that would grow,
    ///   or for a plan breaking the 10% safety margin; `None` when valid.
    #[must_use]
    pub fn validity_error(&self) -> Option<String> {
        if self.accumulated_blocks <= 0 {
            return None;
        }
        if self.mount.read_only {
            return Some(format!(
                "cannot install to {}: the mount is read-only",
                self.mount.path.display()
            ));
        }
        let needed = self
            .accumulated_blocks
            .unsigned_abs()
            .saturating_mul(self.mount.block_size);
        let allowed = self.mount.free_space / SAFETY_MARGIN_DENOMINATOR * SAFETY_MARGIN_NUMERATOR;
        if needed >= allowed {
            return Some(format!(
                "not enough free space on {}: {needed} bytes needed, \
                 {allowed} available within the safety margin",
                self.mount.path.display()
            ));
        }
        None
    }
}

/// The set of disks receiving files, with longest-prefix attribution.
#[derive(Debug)]
pub struct DiskSet {
    disks: Vec<DiskEntry>,
}

impl DiskSet {
    /// What: Build the disk set from a mount table.
    ///
    /// Inputs:
    /// - `table`: Mount enumeration collaborator.
    ///
    /// Output:
    /// - Returns the set, or an error when no mounts are reported.
    pub fn new(table: &dyn MountTable) -> Result<Self> {
        let mounts = table.mounts()?;
        if mounts.is_empty() {
            return Err(DebToolkitError::Internal(
                "the mount table reported no mount points".to_string(),
            ));
        }
        Ok(Self {
            disks: mounts
                .into_iter()
                .map(|mount| DiskEntry {
                    mount,
                    accumulated_blocks: 0,
                })
                .collect(),
        })
    }

    /// What: Find the disk owning a target path.
    ///
    /// Inputs:
    /// - `path`: Absolute target path.
    ///
    /// Output:
    /// - Returns the index of the disk with the longest matching mount
    ///   prefix (`/usr` beats `/`), or `None`.
    #[must_use]
    pub fn find_disk(&self, path: &str) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_len = 0;
        for (index, disk) in self.disks.iter().enumerate() {
            let len = disk.mount.path.as_os_str().len();
            if disk.matches(path) && (best.is_none() || len > best_len) {
                best = Some(index);
                best_len = len;
            }
        }
        best
    }

    /// What: Charge a byte size to the disk owning a path.
    ///
    /// Inputs:
    /// - `path`: Absolute target path.
    /// - `size`: Signed byte count.
    /// - `report`: Receives an error when no disk covers the path.
    pub fn add_size(&mut self, path: &str, size: i64, report: &mut ValidationReport) {
        match self.find_disk(path) {
            Some(index) => self.disks[index].add_size(size),
            None => report.error(format!("cannot find partition for {path}")),
        }
    }

    /// What: Validate every disk's accumulated plan.
    ///
    /// Inputs:
    /// - `report`: Receives one error per failing disk.
    pub fn verify(&self, report: &mut ValidationReport) {
        for disk in &self.disks {
            if let Some(message) = disk.validity_error() {
                report.error(message);
            }
        }
    }

    /// What: Return the tracked disks.
    #[must_use]
    pub fn disks(&self) -> &[DiskEntry] {
        &self.disks
    }
}

/// Cache of files shipped by essential packages.
///
/// Because essential packages are few, the validator builds the union of
/// their file lists once and then answers point queries.
#[derive(Debug, Default)]
pub struct EssentialFileCache {
    /// Target path to owning essential package names.
    files: HashMap<String, Vec<String>>,
}

impl EssentialFileCache {
    /// What: Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What: Record the files of one essential package.
    ///
    /// Inputs:
    /// - `package`: The essential package's name.
    /// - `entries`: Its shipped entries.
    pub fn add_package(&mut self, package: &str, entries: &[ArchiveEntry]) {
        for entry in entries {
            if entry.kind != EntryKind::Directory {
                self.files
                    .entry(entry.path.clone())
                    .or_default()
                    .push(package.to_string());
            }
        }
    }

    /// What: Check whether a path belongs to an essential package.
    ///
    /// Inputs:
    /// - `path`: Target path being overwritten.
    /// - `exclude`: Package under validation (its own files do not count).
    ///
    /// Output:
    /// - Returns `true` when another essential package ships the path.
    #[must_use]
    pub fn owns(&self, path: &str, exclude: &str) -> bool {
        self.files
            .get(path)
            .is_some_and(|owners| owners.iter().any(|owner| owner != exclude))
    }
}

/// Cross-package collision map for one plan: target path to the first
/// installing package and entry kind that claimed it.
pub type ClaimedFiles = HashMap<String, (String, EntryKind)>;

/// What: Plan one package's disk usage and validate its overwrites.
///
/// Inputs:
/// - `disks`: Accumulating disk set.
/// - `item`: The package item being planned (name and conffile list).
/// - `entries`: The package's data entries.
/// - `upgrade_paths`: Paths shipped by the version being upgraded out,
///   when this walk is the install side of an upgrade.
/// - `factor`: `+1` for the install side, `-1` for the upgraded-out side.
/// - `root`: Target root the entries land under.
/// - `essential`: Essential-file ownership cache.
/// - `claimed`: Cross-package collision map shared by the whole plan.
/// - `flags`: Force flags downgrading specific checks.
/// - `report`: Receives errors and warnings.
///
/// Output:
/// - All findings go into the report; nothing is raised directly.
///
/// Details:
/// - Entries not starting with `/` are database internal and skipped.
/// - Directory-over-directory overwrites are silently permitted; an
///   essential package's regular files are never overwritable; conffile
///   overwrites defer to conffile handling with a warning; everything
///   else follows `force_overwrite` / `force_overwrite_dir`.
#[allow(clippy::too_many_arguments)]
pub fn plan_package(
    disks: &mut DiskSet,
    item: &PackageItem,
    entries: &[ArchiveEntry],
    upgrade_paths: Option<&std::collections::HashSet<String>>,
    factor: i64,
    root: &Path,
    essential: &EssentialFileCache,
    claimed: &mut ClaimedFiles,
    flags: &InstallFlags,
    report: &mut ValidationReport,
) {
    let package = item.name();
    for entry in entries {
        if !entry.path.starts_with('/') {
            // database-internal entry
            continue;
        }

        if factor > 0 {
            match claimed.get(&entry.path) {
                Some((other, other_kind))
                    if entry.kind != EntryKind::Directory
                        || *other_kind != EntryKind::Directory =>
                {
                    report.error(format!(
                        "file {} from package {package} also exists in {other}",
                        entry.path
                    ));
                }
                Some(_) => {}
                None => {
                    claimed.insert(entry.path.clone(), (package.to_string(), entry.kind));
                }
            }
        }

        let size = match entry.kind {
            EntryKind::Regular => i64::try_from(entry.size).unwrap_or(i64::MAX),
            EntryKind::Directory if factor < 0 => 0,
            _ => i64::try_from(entry.size.max(MIN_BLOCK_CHARGE)).unwrap_or(i64::MAX),
        };
        disks.add_size(&entry.path, size * factor, report);

        if factor > 0 {
            verify_overwrite(item, entry, upgrade_paths, root, essential, flags, report);
        }
    }
}

/// What: Apply the overwrite policy to one entry.
///
/// Details:
/// - Only consulted on the install side, and only when the destination
///   already exists on the target.
fn verify_overwrite(
    item: &PackageItem,
    entry: &ArchiveEntry,
    upgrade_paths: Option<&std::collections::HashSet<String>>,
    root: &Path,
    essential: &EssentialFileCache,
    flags: &InstallFlags,
    report: &mut ValidationReport,
) {
    let package = item.name();
    let relative = entry.path.trim_start_matches('/');
    let destination = root.join(relative);
    let Ok(metadata) = std::fs::symlink_metadata(&destination) else {
        return;
    };

    let new_is_file = entry.kind != EntryKind::Directory;
    let old_is_file = !metadata.is_dir();
    let owned_by_upgrade = upgrade_paths.is_some_and(|paths| paths.contains(&entry.path));

    if new_is_file && old_is_file {
        if owned_by_upgrade {
            return;
        }
        if essential.owns(&entry.path, package) {
            // no force flag overrides an essential package's files
            report.error(format!(
                "file {} from package {package} already exists on the target \
                 and cannot be overwritten because the owner is an essential package",
                entry.path
            ));
            return;
        }
        if item.is_conffile(&entry.path) {
            report.warning(format!(
                "configuration file {} from package {package} already exists \
                 on the target; conffile handling applies",
                entry.path
            ));
            return;
        }
        if flags.force_overwrite {
            report.warning(format!(
                "file {} from package {package} already exists on the target \
                 and will get overwritten",
                entry.path
            ));
        } else {
            report.error(format!(
                "file {} from package {package} already exists on the target",
                entry.path
            ));
        }
    } else if new_is_file != old_is_file {
        if owned_by_upgrade {
            // a package should not swap a file for a directory, but within
            // an upgrade of itself it is tolerated
            report.warning(format!(
                "package {package} is replacing {} with {} of the other kind",
                entry.path,
                if new_is_file { "a regular file" } else { "a directory" }
            ));
            return;
        }
        if essential.owns(&entry.path, package) {
            // essential directory ownership is immutable even when forced
            report.error(format!(
                "{} belongs to an essential package and cannot change kind",
                entry.path
            ));
            return;
        }
        if flags.force_overwrite_dir {
            report.warning(format!(
                "{} on the target will be replaced by {} from package {package}",
                entry.path,
                if new_is_file { "a regular file" } else { "a directory" }
            ));
        } else if new_is_file {
            report.error(format!(
                "directory {} already exists on the target and package \
                 {package} would like to create a regular file in its place",
                entry.path
            ));
        } else {
            report.error(format!(
                "file {} already exists on the target and package {package} \
                 would like to create a directory in its place",
                entry.path
            ));
        }
    }
    // both directories: silently permitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DirectoryCodec;
    use crate::types::package::PackageKind;
    use std::fs;
    use tempfile::TempDir;

    fn mounts(entries: &[(&str, u64, u64, bool)]) -> FixedMounts {
        FixedMounts::new(
            entries
                .iter()
                .map(|(path, block, free, ro)| MountPoint {
                    path: PathBuf::from(path),
                    block_size: *block,
                    free_space: *free,
                    read_only: *ro,
                })
                .collect(),
        )
    }

    fn test_item(tmp: &TempDir, name: &str) -> PackageItem {
        let pkg = tmp.path().join(format!("{name}_1.0.deb"));
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(
            pkg.join("control"),
            format!("Package: {name}\nVersion: 1.0\nArchitecture: all\n"),
        )
        .expect("write");
        let codec = DirectoryCodec::new();
        PackageItem::from_archive(&codec, &pkg, PackageKind::Explicit).expect("item")
    }

    fn entry(path: &str, kind: EntryKind, size: u64) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            kind,
            size,
            mode: 0o644,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let table = mounts(&[("/", 4096, 1 << 30, false), ("/usr", 4096, 1 << 30, false)]);
        let disks = DiskSet::new(&table).expect("disk set");
        let usr = disks.find_disk("/usr/bin/t1").expect("found");
        assert_eq!(disks.disks()[usr].mount().path, PathBuf::from("/usr"));
        let root = disks.find_disk("/etc/t1.conf").expect("found");
        assert_eq!(disks.disks()[root].mount().path, PathBuf::from("/"));
    }

    #[test]
    fn accumulation_rounds_up_blocks() {
        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        disks.add_size("/a", 1, &mut report);
        disks.add_size("/b", 4097, &mut report);
        assert!(report.is_acceptable());
        assert_eq!(disks.disks()[0].accumulated_blocks(), 3);
    }

    #[test]
    fn negative_sizes_allowed() {
        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        disks.add_size("/a", -8192, &mut report);
        assert_eq!(disks.disks()[0].accumulated_blocks(), -2);
        disks.verify(&mut report);
        assert!(report.is_acceptable());
    }

    #[test]
    fn monotone_in_number_of_files() {
        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        let mut previous = 0;
        for i in 0..16 {
            disks.add_size(&format!("/f{i}"), 100, &mut report);
            let now = disks.disks()[0].accumulated_blocks();
            assert!(now >= previous);
            previous = now;
        }
    }

    #[test]
    fn read_only_mount_rejects_growth() {
        let table = mounts(&[("/", 4096, 1 << 30, true)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        disks.add_size("/a", 4096, &mut report);
        disks.verify(&mut report);
        assert!(!report.is_acceptable());
        assert!(report.errors[0].contains("read-only"));
    }

    #[test]
    fn read_only_mount_accepts_shrink() {
        let table = mounts(&[("/", 4096, 1 << 30, true)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        disks.add_size("/a", -4096, &mut report);
        disks.verify(&mut report);
        assert!(report.is_acceptable());
    }

    #[test]
    fn safety_margin_enforced() {
        // free space 100 blocks; margin allows strictly less than 90
        let table = mounts(&[("/", 4096, 100 * 4096, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        disks.add_size("/a", 89 * 4096, &mut report);
        disks.verify(&mut report);
        assert!(report.is_acceptable());

        disks.add_size("/a", 4096, &mut report);
        disks.verify(&mut report);
        assert!(!report.is_acceptable());
    }

    #[test]
    fn unknown_path_is_an_error() {
        let table = mounts(&[("/usr", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut report = ValidationReport::new();
        disks.add_size("/etc/t1.conf", 100, &mut report);
        assert!(!report.is_acceptable());
    }

    #[test]
    fn duplicate_file_across_packages_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let mut report = ValidationReport::new();
        let essential = EssentialFileCache::new();
        let flags = InstallFlags::default();
        let root = tmp.path().join("root");

        let a = test_item(&tmp, "a");
        let b = test_item(&tmp, "b");
        let shared = [entry("/usr/bin/tool", EntryKind::Regular, 10)];
        plan_package(
            &mut disks, &a, &shared, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        assert!(report.is_acceptable());
        plan_package(
            &mut disks, &b, &shared, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        assert!(!report.is_acceptable());
        assert!(report.errors[0].contains("also exists in a"));
    }

    #[test]
    fn shared_directories_are_fine() {
        let tmp = TempDir::new().expect("tempdir");
        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let mut report = ValidationReport::new();
        let essential = EssentialFileCache::new();
        let flags = InstallFlags::default();
        let root = tmp.path().join("root");

        let a = test_item(&tmp, "a");
        let b = test_item(&tmp, "b");
        let shared = [entry("/usr/share/doc", EntryKind::Directory, 0)];
        plan_package(
            &mut disks, &a, &shared, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        plan_package(
            &mut disks, &b, &shared, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        assert!(report.is_acceptable());
    }

    #[test]
    fn existing_file_blocks_install_without_force() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("usr/bin")).expect("mkdir");
        fs::write(root.join("usr/bin/tool"), b"old").expect("write");

        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let essential = EssentialFileCache::new();
        let item = test_item(&tmp, "a");
        let entries = [entry("/usr/bin/tool", EntryKind::Regular, 10)];

        let mut report = ValidationReport::new();
        plan_package(
            &mut disks,
            &item,
            &entries,
            None,
            1,
            &root,
            &essential,
            &mut claimed,
            &InstallFlags::default(),
            &mut report,
        );
        assert!(!report.is_acceptable());

        // force-overwrite downgrades the error to a warning
        let mut claimed = ClaimedFiles::new();
        let mut report = ValidationReport::new();
        let flags = InstallFlags {
            force_overwrite: true,
            ..InstallFlags::default()
        };
        plan_package(
            &mut disks, &item, &entries, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        assert!(report.is_acceptable());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn upgrade_owned_file_is_fine() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("usr/bin")).expect("mkdir");
        fs::write(root.join("usr/bin/tool"), b"old").expect("write");

        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let essential = EssentialFileCache::new();
        let item = test_item(&tmp, "a");
        let entries = [entry("/usr/bin/tool", EntryKind::Regular, 10)];
        let upgrade_paths: std::collections::HashSet<String> =
            ["/usr/bin/tool".to_string()].into_iter().collect();

        let mut report = ValidationReport::new();
        plan_package(
            &mut disks,
            &item,
            &entries,
            Some(&upgrade_paths),
            1,
            &root,
            &essential,
            &mut claimed,
            &InstallFlags::default(),
            &mut report,
        );
        assert!(report.is_acceptable());
    }

    #[test]
    fn essential_file_overwrite_is_fatal_even_with_force() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("bin")).expect("mkdir");
        fs::write(root.join("bin/sh"), b"old").expect("write");

        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let mut essential = EssentialFileCache::new();
        essential.add_package("base", &[entry("/bin/sh", EntryKind::Regular, 10)]);
        let item = test_item(&tmp, "a");
        let entries = [entry("/bin/sh", EntryKind::Regular, 10)];

        let flags = InstallFlags {
            force_overwrite: true,
            force_overwrite_dir: true,
            ..InstallFlags::default()
        };
        let mut report = ValidationReport::new();
        plan_package(
            &mut disks, &item, &entries, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        assert!(!report.is_acceptable());
        assert!(report.errors[0].contains("essential"));
    }

    #[test]
    fn conffile_overwrite_defers_with_warning() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("etc")).expect("mkdir");
        fs::write(root.join("etc/a.conf"), b"old").expect("write");

        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let essential = EssentialFileCache::new();
        let mut item = test_item(&tmp, "a");
        item.set_conffiles(vec!["/etc/a.conf".to_string()]);
        let entries = [entry("/etc/a.conf", EntryKind::Regular, 10)];

        let mut report = ValidationReport::new();
        plan_package(
            &mut disks,
            &item,
            &entries,
            None,
            1,
            &root,
            &essential,
            &mut claimed,
            &InstallFlags::default(),
            &mut report,
        );
        assert!(report.is_acceptable());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn file_directory_mismatch_needs_force_dir() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("usr/share/tool")).expect("mkdir");

        let table = mounts(&[("/", 4096, 1 << 30, false)]);
        let mut disks = DiskSet::new(&table).expect("disk set");
        let mut claimed = ClaimedFiles::new();
        let essential = EssentialFileCache::new();
        let item = test_item(&tmp, "a");
        // package ships a regular file where the target has a directory
        let entries = [entry("/usr/share/tool", EntryKind::Regular, 10)];

        let mut report = ValidationReport::new();
        plan_package(
            &mut disks,
            &item,
            &entries,
            None,
            1,
            &root,
            &essential,
            &mut claimed,
            &InstallFlags::default(),
            &mut report,
        );
        assert!(!report.is_acceptable());

        let mut claimed = ClaimedFiles::new();
        let mut report = ValidationReport::new();
        let flags = InstallFlags {
            force_overwrite_dir: true,
            ..InstallFlags::default()
        };
        plan_package(
            &mut disks, &item, &entries, None, 1, &root, &essential, &mut claimed, &flags,
            &mut report,
        );
        assert!(report.is_acceptable());
        assert_eq!(report.warnings.len(), 1);
    }
}
