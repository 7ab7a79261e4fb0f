//! Narrow interface to the package archive codec.
//!
//! The low-level `.deb` codec (ar + tar + compression) is an external
//! collaborator. The planner only needs three capabilities: read the
//! control metadata, enumerate data entries with per-entry metadata, and
//! extract one entry's bytes. `PackageCodec` captures exactly that seam,
//! and `DirectoryCodec` implements it over exploded package directories
//! (used by the test suite and by repositories of unpacked packages).
//!
//! Entries whose path begins with `/` install into the target; everything
//! else is database-internal metadata (control file, maintainer scripts,
//! conffile list).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::control::ControlFile;
use crate::error::{DebToolkitError, Result};

/// File type of an archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Any other entry type (device, fifo, ...).
    Other,
}

/// Metadata of one archive entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Entry path; target files start with `/`.
    pub path: String,
    /// Entry file type.
    pub kind: EntryKind,
    /// Entry size in bytes (0 for directories).
    pub size: u64,
    /// Unix permission bits.
    pub mode: u32,
}

/// Maintainer script names a package may ship, in lifecycle order.
pub const SCRIPT_NAMES: &[&str] = &["validate", "preinst", "postinst", "prerm", "postrm"];

/// Read-side interface over one package archive.
///
/// Implementations decode whatever container format they support; the
/// planner never looks inside the container itself.
pub trait PackageCodec {
    /// Read and parse the package's control file.
    fn read_control(&self, package: &Path) -> Result<ControlFile>;

    /// Enumerate the package's data entries (paths starting with `/`).
    fn entries(&self, package: &Path) -> Result<Vec<ArchiveEntry>>;

    /// Extract one data entry to `destination`.
    fn extract_to(&self, package: &Path, entry_path: &str, destination: &Path) -> Result<()>;

    /// Read a database-internal metadata file (e.g. `conffiles`,
    /// `preinst`), or `None` when the package does not ship it.
    fn metadata_file(&self, package: &Path, name: &str) -> Result<Option<Vec<u8>>>;
}

/// What: Check whether a path looks like a package archive.
///
/// Inputs:
/// - `path`: Candidate path.
///
/// Output:
/// - Returns `true` when the basename matches the underscore-separated
///   `name_version[_arch].deb` pattern.
#[must_use]
pub fn is_archive_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| parse_archive_name(n).is_some())
}

/// What: Split an archive basename into its components.
///
/// Inputs:
/// - `basename`: File name such as `t1_1.0_all.deb`.
///
/// Output:
/// - Returns `(name, version, architecture)` with the architecture
///   optional, or `None` when the basename does not match the pattern.
///
/// Details:
/// - The `.deb` suffix is required; anything else is treated as an
///   installed-record name by the store.
#[must_use]
pub fn parse_archive_name(basename: &str) -> Option<(String, String, Option<String>)> {
    let stem = basename.strip_suffix(".deb")?;
    let parts: Vec<&str> = stem.split('_').collect();
    match parts.as_slice() {
        [name, version] if !name.is_empty() && !version.is_empty() => {
            Some(((*name).to_string(), (*version).to_string(), None))
        }
        [name, version, arch] if !name.is_empty() && !version.is_empty() && !arch.is_empty() => {
            Some((
                (*name).to_string(),
                (*version).to_string(),
                Some((*arch).to_string()),
            ))
        }
        _ => None,
    }
}

/// Codec over exploded package directories.
///
/// A package is a directory named `name_version[_arch].deb` containing a
/// `control` file, optional maintainer scripts and `conffiles` at the top
/// level, and a `data/` subtree whose relative paths become absolute
/// target paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryCodec;

impl DirectoryCodec {
    /// What: Create a directory codec.
    ///
    /// Inputs: None
    ///
    /// Output:
    /// - Returns the codec value (stateless).
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn data_root(package: &Path) -> PathBuf {
        package.join("data")
    }

    /// What: Resolve an entry path inside the package's data tree.
    ///
    /// Inputs:
    /// - `package`: The package directory.
    /// - `entry_path`: Absolute-style entry path (`/usr/bin/t1`).
    ///
    /// Output:
    /// - Returns the on-disk source path for the entry.
    fn entry_source(package: &Path, entry_path: &str) -> Result<PathBuf> {
        let relative = entry_path.strip_prefix('/').ok_or_else(|| {
            DebToolkitError::InvalidInput(format!(
                "entry path \"{entry_path}\" is not a target path"
            ))
        })?;
        Ok(Self::data_root(package).join(relative))
    }

    fn walk(dir: &Path, prefix: &str, entries: &mut Vec<ArchiveEntry>) -> Result<()> {
        let mut names: Vec<_> = fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.file_name())
            .collect();
        names.sort();
        for name in names {
            let source = dir.join(&name);
            let name = name.to_string_lossy().into_owned();
            let path = format!("{prefix}/{name}");
            let metadata = fs::symlink_metadata(&source)?;
            let kind = if metadata.file_type().is_symlink() {
                EntryKind::Symlink
            } else if metadata.is_dir() {
                EntryKind::Directory
            } else if metadata.is_file() {
                EntryKind::Regular
            } else {
                EntryKind::Other
            };
            entries.push(ArchiveEntry {
                path: path.clone(),
                kind,
                size: if kind == EntryKind::Directory { 0 } else { metadata.len() },
                mode: entry_mode(&metadata),
            });
            if kind == EntryKind::Directory {
                Self::walk(&source, &path, entries)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn entry_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn entry_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() { 0o755 } else { 0o644 }
}

impl PackageCodec for DirectoryCodec {
    fn read_control(&self, package: &Path) -> Result<ControlFile> {
        let control_path = package.join("control");
        let text = fs::read_to_string(&control_path).map_err(|e| {
            DebToolkitError::Parse(format!(
                "cannot read control file of {}: {e}",
                package.display()
            ))
        })?;
        let control = ControlFile::parse(&text)?;
        control.validate_package_fields()?;
        Ok(control)
    }

    fn entries(&self, package: &Path) -> Result<Vec<ArchiveEntry>> {
        let data = Self::data_root(package);
        let mut entries = Vec::new();
        if data.is_dir() {
            Self::walk(&data, "", &mut entries)?;
        }
        Ok(entries)
    }

    fn extract_to(&self, package: &Path, entry_path: &str, destination: &Path) -> Result<()> {
        let source = Self::entry_source(package, entry_path)?;
        let metadata = fs::symlink_metadata(&source)?;
        if metadata.is_dir() {
            fs::create_dir_all(destination)?;
            return Ok(());
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&source)?;
            if destination.exists() || fs::symlink_metadata(destination).is_ok() {
                fs::remove_file(destination)?;
            }
            std::os::unix::fs::symlink(target, destination)?;
            return Ok(());
        }
        fs::copy(&source, destination)?;
        Ok(())
    }

    fn metadata_file(&self, package: &Path, name: &str) -> Result<Option<Vec<u8>>> {
        let path = package.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_package(root: &Path) -> PathBuf {
        let pkg = root.join("t1_1.0_all.deb");
        fs::create_dir_all(pkg.join("data/usr/bin")).expect("mkdir");
        fs::create_dir_all(pkg.join("data/etc")).expect("mkdir");
        fs::write(
            pkg.join("control"),
            "Package: t1\nVersion: 1.0\nArchitecture: all\n",
        )
        .expect("write control");
        fs::write(pkg.join("data/usr/bin/t1"), b"#!/bin/sh\n").expect("write binary");
        fs::write(pkg.join("data/etc/t1.conf"), b"answer=42\n").expect("write conf");
        fs::write(pkg.join("conffiles"), "/etc/t1.conf\n").expect("write conffiles");
        pkg
    }

    #[test]
    fn archive_name_pattern() {
        assert_eq!(
            parse_archive_name("t1_1.0.deb"),
            Some(("t1".to_string(), "1.0".to_string(), None))
        );
        assert_eq!(
            parse_archive_name("t1_1.0_all.deb"),
            Some(("t1".to_string(), "1.0".to_string(), Some("all".to_string())))
        );
        assert_eq!(parse_archive_name("t1.deb"), None);
        assert_eq!(parse_archive_name("t1_1.0"), None);
        assert_eq!(parse_archive_name("t1_1.0_all_extra.deb"), None);
        assert_eq!(parse_archive_name("_1.0.deb"), None);
    }

    #[test]
    fn is_archive_path_checks_basename() {
        assert!(is_archive_path(Path::new("/repo/t1_1.0_all.deb")));
        assert!(!is_archive_path(Path::new("/repo/t1")));
        assert!(!is_archive_path(Path::new("installed-name")));
    }

    #[test]
    fn read_control_and_entries() {
        let tmp = TempDir::new().expect("tempdir");
        let pkg = build_package(tmp.path());
        let codec = DirectoryCodec::new();

        let control = codec.read_control(&pkg).expect("control should parse");
        assert_eq!(control.get("Package"), Some("t1"));

        let entries = codec.entries(&pkg).expect("entries should list");
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            ["/etc", "/etc/t1.conf", "/usr", "/usr/bin", "/usr/bin/t1"]
        );
        let conf = entries
            .iter()
            .find(|e| e.path == "/etc/t1.conf")
            .expect("conf entry");
        assert_eq!(conf.kind, EntryKind::Regular);
        assert_eq!(conf.size, 10);
        let dir = entries.iter().find(|e| e.path == "/usr").expect("dir entry");
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn extract_copies_file() {
        let tmp = TempDir::new().expect("tempdir");
        let pkg = build_package(tmp.path());
        let codec = DirectoryCodec::new();

        let dest = tmp.path().join("target/etc/t1.conf");
        codec
            .extract_to(&pkg, "/etc/t1.conf", &dest)
            .expect("extract should succeed");
        assert_eq!(fs::read(&dest).expect("read back"), b"answer=42\n");
    }

    #[test]
    fn metadata_files() {
        let tmp = TempDir::new().expect("tempdir");
        let pkg = build_package(tmp.path());
        let codec = DirectoryCodec::new();

        let conffiles = codec
            .metadata_file(&pkg, "conffiles")
            .expect("read should succeed")
            .expect("conffiles shipped");
        assert_eq!(conffiles, b"/etc/t1.conf\n");
        assert!(
            codec
                .metadata_file(&pkg, "preinst")
                .expect("read should succeed")
                .is_none()
        );
    }

    #[test]
    fn missing_control_is_parse_error() {
        let tmp = TempDir::new().expect("tempdir");
        let pkg = tmp.path().join("bad_1.0.deb");
        fs::create_dir_all(&pkg).expect("mkdir");
        let codec = DirectoryCodec::new();
        assert!(matches!(
            codec.read_control(&pkg),
            Err(DebToolkitError::Parse(_))
        ));
    }
}
