//! Package items: one candidate per archive file, repository entry, or
//! database record, tagged with the kind that drives planning.

use std::path::{Path, PathBuf};

use crate::archive::{ArchiveEntry, PackageCodec, parse_archive_name};
use crate::control::ControlFile;
use crate::db::PackageDatabase;
use crate::error::{DebToolkitError, Result};
use crate::types::architecture::Architecture;
use crate::types::dependency::DependencyList;
use crate::types::package::{LoadState, PackageKind, PackageStatus, Selection};

/// Where a package item's bytes come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemSource {
    /// A package archive on disk (or from a repository).
    Archive,
    /// An installed record in the package database.
    Database,
}

/// One package candidate under consideration by the planner.
///
/// Items are created from explicit command-line archives, from installed
/// database records, and from repository indexes. The resolver moves items
/// between kinds; the executor consumes the surviving tree.
#[derive(Clone, Debug)]
pub struct PackageItem {
    path: PathBuf,
    source: ItemSource,
    name: String,
    version: String,
    architecture: Architecture,
    kind: PackageKind,
    control: ControlFile,
    conffiles: Vec<String>,
    original_status: Option<PackageStatus>,
    selection: Selection,
    upgrade_link: Option<usize>,
    loaded: LoadState,
    entries: Vec<ArchiveEntry>,
}

impl PackageItem {
    /// What: Build an item from a package archive.
    ///
    /// Inputs:
    /// - `codec`: Archive codec used to read the control metadata.
    /// - `path`: Archive path (basename must match
    ///   `name_version[_arch].deb`).
    /// - `kind`: Initial kind (`Explicit` or `Available`).
    ///
    /// Output:
    /// - Returns the control-loaded item, or a `Parse` error when the
    ///   control file is malformed or disagrees with the file name.
    pub fn from_archive(codec: &dyn PackageCodec, path: &Path, kind: PackageKind) -> Result<Self> {
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DebToolkitError::InvalidInput(format!("invalid package path {}", path.display()))
            })?;
        let Some((file_name, file_version, _)) = parse_archive_name(basename) else {
            return Err(DebToolkitError::Parse(format!(
                "\"{basename}\" does not match the name_version[_arch].deb pattern"
            )));
        };
        let control = codec.read_control(path)?;
        Self::from_control(path, ItemSource::Archive, kind, control, &[], None, Selection::Normal)
            .and_then(|item| {
                if item.name != file_name {
                    return Err(DebToolkitError::Parse(format!(
                        "file {basename} names package \"{}\" in its control file",
                        item.name
                    )));
                }
                if item.version != file_version {
                    return Err(DebToolkitError::Parse(format!(
                        "file {basename} carries version \"{}\" in its control file",
                        item.version
                    )));
                }
                Ok(item)
            })
    }

    /// What: Build an item from a repository index entry.
    ///
    /// Inputs:
    /// - `path`: Resolved archive path inside the repository.
    /// - `control`: Control fields carried by the index.
    ///
    /// Output:
    /// - Returns the item with kind `Available`.
    pub fn from_index(path: &Path, control: ControlFile) -> Result<Self> {
        Self::from_control(
            path,
            ItemSource::Archive,
            PackageKind::Available,
            control,
            &[],
            None,
            Selection::Normal,
        )
    }

    /// What: Build an item from an installed database record.
    ///
    /// Inputs:
    /// - `db`: The package database.
    /// - `name`: Record name.
    ///
    /// Output:
    /// - Returns the item with kind derived from the record's status:
    ///   `installed` -> `Installed`, `unpacked` -> `Unpacked`, anything
    ///   else -> `NotInstalled`.
    pub fn from_database(db: &PackageDatabase, name: &str) -> Result<Self> {
        let control = db.read_control(name)?;
        let status = db.status(name)?;
        let selection = db.selection(name)?;
        let conffiles = db.conffiles(name)?;
        let kind = match status {
            PackageStatus::Installed => PackageKind::Installed,
            PackageStatus::Unpacked => PackageKind::Unpacked,
            _ => PackageKind::NotInstalled,
        };
        Self::from_control(
            &db.record_dir(name),
            ItemSource::Database,
            kind,
            control,
            &conffiles,
            Some(status),
            selection,
        )
    }

    fn from_control(
        path: &Path,
        source: ItemSource,
        kind: PackageKind,
        control: ControlFile,
        conffiles: &[String],
        original_status: Option<PackageStatus>,
        selection: Selection,
    ) -> Result<Self> {
        control.validate_package_fields()?;
        let name = control
            .get("Package")
            .unwrap_or_default()
            .to_string();
        let version = control.get("Version").unwrap_or_default().to_string();
        crate::deps::version::DebVersion::parse(&version)?;
        let architecture = Architecture::parse(control.get("Architecture").unwrap_or_default())?;
        Ok(Self {
            path: path.to_path_buf(),
            source,
            name,
            version,
            architecture,
            kind,
            control,
            conffiles: conffiles.to_vec(),
            original_status,
            selection,
            upgrade_link: None,
            loaded: LoadState::ControlOnly,
            entries: Vec::new(),
        })
    }

    /// What: Return the item's source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What: Return where the item's bytes come from.
    #[must_use]
    pub const fn source(&self) -> ItemSource {
        self.source
    }

    /// What: Return the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What: Return the version text.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// What: Return the parsed architecture.
    #[must_use]
    pub const fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// What: Return the current kind.
    #[must_use]
    pub const fn kind(&self) -> PackageKind {
        self.kind
    }

    /// What: Change the kind.
    pub fn set_kind(&mut self, kind: PackageKind) {
        self.kind = kind;
    }

    /// What: Return the database status the item was loaded with.
    #[must_use]
    pub const fn original_status(&self) -> Option<PackageStatus> {
        self.original_status
    }

    /// What: Return the item's selection.
    #[must_use]
    pub const fn selection(&self) -> Selection {
        self.selection
    }

    /// What: Return the linked upgrade partner index, if any.
    #[must_use]
    pub const fn upgrade_link(&self) -> Option<usize> {
        self.upgrade_link
    }

    /// What: Link this item to its upgrade partner.
    pub fn set_upgrade_link(&mut self, index: usize) {
        self.upgrade_link = Some(index);
    }

    /// What: Look up a control field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.control.get(name)
    }

    /// What: Check whether a control field is defined.
    #[must_use]
    pub fn field_is_defined(&self, name: &str) -> bool {
        self.control.is_defined(name)
    }

    /// What: Read a boolean control field (e.g. `Essential`).
    #[must_use]
    pub fn boolean_field(&self, name: &str) -> bool {
        self.control.boolean(name)
    }

    /// What: Parse a control field as a dependency list.
    pub fn dependencies(&self, field: &str) -> Result<DependencyList> {
        self.control.dependencies(field)
    }

    /// What: Return the whole control file.
    #[must_use]
    pub const fn control(&self) -> &ControlFile {
        &self.control
    }

    /// What: Check whether a target path is one of the item's conffiles.
    #[must_use]
    pub fn is_conffile(&self, path: &str) -> bool {
        self.conffiles.iter().any(|c| c == path)
    }

    /// What: Return the conffile list.
    #[must_use]
    pub fn conffiles(&self) -> &[String] {
        &self.conffiles
    }

    /// What: Replace the conffile list (archive items load it lazily).
    pub fn set_conffiles(&mut self, conffiles: Vec<String>) {
        self.conffiles = conffiles;
    }

    /// What: Check whether the item will be installed by the plan.
    #[must_use]
    pub const fn is_marked_for_install(&self) -> bool {
        self.kind.is_marked_for_install()
    }

    /// What: Return the data entries (empty until fully loaded).
    #[must_use]
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// What: Return how far the item has been loaded.
    #[must_use]
    pub const fn load_state(&self) -> LoadState {
        self.loaded
    }

    /// What: Load the item's data entries.
    ///
    /// Inputs:
    /// - `codec`: Archive codec (archive items).
    /// - `db`: Package database (installed items read their stored index).
    ///
    /// Output:
    /// - Returns an error when the entry source cannot be read.
    ///
    /// Details:
    /// - Archive items also pick up their `conffiles` list here.
    /// - Loading twice is a no-op.
    pub fn load_full(&mut self, codec: &dyn PackageCodec, db: &PackageDatabase) -> Result<()> {
        if self.loaded == LoadState::Full {
            return Ok(());
        }
        match self.source {
            ItemSource::Archive => {
                self.entries = codec.entries(&self.path)?;
                if let Some(bytes) = codec.metadata_file(&self.path, "conffiles")? {
                    let text = String::from_utf8_lossy(&bytes);
                    self.conffiles = text
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(ToString::to_string)
                        .collect();
                }
            }
            ItemSource::Database => {
                self.entries = db.file_index(&self.name)?;
            }
        }
        self.loaded = LoadState::Full;
        Ok(())
    }
}

/// What: Find the first item of a name with one of the given kinds.
///
/// Inputs:
/// - `items`: The master list or a candidate tree.
/// - `name`: Package name to look for.
/// - `kinds`: Acceptable kinds.
///
/// Output:
/// - Returns the index of the first match.
#[must_use]
pub fn find_by_name(items: &[PackageItem], name: &str, kinds: &[PackageKind]) -> Option<usize> {
    items
        .iter()
        .position(|item| item.name() == name && kinds.contains(&item.kind()))
}

/// What: Find the installed record of a name.
///
/// Inputs:
/// - `items`: The master list.
/// - `name`: Package name.
///
/// Output:
/// - Returns the index of the `Installed` or `Unpacked` item of that name.
#[must_use]
pub fn find_installed(items: &[PackageItem], name: &str) -> Option<usize> {
    find_by_name(
        items,
        name,
        &[
            PackageKind::Installed,
            PackageKind::Unpacked,
            PackageKind::Configure,
            PackageKind::Upgrade,
            PackageKind::UpgradeImplicit,
            PackageKind::Downgrade,
        ],
    )
}
