//! Package-related data types: candidate kinds, database statuses,
//! selections, tasks, and the installation flag bag.

use serde::{Deserialize, Serialize};

// === Enums ===

/// Kind of a package item under consideration by the planner.
///
/// Every candidate in the installation universe carries exactly one kind,
/// and the kind drives nearly every resolver and executor branch. Items
/// move between kinds as validation progresses: an `Available` repository
/// entry may become `Implicit` when it is needed, or `Invalid` when it is
/// ruled out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    /// Requested directly by the caller (command line).
    Explicit,
    /// Pulled in from a repository to satisfy a dependency.
    Implicit,
    /// Known from a repository, not yet needed nor ruled out.
    Available,
    /// Recorded in the database but not currently installed.
    NotInstalled,
    /// Currently installed and fully configured.
    Installed,
    /// Unpacked on the target but not yet configured.
    Unpacked,
    /// Will be configured by this operation.
    Configure,
    /// Installed item that an explicit item is about to upgrade.
    Upgrade,
    /// Installed item that an implicit item is about to upgrade.
    UpgradeImplicit,
    /// Installed item that an explicit item is about to downgrade.
    Downgrade,
    /// Ruled out: bad architecture, losing version, conflict victim.
    Invalid,
    /// Ignored because the exact version is already installed.
    Same,
    /// Removed from consideration because its version is older.
    Older,
    /// A repository directory scanned for candidates, then ignored.
    Directory,
}

impl PackageKind {
    /// What: Check whether an item of this kind will be installed.
    ///
    /// Inputs:
    /// - `self`: The kind to check.
    ///
    /// Output:
    /// - Returns `true` when the kind marks the item for installation.
    ///
    /// Details:
    /// - Covers `Explicit`, `Implicit`, `Configure`, `Upgrade`,
    ///   `UpgradeImplicit`, and `Downgrade`.
    #[must_use]
    pub const fn is_marked_for_install(self) -> bool {
        matches!(
            self,
            Self::Explicit
                | Self::Implicit
                | Self::Configure
                | Self::Upgrade
                | Self::UpgradeImplicit
                | Self::Downgrade
        )
    }

    /// What: Check whether this kind describes an installed database record.
    ///
    /// Inputs:
    /// - `self`: The kind to check.
    ///
    /// Output:
    /// - Returns `true` for `Installed`, `Unpacked`, `Configure`,
    ///   `Upgrade`, `UpgradeImplicit`, and `Downgrade`.
    #[must_use]
    pub const fn is_installed_record(self) -> bool {
        matches!(
            self,
            Self::Installed
                | Self::Unpacked
                | Self::Configure
                | Self::Upgrade
                | Self::UpgradeImplicit
                | Self::Downgrade
        )
    }

    /// What: Check whether items of this kind take part in a tree at all.
    ///
    /// Inputs:
    /// - `self`: The kind to check.
    ///
    /// Output:
    /// - Returns `false` for kinds the planner permanently ignores.
    ///
    /// Details:
    /// - `NotInstalled`, `Invalid`, `Same`, `Older`, and `Directory`
    ///   never contribute to a tree.
    #[must_use]
    pub const fn is_considered(self) -> bool {
        !matches!(
            self,
            Self::NotInstalled | Self::Invalid | Self::Same | Self::Older | Self::Directory
        )
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
            Self::Available => "available",
            Self::NotInstalled => "not-installed",
            Self::Installed => "installed",
            Self::Unpacked => "unpacked",
            Self::Configure => "configure",
            Self::Upgrade => "upgrade",
            Self::UpgradeImplicit => "upgrade-implicit",
            Self::Downgrade => "downgrade",
            Self::Invalid => "invalid",
            Self::Same => "same",
            Self::Older => "older",
            Self::Directory => "directory",
        };
        write!(f, "{text}")
    }
}

/// Lifecycle status of a package as recorded in its `wpkg-status` file.
///
/// The `X-Status` field of every database record holds one of these values.
/// Statuses are persisted before each irreversible step so a crash leaves
/// the database consistent with what was actually done on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    /// The package cannot be found at all.
    NoPackage,
    /// The record exists but its status field is unrecognized.
    Unknown,
    /// Known but not installed.
    NotInstalled,
    /// Removed, configuration files kept.
    ConfigFiles,
    /// In the act of installing right now.
    Installing,
    /// In the act of upgrading right now.
    Upgrading,
    /// Install or upgrade failed midway.
    HalfInstalled,
    /// Files are on disk, not yet configured.
    Unpacked,
    /// Configuration failed midway.
    HalfConfigured,
    /// Unpacked and configured.
    Installed,
    /// In the act of removing.
    Removing,
    /// In the act of purging.
    Purging,
    /// Core record: a listing operation is running.
    Listing,
    /// Core record: a verification is running.
    Verifying,
    /// Core record: normal idle state.
    Ready,
}

impl PackageStatus {
    /// What: Parse a status string from a `wpkg-status` file.
    ///
    /// Inputs:
    /// - `text`: The raw `X-Status` field value.
    ///
    /// Output:
    /// - Returns the matching status, or `Unknown` for unrecognized text.
    ///
    /// Details:
    /// - Matching is exact on the canonical lowercase spellings.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "not-installed" => Self::NotInstalled,
            "config-files" => Self::ConfigFiles,
            "installing" => Self::Installing,
            "upgrading" => Self::Upgrading,
            "half-installed" => Self::HalfInstalled,
            "unpacked" => Self::Unpacked,
            "half-configured" => Self::HalfConfigured,
            "installed" => Self::Installed,
            "removing" => Self::Removing,
            "purging" => Self::Purging,
            "listing" => Self::Listing,
            "verifying" => Self::Verifying,
            "ready" => Self::Ready,
            _ => Self::Unknown,
        }
    }

    /// What: Return the canonical status string.
    ///
    /// Inputs:
    /// - `self`: The status to render.
    ///
    /// Output:
    /// - Returns the lowercase spelling written to `wpkg-status`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoPackage => "no-package",
            Self::Unknown => "unknown",
            Self::NotInstalled => "not-installed",
            Self::ConfigFiles => "config-files",
            Self::Installing => "installing",
            Self::Upgrading => "upgrading",
            Self::HalfInstalled => "half-installed",
            Self::Unpacked => "unpacked",
            Self::HalfConfigured => "half-configured",
            Self::Installed => "installed",
            Self::Removing => "removing",
            Self::Purging => "purging",
            Self::Listing => "listing",
            Self::Verifying => "verifying",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-package selection controlling automatic operations.
///
/// Stored in the `X-Selection` field of the status file. `Hold` disables
/// implicit upgrades and downgrades; `Reject` prevents installation
/// entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// No restriction.
    #[default]
    Normal,
    /// The package may not be upgraded or downgraded implicitly.
    Hold,
    /// The package may not be installed at all.
    Reject,
}

impl Selection {
    /// What: Parse a selection string from a status file.
    ///
    /// Inputs:
    /// - `text`: The raw `X-Selection` value.
    ///
    /// Output:
    /// - Returns the matching selection, defaulting to `Normal`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.to_ascii_lowercase().as_str() {
            "hold" => Self::Hold,
            "reject" => Self::Reject,
            _ => Self::Normal,
        }
    }

    /// What: Return the canonical selection string.
    ///
    /// Inputs:
    /// - `self`: The selection to render.
    ///
    /// Output:
    /// - Returns the capitalized spelling written to the status file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Hold => "Hold",
            Self::Reject => "Reject",
        }
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task driving a planner session.
///
/// The task decides how far the lifecycle runs for each package and which
/// cross-checks apply (`Breaks` is skipped entirely when only unpacking).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Full resolve, unpack, and configure.
    Install,
    /// Resolve and unpack only; stop before configure.
    Unpack,
    /// Configure previously unpacked packages.
    Configure,
    /// Re-run configuration on installed packages.
    Reconfigure,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Install => "install",
            Self::Unpack => "unpack",
            Self::Configure => "configure",
            Self::Reconfigure => "reconfigure",
        };
        write!(f, "{text}")
    }
}

/// How far a package item has been loaded from its source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing read yet.
    #[default]
    NotLoaded,
    /// Control metadata parsed; data entries not yet enumerated.
    ControlOnly,
    /// Control metadata and data entries both loaded.
    Full,
}

// === Flag bag ===

/// Safety-check overrides recognized by the planner and executor.
///
/// Each flag inverts exactly one check; everything defaults to off except
/// where an operation's entry point documents otherwise (`force_rollback`
/// is enabled by the install and upgrade entry points).
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InstallFlags {
    /// Allow installation whatever the architecture.
    pub force_architecture: bool,
    /// Allow installation despite `Breaks` declarations.
    pub force_breaks: bool,
    /// Allow auto-configuration of unpacked packages.
    pub force_configure_any: bool,
    /// Allow installation despite `Conflicts` declarations.
    pub force_conflicts: bool,
    /// Allow installation with missing dependencies.
    pub force_depends: bool,
    /// Allow installation with wrong dependency versions.
    pub force_depends_version: bool,
    /// Allow packages without a matching distribution field.
    pub force_distribution: bool,
    /// Allow explicit downgrades of installed packages.
    pub force_downgrade: bool,
    /// Allow chmod/chown failures while extracting.
    pub force_file_info: bool,
    /// Allow explicit upgrades/downgrades of held packages.
    pub force_hold: bool,
    /// Allow new packages to overwrite existing files.
    pub force_overwrite: bool,
    /// Allow files to replace directories and vice versa.
    pub force_overwrite_dir: bool,
    /// Roll back completed steps when the operation fails.
    pub force_rollback: bool,
    /// Ignore `Minimum-Upgradable-Version` gates.
    pub force_upgrade_any_version: bool,
    /// Allow installation with an incompatible vendor string.
    pub force_vendor: bool,
    /// Do not print chmod/chown warnings.
    pub quiet_file_info: bool,
    /// Read sub-directories of direct repositories.
    pub recursive: bool,
    /// Skip explicit packages already installed at the same version.
    pub skip_same_version: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_marked_for_install() {
        assert!(PackageKind::Explicit.is_marked_for_install());
        assert!(PackageKind::Implicit.is_marked_for_install());
        assert!(PackageKind::Upgrade.is_marked_for_install());
        assert!(!PackageKind::Available.is_marked_for_install());
        assert!(!PackageKind::Installed.is_marked_for_install());
        assert!(!PackageKind::Invalid.is_marked_for_install());
    }

    #[test]
    fn kind_considered() {
        assert!(PackageKind::Explicit.is_considered());
        assert!(PackageKind::Available.is_considered());
        assert!(!PackageKind::Invalid.is_considered());
        assert!(!PackageKind::Directory.is_considered());
        assert!(!PackageKind::Older.is_considered());
    }

    #[test]
    fn status_round_trip() {
        for status in [
            PackageStatus::NotInstalled,
            PackageStatus::ConfigFiles,
            PackageStatus::Installing,
            PackageStatus::Upgrading,
            PackageStatus::HalfInstalled,
            PackageStatus::Unpacked,
            PackageStatus::HalfConfigured,
            PackageStatus::Installed,
            PackageStatus::Removing,
            PackageStatus::Purging,
            PackageStatus::Listing,
            PackageStatus::Verifying,
            PackageStatus::Ready,
        ] {
            assert_eq!(PackageStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn status_unrecognized_is_unknown() {
        assert_eq!(PackageStatus::parse("banana"), PackageStatus::Unknown);
        assert_eq!(PackageStatus::parse(""), PackageStatus::Unknown);
    }

    #[test]
    fn selection_parse_is_case_insensitive() {
        assert_eq!(Selection::parse("Hold"), Selection::Hold);
        assert_eq!(Selection::parse("hold"), Selection::Hold);
        assert_eq!(Selection::parse("REJECT"), Selection::Reject);
        assert_eq!(Selection::parse("normal"), Selection::Normal);
        assert_eq!(Selection::parse("whatever"), Selection::Normal);
    }

    #[test]
    fn flags_default_to_off() {
        let flags = InstallFlags::default();
        assert!(!flags.force_depends);
        assert!(!flags.force_conflicts);
        assert!(!flags.force_rollback);
        assert!(!flags.skip_same_version);
    }

    #[test]
    fn serde_round_trip_kind() {
        let kinds = vec![
            PackageKind::Explicit,
            PackageKind::Available,
            PackageKind::UpgradeImplicit,
            PackageKind::Directory,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).expect("serialization should succeed");
            let back: PackageKind =
                serde_json::from_str(&json).expect("deserialization should succeed");
            assert_eq!(kind, back);
        }
    }
}
