//! The installation planner and executor.
//!
//! An [`Installer`] drives one operation end to end: it collects explicit
//! package references, validates the plan (names, architecture,
//! distribution, pre-dependencies, dependency resolution, disk space,
//! overwrites, script flavors), freezes the chosen tree, and then applies
//! it package by package through the validate -> preinst -> unpack ->
//! postinst -> configure lifecycle, journaling every state-changing step
//! for rollback.

pub mod item;
pub mod journal;
pub mod scripts;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveEntry, EntryKind, is_archive_path};
use crate::deps::resolve::{DEPENDENCY_FIELDS, Resolver};
use crate::deps::version::versioncmp;
use crate::disk::{ClaimedFiles, DiskSet, EssentialFileCache, FixedMounts, MountTable, plan_package};
use crate::error::{DebToolkitError, Result, ValidationReport};
use crate::installer::item::{ItemSource, PackageItem, find_by_name};
use crate::installer::journal::{Journal, JournalEntry};
use crate::installer::scripts::{
    ScriptFlavor, run_hooks, run_maintainer_script, validate_script_flavor,
};
use crate::repository::{
    RemoteFetcher, RepositoryIndex, entry_path, load_direct_repository, load_remote_repository,
};
use crate::store::{Interrupt, NoInterrupt, PackageStore};
use crate::types::architecture::Architecture;
use crate::types::package::{InstallFlags, PackageKind, PackageStatus, Selection, Task};

/// The installation planner and executor for one operation.
///
/// Create one per command, add explicit packages and repositories, then
/// call [`Installer::validate`] followed by [`Installer::run`] (or let
/// `run` validate implicitly).
pub struct Installer {
    store: PackageStore,
    flags: InstallFlags,
    task: Task,
    packages: Vec<PackageItem>,
    pending_names: Vec<String>,
    sorted: Vec<usize>,
    repositories: Vec<String>,
    interrupt: Box<dyn Interrupt>,
    mounts: Box<dyn MountTable>,
    fetcher: Option<Box<dyn RemoteFetcher>>,
    target_arch: Option<Architecture>,
    validated: bool,
}

impl Installer {
    /// What: Create an installer session.
    ///
    /// Inputs:
    /// - `store`: The package store over the target's database.
    /// - `task`: The operation to perform.
    ///
    /// Output:
    /// - Returns the session with default flags; `force_rollback` starts
    ///   enabled for the install and unpack tasks.
    #[must_use]
    pub fn new(store: PackageStore, task: Task) -> Self {
        let flags = InstallFlags {
            force_rollback: matches!(task, Task::Install | Task::Unpack),
            ..InstallFlags::default()
        };
        Self {
            store,
            flags,
            task,
            packages: Vec::new(),
            pending_names: Vec::new(),
            sorted: Vec::new(),
            repositories: Vec::new(),
            interrupt: Box::new(NoInterrupt),
            mounts: Box::new(FixedMounts::single_root()),
            fetcher: None,
            target_arch: None,
            validated: false,
        }
    }

    /// What: Access the flag bag mutably (before validation).
    pub fn flags_mut(&mut self) -> &mut InstallFlags {
        &mut self.flags
    }

    /// What: Access the underlying store.
    #[must_use]
    pub const fn store(&self) -> &PackageStore {
        &self.store
    }

    /// What: Access the underlying store mutably.
    pub fn store_mut(&mut self) -> &mut PackageStore {
        &mut self.store
    }

    /// What: Give the store back after the operation.
    #[must_use]
    pub fn into_store(self) -> PackageStore {
        self.store
    }

    /// What: Install an interrupt hook polled at checkpoints.
    pub fn set_interrupt(&mut self, interrupt: Box<dyn Interrupt>) {
        self.interrupt = interrupt;
    }

    /// What: Replace the mount enumeration collaborator.
    pub fn set_mount_table(&mut self, mounts: Box<dyn MountTable>) {
        self.mounts = mounts;
    }

    /// What: Install the remote repository fetch collaborator.
    pub fn set_remote_fetcher(&mut self, fetcher: Box<dyn RemoteFetcher>) {
        self.fetcher = Some(fetcher);
    }

    /// What: Add a repository URI consulted for implicit dependencies.
    pub fn add_repository(&mut self, uri: impl Into<String>) {
        self.repositories.push(uri.into());
    }

    /// What: Add every repository listed in `core/sources.list`.
    ///
    /// Inputs:
    /// - `self`: The session.
    ///
    /// Output:
    /// - Returns a `Parse` error for a malformed sources list or
    ///   `WPKG_SUBST` value; a missing sources list adds nothing.
    pub fn add_sources_list(&mut self) -> Result<()> {
        let path = self.store.db().sources_list_path();
        if !path.is_file() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&path)?;
        let subst = crate::env::env_subst()?;
        for entry in crate::repository::parse_sources_list(&text)? {
            for uri in entry.resolved_uris() {
                self.repositories.push(crate::env::substitute_uri(&uri, &subst));
            }
        }
        Ok(())
    }

    /// What: Add one explicit package reference.
    ///
    /// Inputs:
    /// - `reference`: An archive path (basename matching
    ///   `name_version[_arch].deb`), a directory of archives (requires the
    ///   `recursive` flag), or a package name.
    ///
    /// Output:
    /// - Returns a `Parse` error for an unreadable archive.
    ///
    /// Details:
    /// - For the install and unpack tasks, a bare name is resolved
    ///   against the repositories during validation. For the configure
    ///   and reconfigure tasks a bare name refers to an installed record.
    pub fn add_package(&mut self, reference: &str) -> Result<()> {
        self.validated = false;
        let path = Path::new(reference);
        if is_archive_path(path) {
            if matches!(self.task, Task::Configure | Task::Reconfigure) {
                return Err(DebToolkitError::InvalidInput(format!(
                    "the {} task expects installed package names, not archives",
                    self.task
                )));
            }
            if self.packages.iter().any(|p| p.path() == path) {
                return Ok(());
            }
            let item =
                PackageItem::from_archive(self.store.codec(), path, PackageKind::Explicit)?;
            tracing::debug!("explicit package {} {}", item.name(), item.version());
            self.packages.push(item);
            return Ok(());
        }
        if path.is_dir() {
            if !self.flags.recursive {
                return Err(DebToolkitError::InvalidInput(format!(
                    "{reference} is a directory; use the recursive flag to \
                     install the packages it contains"
                )));
            }
            let mut found = Vec::new();
            collect_archives(path, &mut found)?;
            found.sort();
            for archive in found {
                self.add_package(&archive.to_string_lossy())?;
            }
            return Ok(());
        }
        self.pending_names.push(reference.to_string());
        Ok(())
    }

    /// What: Return the number of package items under consideration.
    #[must_use]
    pub fn count(&self) -> usize {
        self.packages.len()
    }

    /// What: Return the name of a package item.
    #[must_use]
    pub fn package_name(&self, idx: usize) -> Option<&str> {
        self.packages.get(idx).map(PackageItem::name)
    }

    /// What: Return the items marked for installation, in execution order.
    #[must_use]
    pub fn install_order(&self) -> Vec<&PackageItem> {
        self.sorted.iter().map(|&idx| &self.packages[idx]).collect()
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.stop_now() {
            return Err(DebToolkitError::Interrupted);
        }
        Ok(())
    }

    fn target_arch(&self) -> &Architecture {
        self.target_arch
            .as_ref()
            .expect("target architecture is loaded before use")
    }

    fn flavor(&self) -> ScriptFlavor {
        ScriptFlavor::for_target(self.target_arch())
    }

    // === Validation ===

    /// What: Validate the operation and freeze the installation tree.
    ///
    /// Inputs:
    /// - `self`: The session.
    ///
    /// Output:
    /// - Returns the first fatal resolver error, or the aggregated disk
    ///   and overwrite report when that phase rejects the plan.
    ///
    /// Details:
    /// - Pre-dependencies are verified before any repository load; the
    ///   tree is completely frozen before `run` touches the disk.
    pub fn validate(&mut self) -> Result<()> {
        let core = self.store.db().read_control("core")?;
        let arch_text = core.get("Architecture").ok_or_else(|| {
            DebToolkitError::DatabaseCorrupt(
                "the core record has no Architecture field".to_string(),
            )
        })?;
        let target = Architecture::parse(arch_text)?;
        self.target_arch = Some(target.clone());

        if matches!(self.task, Task::Configure | Task::Reconfigure) {
            self.validate_configure_targets()?;
            self.validated = true;
            return Ok(());
        }

        if self.packages.is_empty() && self.pending_names.is_empty() {
            return Err(DebToolkitError::InvalidInput(
                "no packages were specified".to_string(),
            ));
        }

        self.validate_package_names()?;
        self.load_installed_packages()?;
        self.validate_selections()?;
        self.validate_architecture()?;
        self.validate_distribution(&core)?;

        for idx in 0..self.packages.len() {
            if self.packages[idx].kind() == PackageKind::Explicit {
                self.mark_against_installed(idx)?;
            }
        }

        let self_contained = {
            let resolver =
                Resolver::new(&self.flags, self.task, &target, self.interrupt.as_ref());
            resolver.validate_predependencies(&mut self.packages)?;
            resolver.validate_dependency_fields(&self.packages)?;
            resolver.installed_dependencies_satisfied(&mut self.packages)?
        };
        if !self_contained || !self.pending_names.is_empty() {
            self.load_repositories()?;
            self.resolve_pending_names()?;
        }

        {
            let mut resolver =
                Resolver::new(&self.flags, self.task, &target, self.interrupt.as_ref());
            resolver.trim_packages(&mut self.packages)?;
            resolver.resolve_tree(&mut self.packages)?;
        }

        self.load_plan_entries()?;
        self.validate_size_and_overwrites()?;
        self.validate_scripts()?;
        self.sort_packages()?;
        self.detect_self_upgrade();

        self.validated = true;
        Ok(())
    }

    fn validate_configure_targets(&mut self) -> Result<()> {
        if self.pending_names.is_empty() {
            return Err(DebToolkitError::InvalidInput(
                "no packages were specified".to_string(),
            ));
        }
        let names = std::mem::take(&mut self.pending_names);
        for name in names {
            let mut item = PackageItem::from_database(self.store.db(), &name)?;
            let status = item.original_status().unwrap_or(PackageStatus::NoPackage);
            match (self.task, status) {
                (Task::Configure, PackageStatus::Unpacked | PackageStatus::HalfConfigured)
                | (Task::Reconfigure, PackageStatus::Installed) => {}
                (Task::Configure, other) => {
                    return Err(DebToolkitError::Constraint(format!(
                        "package {name} is {other}, not unpacked; it cannot be \
                         configured"
                    )));
                }
                (Task::Reconfigure, other) => {
                    return Err(DebToolkitError::Constraint(format!(
                        "package {name} is {other}, not installed; it cannot be \
                         reconfigured"
                    )));
                }
                _ => unreachable!("validate_configure_targets only handles configure tasks"),
            }
            item.set_kind(PackageKind::Configure);
            self.packages.push(item);
            self.sorted.push(self.packages.len() - 1);
        }
        self.sorted
            .sort_by(|&a, &b| self.packages[a].name().cmp(self.packages[b].name()));
        Ok(())
    }

    /// What: Reject two distinct explicit files naming the same package.
    fn validate_package_names(&mut self) -> Result<()> {
        for i in 0..self.packages.len() {
            for j in (i + 1)..self.packages.len() {
                if self.packages[i].kind() != PackageKind::Explicit
                    || self.packages[j].kind() != PackageKind::Explicit
                    || self.packages[i].name() != self.packages[j].name()
                {
                    continue;
                }
                if self.packages[i].path() == self.packages[j].path() {
                    self.packages[j].set_kind(PackageKind::Invalid);
                } else {
                    return Err(DebToolkitError::Constraint(format!(
                        "files {} and {} define the same package (their Package \
                         field match) but are distinct files",
                        self.packages[i].path().display(),
                        self.packages[j].path().display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// What: Load every installed database record into the universe.
    fn load_installed_packages(&mut self) -> Result<()> {
        let names: Vec<String> = self.store.list_installed_packages()?.to_vec();
        for name in names {
            self.check_interrupt()?;
            let item = PackageItem::from_database(self.store.db(), &name)?;
            match item.original_status() {
                Some(
                    PackageStatus::Installing
                    | PackageStatus::Upgrading
                    | PackageStatus::HalfInstalled
                    | PackageStatus::HalfConfigured
                    | PackageStatus::Removing
                    | PackageStatus::Purging,
                ) => {
                    return Err(DebToolkitError::DatabaseCorrupt(format!(
                        "package {name} is in an inconsistent state ({}); fix it \
                         before installing anything else",
                        item.original_status().unwrap_or(PackageStatus::Unknown)
                    )));
                }
                _ => {}
            }
            self.packages.push(item);
        }
        Ok(())
    }

    /// What: Refuse to install packages whose selection is `Reject`.
    fn validate_selections(&self) -> Result<()> {
        for item in &self.packages {
            if item.kind() != PackageKind::Explicit {
                continue;
            }
            if self.store.db().selection(item.name())? == Selection::Reject {
                return Err(DebToolkitError::Constraint(format!(
                    "package {} is marked as rejected and cannot be installed",
                    item.name()
                )));
            }
        }
        Ok(())
    }

    /// What: Check explicit packages against the target architecture.
    fn validate_architecture(&self) -> Result<()> {
        let target = self.target_arch();
        for item in &self.packages {
            if item.kind() != PackageKind::Explicit || item.architecture().is_source() {
                continue;
            }
            let compatible = item.architecture().matches(target, !self.flags.force_vendor);
            if compatible {
                continue;
            }
            let message = format!(
                "package {} has architecture {} which is incompatible with the \
                 target architecture {target}",
                item.name(),
                item.architecture()
            );
            if self.flags.force_architecture {
                tracing::warn!("{message}");
            } else {
                return Err(DebToolkitError::Constraint(message));
            }
        }
        Ok(())
    }

    /// What: Check explicit packages against the target distribution.
    fn validate_distribution(&self, core: &crate::control::ControlFile) -> Result<()> {
        let Some(distribution) = core.get("Distribution") else {
            return Ok(());
        };
        for item in &self.packages {
            if item.kind() != PackageKind::Explicit {
                continue;
            }
            let matched = item.field("Distribution") == Some(distribution);
            if matched {
                continue;
            }
            let message = format!(
                "package {} does not carry the target distribution \
                 \"{distribution}\"",
                item.name()
            );
            if self.flags.force_distribution {
                tracing::warn!("{message}");
            } else {
                return Err(DebToolkitError::Constraint(message));
            }
        }
        Ok(())
    }

    /// What: Pair one explicit item with its installed record.
    ///
    /// Details:
    /// - Equal versions become `Same` (a plain re-configure unless
    ///   `skip_same_version`); newer versions mark the record `Upgrade`
    ///   after the hold and `Minimum-Upgradable-Version` gates; older
    ///   versions require `force_downgrade` and mark it `Downgrade`.
    fn mark_against_installed(&mut self, explicit_idx: usize) -> Result<()> {
        let name = self.packages[explicit_idx].name().to_string();
        let Some(installed_idx) = find_by_name(
            &self.packages,
            &name,
            &[PackageKind::Installed, PackageKind::Unpacked],
        ) else {
            return Ok(());
        };

        let new_version = self.packages[explicit_idx].version().to_string();
        let old_version = self.packages[installed_idx].version().to_string();
        let held = self.packages[installed_idx].selection() == Selection::Hold;
        match versioncmp(&old_version, &new_version) {
            std::cmp::Ordering::Equal => {
                self.packages[explicit_idx].set_kind(PackageKind::Same);
                if self.flags.skip_same_version {
                    tracing::debug!("{name} {new_version} is already installed; skipping");
                } else if self.packages[installed_idx].original_status()
                    == Some(PackageStatus::Installed)
                {
                    // re-run the configuration only
                    self.packages[installed_idx].set_kind(PackageKind::Configure);
                }
                Ok(())
            }
            std::cmp::Ordering::Less => {
                if held && !self.flags.force_hold {
                    return Err(DebToolkitError::Constraint(format!(
                        "package {name} is on hold; use force-hold to upgrade it"
                    )));
                }
                if let Some(minimum) =
                    self.packages[explicit_idx].field("Minimum-Upgradable-Version")
                {
                    let minimum = minimum.to_string();
                    if versioncmp(&old_version, &minimum) == std::cmp::Ordering::Less
                        && !self.flags.force_upgrade_any_version
                    {
                        return Err(DebToolkitError::Constraint(format!(
                            "version {new_version} of {name} requires at least \
                             version {minimum} to be installed, but {old_version} \
                             was found"
                        )));
                    }
                }
                tracing::debug!("{name}: upgrade {old_version} -> {new_version}");
                self.packages[installed_idx].set_kind(PackageKind::Upgrade);
                self.packages[explicit_idx].set_upgrade_link(installed_idx);
                Ok(())
            }
            std::cmp::Ordering::Greater => {
                if held && !self.flags.force_hold {
                    return Err(DebToolkitError::Constraint(format!(
                        "package {name} is on hold; use force-hold to downgrade it"
                    )));
                }
                if !self.flags.force_downgrade {
                    return Err(DebToolkitError::Constraint(format!(
                        "package {name} {old_version} is installed and newer than \
                         {new_version}; use force-downgrade to downgrade it"
                    )));
                }
                tracing::warn!("{name}: downgrade {old_version} -> {new_version}");
                self.packages[installed_idx].set_kind(PackageKind::Downgrade);
                self.packages[explicit_idx].set_upgrade_link(installed_idx);
                Ok(())
            }
        }
    }

    /// What: Load every repository into `Available` items.
    fn load_repositories(&mut self) -> Result<()> {
        let target = self.target_arch().clone();
        for uri in self.repositories.clone() {
            self.check_interrupt()?;
            let repo_path = PathBuf::from(&uri);
            let index: Option<RepositoryIndex> = if repo_path.is_dir() {
                Some(load_direct_repository(
                    &repo_path,
                    self.flags.recursive,
                    self.store.codec(),
                )?)
            } else if let Some(fetcher) = self.fetcher.as_deref() {
                load_remote_repository(fetcher, &uri)?
            } else {
                tracing::debug!("skip repository {uri}: not a directory and no fetcher");
                None
            };
            let Some(index) = index else { continue };

            for entry in &index.packages {
                let control = RepositoryIndex::control_of(entry)?;
                let path = entry_path(&repo_path, entry);
                let item = PackageItem::from_index(&path, control)?;
                if !item.architecture().matches(&target, !self.flags.force_vendor) {
                    tracing::debug!(
                        "implicit package {} does not have a valid architecture \
                         ({}) for this target ({target})",
                        item.name(),
                        item.architecture()
                    );
                    continue;
                }
                self.packages.push(item);
            }
        }
        Ok(())
    }

    /// What: Resolve bare explicit names against the loaded repositories.
    fn resolve_pending_names(&mut self) -> Result<()> {
        let names = std::mem::take(&mut self.pending_names);
        for name in names {
            let mut best: Option<usize> = None;
            for idx in 0..self.packages.len() {
                if self.packages[idx].kind() != PackageKind::Available
                    || self.packages[idx].name() != name
                {
                    continue;
                }
                let better = best.is_none_or(|current| {
                    versioncmp(
                        self.packages[idx].version(),
                        self.packages[current].version(),
                    ) == std::cmp::Ordering::Greater
                });
                if better {
                    best = Some(idx);
                }
            }
            let Some(idx) = best else {
                return Err(DebToolkitError::NotFound(format!(
                    "package {name} was not found in any repository"
                )));
            };
            tracing::debug!(
                "resolved {name} to {} from the repositories",
                self.packages[idx].version()
            );
            self.packages[idx].set_kind(PackageKind::Explicit);
            self.mark_against_installed(idx)?;
        }
        Ok(())
    }

    /// What: Load data entries for every item the plan touches.
    fn load_plan_entries(&mut self) -> Result<()> {
        let db = self.store.db().clone();
        for item in &mut self.packages {
            let needed = item.is_marked_for_install()
                || (item.kind() == PackageKind::Installed && item.boolean_field("Essential"));
            if needed {
                item.load_full(self.store.codec(), &db)?;
            }
        }
        Ok(())
    }

    /// What: Plan disk usage and validate overwrites for the whole tree.
    fn validate_size_and_overwrites(&mut self) -> Result<()> {
        let mut disks = DiskSet::new(self.mounts.as_ref())?;
        let mut claimed = ClaimedFiles::new();
        let mut report = ValidationReport::new();
        let root = self.store.db().root().to_path_buf();

        let mut essential = EssentialFileCache::new();
        for item in &self.packages {
            let relevant = item.boolean_field("Essential")
                && (item.is_marked_for_install() || item.kind() == PackageKind::Installed);
            if relevant {
                essential.add_package(item.name(), item.entries());
            }
        }

        for idx in 0..self.packages.len() {
            self.check_interrupt()?;
            let item = &self.packages[idx];
            // configure-only items have their files on disk already
            if !item.is_marked_for_install()
                || item.kind() == PackageKind::Configure
                || item.source() != ItemSource::Archive
            {
                continue;
            }
            let upgrade_paths: Option<HashSet<String>> = item.upgrade_link().map(|old_idx| {
                self.packages[old_idx]
                    .entries()
                    .iter()
                    .map(|e| e.path.clone())
                    .collect()
            });
            plan_package(
                &mut disks,
                item,
                item.entries(),
                upgrade_paths.as_ref(),
                1,
                &root,
                &essential,
                &mut claimed,
                &self.flags,
                &mut report,
            );
            // the upgraded-out side frees its blocks
            if let Some(old_idx) = item.upgrade_link() {
                let old = &self.packages[old_idx];
                plan_package(
                    &mut disks,
                    old,
                    old.entries(),
                    None,
                    -1,
                    &root,
                    &essential,
                    &mut claimed,
                    &self.flags,
                    &mut report,
                );
            }
        }

        disks.verify(&mut report);
        report.into_result()
    }

    /// What: Check that every planned archive ships usable scripts.
    fn validate_scripts(&self) -> Result<()> {
        let flavor = self.flavor();
        for item in &self.packages {
            if item.is_marked_for_install()
                && item.source() == ItemSource::Archive
                && item.kind() != PackageKind::Configure
            {
                validate_script_flavor(self.store.codec(), item.path(), item.name(), flavor)?;
            }
        }
        Ok(())
    }

    /// What: Order the planned packages by their dependencies.
    ///
    /// Details:
    /// - A package is placed after everything it depends on; ties break
    ///   by package name so the output is deterministic. Self packages
    ///   move to the end when no planned package depends on them.
    fn sort_packages(&mut self) -> Result<()> {
        let mut acting: Vec<usize> = (0..self.packages.len())
            .filter(|&idx| {
                matches!(
                    self.packages[idx].kind(),
                    PackageKind::Explicit | PackageKind::Implicit | PackageKind::Configure
                )
            })
            .collect();
        acting.sort_by(|&a, &b| self.packages[a].name().cmp(self.packages[b].name()));

        let mut ordered: Vec<usize> = Vec::with_capacity(acting.len());
        let mut visited: HashSet<usize> = HashSet::new();
        let mut visiting: HashSet<usize> = HashSet::new();
        for &idx in &acting {
            self.visit_for_sort(idx, &acting, &mut visited, &mut visiting, &mut ordered)?;
        }

        // order a self package last unless something depends on it
        let selves: Vec<usize> = ordered
            .iter()
            .copied()
            .filter(|&idx| self.store.exists_as_self(self.packages[idx].name()))
            .collect();
        for self_idx in selves {
            let depended_upon = ordered.iter().any(|&other| {
                other != self_idx
                    && self.dependency_names(other).contains(
                        &self.packages[self_idx].name().to_string(),
                    )
            });
            if !depended_upon {
                ordered.retain(|&idx| idx != self_idx);
                ordered.push(self_idx);
            }
        }

        self.sorted = ordered;
        Ok(())
    }

    fn dependency_names(&self, idx: usize) -> Vec<String> {
        let mut names = Vec::new();
        for field in DEPENDENCY_FIELDS {
            if let Ok(deps) = self.packages[idx].dependencies(field) {
                names.extend(deps.iter().map(|d| d.name.clone()));
            }
        }
        names
    }

    fn visit_for_sort(
        &self,
        idx: usize,
        acting: &[usize],
        visited: &mut HashSet<usize>,
        visiting: &mut HashSet<usize>,
        ordered: &mut Vec<usize>,
    ) -> Result<()> {
        if visited.contains(&idx) {
            return Ok(());
        }
        if !visiting.insert(idx) {
            // a cycle that survived validation can only involve installed
            // nodes, which are trusted and not part of the acting set
            return Err(DebToolkitError::Internal(format!(
                "circular dependency surfaced while ordering {}",
                self.packages[idx].name()
            )));
        }
        for name in self.dependency_names(idx) {
            for &candidate in acting {
                if candidate != idx && self.packages[candidate].name() == name {
                    self.visit_for_sort(candidate, acting, visited, visiting, ordered)?;
                }
            }
        }
        visiting.remove(&idx);
        visited.insert(idx);
        ordered.push(idx);
        Ok(())
    }

    fn detect_self_upgrade(&mut self) {
        let upgrading_self = self.sorted.iter().any(|&idx| {
            self.store.exists_as_self(self.packages[idx].name())
                && self.packages[idx].upgrade_link().is_some()
        });
        if upgrading_self {
            tracing::info!("a self package is being upgraded");
            self.store.mark_self_upgrade();
        }
    }

    // === Execution ===

    /// What: Apply the validated plan to the target.
    ///
    /// Inputs:
    /// - `self`: The session (validated implicitly when needed).
    ///
    /// Output:
    /// - Returns the first execution error; when `force_rollback` is set
    ///   the journal is replayed in reverse first.
    ///
    /// Details:
    /// - The database lock is held for the whole operation and released
    ///   on every exit path.
    pub fn run(&mut self) -> Result<()> {
        if !self.validated {
            self.validate()?;
        }
        let status = match self.task {
            Task::Install => "installing",
            Task::Unpack => "unpacking",
            Task::Configure => "configuring",
            Task::Reconfigure => "reconfiguring",
        };
        let db = self.store.db().clone();
        let lock = db.lock(status)?;
        let mut journal = Journal::create(&db)?;

        let outcome = self.execute(&mut journal);
        let result = match outcome {
            Ok(()) => {
                journal.commit()?;
                Ok(())
            }
            Err(error) => {
                if self.flags.force_rollback {
                    tracing::error!("operation failed, rolling back: {error}");
                    match journal.rollback(&db, self.flavor()) {
                        Ok(()) => Err(error),
                        Err(rollback_error) => Err(rollback_error),
                    }
                } else {
                    journal.discard()?;
                    Err(error)
                }
            }
        };
        drop(lock);
        self.store.invalidate_installed_cache();
        result
    }

    fn execute(&mut self, journal: &mut Journal) -> Result<()> {
        for idx in self.sorted.clone() {
            self.check_interrupt()?;
            match self.packages[idx].kind() {
                PackageKind::Explicit | PackageKind::Implicit => {
                    self.unpack_item(idx, journal)?;
                    if self.task == Task::Install {
                        self.configure_item(idx, journal)?;
                    }
                }
                PackageKind::Configure => {
                    self.configure_item(idx, journal)?;
                }
                other => {
                    return Err(DebToolkitError::Internal(format!(
                        "package {} with kind {other} reached the executor",
                        self.packages[idx].name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// What: Write a package's metadata files into its database record.
    fn register_record(&self, idx: usize, journal: &mut Journal) -> Result<()> {
        let db = self.store.db();
        let item = &self.packages[idx];
        let record = db.record_dir(item.name());
        std::fs::create_dir_all(&record)?;

        let mut names: Vec<String> = vec!["control".to_string(), "conffiles".to_string()];
        for stage in crate::archive::SCRIPT_NAMES {
            names.push((*stage).to_string());
            names.push(format!("{stage}.bat"));
        }
        for file in names {
            let destination = record.join(&file);
            let Some(bytes) = self.store.codec().metadata_file(item.path(), &file)? else {
                // drop metadata the new version no longer ships
                if destination.is_file() {
                    journal.backup_file(&destination)?;
                    std::fs::remove_file(&destination)?;
                }
                continue;
            };
            if destination.exists() {
                journal.backup_file(&destination)?;
            } else {
                journal.record(JournalEntry::InstallFile {
                    path: destination.to_string_lossy().into_owned(),
                })?;
            }
            std::fs::write(&destination, bytes)?;
        }
        Ok(())
    }

    fn set_status_journaled(
        &self,
        journal: &mut Journal,
        name: &str,
        new: PackageStatus,
    ) -> Result<()> {
        let db = self.store.db();
        let old = match db.status(name)? {
            PackageStatus::NoPackage => None,
            other => Some(other),
        };
        journal.record(JournalEntry::SaveStatus {
            package: name.to_string(),
            old,
            new,
        })?;
        db.set_status(name, new)
    }

    /// What: Unpack one package: validate, preinst, extract, index.
    fn unpack_item(&mut self, idx: usize, journal: &mut Journal) -> Result<()> {
        let db = self.store.db().clone();
        let flavor = self.flavor();
        let name = self.packages[idx].name().to_string();
        let version = self.packages[idx].version().to_string();
        let is_upgrade = self.packages[idx].upgrade_link().is_some();
        let old_version = self.packages[idx]
            .upgrade_link()
            .map(|old_idx| self.packages[old_idx].version().to_string());
        let prior_status = db.status(&name)?;
        // the version left behind by a remove (config-files remnants)
        let remnant_version = (prior_status == PackageStatus::ConfigFiles)
            .then(|| db.read_control(&name).ok())
            .flatten()
            .and_then(|control| control.get("Version").map(ToString::to_string));
        tracing::info!(package = %name, %version, upgrade = is_upgrade, "unpacking");

        // the record must exist before any script can run from it
        self.register_record(idx, journal)?;
        self.set_status_journaled(
            journal,
            &name,
            if is_upgrade {
                PackageStatus::Upgrading
            } else {
                PackageStatus::Installing
            },
        )?;

        // validate stage: the package's own check, then the global hooks
        let preinst_args: Vec<String> = match (&old_version, remnant_version) {
            (Some(old), _) => vec!["upgrade".to_string(), old.clone()],
            (None, Some(remnant)) => vec!["install".to_string(), remnant],
            (None, None) => vec!["install".to_string()],
        };
        let arg_refs: Vec<&str> = preinst_args.iter().map(String::as_str).collect();
        run_maintainer_script(&db, flavor, &name, "validate", &arg_refs)?;
        run_hooks(&db, flavor, &name, "validate", &arg_refs)?;

        journal.record(JournalEntry::RunScript {
            package: name.clone(),
            stage: "preinst".to_string(),
            args: preinst_args.clone(),
        })?;
        run_maintainer_script(&db, flavor, &name, "preinst", &arg_refs)?;
        run_hooks(&db, flavor, &name, "preinst", &arg_refs)?;

        self.set_status_journaled(journal, &name, PackageStatus::HalfInstalled)?;
        self.extract_files(idx, journal)?;
        if let Some(old_idx) = self.packages[idx].upgrade_link() {
            self.remove_obsolete_files(idx, old_idx, journal)?;
        }

        let entries = self.packages[idx].entries().to_vec();
        let index_path = db.record_dir(&name).join("index.wpkgar");
        if index_path.exists() {
            journal.backup_file(&index_path)?;
        } else {
            journal.record(JournalEntry::InstallFile {
                path: index_path.to_string_lossy().into_owned(),
            })?;
        }
        db.write_file_index(&name, &entries)?;
        // an upgrade keeps a previously explicit install explicit
        let explicit = self.packages[idx].kind() == PackageKind::Explicit
            || (is_upgrade && db.is_explicit(&name).unwrap_or(false));
        db.set_explicit(&name, explicit)?;

        self.set_status_journaled(journal, &name, PackageStatus::Unpacked)?;
        self.store.evict(&name);
        Ok(())
    }

    fn extract_files(&self, idx: usize, journal: &mut Journal) -> Result<()> {
        let item = &self.packages[idx];
        let root = self.store.db().root();
        for entry in item.entries() {
            if !entry.path.starts_with('/') {
                continue;
            }
            self.check_interrupt()?;
            let destination = root.join(entry.path.trim_start_matches('/'));
            match entry.kind {
                EntryKind::Directory => {
                    if !destination.is_dir() {
                        journal.record(JournalEntry::CreateDirectory {
                            path: destination.to_string_lossy().into_owned(),
                        })?;
                        std::fs::create_dir_all(&destination)?;
                    }
                }
                _ => {
                    if item.is_conffile(&entry.path) && destination.exists() {
                        // never blindly overwrite a conffile the target
                        // already carries
                        tracing::debug!(
                            "keeping existing configuration file {}",
                            entry.path
                        );
                        continue;
                    }
                    if destination.exists() {
                        journal.backup_file(&destination)?;
                    } else {
                        journal.record(JournalEntry::InstallFile {
                            path: destination.to_string_lossy().into_owned(),
                        })?;
                    }
                    self.store
                        .codec()
                        .extract_to(item.path(), &entry.path, &destination)?;
                    self.apply_file_info(&destination, entry)?;
                }
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn apply_file_info(&self, destination: &Path, entry: &ArchiveEntry) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        if entry.kind != EntryKind::Regular {
            return Ok(());
        }
        let outcome = std::fs::set_permissions(
            destination,
            std::fs::Permissions::from_mode(entry.mode),
        );
        if let Err(e) = outcome {
            if self.flags.force_file_info {
                if !self.flags.quiet_file_info {
                    tracing::warn!("cannot set mode of {}: {e}", destination.display());
                }
                return Ok(());
            }
            return Err(e.into());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    fn apply_file_info(&self, _destination: &Path, _entry: &ArchiveEntry) -> Result<()> {
        Ok(())
    }

    /// What: Remove files of the upgraded-out version absent from the new
    /// package.
    fn remove_obsolete_files(
        &self,
        new_idx: usize,
        old_idx: usize,
        journal: &mut Journal,
    ) -> Result<()> {
        let root = self.store.db().root();
        let new_paths: HashSet<&str> = self.packages[new_idx]
            .entries()
            .iter()
            .map(|e| e.path.as_str())
            .collect();
        for entry in self.packages[old_idx].entries() {
            if entry.kind == EntryKind::Directory
                || !entry.path.starts_with('/')
                || new_paths.contains(entry.path.as_str())
            {
                continue;
            }
            let destination = root.join(entry.path.trim_start_matches('/'));
            if destination.exists() {
                tracing::debug!("removing obsolete file {}", entry.path);
                journal.backup_file(&destination)?;
                std::fs::remove_file(&destination)?;
            }
        }
        Ok(())
    }

    /// What: Configure one package: postinst with `configure <version>`.
    fn configure_item(&mut self, idx: usize, journal: &mut Journal) -> Result<()> {
        let db = self.store.db().clone();
        let flavor = self.flavor();
        let name = self.packages[idx].name().to_string();
        let version = self.packages[idx].version().to_string();
        tracing::info!(package = %name, %version, "configuring");

        match db.status(&name)? {
            PackageStatus::Unpacked | PackageStatus::HalfConfigured | PackageStatus::Installed => {}
            other => {
                return Err(DebToolkitError::Constraint(format!(
                    "package {name} is {other} and cannot be configured"
                )));
            }
        }

        self.set_status_journaled(journal, &name, PackageStatus::HalfConfigured)?;
        let args = ["configure", version.as_str()];
        journal.record(JournalEntry::RunScript {
            package: name.clone(),
            stage: "postinst".to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        })?;
        run_maintainer_script(&db, flavor, &name, "postinst", &args)?;
        run_hooks(&db, flavor, &name, "postinst", &args)?;
        self.set_status_journaled(journal, &name, PackageStatus::Installed)?;
        self.store.evict(&name);
        Ok(())
    }
}

/// What: Collect archive paths under a directory, recursively.
fn collect_archives(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_archive_path(&path) {
            found.push(path);
        } else if path.is_dir() {
            collect_archives(&path, found)?;
        }
    }
    Ok(())
}
