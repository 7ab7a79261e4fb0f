//! Package removal: remove, purge, and autoremove.
//!
//! Removal runs the mirror lifecycle of installation: prerm, file
//! deletion (conffiles kept unless purging), postrm, and finally either a
//! `config-files` record or, for a purge, no record at all. Autoremove
//! computes the fixpoint of implicitly-installed packages nothing depends
//! on and removes each through the same lifecycle.

use std::collections::HashSet;
use std::fs;

use crate::archive::EntryKind;
use crate::db::PackageDatabase;
use crate::deps::resolve::DEPENDENCY_FIELDS;
use crate::error::{DebToolkitError, Result};
use crate::installer::journal::{Journal, JournalEntry};
use crate::installer::scripts::{ScriptFlavor, run_hooks, run_maintainer_script};
use crate::store::{Interrupt, NoInterrupt, PackageStore};
use crate::types::architecture::Architecture;
use crate::types::package::{InstallFlags, PackageStatus};

/// The removal planner and executor for one operation.
pub struct Remover {
    store: PackageStore,
    flags: InstallFlags,
    purge: bool,
    names: Vec<String>,
    interrupt: Box<dyn Interrupt>,
}

impl Remover {
    /// What: Create a removal session.
    ///
    /// Inputs:
    /// - `store`: The package store over the target's database.
    /// - `purge`: When `true`, conffiles and the database record are
    ///   erased too.
    ///
    /// Output:
    /// - Returns the session with default flags.
    #[must_use]
    pub fn new(store: PackageStore, purge: bool) -> Self {
        Self {
            store,
            flags: InstallFlags {
                force_rollback: true,
                ..InstallFlags::default()
            },
            purge,
            names: Vec::new(),
            interrupt: Box::new(NoInterrupt),
        }
    }

    /// What: Access the flag bag mutably.
    pub fn flags_mut(&mut self) -> &mut InstallFlags {
        &mut self.flags
    }

    /// What: Install an interrupt hook.
    pub fn set_interrupt(&mut self, interrupt: Box<dyn Interrupt>) {
        self.interrupt = interrupt;
    }

    /// What: Give the store back after the operation.
    #[must_use]
    pub fn into_store(self) -> PackageStore {
        self.store
    }

    /// What: Add one installed package to remove.
    pub fn add_package(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.stop_now() {
            return Err(DebToolkitError::Interrupted);
        }
        Ok(())
    }

    fn flavor(&self) -> Result<ScriptFlavor> {
        let core = self.store.db().read_control("core")?;
        let arch = Architecture::parse(core.get("Architecture").unwrap_or("linux-amd64"))?;
        Ok(ScriptFlavor::for_target(&arch))
    }

    /// What: Validate the removal set.
    ///
    /// Inputs:
    /// - `self`: The session.
    ///
    /// Output:
    /// - Returns a `Constraint` error for an essential package, a package
    ///   in a state that cannot be removed, or a package another
    ///   installed package still depends on (unless `force_depends`).
    pub fn validate(&mut self) -> Result<()> {
        if self.names.is_empty() {
            return Err(DebToolkitError::InvalidInput(
                "no packages were specified".to_string(),
            ));
        }
        let db = self.store.db().clone();
        let removal_set: HashSet<&String> = self.names.iter().collect();

        for name in &self.names {
            self.check_interrupt()?;
            let status = db.status(name)?;
            match status {
                PackageStatus::Installed | PackageStatus::Unpacked => {}
                PackageStatus::ConfigFiles if self.purge => {}
                PackageStatus::NoPackage | PackageStatus::NotInstalled => {
                    return Err(DebToolkitError::NotFound(name.clone()));
                }
                other => {
                    return Err(DebToolkitError::Constraint(format!(
                        "package {name} is {other} and cannot be removed"
                    )));
                }
            }
            let control = db.read_control(name)?;
            if control.boolean("Essential") {
                return Err(DebToolkitError::Constraint(format!(
                    "package {name} is essential and cannot be removed"
                )));
            }
        }

        // no other installed package may still depend on a removed one
        for record in db.records()? {
            if removal_set.contains(&record) {
                continue;
            }
            if !matches!(
                db.status(&record)?,
                PackageStatus::Installed | PackageStatus::Unpacked
            ) {
                continue;
            }
            let control = db.read_control(&record)?;
            for field in DEPENDENCY_FIELDS {
                for dep in control.dependencies(field)?.iter() {
                    if removal_set.contains(&dep.name) {
                        let message = format!(
                            "package {record} depends on {}; remove it first",
                            dep.name
                        );
                        if self.flags.force_depends {
                            tracing::warn!("{message}");
                        } else {
                            return Err(DebToolkitError::Constraint(message));
                        }
                    }
                }
            }
        }

        // dependents leave before their dependencies
        self.sort_for_removal()?;
        Ok(())
    }

    /// What: Order the removal set so dependents go first.
    fn sort_for_removal(&mut self) -> Result<()> {
        let db = self.store.db().clone();
        let mut names = std::mem::take(&mut self.names);
        names.sort();
        names.dedup();

        let mut dependencies: Vec<(String, HashSet<String>)> = Vec::new();
        for name in &names {
            let mut depends = HashSet::new();
            if db.has_record(name) {
                let control = db.read_control(name)?;
                for field in DEPENDENCY_FIELDS {
                    for dep in control.dependencies(field)?.iter() {
                        depends.insert(dep.name.clone());
                    }
                }
            }
            dependencies.push((name.clone(), depends));
        }

        let mut ordered: Vec<String> = Vec::with_capacity(names.len());
        let mut remaining = dependencies;
        while !remaining.is_empty() {
            // pick the first package no remaining package depends on
            let next = remaining
                .iter()
                .position(|(name, _)| {
                    !remaining
                        .iter()
                        .any(|(other, deps)| other != name && deps.contains(name))
                })
                .unwrap_or(0);
            ordered.push(remaining.remove(next).0);
        }
        self.names = ordered;
        Ok(())
    }

    /// What: Execute the removal.
    ///
    /// Inputs:
    /// - `self`: The session (validated implicitly when needed).
    ///
    /// Output:
    /// - Returns the first execution error; completed steps are rolled
    ///   back when `force_rollback` is set.
    pub fn run(&mut self) -> Result<()> {
        self.validate()?;
        let db = self.store.db().clone();
        let flavor = self.flavor()?;
        let lock = db.lock(if self.purge { "purging" } else { "removing" })?;
        let mut journal = Journal::create(&db)?;

        let outcome = self.execute(&db, flavor, &mut journal);
        let result = match outcome {
            Ok(()) => {
                journal.commit()?;
                Ok(())
            }
            Err(error) => {
                if self.flags.force_rollback {
                    tracing::error!("removal failed, rolling back: {error}");
                    match journal.rollback(&db, flavor) {
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

    fn execute(
        &mut self,
        db: &PackageDatabase,
        flavor: ScriptFlavor,
        journal: &mut Journal,
    ) -> Result<()> {
        for name in self.names.clone() {
            self.check_interrupt()?;
            self.remove_one(db, flavor, &name, journal)?;
        }
        Ok(())
    }

    fn set_status_journaled(
        db: &PackageDatabase,
        journal: &mut Journal,
        name: &str,
        new: PackageStatus,
    ) -> Result<()> {
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

    fn remove_one(
        &mut self,
        db: &PackageDatabase,
        flavor: ScriptFlavor,
        name: &str,
        journal: &mut Journal,
    ) -> Result<()> {
        let had_files = db.status(name)? != PackageStatus::ConfigFiles;
        tracing::info!(package = name, purge = self.purge, "removing");

        if had_files {
            Self::set_status_journaled(db, journal, name, PackageStatus::Removing)?;
            journal.record(JournalEntry::RunScript {
                package: name.to_string(),
                stage: "prerm".to_string(),
                args: vec!["remove".to_string()],
            })?;
            run_maintainer_script(db, flavor, name, "prerm", &["remove"])?;
            run_hooks(db, flavor, name, "prerm", &["remove"])?;

            Self::set_status_journaled(db, journal, name, PackageStatus::HalfInstalled)?;
            self.remove_files(db, name, journal)?;
            Self::set_status_journaled(db, journal, name, PackageStatus::ConfigFiles)?;
        } else if self.purge {
            Self::set_status_journaled(db, journal, name, PackageStatus::Purging)?;
        }

        let postrm_arg = if self.purge { "purge" } else { "remove" };
        run_maintainer_script(db, flavor, name, "postrm", &[postrm_arg])?;
        run_hooks(db, flavor, name, "postrm", &[postrm_arg])?;

        if self.purge {
            self.purge_remnants(db, name, journal)?;
        }
        self.store.evict(name);
        Ok(())
    }

    /// What: Delete a package's shipped files, keeping conffiles.
    fn remove_files(
        &self,
        db: &PackageDatabase,
        name: &str,
        journal: &mut Journal,
    ) -> Result<()> {
        let root = db.root();
        let conffiles: HashSet<String> = db.conffiles(name)?.into_iter().collect();
        let entries = db.file_index(name)?;

        let mut directories = Vec::new();
        for entry in &entries {
            if !entry.path.starts_with('/') {
                continue;
            }
            self.check_interrupt()?;
            let destination = root.join(entry.path.trim_start_matches('/'));
            if entry.kind == EntryKind::Directory {
                directories.push(destination);
                continue;
            }
            if conffiles.contains(&entry.path) {
                tracing::debug!("keeping configuration file {}", entry.path);
                continue;
            }
            if destination.exists() {
                journal.backup_file(&destination)?;
                fs::remove_file(&destination)?;
            }
        }

        // deepest first; shared directories simply stay
        directories.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
        for directory in directories {
            let _ = fs::remove_dir(&directory);
        }
        Ok(())
    }

    /// What: Erase conffiles and the database record after a purge.
    fn purge_remnants(
        &self,
        db: &PackageDatabase,
        name: &str,
        journal: &mut Journal,
    ) -> Result<()> {
        let root = db.root();
        for conffile in db.conffiles(name)? {
            let destination = root.join(conffile.trim_start_matches('/'));
            if destination.exists() {
                journal.backup_file(&destination)?;
                fs::remove_file(&destination)?;
            }
        }

        // preserve the record's files in the journal, then drop the record
        let record = db.record_dir(name);
        if record.is_dir() {
            for entry in fs::read_dir(&record)? {
                let path = entry?.path();
                if path.is_file() {
                    journal.backup_file(&path)?;
                }
            }
        }
        let old = match db.status(name)? {
            PackageStatus::NoPackage => None,
            other => Some(other),
        };
        journal.record(JournalEntry::SaveStatus {
            package: name.to_string(),
            old,
            new: PackageStatus::NotInstalled,
        })?;
        db.remove_record(name)?;
        Ok(())
    }
}

/// What: Remove every implicitly-installed package nothing depends on.
///
/// Inputs:
/// - `store`: The package store (returned when done).
/// - `flags`: Force flags applied to each removal.
///
/// Output:
/// - Returns the store and the names removed, in removal order.
///
/// Details:
/// - The candidate set is computed to a fixpoint: removing one package
///   may expose the next candidate. Each round runs the normal removal
///   lifecycle.
pub fn autoremove(
    mut store: PackageStore,
    flags: &InstallFlags,
) -> Result<(PackageStore, Vec<String>)> {
    let mut removed = Vec::new();
    loop {
        let candidates = autoremove_candidates(store.db())?;
        if candidates.is_empty() {
            break;
        }
        tracing::info!(?candidates, "autoremove round");
        let mut remover = Remover::new(store, false);
        *remover.flags_mut() = flags.clone();
        for name in &candidates {
            remover.add_package(name);
        }
        remover.run()?;
        store = remover.into_store();
        removed.extend(candidates);
    }
    Ok((store, removed))
}

/// What: Compute the current autoremove candidate set.
///
/// Inputs:
/// - `db`: The package database.
///
/// Output:
/// - Returns every installed record that was installed implicitly and
///   that no other installed record depends on.
pub fn autoremove_candidates(db: &PackageDatabase) -> Result<Vec<String>> {
    let records = db.records()?;
    let mut depended_upon: HashSet<String> = HashSet::new();
    for record in &records {
        if !matches!(
            db.status(record)?,
            PackageStatus::Installed | PackageStatus::Unpacked
        ) {
            continue;
        }
        let control = db.read_control(record)?;
        for field in DEPENDENCY_FIELDS {
            for dep in control.dependencies(field)?.iter() {
                depended_upon.insert(dep.name.clone());
            }
        }
    }

    let mut candidates = Vec::new();
    for record in records {
        if !matches!(
            db.status(&record)?,
            PackageStatus::Installed | PackageStatus::Unpacked
        ) {
            continue;
        }
        if !db.is_explicit(&record)? && !depended_upon.contains(&record) {
            candidates.push(record);
        }
    }
    Ok(candidates)
}
