//! The rollback journal.
//!
//! A mutating operation opens a journal directory inside the admindir and
//! appends one record per state-changing step. On success the directory is
//! atomically renamed away and deleted; on abort the records are replayed
//! in reverse: installed files removed, overwritten files restored from
//! their shadow copies, created directories dropped, statuses rewritten,
//! and maintainer scripts inverted best effort.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::PackageDatabase;
use crate::error::{DebToolkitError, Result};
use crate::installer::scripts::{ScriptFlavor, run_maintainer_script};
use crate::types::package::PackageStatus;

/// Directory name of the active journal inside the admindir.
const JOURNAL_DIR: &str = "journal";

/// Rename target used to atomically retire a committed journal.
const COMMITTED_DIR: &str = "journal.committed";

/// One journaled state-changing step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum JournalEntry {
    /// An existing file was copied aside before being overwritten.
    BackupFile {
        /// Absolute on-disk path of the overwritten file.
        path: String,
        /// Shadow copy inside the journal directory.
        shadow: String,
    },
    /// A new file was placed on the target.
    InstallFile {
        /// Absolute on-disk path of the new file.
        path: String,
    },
    /// A directory was created on the target.
    CreateDirectory {
        /// Absolute on-disk path of the new directory.
        path: String,
    },
    /// A database status is about to change.
    SaveStatus {
        /// Package whose status changes.
        package: String,
        /// Previous status; `None` when the record did not exist yet.
        old: Option<PackageStatus>,
        /// Status being written.
        new: PackageStatus,
    },
    /// A maintainer script is about to run.
    RunScript {
        /// Package whose script runs.
        package: String,
        /// Stage name (`preinst`, `prerm`, ...).
        stage: String,
        /// Positional arguments of the invocation.
        args: Vec<String>,
    },
}

/// Append-only journal of one mutating operation.
#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
    entries: Vec<JournalEntry>,
    shadow_count: u64,
    finished: bool,
}

impl Journal {
    /// What: Open a fresh journal for a mutating operation.
    ///
    /// Inputs:
    /// - `db`: The package database the journal lives under.
    ///
    /// Output:
    /// - Returns the journal, or `DatabaseCorrupt` when a journal from a
    ///   crashed run is still present.
    pub fn create(db: &PackageDatabase) -> Result<Self> {
        let dir = db.admindir().join(JOURNAL_DIR);
        if dir.exists() {
            return Err(DebToolkitError::DatabaseCorrupt(format!(
                "a rollback journal already exists at {}; a previous run may \
                 have crashed",
                dir.display()
            )));
        }
        fs::create_dir_all(dir.join("shadow"))?;
        fs::write(dir.join("log"), b"")?;
        Ok(Self {
            dir,
            entries: Vec::new(),
            shadow_count: 0,
            finished: false,
        })
    }

    /// What: Append one record and persist it.
    ///
    /// Inputs:
    /// - `entry`: The record to append.
    ///
    /// Output:
    /// - Returns an error on I/O failure.
    pub fn record(&mut self, entry: JournalEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(self.dir.join("log"))?;
        writeln!(file, "{line}")?;
        self.entries.push(entry);
        Ok(())
    }

    /// What: Preserve an existing file and journal the overwrite.
    ///
    /// Inputs:
    /// - `target`: Absolute path of the file about to be overwritten.
    ///
    /// Output:
    /// - Returns an error on I/O failure.
    pub fn backup_file(&mut self, target: &Path) -> Result<()> {
        self.shadow_count += 1;
        let shadow = self.dir.join("shadow").join(self.shadow_count.to_string());
        fs::copy(target, &shadow)?;
        self.record(JournalEntry::BackupFile {
            path: target.to_string_lossy().into_owned(),
            shadow: shadow.to_string_lossy().into_owned(),
        })
    }

    /// What: Retire the journal after a successful operation.
    ///
    /// Inputs:
    /// - `self`: The journal (consumed).
    ///
    /// Output:
    /// - Returns an error on I/O failure.
    ///
    /// Details:
    /// - The directory is renamed away first so a crash between the two
    ///   steps never leaves an *active* journal behind.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let committed = self
            .dir
            .parent()
            .map_or_else(|| PathBuf::from(COMMITTED_DIR), |p| p.join(COMMITTED_DIR));
        fs::rename(&self.dir, &committed)?;
        fs::remove_dir_all(&committed)?;
        tracing::debug!("journal committed");
        Ok(())
    }

    /// What: Discard the journal without replaying it.
    ///
    /// Inputs:
    /// - `self`: The journal (consumed).
    pub fn discard(mut self) -> Result<()> {
        self.finished = true;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// What: Replay the journal in reverse, undoing completed steps.
    ///
    /// Inputs:
    /// - `self`: The journal (consumed).
    /// - `db`: The package database.
    /// - `flavor`: Script flavor for inverse maintainer scripts.
    ///
    /// Output:
    /// - Returns `DatabaseCorrupt` naming the packages left behind when
    ///   some steps could not be reversed; `Ok(())` on a full rollback.
    ///
    /// Details:
    /// - File steps are reversed exactly; maintainer scripts are reversed
    ///   best effort (`preinst install` by `postrm abort-install`,
    ///   `preinst upgrade V` by `postrm abort-upgrade V`, `prerm remove`
    ///   by `postinst abort-remove`).
    pub fn rollback(mut self, db: &PackageDatabase, flavor: ScriptFlavor) -> Result<()> {
        self.finished = true;
        let mut damaged: Vec<String> = Vec::new();

        for entry in self.entries.iter().rev() {
            let outcome = Self::reverse_entry(entry, db, flavor);
            match outcome {
                Ok(()) => tracing::info!(?entry, "reversed"),
                Err(e) => {
                    tracing::error!(?entry, "rollback step failed: {e}");
                    let package = match entry {
                        JournalEntry::SaveStatus { package, .. }
                        | JournalEntry::RunScript { package, .. } => package.clone(),
                        JournalEntry::BackupFile { path, .. }
                        | JournalEntry::InstallFile { path }
                        | JournalEntry::CreateDirectory { path } => path.clone(),
                    };
                    damaged.push(package);
                }
            }
        }

        let _ = fs::remove_dir_all(&self.dir);
        if damaged.is_empty() {
            tracing::info!("rollback complete");
            Ok(())
        } else {
            damaged.dedup();
            Err(DebToolkitError::DatabaseCorrupt(format!(
                "rollback could not reverse every step; check: {}",
                damaged.join(", ")
            )))
        }
    }

    fn reverse_entry(
        entry: &JournalEntry,
        db: &PackageDatabase,
        flavor: ScriptFlavor,
    ) -> Result<()> {
        match entry {
            JournalEntry::InstallFile { path } => {
                if Path::new(path).exists() {
                    fs::remove_file(path)?;
                }
                Ok(())
            }
            JournalEntry::BackupFile { path, shadow } => {
                fs::copy(shadow, path)?;
                Ok(())
            }
            JournalEntry::CreateDirectory { path } => {
                // only removable while empty; shared directories stay
                let _ = fs::remove_dir(path);
                Ok(())
            }
            JournalEntry::SaveStatus { package, old, .. } => match old {
                Some(status) => db.set_status(package, *status),
                None => db.remove_record(package),
            },
            JournalEntry::RunScript { package, stage, args } => {
                let inverse: Option<(&str, Vec<&str>)> =
                    match (stage.as_str(), args.first().map(String::as_str)) {
                        ("preinst", Some("install")) => {
                            Some(("postrm", vec!["abort-install"]))
                        }
                        ("preinst", Some("upgrade")) => {
                            let mut inverse_args = vec!["abort-upgrade"];
                            if let Some(version) = args.get(1) {
                                inverse_args.push(version);
                            }
                            Some(("postrm", inverse_args))
                        }
                        ("prerm", Some("remove")) => {
                            Some(("postinst", vec!["abort-remove"]))
                        }
                        _ => None,
                    };
                if let Some((script, inverse_args)) = inverse {
                    // best effort: the record may already be gone
                    if db.has_record(package) {
                        let _ = run_maintainer_script(
                            db,
                            flavor,
                            package,
                            script,
                            &inverse_args,
                        );
                    }
                }
                Ok(())
            }
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "journal at {} dropped without commit or rollback",
                self.dir.display()
            );
        }
    }
}
