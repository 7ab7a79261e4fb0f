//! Maintainer script and hook invocation.
//!
//! A package ships either POSIX shell scripts (no extension) or batch
//! scripts (`.bat`); the executor picks the flavor matching the target's
//! OS. Scripts run synchronously with the working directory set to the
//! target root and the `WPKG_ROOT_PATH`, `WPKG_DATABASE_PATH`, and
//! `WPKG_PACKAGE_NAME` environment variables set.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::archive::{PackageCodec, SCRIPT_NAMES};
use crate::db::PackageDatabase;
use crate::error::{DebToolkitError, Result};
use crate::types::architecture::Architecture;

/// Maintainer script flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptFlavor {
    /// POSIX shell scripts, no file extension.
    Posix,
    /// Batch scripts with the `.bat` extension.
    Batch,
}

impl ScriptFlavor {
    /// What: Pick the script flavor for a target architecture.
    ///
    /// Inputs:
    /// - `target`: The target's architecture triple.
    ///
    /// Output:
    /// - Returns `Batch` for Windows-flavored targets, `Posix` otherwise.
    #[must_use]
    pub fn for_target(target: &Architecture) -> Self {
        if target.os.contains("win") {
            Self::Batch
        } else {
            Self::Posix
        }
    }

    /// What: Return a script's file name in this flavor.
    ///
    /// Inputs:
    /// - `stage`: Script stage name (e.g. `preinst`).
    #[must_use]
    pub fn file_name(self, stage: &str) -> String {
        match self {
            Self::Posix => stage.to_string(),
            Self::Batch => format!("{stage}.bat"),
        }
    }

    /// What: Check whether this flavor uses `.bat` scripts.
    #[must_use]
    pub const fn is_batch(self) -> bool {
        matches!(self, Self::Batch)
    }
}

/// What: Run one script file synchronously.
///
/// Inputs:
/// - `script`: Script path.
/// - `flavor`: Interpreter flavor.
/// - `package`: Package the script belongs to (for the environment and
///   error reporting).
/// - `stage`: Stage name (for error reporting).
/// - `args`: Positional arguments handed to the script.
/// - `root`: Target root; becomes the working directory and
///   `WPKG_ROOT_PATH`.
/// - `admindir`: Database path exported as `WPKG_DATABASE_PATH`.
///
/// Output:
/// - Returns `ScriptFailed` when the script exits non-zero, `Io` when it
///   cannot be spawned.
#[allow(clippy::too_many_arguments)]
pub fn run_script(
    script: &Path,
    flavor: ScriptFlavor,
    package: &str,
    stage: &str,
    args: &[&str],
    root: &Path,
    admindir: &Path,
) -> Result<()> {
    let mut command = match flavor {
        ScriptFlavor::Posix => {
            let mut command = Command::new("/bin/sh");
            command.arg(script);
            command
        }
        ScriptFlavor::Batch => {
            let mut command = Command::new("cmd");
            command.arg("/c").arg(script);
            command
        }
    };
    tracing::debug!(package, stage, ?args, "running maintainer script");
    let status = command
        .args(args)
        .current_dir(root)
        .env("WPKG_ROOT_PATH", root)
        .env("WPKG_DATABASE_PATH", admindir)
        .env("WPKG_PACKAGE_NAME", package)
        .stdin(Stdio::null())
        .status()?;
    if status.success() {
        return Ok(());
    }
    Err(DebToolkitError::ScriptFailed {
        package: package.to_string(),
        stage: stage.to_string(),
        code: status.code().unwrap_or(-1),
    })
}

/// What: Run a package's maintainer script for one stage, if present.
///
/// Inputs:
/// - `db`: The package database (scripts run from the package record).
/// - `flavor`: Script flavor of the target.
/// - `package`: Package name.
/// - `stage`: Stage name (`preinst`, `postinst`, `prerm`, `postrm`,
///   `validate`).
/// - `args`: Positional arguments.
///
/// Output:
/// - Returns `Ok(false)` when the package ships no such script.
pub fn run_maintainer_script(
    db: &PackageDatabase,
    flavor: ScriptFlavor,
    package: &str,
    stage: &str,
    args: &[&str],
) -> Result<bool> {
    let Some(script) = db.script_path(package, stage, flavor.is_batch()) else {
        return Ok(false);
    };
    run_script(
        &script,
        flavor,
        package,
        stage,
        args,
        db.root(),
        db.admindir(),
    )?;
    Ok(true)
}

/// What: Run every global hook of one stage.
///
/// Inputs:
/// - `db`: The package database (`core/hooks/*_<stage>[.bat]`).
/// - `flavor`: Script flavor of the target.
/// - `package`: Package the hooks fire for.
/// - `stage`: Stage name.
/// - `args`: Positional arguments, same as the package's own script.
///
/// Output:
/// - Returns an error only for the `validate` stage; failures of
///   post-stage hooks are logged and do not abort.
pub fn run_hooks(
    db: &PackageDatabase,
    flavor: ScriptFlavor,
    package: &str,
    stage: &str,
    args: &[&str],
) -> Result<()> {
    for hook in db.hooks(stage, flavor.is_batch())? {
        let outcome = run_script(
            &hook,
            flavor,
            package,
            stage,
            args,
            db.root(),
            db.admindir(),
        );
        match outcome {
            Ok(()) => {}
            Err(e) if stage == "validate" => return Err(e),
            Err(e) => {
                tracing::warn!("hook {} failed: {e}", hook.display());
            }
        }
    }
    Ok(())
}

/// What: Check that an archive package ships scripts usable on the target.
///
/// Inputs:
/// - `codec`: Archive codec.
/// - `package_path`: Archive path.
/// - `package`: Package name (for the error message).
/// - `flavor`: The target's script flavor.
///
/// Output:
/// - Returns a `Constraint` error when the package ships maintainer
///   scripts but none of them in the target's flavor.
pub fn validate_script_flavor(
    codec: &dyn PackageCodec,
    package_path: &Path,
    package: &str,
    flavor: ScriptFlavor,
) -> Result<()> {
    let mut ships_any = false;
    let mut ships_matching = false;
    for stage in SCRIPT_NAMES {
        for candidate in [ScriptFlavor::Posix, ScriptFlavor::Batch] {
            if codec
                .metadata_file(package_path, &candidate.file_name(stage))?
                .is_some()
            {
                ships_any = true;
                if candidate == flavor {
                    ships_matching = true;
                }
            }
        }
    }
    if ships_any && !ships_matching {
        return Err(DebToolkitError::Constraint(format!(
            "package {package} ships maintainer scripts but none usable on \
             this target"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlFile;
    use std::fs;
    use tempfile::TempDir;

    fn create_db(tmp: &TempDir) -> PackageDatabase {
        let db = PackageDatabase::new(tmp.path());
        let mut control = ControlFile::new();
        control.set("Architecture", "linux-amd64");
        db.create(&control).expect("create db");
        db
    }

    #[test]
    fn flavor_for_target() {
        let linux = Architecture::parse("linux-amd64").expect("parse");
        assert_eq!(ScriptFlavor::for_target(&linux), ScriptFlavor::Posix);
        let windows = Architecture::parse("mswindows-amd64").expect("parse");
        assert_eq!(ScriptFlavor::for_target(&windows), ScriptFlavor::Batch);
    }

    #[test]
    fn flavor_file_names() {
        assert_eq!(ScriptFlavor::Posix.file_name("preinst"), "preinst");
        assert_eq!(ScriptFlavor::Batch.file_name("preinst"), "preinst.bat");
    }

    #[cfg(unix)]
    #[test]
    fn missing_script_is_not_run() {
        let tmp = TempDir::new().expect("tempdir");
        let db = create_db(&tmp);
        db.set_status("t1", crate::types::package::PackageStatus::Installed)
            .expect("status");
        let ran = run_maintainer_script(&db, ScriptFlavor::Posix, "t1", "preinst", &["install"])
            .expect("no script is fine");
        assert!(!ran);
    }

    #[cfg(unix)]
    #[test]
    fn script_runs_with_environment_and_args() {
        let tmp = TempDir::new().expect("tempdir");
        let db = create_db(&tmp);
        db.set_status("t1", crate::types::package::PackageStatus::Installed)
            .expect("status");
        let marker = tmp.path().join("marker");
        fs::write(
            db.record_dir("t1").join("postinst"),
            format!(
                "#!/bin/sh\necho \"$1 $2 $WPKG_PACKAGE_NAME\" > {}\n",
                marker.display()
            ),
        )
        .expect("write script");

        let ran = run_maintainer_script(
            &db,
            ScriptFlavor::Posix,
            "t1",
            "postinst",
            &["configure", "1.0"],
        )
        .expect("script should succeed");
        assert!(ran);
        let text = fs::read_to_string(&marker).expect("marker written");
        assert_eq!(text.trim(), "configure 1.0 t1");
    }

    #[cfg(unix)]
    #[test]
    fn failing_script_reports_exit_code() {
        let tmp = TempDir::new().expect("tempdir");
        let db = create_db(&tmp);
        db.set_status("t1", crate::types::package::PackageStatus::Installed)
            .expect("status");
        fs::write(db.record_dir("t1").join("prerm"), "#!/bin/sh\nexit 3\n")
            .expect("write script");

        let err = run_maintainer_script(&db, ScriptFlavor::Posix, "t1", "prerm", &["remove"])
            .expect_err("script fails");
        match err {
            DebToolkitError::ScriptFailed { package, stage, code } => {
                assert_eq!(package, "t1");
                assert_eq!(stage, "prerm");
                assert_eq!(code, 3);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn validate_hooks_abort_and_post_hooks_warn() {
        let tmp = TempDir::new().expect("tempdir");
        let db = create_db(&tmp);
        let hooks = db.admindir().join("core/hooks");
        fs::write(hooks.join("audit_validate"), "#!/bin/sh\nexit 1\n").expect("write hook");
        fs::write(hooks.join("audit_postinst"), "#!/bin/sh\nexit 1\n").expect("write hook");

        assert!(run_hooks(&db, ScriptFlavor::Posix, "t1", "validate", &[]).is_err());
        // post-stage hook failures are logged, not raised
        run_hooks(&db, ScriptFlavor::Posix, "t1", "postinst", &["configure"])
            .expect("post hooks never abort");
    }

    #[test]
    fn script_flavor_validation() {
        use crate::archive::DirectoryCodec;
        let tmp = TempDir::new().expect("tempdir");
        let pkg = tmp.path().join("t1_1.0.deb");
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(
            pkg.join("control"),
            "Package: t1\nVersion: 1.0\nArchitecture: all\n",
        )
        .expect("write control");
        let codec = DirectoryCodec::new();

        // no scripts at all: fine on both flavors
        validate_script_flavor(&codec, &pkg, "t1", ScriptFlavor::Posix).expect("no scripts");
        validate_script_flavor(&codec, &pkg, "t1", ScriptFlavor::Batch).expect("no scripts");

        // batch-only package fails on a posix target
        fs::write(pkg.join("preinst.bat"), "@echo off\n").expect("write script");
        assert!(validate_script_flavor(&codec, &pkg, "t1", ScriptFlavor::Posix).is_err());
        validate_script_flavor(&codec, &pkg, "t1", ScriptFlavor::Batch).expect("batch target");

        // shipping both flavors satisfies either target
        fs::write(pkg.join("preinst"), "#!/bin/sh\n").expect("write script");
        validate_script_flavor(&codec, &pkg, "t1", ScriptFlavor::Posix).expect("posix target");
    }
}
