//! Shared sandbox helpers for the integration tests.
//!
//! A sandbox is a temporary directory holding a target root (with a fresh
//! package database), a package build area, and a repository directory.
//! Packages are built as exploded archive directories consumed by the
//! `DirectoryCodec`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use deb_toolkit::archive::DirectoryCodec;
use deb_toolkit::control::ControlFile;
use deb_toolkit::db::PackageDatabase;
use deb_toolkit::installer::Installer;
use deb_toolkit::store::PackageStore;
use deb_toolkit::types::Task;
use tempfile::TempDir;

/// One test sandbox: target root, package build area, and repository.
pub struct Sandbox {
    tmp: TempDir,
}

/// Declarative description of a package to build.
#[derive(Default)]
pub struct PackageSpec<'a> {
    /// Package name.
    pub name: &'a str,
    /// Package version.
    pub version: &'a str,
    /// Extra control fields beyond Package/Version/Architecture.
    pub fields: &'a [(&'a str, &'a str)],
    /// Shipped files as `(target path, contents)`.
    pub files: &'a [(&'a str, &'a str)],
    /// Paths declared as configuration files.
    pub conffiles: &'a [&'a str],
    /// Maintainer scripts as `(stage, body)`; a `#!/bin/sh` line is
    /// prepended automatically.
    pub scripts: &'a [(&'a str, &'a str)],
}

impl Sandbox {
    /// Create a sandbox with a fresh database under `root/`.
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let sandbox = Self { tmp };
        fs::create_dir_all(sandbox.root()).expect("mkdir root");
        fs::create_dir_all(sandbox.repo()).expect("mkdir repo");
        fs::create_dir_all(sandbox.packages_dir()).expect("mkdir packages");
        let mut core = ControlFile::new();
        core.set("Architecture", "linux-amd64");
        core.set("Maintainer", "Tests <tests@example.com>");
        sandbox.db().create(&core).expect("create database");
        sandbox
    }

    /// The target root path.
    pub fn root(&self) -> PathBuf {
        self.tmp.path().join("root")
    }

    /// The repository directory.
    pub fn repo(&self) -> PathBuf {
        self.tmp.path().join("repo")
    }

    fn packages_dir(&self) -> PathBuf {
        self.tmp.path().join("packages")
    }

    /// A database handle over the target root.
    pub fn db(&self) -> PackageDatabase {
        PackageDatabase::new(self.root())
    }

    /// A fresh store over the target root.
    pub fn store(&self) -> PackageStore {
        PackageStore::new(self.db(), Box::new(DirectoryCodec::new()))
    }

    /// A fresh installer session for a task.
    pub fn installer(&self, task: Task) -> Installer {
        Installer::new(self.store(), task)
    }

    /// The on-target path of an absolute package path.
    pub fn target_path(&self, path: &str) -> PathBuf {
        self.root().join(path.trim_start_matches('/'))
    }

    /// Build a package in the build area; returns its archive path.
    pub fn build_package(&self, spec: &PackageSpec<'_>) -> PathBuf {
        build_package_in(&self.packages_dir(), spec)
    }

    /// Build a package straight into the repository directory.
    pub fn build_repo_package(&self, spec: &PackageSpec<'_>) -> PathBuf {
        // drop any stale index so the next load sees the new package
        let _ = fs::remove_file(self.repo().join("index.json"));
        build_package_in(&self.repo(), spec)
    }
}

/// Build one exploded package directory under `dir`.
pub fn build_package_in(dir: &Path, spec: &PackageSpec<'_>) -> PathBuf {
    let pkg = dir.join(format!("{}_{}_all.deb", spec.name, spec.version));
    fs::create_dir_all(&pkg).expect("mkdir package");

    let mut control = ControlFile::new();
    control.set("Package", spec.name);
    control.set("Version", spec.version);
    control.set("Architecture", "all");
    for (name, value) in spec.fields {
        control.set(name, *value);
    }
    fs::write(pkg.join("control"), control.to_text()).expect("write control");

    for (path, contents) in spec.files {
        let relative = path.trim_start_matches('/');
        let destination = pkg.join("data").join(relative);
        fs::create_dir_all(destination.parent().expect("parent")).expect("mkdir data");
        fs::write(destination, contents).expect("write data file");
    }

    if !spec.conffiles.is_empty() {
        fs::write(pkg.join("conffiles"), spec.conffiles.join("\n") + "\n")
            .expect("write conffiles");
    }

    for (stage, body) in spec.scripts {
        fs::write(pkg.join(stage), format!("#!/bin/sh\n{body}\n")).expect("write script");
    }

    pkg
}
