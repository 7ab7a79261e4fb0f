//! Dependency resolution: pre-dependency checks, universe trimming,
//! tree verification, and best-tree selection.
//!
//! The resolver operates on the master item list by index. Trimming marks
//! candidates `Invalid` when they can never be used and detects whether
//! the universe contains choices; when it does, candidate trees are
//! enumerated lazily and compete pairwise until one best tree survives.

use std::cmp::Ordering;

use crate::deps::tree::TreeGenerator;
use crate::deps::version::{version_satisfies, versioncmp};
use crate::error::{DebToolkitError, Result};
use crate::installer::item::{PackageItem, find_by_name};
use crate::store::Interrupt;
use crate::types::architecture::Architecture;
use crate::types::dependency::{DepOperator, Dependency, DependencyTerm};
use crate::types::package::{InstallFlags, PackageKind, PackageStatus, Selection, Task};

/// Control fields scanned for dependency tuples, in evaluation order.
pub const DEPENDENCY_FIELDS: &[&str] = &["Depends", "Pre-Depends", "Depends-On", "Built-Using"];

/// Fields that carry build dependencies; binary packages may not declare
/// them and only these fields may name a source package.
const BUILD_DEPENDENCY_FIELDS: &[&str] = &["Depends-On", "Built-Using"];

/// Recursion depth at which a stack-risk warning is emitted.
const TREE_DEPTH_WARNING: usize = 1000;

/// Hard recursion cap; beyond this the resolver reports a constraint
/// violation instead of running the stack out.
const TREE_DEPTH_LIMIT: usize = 4096;

/// What: Check a dependency tuple's version constraint against an item.
///
/// Inputs:
/// - `dep`: The dependency tuple.
/// - `item`: The candidate item.
///
/// Output:
/// - Returns `true` when the item's version satisfies the constraint (or
///   the tuple carries none).
#[must_use]
pub fn match_dependency_version(dep: &Dependency, item: &PackageItem) -> bool {
    if dep.operator == DepOperator::Any || dep.version.is_empty() {
        return true;
    }
    version_satisfies(item.version(), dep.operator, &dep.version)
}

/// Outcome of trying one dependency alternative during trimming.
enum AlternativeOutcome {
    /// An explicit, installed, or available item can satisfy it.
    Satisfied,
    /// Only a version-incompatible installed record matched (named here).
    AutoUpgradeBlocked(String),
    /// Nothing matched at all.
    NotFound,
}

/// Outcome of the implicit-for-upgrade rule.
enum ImplicitUpgrade {
    /// Promotion is a pure install or a legal upgrade.
    Allowed,
    /// Promotion is illegal (downgrade, bad state, auto-configure).
    Blocked,
    /// Promotion is blocked by a `Hold` selection.
    Held,
}

/// Outcome of resolving one dependency term inside a tree.
#[derive(Clone, Copy, PartialEq, Eq)]
enum TermOutcome {
    NotFound,
    Unpacked,
    Held,
    Success,
}

/// The dependency resolver: trimming, verification, and tree selection.
///
/// One resolver drives one planning session; it carries the force flags,
/// the task, the target architecture, and the interrupt hook, and records
/// whether the trimmed universe still contains choices.
pub struct Resolver<'a> {
    flags: &'a InstallFlags,
    task: Task,
    target_arch: &'a Architecture,
    interrupt: &'a dyn Interrupt,
    has_choices: bool,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    /// What: Create a resolver for one planning session.
    ///
    /// Inputs:
    /// - `flags`: Force flags.
    /// - `task`: The session's task.
    /// - `target_arch`: The target's architecture triple.
    /// - `interrupt`: Interrupt hook polled inside the loops.
    #[must_use]
    pub fn new(
        flags: &'a InstallFlags,
        task: Task,
        target_arch: &'a Architecture,
        interrupt: &'a dyn Interrupt,
    ) -> Self {
        Self {
            flags,
            task,
            target_arch,
            interrupt,
            has_choices: false,
            max_depth: 0,
        }
    }

    /// What: Report whether trimming found alternative candidates.
    #[must_use]
    pub const fn has_choices(&self) -> bool {
        self.has_choices
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.stop_now() {
            return Err(DebToolkitError::Interrupted);
        }
        Ok(())
    }

    /// What: Check whether a tuple applies on the target architecture.
    ///
    /// Details:
    /// - No qualifiers means the tuple always applies; a negated
    ///   qualifier matching the target excludes it; otherwise at least
    ///   one positive qualifier must match (a purely negative list
    ///   defaults to applying).
    fn dependency_applies(&self, dep: &Dependency) -> bool {
        if dep.architectures.is_empty() {
            return true;
        }
        let mut applies = dep.architectures.iter().all(|q| q.negated);
        for qualifier in &dep.architectures {
            let Ok(arch) = Architecture::parse(&qualifier.architecture) else {
                continue;
            };
            let matched = arch.matches(self.target_arch, false);
            if qualifier.negated {
                if matched {
                    return false;
                }
            } else if matched {
                applies = true;
            }
        }
        applies
    }

    fn applicable<'t>(&self, term: &'t DependencyTerm) -> Vec<&'t Dependency> {
        term.alternatives
            .iter()
            .filter(|dep| self.dependency_applies(dep))
            .collect()
    }

    /// What: Reject dependencies on source packages outside `Built-Using`.
    fn check_source_target(field: &str, target: &PackageItem) -> Result<()> {
        if target.architecture().is_source()
            && !field.eq_ignore_ascii_case("Built-Using")
        {
            return Err(DebToolkitError::Constraint(format!(
                "package {} is a source package and cannot be part of the \
                 list of dependencies defined in {field}",
                target.name()
            )));
        }
        Ok(())
    }

    // === Pre-dependencies (run before any repository load) ===

    /// What: Verify every explicit item's `Pre-Depends` field.
    ///
    /// Inputs:
    /// - `items`: The master list (installed records already loaded).
    ///
    /// Output:
    /// - Returns a `Constraint` error for an unsatisfied pre-dependency.
    ///
    /// Details:
    /// - A pre-dependency must be fully configured on the target. A
    ///   merely unpacked match is promoted to `Configure` under
    ///   `force_configure_any`, tolerated under `force_depends`, and an
    ///   error otherwise. Pre-dependencies are never satisfied from a
    ///   repository.
    pub fn validate_predependencies(&self, items: &mut [PackageItem]) -> Result<()> {
        for idx in 0..items.len() {
            self.check_interrupt()?;
            if items[idx].kind() != PackageKind::Explicit
                || !items[idx].field_is_defined("Pre-Depends")
            {
                continue;
            }
            let pre_depends = items[idx].dependencies("Pre-Depends")?;
            for term in &pre_depends.terms {
                self.find_installed_predependency(items, idx, term)?;
            }
        }
        Ok(())
    }

    fn find_installed_predependency(
        &self,
        items: &mut [PackageItem],
        origin: usize,
        term: &DependencyTerm,
    ) -> Result<()> {
        let applicable: Vec<Dependency> = self.applicable(term).into_iter().cloned().collect();
        if applicable.is_empty() {
            return Ok(());
        }
        let origin_name = items[origin].name().to_string();
        let mut first_error: Option<DebToolkitError> = None;

        for dep in &applicable {
            for j in 0..items.len() {
                if j == origin || items[j].name() != dep.name {
                    continue;
                }
                match items[j].kind() {
                    PackageKind::Installed | PackageKind::Unpacked => {}
                    _ => continue,
                }
                if !match_dependency_version(dep, &items[j]) {
                    if self.flags.force_depends_version {
                        tracing::warn!(
                            "using {} even though it has an incompatible version \
                             for pre-dependency {dep} of {origin_name}",
                            items[j].name()
                        );
                    } else {
                        first_error.get_or_insert(DebToolkitError::Constraint(format!(
                            "package {} has an incompatible version for \
                             pre-dependency {dep} of {origin_name}",
                            items[j].name()
                        )));
                        continue;
                    }
                }
                if items[j].kind() == PackageKind::Installed {
                    tracing::debug!("pre-dependency {dep} of {origin_name} is satisfied");
                    return Ok(());
                }
                // unpacked but not configured
                if self.flags.force_configure_any {
                    tracing::warn!(
                        "pre-dependency {dep} of {origin_name} is not yet configured; \
                         it will be auto-configured before the installation proceeds"
                    );
                    items[j].set_kind(PackageKind::Configure);
                    return Ok(());
                }
                if self.flags.force_depends {
                    tracing::warn!(
                        "pre-dependency {dep} of {origin_name} is not yet configured \
                         but accepted because of force-depends"
                    );
                    return Ok(());
                }
                first_error.get_or_insert(DebToolkitError::Constraint(format!(
                    "package {origin_name} has pre-dependency {dep} which still \
                     needs to be configured"
                )));
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if self.flags.force_depends {
            tracing::warn!(
                "package {origin_name} has pre-dependency {} which is not installed",
                applicable[0]
            );
            return Ok(());
        }
        Err(DebToolkitError::Constraint(format!(
            "package {origin_name} has pre-dependency {} which is not installed",
            applicable[0]
        )))
    }

    // === Build-dependency validation (single point) ===

    /// What: Reject binary packages that declare build dependencies.
    ///
    /// Inputs:
    /// - `items`: The master list.
    ///
    /// Output:
    /// - Returns a `Constraint` error for an explicit binary package with
    ///   a `Built-Using` or `Depends-On` field.
    pub fn validate_dependency_fields(&self, items: &[PackageItem]) -> Result<()> {
        for item in items {
            if item.kind() != PackageKind::Explicit || item.architecture().is_source() {
                continue;
            }
            for field in BUILD_DEPENDENCY_FIELDS {
                if item.field_is_defined(field) {
                    return Err(DebToolkitError::Constraint(format!(
                        "{} is a binary package and yet it includes build \
                         dependencies ({field})",
                        item.name()
                    )));
                }
            }
        }
        Ok(())
    }

    // === Trim phase ===

    /// What: Trim the universe before tree enumeration.
    ///
    /// Inputs:
    /// - `items`: The master list.
    ///
    /// Output:
    /// - Returns a `Constraint` error for conflicts involving explicit or
    ///   installed packages, unsatisfiable dependencies, or circular
    ///   dependency chains.
    ///
    /// Details:
    /// - First applies `Conflicts`/`Breaks` cross-checks, then walks every
    ///   explicit item's dependency fields recursively, invalidating
    ///   available candidates that can never be used and recording
    ///   whether choices remain.
    pub fn trim_packages(&mut self, items: &mut Vec<PackageItem>) -> Result<()> {
        self.has_choices = false;
        self.max_depth = 0;

        for idx in 0..items.len() {
            self.check_interrupt()?;
            match items[idx].kind() {
                PackageKind::Explicit => {
                    if self.task != Task::Reconfigure {
                        self.trim_conflicts(items, idx, false)?;
                    }
                }
                PackageKind::Installed
                | PackageKind::Configure
                | PackageKind::Implicit
                | PackageKind::Available
                | PackageKind::Upgrade
                | PackageKind::UpgradeImplicit
                | PackageKind::Downgrade
                | PackageKind::Unpacked => {
                    self.trim_conflicts(items, idx, true)?;
                }
                _ => {}
            }
        }

        if self.task != Task::Reconfigure {
            let mut parents = Vec::new();
            for idx in 0..items.len() {
                if items[idx].kind() == PackageKind::Explicit {
                    self.trim_available(items, idx, &mut parents)?;
                    debug_assert!(parents.is_empty());
                }
            }
        }
        Ok(())
    }

    /// What: Apply one item's `Conflicts` and `Breaks` fields to a tree.
    ///
    /// Details:
    /// - `Breaks` is skipped entirely when the task only unpacks.
    fn trim_conflicts(
        &self,
        items: &mut [PackageItem],
        idx: usize,
        only_explicit: bool,
    ) -> Result<()> {
        let conflicts = items[idx].dependencies("Conflicts")?;
        for term in &conflicts.terms {
            for dep in &term.alternatives {
                if !self.dependency_applies(dep) {
                    continue;
                }
                for j in 0..items.len() {
                    if j == idx {
                        continue;
                    }
                    self.check_interrupt()?;
                    self.trim_cross(items, idx, j, dep, false, only_explicit)?;
                }
            }
        }

        if self.task == Task::Unpack {
            return Ok(());
        }

        let breaks = items[idx].dependencies("Breaks")?;
        for term in &breaks.terms {
            for dep in &term.alternatives {
                if !self.dependency_applies(dep) {
                    continue;
                }
                for j in 0..items.len() {
                    if j == idx {
                        continue;
                    }
                    self.check_interrupt()?;
                    self.trim_cross(items, idx, j, dep, true, only_explicit)?;
                }
            }
        }
        Ok(())
    }

    /// What: Apply one conflict/break tuple to one defender item.
    ///
    /// Details:
    /// - When either side is repository-provided (`Available`, `Implicit`,
    ///   `UpgradeImplicit`) that side is invalidated silently; a match
    ///   between two command-line/installed packages is an error unless
    ///   the matching force flag downgrades it.
    fn trim_cross(
        &self,
        items: &mut [PackageItem],
        parent_idx: usize,
        defender_idx: usize,
        dep: &Dependency,
        is_breaks: bool,
        only_explicit: bool,
    ) -> Result<()> {
        let defender_kind = items[defender_idx].kind();
        if only_explicit && defender_kind != PackageKind::Explicit {
            return Ok(());
        }
        let parent_kind = items[parent_idx].kind();
        let check_available = matches!(
            parent_kind,
            PackageKind::Explicit
                | PackageKind::Installed
                | PackageKind::Configure
                | PackageKind::Upgrade
                | PackageKind::Downgrade
                | PackageKind::Unpacked
        );
        match defender_kind {
            PackageKind::Available if !check_available => return Ok(()),
            PackageKind::Unpacked if is_breaks => return Ok(()),
            PackageKind::Available
            | PackageKind::Explicit
            | PackageKind::Installed
            | PackageKind::Configure
            | PackageKind::Implicit
            | PackageKind::Upgrade
            | PackageKind::UpgradeImplicit
            | PackageKind::Downgrade
            | PackageKind::Unpacked => {}
            _ => return Ok(()),
        }
        if items[defender_idx].name() != dep.name
            || !match_dependency_version(dep, &items[defender_idx])
        {
            return Ok(());
        }

        let mut hard = true;
        if matches!(
            defender_kind,
            PackageKind::Implicit | PackageKind::UpgradeImplicit | PackageKind::Available
        ) {
            items[defender_idx].set_kind(PackageKind::Invalid);
            hard = false;
        }
        if matches!(
            parent_kind,
            PackageKind::Implicit | PackageKind::UpgradeImplicit | PackageKind::Available
        ) {
            items[parent_idx].set_kind(PackageKind::Invalid);
            hard = false;
        }
        if !hard {
            return Ok(());
        }

        let verb = if is_breaks { "breaks" } else { "is in conflict with" };
        let message = format!(
            "package {} {verb} {}",
            items[parent_idx].name(),
            items[defender_idx].name()
        );
        let forced = if is_breaks {
            self.flags.force_breaks
        } else {
            self.flags.force_conflicts
        };
        if forced {
            tracing::warn!("{message}");
            Ok(())
        } else {
            Err(DebToolkitError::Constraint(message))
        }
    }

    /// What: Recursively trim the dependencies of one item.
    ///
    /// Details:
    /// - The parent stack detects cycles; depth beyond the hard cap is a
    ///   constraint violation rather than a stack crash.
    fn trim_available(
        &mut self,
        items: &mut Vec<PackageItem>,
        idx: usize,
        parents: &mut Vec<usize>,
    ) -> Result<()> {
        if parents.len() >= TREE_DEPTH_LIMIT {
            return Err(DebToolkitError::Constraint(format!(
                "dependency chain exceeds the maximum depth of {TREE_DEPTH_LIMIT}"
            )));
        }
        if parents.len() > self.max_depth {
            self.max_depth = parents.len();
            if self.max_depth == TREE_DEPTH_WARNING {
                tracing::warn!(
                    "dependency tree depth reached {TREE_DEPTH_WARNING}; \
                     deep recursion may be slow"
                );
            }
        }
        if parents.contains(&idx) {
            return Err(DebToolkitError::Constraint(format!(
                "package {} depends on itself (circular dependency)",
                items[idx].name()
            )));
        }

        for field in DEPENDENCY_FIELDS {
            if !items[idx].field_is_defined(field) {
                continue;
            }
            let deps = items[idx].dependencies(field)?;
            for term in &deps.terms {
                self.trim_term(items, idx, parents, term, field)?;
            }
        }
        Ok(())
    }

    /// What: Trim one dependency term (a disjunction of alternatives).
    fn trim_term(
        &mut self,
        items: &mut Vec<PackageItem>,
        idx: usize,
        parents: &mut Vec<usize>,
        term: &DependencyTerm,
        field: &str,
    ) -> Result<()> {
        let applicable: Vec<Dependency> = self.applicable(term).into_iter().cloned().collect();
        if applicable.is_empty() {
            return Ok(());
        }

        let mut satisfied = false;
        let mut blocked_installed: Option<String> = None;
        for dep in &applicable {
            match self.trim_alternative(items, idx, parents, dep, field)? {
                AlternativeOutcome::Satisfied => satisfied = true,
                AlternativeOutcome::AutoUpgradeBlocked(name) => {
                    blocked_installed.get_or_insert(name);
                }
                AlternativeOutcome::NotFound => {}
            }
        }
        if satisfied {
            return Ok(());
        }

        let item_name = items[idx].name().to_string();
        let description = applicable
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ");
        let message = blocked_installed.map_or_else(
            || {
                format!(
                    "no explicit or implicit package satisfies dependency \
                     {description} of package {item_name}"
                )
            },
            |installed| {
                format!(
                    "package {item_name} depends on {installed} which is an \
                     installed package with an incompatible version constraint \
                     ({description})"
                )
            },
        );
        if self.flags.force_depends {
            tracing::warn!("{message}; it may still get installed");
            Ok(())
        } else {
            Err(DebToolkitError::Constraint(message))
        }
    }

    /// What: Trim one dependency alternative.
    ///
    /// Details:
    /// - An explicit match invalidates every available candidate of the
    ///   same name (they can never legally be used). An installed match
    ///   keeps the candidates (they may still serve an upgrade). Available
    ///   matches are recursed into; version-incompatible candidates are
    ///   invalidated; more than one surviving candidate records a choice.
    fn trim_alternative(
        &mut self,
        items: &mut Vec<PackageItem>,
        idx: usize,
        parents: &mut Vec<usize>,
        dep: &Dependency,
        field: &str,
    ) -> Result<AlternativeOutcome> {
        self.check_interrupt()?;

        // explicit packages win outright
        if let Some(j) = find_by_name(items, &dep.name, &[PackageKind::Explicit]) {
            if match_dependency_version(dep, &items[j]) {
                Self::check_source_target(field, &items[j])?;
                parents.push(idx);
                let recursed = self.trim_available(items, j, parents);
                parents.pop();
                recursed?;
            } else if self.flags.force_depends_version {
                tracing::warn!(
                    "using package {} which has an incompatible version for \
                     dependency {dep} found in field {field}",
                    items[j].name()
                );
            } else {
                return Err(DebToolkitError::Constraint(format!(
                    "package {} depends on {} with an incompatible version \
                     constraint ({dep})",
                    items[idx].name(),
                    items[j].name()
                )));
            }
            for k in 0..items.len() {
                if items[k].kind() == PackageKind::Available && items[k].name() == dep.name {
                    items[k].set_kind(PackageKind::Invalid);
                }
            }
            return Ok(AlternativeOutcome::Satisfied);
        }

        // already-installed packages are trusted as-is
        let mut version_blocked = false;
        for j in 0..items.len() {
            if items[j].name() != dep.name {
                continue;
            }
            match items[j].kind() {
                PackageKind::Unpacked => {
                    tracing::debug!(
                        "unpacked version of {} checked for dependency {dep}; \
                         if selected later, it will need configuring",
                        items[j].name()
                    );
                }
                PackageKind::Installed
                | PackageKind::Configure
                | PackageKind::Upgrade
                | PackageKind::Downgrade => {}
                _ => continue,
            }
            if match_dependency_version(dep, &items[j]) {
                // installed state is trusted; no recursion needed
                return Ok(AlternativeOutcome::Satisfied);
            }
            version_blocked = true;
            break;
        }

        // available candidates from the repositories
        let mut match_count = 0_u32;
        let mut installed_match = false;
        let mut blocked_name = None;
        for j in 0..items.len() {
            self.check_interrupt()?;
            if items[j].name() != dep.name {
                continue;
            }
            match items[j].kind() {
                PackageKind::Installed | PackageKind::Upgrade => {
                    installed_match = true;
                    blocked_name = Some(items[j].name().to_string());
                }
                PackageKind::Available => {
                    if match_dependency_version(dep, &items[j]) {
                        match_count += 1;
                        parents.push(idx);
                        let recursed = self.trim_available(items, j, parents);
                        parents.pop();
                        recursed?;
                    } else {
                        tracing::debug!(
                            "candidate {} {} does not satisfy dependency {dep} \
                             because of its version",
                            items[j].name(),
                            items[j].version()
                        );
                        items[j].set_kind(PackageKind::Invalid);
                    }
                }
                _ => {}
            }
        }

        if match_count > 1 {
            self.has_choices = true;
        }
        if match_count > 0 || installed_match {
            return Ok(AlternativeOutcome::Satisfied);
        }
        if version_blocked {
            return Ok(AlternativeOutcome::AutoUpgradeBlocked(
                blocked_name.unwrap_or_else(|| dep.name.clone()),
            ));
        }
        Ok(AlternativeOutcome::NotFound)
    }

    // === Self-contained check ===

    /// What: Check whether explicit and installed items alone satisfy all
    /// dependencies.
    ///
    /// Inputs:
    /// - `items`: The master list (no repository items needed).
    ///
    /// Output:
    /// - Returns `true` when everything is self contained, so repository
    ///   loading and tree enumeration can be skipped entirely.
    pub fn installed_dependencies_satisfied(&self, items: &mut [PackageItem]) -> Result<bool> {
        let mut all_satisfied = true;
        for idx in 0..items.len() {
            self.check_interrupt()?;
            if items[idx].kind() != PackageKind::Explicit {
                continue;
            }
            for field in DEPENDENCY_FIELDS {
                if !items[idx].field_is_defined(field) {
                    continue;
                }
                let deps = items[idx].dependencies(field)?;
                for term in &deps.terms {
                    if !self.term_satisfied_locally(items, idx, term, field)? {
                        all_satisfied = false;
                    }
                }
            }
        }
        Ok(all_satisfied)
    }

    fn term_satisfied_locally(
        &self,
        items: &mut [PackageItem],
        idx: usize,
        term: &DependencyTerm,
        field: &str,
    ) -> Result<bool> {
        let applicable: Vec<Dependency> = self.applicable(term).into_iter().cloned().collect();
        if applicable.is_empty() {
            return Ok(true);
        }
        for dep in &applicable {
            if self.find_explicit_dependency(items, idx, dep, field)? {
                return Ok(true);
            }
        }
        for dep in &applicable {
            if Self::find_installed_dependency(items, idx, dep, field)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// What: Search the explicit items for a dependency match.
    ///
    /// Details:
    /// - Two distinct explicit files defining the same package name are a
    ///   fatal error; the same file listed twice is deduplicated by
    ///   invalidating the copy.
    fn find_explicit_dependency(
        &self,
        items: &mut [PackageItem],
        idx: usize,
        dep: &Dependency,
        field: &str,
    ) -> Result<bool> {
        let mut found: Option<usize> = None;
        for j in 0..items.len() {
            if j == idx
                || items[j].kind() != PackageKind::Explicit
                || items[j].name() != dep.name
            {
                continue;
            }
            if let Some(previous) = found {
                if items[previous].path() == items[j].path() {
                    items[j].set_kind(PackageKind::Invalid);
                } else {
                    return Err(DebToolkitError::Constraint(format!(
                        "files {} and {} define the same package but are \
                         distinct files",
                        items[previous].path().display(),
                        items[j].path().display()
                    )));
                }
            } else {
                Self::check_source_target(field, &items[j])?;
                found = Some(j);
            }
        }
        let Some(j) = found else {
            return Ok(false);
        };
        if match_dependency_version(dep, &items[j]) {
            tracing::debug!(
                "using {} to satisfy dependency {dep}, as specified on the \
                 command line",
                items[j].name()
            );
            return Ok(true);
        }
        Err(DebToolkitError::Constraint(format!(
            "package {} has an incompatible version for dependency {dep}",
            items[j].name()
        )))
    }

    /// What: Search the installed items for a dependency match.
    fn find_installed_dependency(
        items: &mut [PackageItem],
        idx: usize,
        dep: &Dependency,
        field: &str,
    ) -> Result<bool> {
        let mut found: Option<usize> = None;
        for j in 0..items.len() {
            if j == idx
                || items[j].kind() != PackageKind::Installed
                || items[j].name() != dep.name
            {
                continue;
            }
            if found.is_some() {
                return Err(DebToolkitError::DatabaseCorrupt(format!(
                    "found two distinct installed packages named {}",
                    dep.name
                )));
            }
            Self::check_source_target(field, &items[j])?;
            found = Some(j);
        }
        let Some(j) = found else {
            return Ok(false);
        };
        if match_dependency_version(dep, &items[j]) {
            return Ok(true);
        }
        // the installed version mismatches; the full resolver may still
        // auto-upgrade it
        Ok(false)
    }

    // === Tree verification ===

    /// What: Apply the implicit-for-upgrade rule to an available item.
    ///
    /// Details:
    /// - A candidate whose name is installed must be a strict upgrade of
    ///   a fully installed record; downgrades, held packages, and
    ///   packages left unpacked are rejected. Accepting the upgrade marks
    ///   the installed record `UpgradeImplicit`.
    fn check_implicit_for_upgrade(
        &self,
        tree: &mut [PackageItem],
        idx: usize,
    ) -> ImplicitUpgrade {
        if self.task != Task::Install {
            return ImplicitUpgrade::Allowed;
        }
        let name = tree[idx].name().to_string();
        let Some(installed_idx) = find_by_name(
            tree,
            &name,
            &[PackageKind::Installed, PackageKind::Unpacked],
        ) else {
            return ImplicitUpgrade::Allowed;
        };

        let status = tree[installed_idx]
            .original_status()
            .unwrap_or(PackageStatus::NotInstalled);
        let expected_kind = match status {
            PackageStatus::NotInstalled | PackageStatus::ConfigFiles => {
                return ImplicitUpgrade::Allowed;
            }
            PackageStatus::Installed => PackageKind::Installed,
            // auto-configure of implicit targets is not allowed, so a
            // merely unpacked record blocks the promotion
            _ => return ImplicitUpgrade::Blocked,
        };

        let cmp = versioncmp(tree[installed_idx].version(), tree[idx].version());
        if cmp == Ordering::Equal {
            // the same version is already installed; this candidate should
            // have been dropped earlier
            tracing::debug!(
                "candidate {} {} matches the installed version exactly",
                name,
                tree[idx].version()
            );
            return ImplicitUpgrade::Blocked;
        }
        if cmp == Ordering::Greater {
            // implicit downgrades are forbidden
            return ImplicitUpgrade::Blocked;
        }
        if tree[installed_idx].selection() == Selection::Hold {
            // held even against force-hold on the implicit path
            return ImplicitUpgrade::Held;
        }
        if tree[installed_idx].kind() == expected_kind {
            tree[installed_idx].set_kind(PackageKind::UpgradeImplicit);
        }
        ImplicitUpgrade::Allowed
    }

    /// What: Resolve every dependency of one tree item, promoting
    /// available candidates to implicit as needed.
    ///
    /// Details:
    /// - Failures are recorded in `missing`/`held` rather than raised, so
    ///   a failing tree only loses the competition.
    fn find_dependencies(
        &self,
        tree: &mut Vec<PackageItem>,
        idx: usize,
        missing: &mut Vec<Dependency>,
        held: &mut Vec<Dependency>,
    ) -> Result<()> {
        self.trim_conflicts(tree, idx, false)?;

        for field in DEPENDENCY_FIELDS {
            if !tree[idx].field_is_defined(field) {
                continue;
            }
            let deps = tree[idx].dependencies(field)?;
            for term in &deps.terms {
                let applicable: Vec<Dependency> =
                    self.applicable(term).into_iter().cloned().collect();
                if applicable.is_empty() {
                    continue;
                }

                let mut outcome = TermOutcome::NotFound;
                let mut unpacked_idx = None;
                'alternatives: for dep in &applicable {
                    for tree_idx in 0..tree.len() {
                        self.check_interrupt()?;
                        if tree[tree_idx].name() != dep.name {
                            continue;
                        }
                        match tree[tree_idx].kind() {
                            PackageKind::Available => {
                                if !match_dependency_version(dep, &tree[tree_idx]) {
                                    continue;
                                }
                                match self.check_implicit_for_upgrade(tree, tree_idx) {
                                    ImplicitUpgrade::Allowed => {
                                        Self::check_source_target(field, &tree[tree_idx])?;
                                        tree[tree_idx].set_kind(PackageKind::Implicit);
                                        if let Some(old) = find_by_name(
                                            tree,
                                            dep.name.as_str(),
                                            &[PackageKind::UpgradeImplicit],
                                        ) {
                                            tree[tree_idx].set_upgrade_link(old);
                                        }
                                        self.find_dependencies(tree, tree_idx, missing, held)?;
                                        outcome = TermOutcome::Success;
                                        break 'alternatives;
                                    }
                                    ImplicitUpgrade::Held => {
                                        if outcome != TermOutcome::Success {
                                            outcome = TermOutcome::Held;
                                        }
                                    }
                                    ImplicitUpgrade::Blocked => {}
                                }
                            }
                            PackageKind::Explicit
                            | PackageKind::Implicit
                            | PackageKind::Installed
                            | PackageKind::Configure
                            | PackageKind::Upgrade
                            | PackageKind::UpgradeImplicit
                            | PackageKind::Downgrade => {
                                if match_dependency_version(dep, &tree[tree_idx]) {
                                    Self::check_source_target(field, &tree[tree_idx])?;
                                    outcome = TermOutcome::Success;
                                    break 'alternatives;
                                }
                            }
                            PackageKind::Unpacked => {
                                if match_dependency_version(dep, &tree[tree_idx])
                                    && outcome == TermOutcome::NotFound
                                {
                                    outcome = TermOutcome::Unpacked;
                                    unpacked_idx = Some(tree_idx);
                                }
                            }
                            _ => {}
                        }
                    }
                }

                if outcome == TermOutcome::Unpacked {
                    if self.flags.force_configure_any {
                        if let Some(j) = unpacked_idx {
                            tree[j].set_kind(PackageKind::Configure);
                        }
                        outcome = TermOutcome::Success;
                    } else {
                        outcome = TermOutcome::NotFound;
                    }
                }
                match outcome {
                    TermOutcome::Success => {}
                    TermOutcome::Held => held.push(applicable[0].clone()),
                    _ => missing.push(applicable[0].clone()),
                }
            }
        }
        Ok(())
    }

    /// What: Verify one candidate tree.
    ///
    /// Inputs:
    /// - `tree`: The candidate (mutated: promotions happen in place).
    /// - `missing`, `held`: Receive the unsatisfied dependencies.
    ///
    /// Output:
    /// - Returns `true` when the tree satisfies every dependency.
    pub fn verify_tree(
        &self,
        tree: &mut Vec<PackageItem>,
        missing: &mut Vec<Dependency>,
        held: &mut Vec<Dependency>,
    ) -> Result<bool> {
        if self.task == Task::Reconfigure {
            // the existing installation tree is assumed proper
            return Ok(true);
        }
        let missing_before = missing.len();
        let held_before = held.len();
        for idx in 0..tree.len() {
            if tree[idx].kind() == PackageKind::Explicit {
                self.find_dependencies(tree, idx, missing, held)?;
            }
        }
        Ok(missing.len() == missing_before && held.len() == held_before)
    }

    // === Best-tree selection ===

    fn unsatisfied_error(missing: &[Dependency], held: &[Dependency]) -> DebToolkitError {
        let render = |deps: &[Dependency]| {
            deps.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !missing.is_empty() {
            DebToolkitError::Constraint(format!(
                "missing dependencies: [{}]; package not installed",
                render(missing)
            ))
        } else if !held.is_empty() {
            DebToolkitError::Constraint(format!(
                "the following dependencies are in a held state: [{}]; \
                 package not installed",
                render(held)
            ))
        } else {
            DebToolkitError::Constraint(
                "could not create a complete tree; some dependencies are in \
                 conflict or have incompatible versions"
                    .to_string(),
            )
        }
    }

    /// What: Choose the final tree after trimming.
    ///
    /// Inputs:
    /// - `items`: The trimmed master list; replaced by the winning tree.
    ///
    /// Output:
    /// - Returns a `Constraint` error when no tree verifies, or when two
    ///   non-identical best trees tie and the computer cannot decide.
    ///
    /// Details:
    /// - Without choices the trimmed universe is the final tree. With
    ///   choices, permutations are enumerated lazily; only the best tree
    ///   so far is kept in memory.
    pub fn resolve_tree(&mut self, items: &mut Vec<PackageItem>) -> Result<()> {
        if !self.has_choices {
            let mut missing = Vec::new();
            let mut held = Vec::new();
            if !self.verify_tree(items, &mut missing, &mut held)? {
                if held.is_empty() && self.flags.force_depends {
                    tracing::warn!(
                        "installing despite unsatisfied dependencies: {}",
                        missing
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    return Ok(());
                }
                return Err(Self::unsatisfied_error(&missing, &held));
            }
            return Ok(());
        }

        let mut generator = TreeGenerator::new(items.clone());
        tracing::debug!(
            "enumerating up to {} candidate trees",
            generator.permutation_count()
        );
        let mut best: Option<Vec<PackageItem>> = None;
        while let Some(mut tree) = generator.next_tree() {
            self.check_interrupt()?;
            let mut missing = Vec::new();
            let mut held = Vec::new();
            let verified = self.verify_tree(&mut tree, &mut missing, &mut held)?;
            tracing::debug!(
                tree = generator.tree_number(),
                verified,
                "candidate tree checked"
            );
            if !verified {
                continue;
            }
            match best.as_ref() {
                None => best = Some(tree),
                Some(current) => {
                    if trees_are_practically_identical(&tree, current) {
                        continue;
                    }
                    match compare_trees(&tree, current, self.interrupt)? {
                        Ordering::Equal => {
                            return Err(DebToolkitError::Constraint(
                                "found two trees that are considered similar; the \
                                 computer cannot choose between two implicit \
                                 dependencies, add dependencies to your command \
                                 line to resolve the issue"
                                    .to_string(),
                            ));
                        }
                        Ordering::Greater => best = Some(tree),
                        Ordering::Less => {}
                    }
                }
            }
        }

        match best {
            Some(tree) => {
                *items = tree;
                Ok(())
            }
            None => Err(DebToolkitError::Constraint(
                "could not create a complete tree, some dependencies are missing"
                    .to_string(),
            )),
        }
    }
}

/// What: Check whether two trees install the same `(name, version)` set.
///
/// Inputs:
/// - `left`, `right`: The two verified trees.
///
/// Output:
/// - Returns `true` when both trees are practically identical: neither is
///   preferable and the comparison is skipped.
#[must_use]
pub fn trees_are_practically_identical(left: &[PackageItem], right: &[PackageItem]) -> bool {
    let installable = |items: &[PackageItem]| {
        items
            .iter()
            .filter(|item| item.is_marked_for_install())
            .count()
    };
    if installable(left) != installable(right) {
        return false;
    }
    for left_item in left.iter().filter(|item| item.is_marked_for_install()) {
        let equivalent = right.iter().any(|right_item| {
            right_item.is_marked_for_install()
                && right_item.name() == left_item.name()
                && versioncmp(right_item.version(), left_item.version()) == Ordering::Equal
        });
        if !equivalent {
            return false;
        }
    }
    true
}

/// What: Compare two verified trees by package versions.
///
/// Inputs:
/// - `left`, `right`: The two trees.
/// - `interrupt`: Interrupt hook polled inside the loop.
///
/// Output:
/// - Returns `Greater` when `left` only upgrades over `right` (with at
///   least one strict win), `Less` for the converse, and `Equal` for a
///   tie the caller must treat as computer indecision.
pub fn compare_trees(
    left: &[PackageItem],
    right: &[PackageItem],
    interrupt: &dyn Interrupt,
) -> Result<Ordering> {
    let mut result = Ordering::Equal;
    for left_item in left.iter().filter(|item| item.is_marked_for_install()) {
        if interrupt.stop_now() {
            return Err(DebToolkitError::Interrupted);
        }
        for right_item in right.iter().filter(|item| item.is_marked_for_install()) {
            if left_item.name() != right_item.name() {
                continue;
            }
            let cmp = versioncmp(left_item.version(), right_item.version());
            if cmp == Ordering::Equal {
                continue;
            }
            if result == Ordering::Equal {
                result = cmp;
            } else if result != cmp {
                // one package is newer on each side: indecision
                return Ok(Ordering::Equal);
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DirectoryCodec;
    use crate::store::NoInterrupt;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn item(root: &Path, name: &str, version: &str, kind: PackageKind) -> PackageItem {
        let pkg = root.join(format!("{name}_{version}.deb"));
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(
            pkg.join("control"),
            format!("Package: {name}\nVersion: {version}\nArchitecture: all\n"),
        )
        .expect("write control");
        let codec = DirectoryCodec::new();
        PackageItem::from_archive(&codec, &pkg, kind).expect("item")
    }

    #[test]
    fn match_dependency_version_checks_constraint() {
        let tmp = TempDir::new().expect("tempdir");
        let candidate = item(tmp.path(), "t1", "1.5", PackageKind::Available);

        let unconstrained = Dependency::new("t1");
        assert!(match_dependency_version(&unconstrained, &candidate));

        let satisfied = Dependency::with_version("t1", DepOperator::Ge, "1.0");
        assert!(match_dependency_version(&satisfied, &candidate));

        let unsatisfied = Dependency::with_version("t1", DepOperator::Eq, "2.0");
        assert!(!match_dependency_version(&unsatisfied, &candidate));
    }

    #[test]
    fn identical_trees_are_practically_identical() {
        let tmp = TempDir::new().expect("tempdir");
        let left = vec![
            item(tmp.path(), "a", "1.0", PackageKind::Explicit),
            item(tmp.path(), "b", "2.0", PackageKind::Implicit),
            item(tmp.path(), "c", "3.0", PackageKind::Available),
        ];
        let mut right = left.clone();
        assert!(trees_are_practically_identical(&left, &right));

        // an available item does not count as installable
        right[2].set_kind(PackageKind::Invalid);
        assert!(trees_are_practically_identical(&left, &right));

        // a different implicit version breaks the identity
        right[1] = item(tmp.path(), "b", "2.1", PackageKind::Implicit);
        assert!(!trees_are_practically_identical(&left, &right));
    }

    #[test]
    fn compare_trees_prefers_newer_versions() {
        let tmp = TempDir::new().expect("tempdir");
        let older = vec![
            item(tmp.path(), "a", "1.0", PackageKind::Explicit),
            item(tmp.path(), "b", "1.0", PackageKind::Implicit),
        ];
        let newer = vec![
            item(tmp.path(), "a", "1.0", PackageKind::Explicit),
            item(tmp.path(), "b", "2.0", PackageKind::Implicit),
        ];
        assert_eq!(
            compare_trees(&newer, &older, &NoInterrupt).expect("compare"),
            Ordering::Greater
        );
        assert_eq!(
            compare_trees(&older, &newer, &NoInterrupt).expect("compare"),
            Ordering::Less
        );
    }

    #[test]
    fn compare_trees_mixed_winners_tie() {
        let tmp = TempDir::new().expect("tempdir");
        let left = vec![
            item(tmp.path(), "a", "2.0", PackageKind::Implicit),
            item(tmp.path(), "b", "1.0", PackageKind::Implicit),
        ];
        let right = vec![
            item(tmp.path(), "a", "1.0", PackageKind::Implicit),
            item(tmp.path(), "b", "2.0", PackageKind::Implicit),
        ];
        assert_eq!(
            compare_trees(&left, &right, &NoInterrupt).expect("compare"),
            Ordering::Equal
        );
    }

    #[test]
    fn trim_invalidates_version_incompatible_candidates() {
        let tmp = TempDir::new().expect("tempdir");
        let flags = InstallFlags::default();
        let target = Architecture::parse("linux-amd64").expect("arch");
        let mut resolver = Resolver::new(&flags, Task::Install, &target, &NoInterrupt);

        let explicit = {
            let pkg = tmp.path().join("t2_1.0.deb");
            fs::create_dir_all(&pkg).expect("mkdir");
            fs::write(
                pkg.join("control"),
                "Package: t2\nVersion: 1.0\nArchitecture: all\nDepends: t1 (>= 2.0)\n",
            )
            .expect("write control");
            let codec = DirectoryCodec::new();
            PackageItem::from_archive(&codec, &pkg, PackageKind::Explicit).expect("item")
        };
        let mut items = vec![
            explicit,
            item(tmp.path(), "t1", "1.0", PackageKind::Available),
            item(tmp.path(), "t1", "2.0", PackageKind::Available),
        ];
        resolver.trim_packages(&mut items).expect("trim succeeds");
        assert_eq!(items[1].kind(), PackageKind::Invalid);
        assert_eq!(items[2].kind(), PackageKind::Available);
        assert!(!resolver.has_choices());
    }

    #[test]
    fn trim_reports_unsatisfiable_dependency() {
        let tmp = TempDir::new().expect("tempdir");
        let flags = InstallFlags::default();
        let target = Architecture::parse("linux-amd64").expect("arch");
        let mut resolver = Resolver::new(&flags, Task::Install, &target, &NoInterrupt);

        let pkg = tmp.path().join("t2_1.0.deb");
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(
            pkg.join("control"),
            "Package: t2\nVersion: 1.0\nArchitecture: all\nDepends: ghost\n",
        )
        .expect("write control");
        let codec = DirectoryCodec::new();
        let mut items =
            vec![PackageItem::from_archive(&codec, &pkg, PackageKind::Explicit).expect("item")];
        let error = resolver
            .trim_packages(&mut items)
            .expect_err("ghost cannot be satisfied");
        assert!(error.to_string().contains("ghost"));
    }
}
