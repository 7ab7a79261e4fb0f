//! Unified error type for deb-toolkit.

use thiserror::Error;

/// Unified error type for all deb-toolkit operations.
///
/// This error type covers all possible failure modes across different modules,
/// providing clear, actionable error messages. Each variant corresponds to one
/// class of failure: malformed input, a violated packaging constraint, a broken
/// database, a transient condition, a failed maintainer script, a user
/// interrupt, or an internal logic error.
#[derive(Error, Debug)]
pub enum DebToolkitError {
    /// Filesystem or process I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error (repository indexes, journal).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed input: package file, control field, version string, or
    /// architecture triple.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A packaging constraint was violated: unsatisfied dependency, version
    /// mismatch, conflict, break, architecture or distribution mismatch,
    /// hold violation, essential-file overwrite, disk full, or a duplicate
    /// file across packages.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The package database is inconsistent: duplicate installed records,
    /// conflicting sources for the same package, or a missing index file.
    #[error("Database corrupt: {0}")]
    DatabaseCorrupt(String),

    /// A transient condition: repository fetch failure or lock contention.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The database lock is held by another process.
    #[error(
        "database is locked: {0}; if no other process is running, \
         use remove_lock() to recover"
    )]
    Locked(String),

    /// A maintainer script exited with a non-zero status.
    #[error("script {stage} of package {package} failed with exit code {code}")]
    ScriptFailed {
        /// Name of the package whose script failed.
        package: String,
        /// Lifecycle stage of the failing script (e.g. "preinst").
        stage: String,
        /// Exit code reported by the script interpreter.
        code: i32,
    },

    /// Package not found in the store, database, or repositories.
    #[error("Package not found: {0}")]
    NotFound(String),

    /// The interrupt handler requested a stop.
    #[error("operation interrupted by user")]
    Interrupted,

    /// Invalid input parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Broken internal logic; indicates a bug in deb-toolkit itself.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for deb-toolkit operations.
pub type Result<T> = std::result::Result<T, DebToolkitError>;

/// Aggregated findings of one validation phase.
///
/// Validation does not stop at the first problem: errors and warnings
/// accumulate so the user sees every failing package at once. The plan is
/// rejected iff any error is present; warnings never abort.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// Fatal findings; any entry rejects the plan.
    pub errors: Vec<String>,
    /// Non-fatal findings, usually checks downgraded by a force flag.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// What: Create an empty report.
    ///
    /// Inputs: None
    ///
    /// Output:
    /// - Returns a report with no findings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// What: Record a fatal finding.
    ///
    /// Inputs:
    /// - `message`: Description naming the package and the check.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.errors.push(message);
    }

    /// What: Record a non-fatal finding.
    ///
    /// Inputs:
    /// - `message`: Description naming the package and the check.
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// What: Check whether the plan survives this report.
    ///
    /// Inputs:
    /// - `self`: The report.
    ///
    /// Output:
    /// - Returns `true` when no error was recorded.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.errors.is_empty()
    }

    /// What: Convert the report into a result.
    ///
    /// Inputs:
    /// - `self`: The report (consumed).
    ///
    /// Output:
    /// - Returns `Ok(())` when acceptable, otherwise a `Constraint` error
    ///   joining every finding.
    pub fn into_result(self) -> Result<()> {
        if self.is_acceptable() {
            Ok(())
        } else {
            Err(DebToolkitError::Constraint(self.errors.join("; ")))
        }
    }
}
