//! Repository handling: `sources.list` parsing, package indexes, and the
//! remote-fetch seam.
//!
//! A repository is either *direct* (a filesystem directory of package
//! archives) or *remote* (reached through an opaque [`RemoteFetcher`]).
//! Direct repositories get their index built on the fly when missing;
//! remote repositories without an index are silently skipped.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::{PackageCodec, is_archive_path};
use crate::control::ControlFile;
use crate::error::{DebToolkitError, Result};

/// File name of the serialized package index inside a repository.
pub const INDEX_FILENAME: &str = "index.json";

// === Sources list ===

/// One parsed `sources.list` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Entry type tag (first token of the line).
    pub entry_type: String,
    /// `name=value` options between the type and the URI.
    pub options: BTreeMap<String, String>,
    /// Repository URI.
    pub uri: String,
    /// Optional distribution path component.
    pub distribution: Option<String>,
    /// Component names fanned out under the distribution.
    pub components: Vec<String>,
}

impl SourceEntry {
    /// What: Expand the entry into concrete repository URIs.
    ///
    /// Inputs:
    /// - `self`: The parsed entry.
    ///
    /// Output:
    /// - Returns `<uri>/<distribution>/<component>` once per component,
    ///   `<uri>/<distribution>` when no components are listed, or just
    ///   `<uri>` when no distribution is given.
    #[must_use]
    pub fn resolved_uris(&self) -> Vec<String> {
        let base = self.uri.trim_end_matches('/');
        match &self.distribution {
            None => vec![base.to_string()],
            Some(distribution) => {
                if self.components.is_empty() {
                    vec![format!("{base}/{distribution}")]
                } else {
                    self.components
                        .iter()
                        .map(|component| format!("{base}/{distribution}/{component}"))
                        .collect()
                }
            }
        }
    }
}

/// What: Parse a `sources.list` document.
///
/// Inputs:
/// - `text`: The file contents.
///
/// Output:
/// - Returns the parsed entries, or a `Parse` error.
///
/// Details:
/// - Blank lines and lines starting with `#` are ignored.
/// - Grammar per line:
///   `<type> [<name>=<value> ...] <uri> [<distribution> [<component> ...]]`.
pub fn parse_sources_list(text: &str) -> Result<Vec<SourceEntry>> {
    let mut entries = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let entry_type = tokens
            .next()
            .ok_or_else(|| DebToolkitError::Parse(format!("empty sources entry on line {}", number + 1)))?
            .to_string();

        let mut options = BTreeMap::new();
        let mut uri = None;
        for token in tokens.by_ref() {
            if let Some((name, value)) = token.split_once('=') {
                options.insert(name.to_string(), value.to_string());
            } else {
                uri = Some(token.to_string());
                break;
            }
        }
        let Some(uri) = uri else {
            return Err(DebToolkitError::Parse(format!(
                "sources entry on line {} has no URI",
                number + 1
            )));
        };
        let distribution = tokens.next().map(ToString::to_string);
        let components = tokens.map(ToString::to_string).collect();
        entries.push(SourceEntry {
            entry_type,
            options,
            uri,
            distribution,
            components,
        });
    }
    Ok(entries)
}

// === Index ===

/// One package recorded in a repository index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Archive file name relative to the repository root.
    pub filename: String,
    /// The package's control file text.
    pub control: String,
}

/// Serialized package index of one repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Indexed packages.
    pub packages: Vec<IndexEntry>,
}

impl RepositoryIndex {
    /// What: Deserialize an index from its JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// What: Serialize the index to JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// What: Parse one entry's control text.
    ///
    /// Inputs:
    /// - `entry`: The index entry.
    ///
    /// Output:
    /// - Returns the parsed control file.
    pub fn control_of(entry: &IndexEntry) -> Result<ControlFile> {
        ControlFile::parse(&entry.control)
    }
}

/// Fetch interface to remote repositories.
///
/// The transport is an external collaborator; the planner only asks for a
/// URI's bytes. `Ok(None)` means the resource does not exist, which for an
/// index silently excludes the repository.
pub trait RemoteFetcher {
    /// Fetch the bytes behind a URI, `None` when the resource is missing.
    fn fetch(&self, uri: &str) -> Result<Option<Vec<u8>>>;
}

/// What: Scan a direct repository directory and build its index.
///
/// Inputs:
/// - `dir`: Repository directory.
/// - `recursive`: Whether to descend into subdirectories.
/// - `codec`: Archive codec used to read each package's control file.
///
/// Output:
/// - Returns the index; unreadable packages are skipped with a warning.
pub fn build_index(
    dir: &Path,
    recursive: bool,
    codec: &dyn PackageCodec,
) -> Result<RepositoryIndex> {
    let mut index = RepositoryIndex::default();
    scan_directory(dir, dir, recursive, codec, &mut index)?;
    index.packages.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(index)
}

fn scan_directory(
    root: &Path,
    dir: &Path,
    recursive: bool,
    codec: &dyn PackageCodec,
    index: &mut RepositoryIndex,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_archive_path(&path) {
            match codec.read_control(&path) {
                Ok(control) => {
                    let filename = path
                        .strip_prefix(root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    index.packages.push(IndexEntry {
                        filename,
                        control: control.to_text(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "skipping unreadable package {}: {e}",
                        path.display()
                    );
                }
            }
        } else if recursive && path.is_dir() {
            scan_directory(root, &path, recursive, codec, index)?;
        }
    }
    Ok(())
}

/// What: Load a direct repository's index, building it when missing.
///
/// Inputs:
/// - `dir`: Repository directory.
/// - `recursive`: Whether index construction descends subdirectories.
/// - `codec`: Archive codec for index construction.
///
/// Output:
/// - Returns the index. A freshly built index is also written back into
///   the repository (best effort; a read-only repository still works).
pub fn load_direct_repository(
    dir: &Path,
    recursive: bool,
    codec: &dyn PackageCodec,
) -> Result<RepositoryIndex> {
    let index_path = dir.join(INDEX_FILENAME);
    if index_path.is_file() {
        tracing::debug!("reading index file from repository {}", dir.display());
        let bytes = fs::read(&index_path)?;
        return RepositoryIndex::from_bytes(&bytes);
    }
    tracing::debug!(
        "creating index file, since it does not exist in repository {}",
        dir.display()
    );
    let index = build_index(dir, recursive, codec)?;
    if let Err(e) = fs::write(&index_path, index.to_bytes()?) {
        tracing::debug!("could not persist repository index: {e}");
    }
    Ok(index)
}

/// What: Load a remote repository's index through the fetcher.
///
/// Inputs:
/// - `fetcher`: Transport collaborator.
/// - `uri`: Repository URI.
///
/// Output:
/// - Returns `None` when the repository ships no index (the repository is
///   then skipped), the parsed index otherwise.
pub fn load_remote_repository(
    fetcher: &dyn RemoteFetcher,
    uri: &str,
) -> Result<Option<RepositoryIndex>> {
    let index_uri = format!("{}/{INDEX_FILENAME}", uri.trim_end_matches('/'));
    match fetcher.fetch(&index_uri)? {
        Some(bytes) => Ok(Some(RepositoryIndex::from_bytes(&bytes)?)),
        None => {
            tracing::debug!("skip remote repository {uri}: it does not include an index");
            Ok(None)
        }
    }
}

/// What: Resolve an index entry's archive path inside a repository.
///
/// Inputs:
/// - `repository`: Repository directory.
/// - `entry`: The index entry.
///
/// Output:
/// - Returns the joined path.
#[must_use]
pub fn entry_path(repository: &Path, entry: &IndexEntry) -> PathBuf {
    repository.join(&entry.filename)
}
