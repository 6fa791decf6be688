//! Repository discovery and the conversion walk.
//!
//! A directory containing the marker entry is a repository: it is handed to
//! the converter and never descended into. Any other directory is a
//! container whose sub-directories are visited depth-first in name order.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::converter::RepositoryConverter;
use crate::errors::WalkError;
use crate::process::CommandRunner;

/// What a single directory listing revealed.
enum Listing {
    Repository,
    Container(Vec<PathBuf>),
}

fn scan_dir(dir: &Path, marker: &OsStr) -> std::io::Result<Listing> {
    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().as_os_str() == marker {
            return Ok(Listing::Repository);
        }
        // Symlinks are not followed.
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.file_name());
        }
    }
    subdirs.sort();
    Ok(Listing::Container(
        subdirs.into_iter().map(|name| dir.join(name)).collect(),
    ))
}

/// Lazy depth-first iterator over the repositories below a root.
///
/// Yields `Err` for every directory that cannot be listed and keeps going
/// with the rest of the tree.
pub struct RepoDiscovery {
    marker: OsString,
    stack: Vec<PathBuf>,
}

impl RepoDiscovery {
    pub fn new(root: impl Into<PathBuf>, marker: impl AsRef<OsStr>) -> Self {
        Self {
            marker: marker.as_ref().to_os_string(),
            stack: vec![root.into()],
        }
    }
}

impl Iterator for RepoDiscovery {
    type Item = Result<PathBuf, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(dir) = self.stack.pop() {
            match scan_dir(&dir, &self.marker) {
                Ok(Listing::Repository) => return Some(Ok(dir)),
                Ok(Listing::Container(children)) => {
                    // Reversed so the first child is popped first.
                    self.stack.extend(children.into_iter().rev());
                }
                Err(source) => {
                    return Some(Err(WalkError::DirectoryAccess { path: dir, source }));
                }
            }
        }
        None
    }
}

/// A repository whose conversion failed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedRepository {
    pub path: PathBuf,
    pub error: String,
}

/// A directory that could not be listed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UnreadableDirectory {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a full walk.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WalkSummary {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<FailedRepository>,
    pub unreadable: Vec<UnreadableDirectory>,
}

impl WalkSummary {
    /// Number of repositories a conversion was attempted for.
    pub fn attempted(&self) -> usize {
        self.converted.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unreadable.is_empty()
    }
}

/// Repositories found by [`discover`], without converting anything.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Discovery {
    pub repositories: Vec<PathBuf>,
    pub unreadable: Vec<UnreadableDirectory>,
}

/// List every repository below `root`. Only an unreadable `root` is an error.
pub fn discover(root: &Path, marker: &str) -> Result<Discovery, WalkError> {
    let mut found = Discovery::default();
    for item in RepoDiscovery::new(root, marker) {
        match item {
            Ok(repo) => found.repositories.push(repo),
            Err(e) => record_unreadable(root, e, &mut found.unreadable)?,
        }
    }
    Ok(found)
}

/// Return the error if it concerns `root`, otherwise log and record it.
fn record_unreadable(
    root: &Path,
    err: WalkError,
    unreadable: &mut Vec<UnreadableDirectory>,
) -> Result<(), WalkError> {
    let WalkError::DirectoryAccess { path, source } = err;
    if path == root {
        return Err(WalkError::DirectoryAccess { path, source });
    }
    warn!(dir = %path.display(), error = %source, "skipping unreadable directory");
    unreadable.push(UnreadableDirectory {
        path,
        error: source.to_string(),
    });
    Ok(())
}

/// Walks a tree and converts every repository found, one at a time.
pub struct TreeWalker<R> {
    converter: RepositoryConverter<R>,
    marker: String,
}

impl<R: CommandRunner> TreeWalker<R> {
    pub fn new(converter: RepositoryConverter<R>) -> Self {
        let marker = converter.config().source.marker.clone();
        Self { converter, marker }
    }

    /// Convert every repository below `root`.
    ///
    /// A failed conversion or an unreadable sub-directory is logged and
    /// recorded; the walk carries on. Only an unreadable `root` fails the
    /// whole call.
    pub async fn walk(&self, root: &Path) -> Result<WalkSummary, WalkError> {
        info!(root = %root.display(), marker = %self.marker, "scanning for repositories");
        let mut summary = WalkSummary::default();

        for item in RepoDiscovery::new(root, &self.marker) {
            let repo = match item {
                Ok(repo) => repo,
                Err(e) => {
                    record_unreadable(root, e, &mut summary.unreadable)?;
                    continue;
                }
            };

            debug!(repo = %repo.display(), "found repository");
            match self.converter.convert(&repo).await {
                Ok(()) => summary.converted.push(repo),
                Err(e) => {
                    error!(repo = %repo.display(), error = %e, "repository conversion failed");
                    summary.failed.push(FailedRepository {
                        path: repo,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            converted = summary.converted.len(),
            failed = summary.failed.len(),
            unreadable = summary.unreadable.len(),
            "walk complete"
        );
        Ok(summary)
    }
}
