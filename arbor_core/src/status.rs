//! Working tree status of tracked paths, and auto-staging from it.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::{Index, IndexEntry};
use crate::object::ObjectType;
use crate::tree::FileMode;
use crate::worktree::Worktree;
use std::io;

/// State of one tracked path relative to its index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unmodified,
    /// Content or mode differs; carries what the working tree has now.
    Modified { mode: FileMode, hash: Hash },
    Deleted,
}

/// Snapshot of every tracked path, in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    entries: Vec<(String, FileState)>,
}

impl Status {
    /// Compare each index entry against the working tree.
    ///
    /// A path that is no longer a file is `Deleted`: it is missing, a
    /// directory now, or one of its parents became a file. Any other stat or
    /// read failure is an error.
    pub fn compute<W: Worktree>(index: &Index, worktree: &W) -> Result<Self> {
        let mut entries = Vec::with_capacity(index.len());
        for entry in index.entries() {
            let state = match worktree.stat(&entry.path) {
                Err(e) if is_gone(&e) => FileState::Deleted,
                Err(e) => return Err(Error::source_file_unavailable(&entry.path, e)),
                Ok(stat) => {
                    let reader = worktree
                        .open(&entry.path)
                        .map_err(|e| Error::source_file_unavailable(&entry.path, e))?;
                    let hash = Hash::hash_object_reader(ObjectType::Blob, stat.size, reader)
                        .map_err(|e| match e {
                            Error::Io { source } => {
                                Error::source_file_unavailable(&entry.path, source)
                            }
                            other => other,
                        })?;
                    if hash == entry.hash && stat.mode == entry.mode {
                        FileState::Unmodified
                    } else {
                        FileState::Modified {
                            mode: stat.mode,
                            hash,
                        }
                    }
                }
            };
            entries.push((entry.path.clone(), state));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, FileState)] {
        &self.entries
    }

    /// Paths that are modified or deleted.
    pub fn changed(&self) -> impl Iterator<Item = (&str, &FileState)> {
        self.entries
            .iter()
            .filter(|(_, state)| *state != FileState::Unmodified)
            .map(|(path, state)| (path.as_str(), state))
    }

    pub fn is_clean(&self) -> bool {
        self.changed().next().is_none()
    }

    /// Bring the index in line with the snapshot.
    ///
    /// Modified paths are upserted with their new mode and hash, deleted paths
    /// are removed. Returns the number of index entries touched.
    pub fn apply(&self, index: &mut Index) -> Result<usize> {
        let mut touched = 0;
        for (path, state) in self.changed() {
            match state {
                FileState::Modified { mode, hash } => {
                    index.upsert(IndexEntry::new(path, *mode, *hash)?);
                }
                FileState::Deleted => {
                    index.remove(path);
                }
                FileState::Unmodified => continue,
            }
            touched += 1;
        }
        Ok(touched)
    }
}

fn is_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory | io::ErrorKind::IsADirectory
    )
}
