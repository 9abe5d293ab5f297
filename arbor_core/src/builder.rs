//! Folding flat index entries into a directory arena.
//!
//! Building is the pure first phase of writing a tree: every directory the
//! entries imply gets a node keyed by its slash-separated path (the root is
//! `""`), and each node lists its children by name. Subdirectory children carry
//! no hash yet; the persister fills those in bottom-up.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::{IndexEntry, normalize_path};
use crate::tree::FileMode;
use std::collections::{BTreeMap, HashSet};

/// Key of the root directory node.
pub const ROOT: &str = "";

/// A child of a directory node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    /// Single path component.
    pub name: String,
    pub mode: FileMode,
    /// Full path; for a subdirectory this is also its node key.
    pub path: String,
    /// Blob hash for files, `None` for subdirectories until persisted.
    pub hash: Option<Hash>,
}

/// A directory and its children, in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirNode {
    children: Vec<ChildEntry>,
}

impl DirNode {
    pub fn children(&self) -> &[ChildEntry] {
        &self.children
    }
}

/// Every directory implied by a set of index entries, keyed by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeArena {
    nodes: BTreeMap<String, DirNode>,
    files: usize,
}

impl TreeArena {
    /// Fold `entries` into an arena.
    ///
    /// Fails with `InvalidPath` when a path is malformed, when the same path
    /// appears twice, or when one entry's path is a directory of another's.
    pub fn build(entries: &[IndexEntry]) -> Result<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), DirNode::default());
        let mut files: HashSet<String> = HashSet::with_capacity(entries.len());

        for entry in entries {
            let path = normalize_path(&entry.path)?;
            if entry.mode.is_dir() {
                return Err(Error::invalid_path(path, "directory mode on an index entry"));
            }
            if files.contains(&path) {
                return Err(Error::invalid_path(path, "staged more than once"));
            }
            if nodes.contains_key(&path) {
                return Err(Error::invalid_path(
                    path,
                    "is a file but another entry uses it as a directory",
                ));
            }

            let mut parent = ROOT.to_string();
            let mut components = path.split('/').peekable();
            while let Some(name) = components.next() {
                let prefix = if parent.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", parent, name)
                };

                if components.peek().is_none() {
                    attach(
                        &mut nodes,
                        &parent,
                        ChildEntry {
                            name: name.to_string(),
                            mode: entry.mode,
                            path: prefix,
                            hash: Some(entry.hash),
                        },
                    )?;
                    break;
                }

                if files.contains(&prefix) {
                    return Err(Error::invalid_path(
                        path,
                        format!("{} is staged as a file", prefix),
                    ));
                }
                if !nodes.contains_key(&prefix) {
                    attach(
                        &mut nodes,
                        &parent,
                        ChildEntry {
                            name: name.to_string(),
                            mode: FileMode::Directory,
                            path: prefix.clone(),
                            hash: None,
                        },
                    )?;
                    nodes.insert(prefix.clone(), DirNode::default());
                }
                parent = prefix;
            }
            files.insert(path);
        }

        Ok(Self {
            nodes,
            files: files.len(),
        })
    }

    /// The root directory node.
    pub fn root(&self) -> &DirNode {
        // build() always inserts the root
        &self.nodes[ROOT]
    }

    pub fn node(&self, path: &str) -> Option<&DirNode> {
        self.nodes.get(path)
    }

    /// Directory paths, sorted; the root comes first as `""`.
    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Number of directories including the root.
    pub fn dir_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of file entries.
    pub fn file_count(&self) -> usize {
        self.files
    }
}

fn attach(nodes: &mut BTreeMap<String, DirNode>, parent: &str, child: ChildEntry) -> Result<()> {
    let node = nodes
        .get_mut(parent)
        .ok_or_else(|| Error::invalid_path(&child.path, "parent directory missing"))?;
    node.children.push(child);
    Ok(())
}
