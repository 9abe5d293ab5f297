//! The staging index: the flat list of entries the next commit will contain.
//!
//! On disk the index is one line per entry, sorted by path:
//!
//! ```text
//! <mode-octal> <hash-hex> <path>
//! ```

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::ObjectType;
use crate::tree::FileMode;
use crate::worktree::Worktree;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Slash-separated path relative to the working tree root.
    pub path: String,
    pub mode: FileMode,
    /// Blob object hash of the staged content.
    pub hash: Hash,
}

impl IndexEntry {
    /// Create an entry, normalizing and validating `path`.
    pub fn new(path: &str, mode: FileMode, hash: Hash) -> Result<Self> {
        if mode.is_dir() {
            return Err(Error::invalid_path(path, "directories cannot be staged"));
        }
        Ok(Self {
            path: normalize_path(path)?,
            mode,
            hash,
        })
    }

    fn to_line(&self) -> String {
        format!("{:o} {} {}", self.mode.to_u32(), self.hash, self.path)
    }

    fn from_line(line: &str) -> Result<Self> {
        let mut parts = line.splitn(3, ' ');
        let (Some(mode), Some(hash), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::invalid_index(format!(
                "expected 3 fields in {:?}",
                line
            )));
        };
        let mode = FileMode::from_octal(mode)
            .map_err(|e| Error::invalid_index(format!("bad mode in {:?}: {}", line, e)))?;
        let hash = Hash::from_hex(hash)
            .map_err(|e| Error::invalid_index(format!("bad hash in {:?}: {}", line, e)))?;
        Self::new(path, mode, hash)
    }
}

/// Normalize a relative path to slash-separated form and reject malformed ones.
///
/// Backslashes become slashes and a single leading `./` or trailing `/` is
/// dropped. Empty, `.` and `..` components are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let slashed = path.replace('\\', "/");
    let trimmed = slashed.strip_prefix("./").unwrap_or(&slashed);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(Error::invalid_path(path, "path is empty"));
    }
    if trimmed.starts_with('/') {
        return Err(Error::invalid_path(path, "path must be relative"));
    }
    for part in trimmed.split('/') {
        match part {
            "" => return Err(Error::invalid_path(path, "empty path component")),
            "." | ".." => {
                return Err(Error::invalid_path(path, "'.' and '..' are not allowed"));
            }
            _ if part.contains('\0') => {
                return Err(Error::invalid_path(path, "NUL in path"));
            }
            _ if part.len() > 255 => {
                return Err(Error::invalid_path(path, "component longer than 255 bytes"));
            }
            _ => {}
        }
    }
    Ok(trimmed.to_string())
}

/// Staged entries, unique by path and kept sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from entries; later entries replace earlier ones with the same path.
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.upsert(entry);
        }
        index
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.position(path).ok().map(|i| &self.entries[i])
    }

    fn position(&self, path: &str) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
    }

    /// Add an entry or replace the one with the same path.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.position(&entry.path) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Remove the entry for `path`, returning it if present.
    pub fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        self.position(path).ok().map(|i| self.entries.remove(i))
    }

    /// Hash the working tree file at `path` and stage it.
    ///
    /// Only the index changes; the blob is written when the tree is persisted.
    pub fn stage<W: Worktree>(&mut self, worktree: &W, path: &str) -> Result<&IndexEntry> {
        let path = normalize_path(path)?;
        let stat = worktree
            .stat(&path)
            .map_err(|e| Error::source_file_unavailable(&path, e))?;
        let reader = worktree
            .open(&path)
            .map_err(|e| Error::source_file_unavailable(&path, e))?;
        let hash = Hash::hash_object_reader(ObjectType::Blob, stat.size, reader).map_err(
            |e| match e {
                Error::Io { source } => Error::source_file_unavailable(&path, source),
                other => other,
            },
        )?;

        debug!(path = %path, %hash, "staged");
        self.upsert(IndexEntry::new(&path, stat.mode, hash)?);
        self.get(&path)
            .ok_or_else(|| Error::invalid_index(format!("{} vanished after staging", path)))
    }

    /// Read the index file; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let mut index = Self::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            index.upsert(IndexEntry::from_line(line)?);
        }
        Ok(index)
    }

    /// Write the index file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::invalid_index("index path has no parent"))?;
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        for entry in &self.entries {
            writeln!(temp_file, "{}", entry.to_line())?;
        }
        temp_file.flush()?;
        temp_file.persist(path)?;
        Ok(())
    }
}
