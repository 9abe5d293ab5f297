//! Working tree access.
//!
//! The persister only ever needs two things from the working tree: the size
//! and mode of a staged path, and a reader over its bytes.

use crate::tree::FileMode;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the metadata directory inside a working tree.
pub const META_DIR: &str = ".arbor";

/// Size and kind of a working tree file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mode: FileMode,
}

/// Read access to files by slash-separated relative path.
pub trait Worktree {
    /// Size and mode of the file at `path`.
    fn stat(&self, path: &str) -> io::Result<FileStat>;

    /// Reader over the content of the file at `path`.
    ///
    /// For symlinks this is the link target.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;
}

impl<W: Worktree + ?Sized> Worktree for &W {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        (**self).stat(path)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        (**self).open(path)
    }
}

/// A working tree rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsWorktree {
    root: PathBuf,
}

impl FsWorktree {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a relative slash-separated path.
    pub fn full_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |full, part| full.join(part))
    }

    /// Relative paths of the files under `dir`, sorted.
    ///
    /// `.gitignore` rules are honoured and the metadata directory is skipped.
    /// An empty `dir` walks the whole tree.
    pub fn files_under(&self, dir: &str) -> io::Result<Vec<String>> {
        let walker = ignore::WalkBuilder::new(self.full_path(dir))
            .hidden(false) // Include dotfiles
            .git_ignore(true)
            .require_git(false)
            .filter_entry(|entry| {
                entry.depth() == 0
                    || entry
                        .file_name()
                        .to_str()
                        .is_none_or(|name| name != META_DIR && name != ".git")
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_none_or(|file_type| file_type.is_dir()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(io::Error::other)?;
            let parts: Option<Vec<&str>> = relative
                .components()
                .map(|component| component.as_os_str().to_str())
                .collect();
            match parts {
                Some(parts) => files.push(parts.join("/")),
                None => debug!(path = %entry.path().display(), "skipping non-UTF-8 path"),
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Worktree for FsWorktree {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        let metadata = fs::symlink_metadata(self.full_path(path))?;
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path),
            ));
        }
        let (size, mode) = if metadata.file_type().is_symlink() {
            let target = fs::read_link(self.full_path(path))?;
            (
                target.as_os_str().as_encoded_bytes().len() as u64,
                FileMode::Symlink,
            )
        } else {
            (metadata.len(), mode_for_metadata(&metadata))
        };
        Ok(FileStat { size, mode })
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let full = self.full_path(path);
        if fs::symlink_metadata(&full)?.file_type().is_symlink() {
            let target = fs::read_link(&full)?;
            return Ok(Box::new(Cursor::new(
                target.as_os_str().as_encoded_bytes().to_vec(),
            )));
        }
        Ok(Box::new(fs::File::open(full)?))
    }
}

#[cfg(unix)]
fn mode_for_metadata(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

#[cfg(not(unix))]
fn mode_for_metadata(_metadata: &fs::Metadata) -> FileMode {
    FileMode::Regular
}

/// A working tree held in memory, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorktree {
    files: BTreeMap<String, (FileMode, Vec<u8>)>,
}

impl MemoryWorktree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a regular file.
    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.insert_with_mode(path, FileMode::Regular, content);
    }

    /// Add or replace a file with an explicit mode.
    pub fn insert_with_mode(&mut self, path: &str, mode: FileMode, content: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), (mode, content.into()));
    }

    /// Delete a file.
    pub fn remove(&mut self, path: &str) {
        self.files.remove(path);
    }

    /// Paths of all files, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Fails like the filesystem would: `IsADirectory` when files live under
    /// `path`, `NotADirectory` when one of its parents is a file.
    fn lookup(&self, path: &str) -> io::Result<&(FileMode, Vec<u8>)> {
        if let Some(file) = self.files.get(path) {
            return Ok(file);
        }
        let dir = format!("{}/", path);
        let (kind, what) = if self
            .files
            .range(dir.clone()..)
            .next()
            .is_some_and(|(file, _)| file.starts_with(&dir))
        {
            (io::ErrorKind::IsADirectory, "is a directory")
        } else if path
            .match_indices('/')
            .any(|(i, _)| self.files.contains_key(&path[..i]))
        {
            (io::ErrorKind::NotADirectory, "has a file as parent")
        } else {
            (io::ErrorKind::NotFound, "not found")
        };
        Err(io::Error::new(kind, format!("{} {}", path, what)))
    }
}

impl Worktree for MemoryWorktree {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        let (mode, content) = self.lookup(path)?;
        Ok(FileStat {
            size: content.len() as u64,
            mode: *mode,
        })
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let (_, content) = self.lookup(path)?;
        Ok(Box::new(&content[..]))
    }
}
