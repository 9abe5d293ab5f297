//! Tree encoding and directory structure.

use crate::error::{Error, Result};
use crate::hash::{HASH_SIZE, Hash};
use std::fmt;
use std::io::Read;

/// Kind of a tree or index entry, stored as its POSIX mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular (non-executable) file.
    Regular,
    /// Executable file.
    Executable,
    /// Symbolic link; the blob holds the link target.
    Symlink,
    /// Subdirectory; the hash names a tree.
    Directory,
}

impl FileMode {
    /// Numeric mode as written into trees and the index.
    pub fn to_u32(self) -> u32 {
        match self {
            FileMode::Regular => 0o100644,
            FileMode::Executable => 0o100755,
            FileMode::Symlink => 0o120000,
            FileMode::Directory => 0o040000,
        }
    }

    /// Parse a numeric mode.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0o100644 => Ok(FileMode::Regular),
            0o100755 => Ok(FileMode::Executable),
            0o120000 => Ok(FileMode::Symlink),
            0o040000 => Ok(FileMode::Directory),
            _ => Err(Error::invalid_tree_entry(format!(
                "Unknown file mode: {:o}",
                value
            ))),
        }
    }

    /// Parse the octal text form (`100644`, `40000`, ...).
    pub fn from_octal(s: &str) -> Result<Self> {
        let value = u32::from_str_radix(s, 8)
            .map_err(|_| Error::invalid_tree_entry(format!("Invalid octal mode: {}", s)))?;
        Self::from_u32(value)
    }

    /// True for subdirectory entries.
    pub fn is_dir(self) -> bool {
        self == FileMode::Directory
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.to_u32())
    }
}

/// An entry in a tree (file or subdirectory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Single path component.
    pub name: String,
    /// Entry kind.
    pub mode: FileMode,
    /// Hash of the blob or subtree.
    pub hash: Hash,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(name: impl Into<String>, mode: FileMode, hash: Hash) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, mode, hash })
    }

    /// Encode the entry to bytes.
    ///
    /// Format:
    /// - 4 bytes: mode (u32 LE)
    /// - 32 bytes: hash
    /// - 1 byte: name_len
    /// - N bytes: name (UTF-8)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + HASH_SIZE + 1 + self.name.len());
        buf.extend_from_slice(&self.mode.to_u32().to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());
        buf
    }

    /// Decode an entry from a reader.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut mode_buf = [0u8; 4];
        reader.read_exact(&mut mode_buf)?;
        let mode = FileMode::from_u32(u32::from_le_bytes(mode_buf))?;

        let mut hash_buf = [0u8; HASH_SIZE];
        reader.read_exact(&mut hash_buf)?;
        let hash = Hash::from_bytes(hash_buf);

        let mut name_len_buf = [0u8; 1];
        reader.read_exact(&mut name_len_buf)?;
        let name_len = name_len_buf[0] as usize;
        if name_len == 0 {
            return Err(Error::invalid_tree_entry("Name length is zero"));
        }

        let mut name_buf = vec![0u8; name_len];
        reader.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf)
            .map_err(|e| Error::invalid_tree_entry(format!("Invalid UTF-8 in name: {}", e)))?;

        Self::new(name, mode, hash)
    }
}

/// Check that `name` is a single, encodable path component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_tree_entry("Name cannot be empty"));
    }
    if name.len() > 255 {
        return Err(Error::invalid_tree_entry(format!(
            "Name too long: {} bytes (max 255)",
            name.len()
        )));
    }
    if name.contains('\0') {
        return Err(Error::invalid_tree_entry("Name cannot contain null bytes"));
    }
    if name.contains('/') {
        return Err(Error::invalid_tree_entry(format!(
            "Name cannot contain path separators: {}",
            name
        )));
    }
    Ok(())
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    /// Compare by name (bytewise UTF-8) for canonical ordering.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.as_bytes().cmp(other.name.as_bytes())
    }
}

/// Encode a list of tree entries in canonical (name) order.
pub fn encode_tree(mut entries: Vec<TreeEntry>) -> Vec<u8> {
    entries.sort();

    let mut buf = Vec::new();
    for entry in entries {
        buf.extend_from_slice(&entry.encode());
    }
    buf
}

/// Decode a list of tree entries from bytes.
pub fn decode_tree(data: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut reader = std::io::Cursor::new(data);
    let mut entries = Vec::new();

    while reader.position() < data.len() as u64 {
        entries.push(TreeEntry::decode(&mut reader)?);
    }

    Ok(entries)
}
