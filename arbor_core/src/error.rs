//! Error types for arbor_core.

use crate::hash::Hash;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using arbor_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while staging, building trees and committing.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Index entries collide, or a path is malformed.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A staged file could not be stat'ed, opened or read from the working tree.
    #[error("Source file unavailable: {path}: {source}")]
    SourceFileUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The content or reference store rejected a write.
    #[error("Store write failed for {target}: {reason}")]
    StoreWriteFailure { target: String, reason: String },

    /// Commit options are incomplete.
    #[error("Invalid commit options: {reason}")]
    InvalidCommitOptions { reason: String },

    /// HEAD or the reference it names cannot be resolved.
    #[error("Cannot resolve reference {name}: {reason}")]
    ReferenceResolutionFailure { name: String, reason: String },

    /// The commit object was stored but HEAD, or the branch it names, did not move.
    ///
    /// Retrying only the reference update with `commit` completes the commit.
    #[error("Commit {commit} was stored but HEAD was not advanced: {source}")]
    HeadNotAdvanced {
        commit: Hash,
        #[source]
        source: Box<Error>,
    },

    /// A working tree file no longer matches the hash it was staged with.
    #[error("Content of {path} changed since it was staged: expected {expected}, got {actual}")]
    ContentMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Object file is corrupted or invalid.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Object not found in store.
    #[error("Object not found: {hash}")]
    ObjectNotFound { hash: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Invalid reference name or format.
    #[error("Invalid reference: {reason}")]
    InvalidRef { reason: String },

    /// Invalid object type.
    #[error("Invalid object type: expected {expected}, got {got}")]
    InvalidObjectType { expected: String, got: String },

    /// Invalid tree entry.
    #[error("Invalid tree entry: {reason}")]
    InvalidTreeEntry { reason: String },

    /// Commit payload cannot be decoded.
    #[error("Invalid commit: {reason}")]
    InvalidCommit { reason: String },

    /// Index file cannot be decoded.
    #[error("Invalid index: {reason}")]
    InvalidIndex { reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Compression or decompression error.
    #[error("Compression error: {reason}")]
    Compression { reason: String },
}

impl Error {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a SourceFileUnavailable error.
    pub fn source_file_unavailable(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::SourceFileUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Create a StoreWriteFailure error.
    pub fn store_write(target: impl Into<String>, reason: impl ToString) -> Self {
        Error::StoreWriteFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidCommitOptions error.
    pub fn invalid_commit_options(reason: impl Into<String>) -> Self {
        Error::InvalidCommitOptions {
            reason: reason.into(),
        }
    }

    /// Create a ReferenceResolutionFailure error.
    pub fn unresolved_ref(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ReferenceResolutionFailure {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a HeadNotAdvanced error.
    pub fn head_not_advanced(commit: Hash, source: Error) -> Self {
        Error::HeadNotAdvanced {
            commit,
            source: Box::new(source),
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Error::ObjectNotFound { hash: hash.into() }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidRef error.
    pub fn invalid_ref(reason: impl Into<String>) -> Self {
        Error::InvalidRef {
            reason: reason.into(),
        }
    }

    /// Create an InvalidObjectType error.
    pub fn invalid_object_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::InvalidObjectType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an InvalidTreeEntry error.
    pub fn invalid_tree_entry(reason: impl Into<String>) -> Self {
        Error::InvalidTreeEntry {
            reason: reason.into(),
        }
    }

    /// Create an InvalidCommit error.
    pub fn invalid_commit(reason: impl Into<String>) -> Self {
        Error::InvalidCommit {
            reason: reason.into(),
        }
    }

    /// Create an InvalidIndex error.
    pub fn invalid_index(reason: impl Into<String>) -> Self {
        Error::InvalidIndex {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::Compression {
            reason: reason.into(),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
