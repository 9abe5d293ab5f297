//! # Arbor Core
//!
//! Turns a staging index into commits in a content-addressed object store.
//!
//! A commit is written in four steps:
//!
//! 1. [`TreeArena::build`] folds the flat index entries into one node per
//!    directory, rejecting colliding or malformed paths.
//! 2. [`Persister::persist`] stores blobs and trees bottom-up, reusing any
//!    blob the store already holds.
//! 3. The commit object is encoded and stored.
//! 4. HEAD, or the branch it names, is moved to the new commit.
//!
//! The store, the references and the working tree are explicit handles
//! ([`ObjectStore`], [`RefStore`], [`Worktree`]) so in-memory implementations
//! can stand in for the filesystem.
//!
//! ## Example
//!
//! ```no_run
//! use arbor_core::{CommitOptions, DiskRepository, Signature};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut repo = DiskRepository::init("./project")?;
//! repo.stage("src/main.rs")?;
//! repo.save_index()?;
//!
//! let options = CommitOptions::signed(Signature::new("Ada", "ada@example.com"));
//! let commit = repo.commit("Initial commit", &options)?;
//! println!("committed {}", commit);
//! # Ok(())
//! # }
//! ```

mod builder;
mod commit;
mod config;
mod error;
mod hash;
mod index;
mod object;
mod persist;
mod refs;
mod repository;
mod status;
mod store;
mod tree;
mod worktree;

pub use builder::{ChildEntry, DirNode, TreeArena};
pub use commit::{Commit, CommitOptions, Signature};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use hash::{Algorithm, Hash};
pub use index::{Index, IndexEntry, normalize_path};
pub use object::{ObjectHeader, ObjectType};
pub use persist::{PersistStats, Persister};
pub use refs::{BRANCH_PREFIX, HEAD, MemoryRefs, RefManager, RefStore, Reference};
pub use repository::{BranchInfo, DiskRepository, Repository};
pub use status::{FileState, Status};
pub use store::{DEFAULT_BRANCH, MemoryStore, ObjectStore, Store};
pub use tree::{FileMode, TreeEntry, decode_tree, encode_tree};
pub use worktree::{FileStat, FsWorktree, META_DIR, MemoryWorktree, Worktree};
