//! The repository facade: index plus object store, references and working tree.
//!
//! A commit runs `build → persist → store commit → advance HEAD`. The
//! reference is only moved once the commit object is stored, so any earlier
//! failure leaves every reference untouched.

use crate::builder::TreeArena;
use crate::commit::{Commit, CommitOptions, Signature};
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::index::{Index, IndexEntry};
use crate::object::ObjectType;
use crate::persist::Persister;
use crate::refs::{BRANCH_PREFIX, HEAD, RefManager, RefStore, Reference};
use crate::status::Status;
use crate::store::{ObjectStore, Store};
use crate::worktree::{FsWorktree, META_DIR, Worktree};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A branch head as shown in branch listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Short name, without `refs/heads/`.
    pub name: String,
    pub commit: Hash,
    pub tree: Hash,
    pub author: Signature,
    /// First line of the commit message.
    pub summary: String,
    /// True when HEAD names this branch.
    pub is_head: bool,
}

/// Index, object store, references and working tree of one repository.
#[derive(Debug)]
pub struct Repository<S: ObjectStore, R: RefStore, W: Worktree> {
    store: S,
    refs: R,
    worktree: W,
    index: Index,
}

impl<S: ObjectStore, R: RefStore, W: Worktree> Repository<S, R, W> {
    pub fn new(store: S, refs: R, worktree: W, index: Index) -> Self {
        Self {
            store,
            refs,
            worktree,
            index,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn refs(&self) -> &R {
        &self.refs
    }

    pub fn worktree(&self) -> &W {
        &self.worktree
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    /// Stage one working tree file.
    pub fn stage(&mut self, path: &str) -> Result<&IndexEntry> {
        self.index.stage(&self.worktree, path)
    }

    /// Drop a path from the index, leaving the working tree alone.
    pub fn unstage(&mut self, path: &str) -> Option<IndexEntry> {
        self.index.remove(path)
    }

    /// Status of every tracked path.
    pub fn status(&self) -> Result<Status> {
        Status::compute(&self.index, &self.worktree)
    }

    /// Update the index for modified and deleted tracked files.
    ///
    /// Only the index changes; nothing is written to the store.
    pub fn auto_stage(&mut self) -> Result<Status> {
        let status = self.status()?;
        let touched = status.apply(&mut self.index)?;
        debug!(touched, "auto-staged");
        Ok(status)
    }

    /// Build and persist the tree for the current index; returns the root tree hash.
    pub fn write_tree(&self) -> Result<Hash> {
        let arena = TreeArena::build(self.index.entries())?;
        Persister::new(&self.store, &self.worktree).persist(&arena)
    }

    /// Store a commit for `tree`. References are not touched.
    pub fn write_commit(
        &self,
        message: &str,
        options: &CommitOptions,
        tree: Hash,
    ) -> Result<Hash> {
        let commit = options.to_commit(message, tree)?;
        let hash = self.store.put(ObjectType::Commit, &commit.encode())?;
        debug!(%hash, %tree, parents = commit.parents.len(), "stored commit");
        Ok(hash)
    }

    /// The reference a new commit should be written to.
    ///
    /// `HEAD` itself when detached, otherwise the branch it names. Only one
    /// level of symbolic indirection is followed.
    pub fn head_target(&self) -> Result<String> {
        match self.refs.resolve(HEAD)? {
            None => Err(Error::unresolved_ref(HEAD, "HEAD does not exist")),
            Some(Reference::Direct(_)) => Ok(HEAD.to_string()),
            Some(Reference::Symbolic(target)) => match self.refs.resolve(&target)? {
                Some(Reference::Symbolic(next)) => Err(Error::unresolved_ref(
                    target,
                    format!("is itself symbolic (-> {})", next),
                )),
                _ => Ok(target),
            },
        }
    }

    /// Point the current branch, or a detached HEAD, at `commit`.
    ///
    /// Returns the name of the reference that moved. A branch that does not
    /// exist yet is created.
    pub fn advance_head(&self, commit: &Hash) -> Result<String> {
        let target = self.head_target()?;
        self.refs.set(&target, commit)?;
        info!(reference = %target, %commit, "advanced head");
        Ok(target)
    }

    /// Commit the index.
    ///
    /// With `options.all`, modified and deleted tracked files are staged first.
    /// A failure after the commit object is stored comes back as
    /// [`Error::HeadNotAdvanced`] carrying its hash, so `advance_head` alone
    /// can be retried.
    pub fn commit(&mut self, message: &str, options: &CommitOptions) -> Result<Hash> {
        options.validate()?;
        if options.all {
            self.auto_stage()?;
        }
        let tree = self.write_tree()?;
        let commit = self.write_commit(message, options, tree)?;
        self.advance_head(&commit)
            .map_err(|e| Error::head_not_advanced(commit, e))?;
        info!(%commit, %tree, "committed");
        Ok(commit)
    }

    /// Commit HEAD points at, or `None` on an unborn branch.
    pub fn head(&self) -> Result<Option<Hash>> {
        match self.refs.resolve(HEAD)? {
            None => Err(Error::unresolved_ref(HEAD, "HEAD does not exist")),
            Some(Reference::Direct(hash)) => Ok(Some(hash)),
            Some(Reference::Symbolic(target)) => match self.refs.resolve(&target)? {
                None => Ok(None),
                Some(Reference::Direct(hash)) => Ok(Some(hash)),
                Some(Reference::Symbolic(next)) => Err(Error::unresolved_ref(
                    target,
                    format!("is itself symbolic (-> {})", next),
                )),
            },
        }
    }

    /// Short name of the branch HEAD names, or `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.refs.resolve(HEAD)? {
            Some(Reference::Symbolic(target)) => Ok(Some(
                target
                    .strip_prefix(BRANCH_PREFIX)
                    .unwrap_or(&target)
                    .to_string(),
            )),
            _ => Ok(None),
        }
    }

    pub fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        self.store.read_commit(hash)
    }

    /// First-parent history starting at `start`, newest first.
    pub fn log(&self, start: &Hash, limit: Option<usize>) -> Result<Vec<(Hash, Commit)>> {
        let mut history = Vec::new();
        let mut next = Some(*start);
        while let Some(hash) = next {
            if limit.is_some_and(|limit| history.len() >= limit) {
                break;
            }
            let commit = self.read_commit(&hash)?;
            next = commit.parents.first().copied();
            history.push((hash, commit));
        }
        Ok(history)
    }

    /// Branch heads, most recently authored first, then by name.
    ///
    /// Branches whose head cannot be read are skipped with a warning.
    pub fn branches(&self) -> Result<Vec<BranchInfo>> {
        let head_target = self.head_target().ok();
        let mut branches = Vec::new();

        for (name, reference) in self.refs.list(BRANCH_PREFIX)? {
            let Reference::Direct(hash) = reference else {
                warn!(branch = %name, "skipping symbolic branch");
                continue;
            };
            let commit = match self.read_commit(&hash) {
                Ok(commit) => commit,
                Err(e) => {
                    warn!(branch = %name, %hash, error = %e, "skipping unreadable branch head");
                    continue;
                }
            };
            branches.push(BranchInfo {
                is_head: head_target.as_deref() == Some(name.as_str()),
                name: name
                    .strip_prefix(BRANCH_PREFIX)
                    .unwrap_or(&name)
                    .to_string(),
                commit: hash,
                tree: commit.tree,
                summary: commit.summary().to_string(),
                author: commit.author,
            });
        }

        branches.sort_by(|a, b| {
            b.author
                .when
                .cmp(&a.author.when)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(branches)
    }
}

/// A repository backed by the filesystem.
pub type DiskRepository = Repository<Store, RefManager, FsWorktree>;

impl Repository<Store, RefManager, FsWorktree> {
    /// Create `.arbor/` inside `worktree_root` and return the empty repository.
    pub fn init(worktree_root: impl AsRef<Path>) -> Result<Self> {
        let worktree_root = worktree_root.as_ref();
        let meta = meta_dir(worktree_root);
        if meta.exists() {
            return Err(Error::invalid_store(&meta, "already initialized"));
        }
        let store = Store::init(&meta, Algorithm::Blake3)?;
        let refs = store.refs();
        info!(path = %meta.display(), "initialized repository");
        Ok(Self::new(
            store,
            refs,
            FsWorktree::new(worktree_root),
            Index::new(),
        ))
    }

    /// Open the repository whose working tree is `worktree_root`.
    pub fn open(worktree_root: impl AsRef<Path>) -> Result<Self> {
        let worktree_root = worktree_root.as_ref();
        let store = Store::open(meta_dir(worktree_root))?;
        let refs = store.refs();
        let index = Index::load(&store.index_path())?;
        debug!(path = %worktree_root.display(), entries = index.len(), "opened repository");
        Ok(Self::new(store, refs, FsWorktree::new(worktree_root), index))
    }

    /// Persist the index to `.arbor/index`.
    pub fn save_index(&self) -> Result<()> {
        self.index.save(&self.store.index_path())
    }
}

fn meta_dir(worktree_root: &Path) -> PathBuf {
    worktree_root.join(META_DIR)
}
