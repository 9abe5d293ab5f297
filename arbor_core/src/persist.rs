//! Bottom-up persistence of a [`TreeArena`] into an object store.

use crate::builder::{ROOT, TreeArena};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::ObjectType;
use crate::store::ObjectStore;
use crate::tree::{TreeEntry, encode_tree};
use crate::worktree::Worktree;
use std::io::{self, Read};
use tracing::debug;

/// Counters from one persist run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Blobs read from the working tree and stored.
    pub blobs_written: usize,
    /// Blobs already present in the store.
    pub blobs_reused: usize,
    /// Trees encoded and stored.
    pub trees_written: usize,
}

/// Writes blobs and trees for an arena, children before parents.
pub struct Persister<'a, S: ObjectStore, W: Worktree> {
    store: &'a S,
    worktree: &'a W,
    stats: PersistStats,
}

impl<'a, S: ObjectStore, W: Worktree> Persister<'a, S, W> {
    pub fn new(store: &'a S, worktree: &'a W) -> Self {
        Self {
            store,
            worktree,
            stats: PersistStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> PersistStats {
        self.stats
    }

    /// Store every blob and tree reachable from the root and return the root tree hash.
    ///
    /// Any failure aborts the run; objects already stored stay in the store
    /// but no root hash is returned.
    pub fn persist(&mut self, arena: &TreeArena) -> Result<Hash> {
        let root = self.persist_dir(arena, ROOT)?;
        debug!(
            root = %root,
            blobs_written = self.stats.blobs_written,
            blobs_reused = self.stats.blobs_reused,
            trees_written = self.stats.trees_written,
            "persisted tree"
        );
        Ok(root)
    }

    fn persist_dir(&mut self, arena: &TreeArena, path: &str) -> Result<Hash> {
        let node = arena
            .node(path)
            .ok_or_else(|| Error::invalid_path(path, "directory missing from arena"))?;

        let mut entries = Vec::with_capacity(node.children().len());
        for child in node.children() {
            let hash = match child.hash {
                None if child.mode.is_dir() => self.persist_dir(arena, &child.path)?,
                Some(hash) => {
                    self.persist_blob(&child.path, &hash)?;
                    hash
                }
                None => {
                    return Err(Error::invalid_path(&child.path, "file entry without a hash"));
                }
            };
            entries.push(TreeEntry::new(child.name.as_str(), child.mode, hash)?);
        }

        let hash = self.store.put(ObjectType::Tree, &encode_tree(entries))?;
        self.stats.trees_written += 1;
        debug!(path = %path, %hash, "stored tree");
        Ok(hash)
    }

    fn persist_blob(&mut self, path: &str, staged: &Hash) -> Result<()> {
        if self.store.has(staged)? {
            self.stats.blobs_reused += 1;
            return Ok(());
        }

        let stat = self
            .worktree
            .stat(path)
            .map_err(|e| Error::source_file_unavailable(path, e))?;
        let reader = self
            .worktree
            .open(path)
            .map_err(|e| Error::source_file_unavailable(path, e))?;

        let mut content = Vec::new();
        usize::try_from(stat.size)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))
            .and_then(|size| {
                content
                    .try_reserve_exact(size)
                    .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))
            })
            .map_err(|e| Error::source_file_unavailable(path, e))?;
        reader
            .take(stat.size)
            .read_to_end(&mut content)
            .map_err(|e| Error::source_file_unavailable(path, e))?;
        if content.len() as u64 != stat.size {
            return Err(Error::source_file_unavailable(
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, read {}", stat.size, content.len()),
                ),
            ));
        }

        let actual = Hash::hash_object(ObjectType::Blob, &content);
        if actual != *staged {
            return Err(Error::ContentMismatch {
                path: path.to_string(),
                expected: staged.to_hex(),
                actual: actual.to_hex(),
            });
        }

        self.store.put(ObjectType::Blob, &content)?;
        self.stats.blobs_written += 1;
        debug!(path = %path, hash = %staged, size = stat.size, "stored blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use crate::store::MemoryStore;
    use crate::tree::FileMode;
    use crate::worktree::MemoryWorktree;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn stage(worktree: &mut MemoryWorktree, path: &str, content: &[u8]) -> IndexEntry {
        worktree.insert(path, content);
        IndexEntry::new(
            path,
            FileMode::Regular,
            Hash::hash_object(ObjectType::Blob, content),
        )
        .unwrap()
    }

    fn persist(
        store: &MemoryStore,
        worktree: &MemoryWorktree,
        entries: &[IndexEntry],
    ) -> Result<Hash> {
        let arena = TreeArena::build(entries)?;
        Persister::new(store, worktree).persist(&arena)
    }

    /// Reports a size no buffer can hold.
    struct HugeFile;

    impl Worktree for HugeFile {
        fn stat(&self, _path: &str) -> io::Result<crate::worktree::FileStat> {
            Ok(crate::worktree::FileStat {
                size: u64::MAX,
                mode: FileMode::Regular,
            })
        }

        fn open(&self, _path: &str) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(io::empty()))
        }
    }

    #[test]
    fn test_oversized_file_is_an_error() {
        let store = MemoryStore::new();
        let entries = vec![
            IndexEntry::new("huge.bin", FileMode::Regular, Hash::hash_bytes(b"huge")).unwrap(),
        ];
        let arena = TreeArena::build(&entries).unwrap();

        let mut persister = Persister::new(&store, &HugeFile);
        assert!(matches!(
            persister.persist(&arena),
            Err(Error::SourceFileUnavailable { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_persist_structure() {
        let mut worktree = MemoryWorktree::new();
        let entries = vec![
            stage(&mut worktree, "src/main.rs", b"fn main() {}"),
            stage(&mut worktree, "README", b"hello"),
            stage(&mut worktree, "src/lib/mod.rs", b"pub mod x;"),
        ];
        let store = MemoryStore::new();
        let root = persist(&store, &worktree, &entries).unwrap();

        let top = store.read_tree(&root).unwrap();
        let names: Vec<_> = top.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README", "src"]);
        assert_eq!(top[1].mode, FileMode::Directory);

        let src = store.read_tree(&top[1].hash).unwrap();
        let names: Vec<_> = src.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["lib", "main.rs"]);

        let (kind, content) = store.get(&src[1].hash).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(content, b"fn main() {}");

        assert_eq!(store.count(ObjectType::Blob), 3);
        assert_eq!(store.count(ObjectType::Tree), 3);
    }

    #[test]
    fn test_empty_index_is_empty_tree() {
        let store = MemoryStore::new();
        let root = persist(&store, &MemoryWorktree::new(), &[]).unwrap();
        assert_eq!(root, Hash::hash_object(ObjectType::Tree, b""));
        assert!(store.read_tree(&root).unwrap().is_empty());
    }

    #[test]
    fn test_identical_content_stored_once() {
        let mut worktree = MemoryWorktree::new();
        let entries = vec![
            stage(&mut worktree, "one.txt", b"same bytes"),
            stage(&mut worktree, "nested/two.txt", b"same bytes"),
        ];
        let store = MemoryStore::new();
        let arena = TreeArena::build(&entries).unwrap();
        let mut persister = Persister::new(&store, &worktree);
        persister.persist(&arena).unwrap();

        assert_eq!(store.count(ObjectType::Blob), 1);
        let stats = persister.stats();
        assert_eq!(stats.blobs_written, 1);
        assert_eq!(stats.blobs_reused, 1);
        assert_eq!(stats.trees_written, 2);
        // one blob plus two trees
        assert_eq!(store.writes(), 3);
    }

    #[test]
    fn test_present_blob_skips_worktree() {
        let store = MemoryStore::new();
        let hash = store.put(ObjectType::Blob, b"already stored").unwrap();
        let entry = IndexEntry::new("gone.txt", FileMode::Regular, hash).unwrap();

        // The file is not in the worktree at all.
        let root = persist(&store, &MemoryWorktree::new(), &[entry]).unwrap();
        assert_eq!(store.read_tree(&root).unwrap()[0].hash, hash);
    }

    #[test]
    fn test_missing_file_fails() {
        let mut worktree = MemoryWorktree::new();
        let entries = vec![
            stage(&mut worktree, "ok.txt", b"fine"),
            stage(&mut worktree, "broken.txt", b"lost"),
        ];
        worktree.remove("broken.txt");

        let store = MemoryStore::new();
        let err = persist(&store, &worktree, &entries).unwrap_err();
        match err {
            Error::SourceFileUnavailable { path, .. } => assert_eq!(path, "broken.txt"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(store.count(ObjectType::Tree), 0);
    }

    #[test]
    fn test_changed_file_is_content_mismatch() {
        let mut worktree = MemoryWorktree::new();
        let entries = vec![stage(&mut worktree, "a.txt", b"staged")];
        worktree.insert("a.txt", "edited");

        let store = MemoryStore::new();
        assert!(matches!(
            persist(&store, &worktree, &entries),
            Err(Error::ContentMismatch { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_modes_preserved() {
        let mut worktree = MemoryWorktree::new();
        worktree.insert_with_mode("bin/run", FileMode::Executable, "#!/bin/sh");
        worktree.insert_with_mode("link", FileMode::Symlink, "bin/run");
        let mut index = crate::index::Index::new();
        index.stage(&worktree, "bin/run").unwrap();
        index.stage(&worktree, "link").unwrap();

        let store = MemoryStore::new();
        let root = persist(&store, &worktree, index.entries()).unwrap();
        let top = store.read_tree(&root).unwrap();
        assert_eq!(top[1].name, "link");
        assert_eq!(top[1].mode, FileMode::Symlink);
        let bin = store.read_tree(&top[0].hash).unwrap();
        assert_eq!(bin[0].mode, FileMode::Executable);
    }

    /// Collision-free path sets with content.
    fn arb_files() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
        prop::collection::btree_map(
            "[a-d]{1,2}(/[a-d]{1,2}){0,2}",
            prop::collection::vec(any::<u8>(), 0..64),
            0..16,
        )
        .prop_map(|files: BTreeMap<String, Vec<u8>>| {
            let dirs: Vec<String> = files.keys().map(|p| format!("{}/", p)).collect();
            files
                .into_iter()
                // keep "a" and drop anything under "a/"
                .filter(|(path, _)| !dirs.iter().any(|dir| path.starts_with(dir.as_str())))
                .collect::<Vec<_>>()
        })
    }

    fn stage_all(files: &[(String, Vec<u8>)]) -> (MemoryWorktree, Vec<IndexEntry>) {
        let mut worktree = MemoryWorktree::new();
        let entries = files
            .iter()
            .map(|(path, content)| stage(&mut worktree, path, content))
            .collect();
        (worktree, entries)
    }

    proptest! {
        #[test]
        fn prop_persist_is_deterministic(files in arb_files()) {
            let (worktree, entries) = stage_all(&files);
            let first = persist(&MemoryStore::new(), &worktree, &entries).unwrap();
            let second = persist(&MemoryStore::new(), &worktree, &entries).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_root_independent_of_order(
            (files, shuffled) in arb_files().prop_flat_map(|files| {
                (Just(files.clone()), Just(files).prop_shuffle())
            })
        ) {
            let (worktree, entries) = stage_all(&files);
            let (_, shuffled_entries) = stage_all(&shuffled);
            let expected = persist(&MemoryStore::new(), &worktree, &entries).unwrap();
            let actual = persist(&MemoryStore::new(), &worktree, &shuffled_entries).unwrap();
            prop_assert_eq!(expected, actual);
        }
    }
}
