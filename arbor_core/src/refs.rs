//! Named references: branches and HEAD.

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Name of the head reference.
pub const HEAD: &str = "HEAD";

/// Namespace holding branch references.
pub const BRANCH_PREFIX: &str = "refs/heads/";

/// Prefix marking a symbolic reference in a ref file.
const SYMBOLIC_PREFIX: &str = "ref: ";

/// Value of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Points straight at a commit.
    Direct(Hash),
    /// Names another reference.
    Symbolic(String),
}

impl Reference {
    /// Parse the content of a ref file.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        if let Some(target) = content.strip_prefix(SYMBOLIC_PREFIX) {
            let target = target.trim();
            validate_ref_name(target)?;
            return Ok(Reference::Symbolic(target.to_string()));
        }
        Hash::from_hex(content)
            .map(Reference::Direct)
            .map_err(|_| Error::invalid_ref(format!("Unparseable ref content: {:?}", content)))
    }

    /// Render as ref file content.
    pub fn render(&self) -> String {
        match self {
            Reference::Direct(hash) => format!("{}\n", hash.to_hex()),
            Reference::Symbolic(target) => format!("{}{}\n", SYMBOLIC_PREFIX, target),
        }
    }
}

/// Namespace every reference other than HEAD lives in.
const REFS_PREFIX: &str = "refs/";

/// Check a slash-separated reference name.
///
/// Only `HEAD` and names under `refs/` are valid, so a reference can never
/// alias the index, config or object files next to it.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref("Ref name cannot be empty"));
    }
    if name != HEAD && !name.starts_with(REFS_PREFIX) {
        return Err(Error::invalid_ref(format!(
            "Invalid ref name: {} (must be HEAD or start with {})",
            name, REFS_PREFIX
        )));
    }
    if name.contains("..") || name.contains('\\') || name.contains('\0') {
        return Err(Error::invalid_ref(format!(
            "Invalid ref name: {} (must not contain .., backslashes or NUL)",
            name
        )));
    }
    if name.split('/').any(str::is_empty) {
        return Err(Error::invalid_ref(format!(
            "Invalid ref name: {} (empty path component)",
            name
        )));
    }
    Ok(())
}

/// Resolve/set interface over a reference namespace.
pub trait RefStore {
    /// Read a reference, `None` if it does not exist.
    fn resolve(&self, name: &str) -> Result<Option<Reference>>;

    /// Point `name` directly at `hash`, in a single atomic write.
    fn set(&self, name: &str, hash: &Hash) -> Result<()>;

    /// Point `name` at another reference.
    fn set_symbolic(&self, name: &str, target: &str) -> Result<()>;

    /// All references whose name starts with `prefix`, sorted by name.
    fn list(&self, prefix: &str) -> Result<Vec<(String, Reference)>>;
}

impl<R: RefStore + ?Sized> RefStore for &R {
    fn resolve(&self, name: &str) -> Result<Option<Reference>> {
        (**self).resolve(name)
    }

    fn set(&self, name: &str, hash: &Hash) -> Result<()> {
        (**self).set(name, hash)
    }

    fn set_symbolic(&self, name: &str, target: &str) -> Result<()> {
        (**self).set_symbolic(name, target)
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Reference)>> {
        (**self).list(prefix)
    }
}

/// File-backed references under a store root.
///
/// `HEAD` lives at `<root>/HEAD`, everything else at `<root>/<name>`
/// (e.g. `<root>/refs/heads/main`).
#[derive(Debug, Clone)]
pub struct RefManager {
    root: PathBuf,
}

impl RefManager {
    /// Create a RefManager rooted at a store directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the path to a reference file.
    fn ref_path(&self, name: &str) -> Result<PathBuf> {
        validate_ref_name(name)?;
        Ok(name
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part)))
    }

    /// Point HEAD at `branch` unless HEAD already exists.
    pub fn init_head(&self, branch: &str) -> Result<()> {
        if self.resolve(HEAD)?.is_none() {
            self.set_symbolic(HEAD, branch)?;
        }
        Ok(())
    }

    fn write_atomic(&self, name: &str, reference: &Reference) -> Result<()> {
        let path = self.ref_path(name)?;
        let write = || -> Result<()> {
            let dir = path
                .parent()
                .ok_or_else(|| Error::invalid_ref(format!("Ref {} has no parent", name)))?;
            fs::create_dir_all(dir)?;
            let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
            temp_file.write_all(reference.render().as_bytes())?;
            temp_file.as_file().sync_all()?;
            temp_file.persist(&path)?;
            Ok(())
        };
        write().map_err(|e| Error::store_write(name, e))?;
        debug!(name, value = reference.render().trim(), "wrote reference");
        Ok(())
    }

    fn collect(&self, dir: &Path, name: &str, out: &mut Vec<(String, Reference)>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let child = format!("{}/{}", name, file_name);
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect(&entry.path(), &child, out)?;
            } else if file_type.is_file() && validate_ref_name(&child).is_ok() {
                match Reference::parse(&fs::read_to_string(entry.path())?) {
                    Ok(reference) => out.push((child, reference)),
                    // e.g. a temp file left by an interrupted write
                    Err(e) => debug!(name = %child, error = %e, "skipping unreadable ref"),
                }
            }
        }
        Ok(())
    }
}

impl RefStore for RefManager {
    fn resolve(&self, name: &str) -> Result<Option<Reference>> {
        let path = self.ref_path(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Reference::parse(&content).map(Some)
    }

    fn set(&self, name: &str, hash: &Hash) -> Result<()> {
        self.write_atomic(name, &Reference::Direct(*hash))
    }

    fn set_symbolic(&self, name: &str, target: &str) -> Result<()> {
        validate_ref_name(target)?;
        self.write_atomic(name, &Reference::Symbolic(target.to_string()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Reference)>> {
        let refs_dir = self.root.join("refs");
        let mut refs = Vec::new();

        if refs_dir.is_dir() {
            self.collect(&refs_dir, "refs", &mut refs)?;
        }

        refs.retain(|(name, _)| name.starts_with(prefix));
        refs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(refs)
    }
}

/// In-memory references.
#[derive(Debug, Default)]
pub struct MemoryRefs {
    refs: Mutex<BTreeMap<String, Reference>>,
    sets: AtomicUsize,
}

impl MemoryRefs {
    /// Create an empty namespace (no HEAD).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace whose HEAD names `branch`.
    pub fn with_head(branch: &str) -> Self {
        let refs = Self::new();
        refs.insert(HEAD, Reference::Symbolic(branch.to_string()));
        refs
    }

    /// Number of `set`/`set_symbolic` calls made.
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Seed a reference without counting it as a write.
    pub fn insert(&self, name: &str, reference: Reference) {
        if let Ok(mut refs) = self.refs.lock() {
            refs.insert(name.to_string(), reference);
        }
    }

    fn write(&self, name: &str, reference: Reference) -> Result<()> {
        validate_ref_name(name)?;
        let mut refs = self
            .refs
            .lock()
            .map_err(|_| Error::store_write(name, "ref map lock poisoned"))?;
        refs.insert(name.to_string(), reference);
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl RefStore for MemoryRefs {
    fn resolve(&self, name: &str) -> Result<Option<Reference>> {
        let refs = self
            .refs
            .lock()
            .map_err(|_| Error::unresolved_ref(name, "ref map lock poisoned"))?;
        Ok(refs.get(name).cloned())
    }

    fn set(&self, name: &str, hash: &Hash) -> Result<()> {
        self.write(name, Reference::Direct(*hash))
    }

    fn set_symbolic(&self, name: &str, target: &str) -> Result<()> {
        validate_ref_name(target)?;
        self.write(name, Reference::Symbolic(target.to_string()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Reference)>> {
        let refs = self
            .refs
            .lock()
            .map_err(|_| Error::unresolved_ref(prefix, "ref map lock poisoned"))?;
        Ok(refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, reference)| (name.clone(), reference.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ref_set_and_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let refs = RefManager::new(temp_dir.path());

        let hash = Hash::hash_bytes(b"test");
        refs.set("refs/heads/main", &hash).unwrap();

        assert_eq!(
            refs.resolve("refs/heads/main").unwrap(),
            Some(Reference::Direct(hash))
        );
        let content = fs::read_to_string(temp_dir.path().join("refs/heads/main")).unwrap();
        assert_eq!(content, format!("{}\n", hash.to_hex()));
    }

    #[test]
    fn test_ref_resolve_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let refs = RefManager::new(temp_dir.path());
        assert_eq!(refs.resolve("refs/heads/nope").unwrap(), None);
    }

    #[test]
    fn test_ref_update_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let refs = RefManager::new(temp_dir.path());

        let hash1 = Hash::hash_bytes(b"test1");
        let hash2 = Hash::hash_bytes(b"test2");
        refs.set("refs/heads/main", &hash1).unwrap();
        refs.set("refs/heads/main", &hash2).unwrap();

        assert_eq!(
            refs.resolve("refs/heads/main").unwrap(),
            Some(Reference::Direct(hash2))
        );
    }

    #[test]
    fn test_symbolic_head() {
        let temp_dir = TempDir::new().unwrap();
        let refs = RefManager::new(temp_dir.path());

        refs.init_head("refs/heads/main").unwrap();
        assert_eq!(
            refs.resolve(HEAD).unwrap(),
            Some(Reference::Symbolic("refs/heads/main".to_string()))
        );

        // A second init keeps the existing HEAD
        refs.set_symbolic(HEAD, "refs/heads/dev").unwrap();
        refs.init_head("refs/heads/main").unwrap();
        assert_eq!(
            refs.resolve(HEAD).unwrap(),
            Some(Reference::Symbolic("refs/heads/dev".to_string()))
        );
    }

    #[test]
    fn test_ref_list_by_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let refs = RefManager::new(temp_dir.path());

        let hash1 = Hash::hash_bytes(b"test1");
        let hash2 = Hash::hash_bytes(b"test2");
        refs.set("refs/heads/main", &hash1).unwrap();
        refs.set("refs/heads/feature/x", &hash2).unwrap();
        refs.set("refs/tags/v1", &hash1).unwrap();
        refs.init_head("refs/heads/main").unwrap();

        let list = refs.list(BRANCH_PREFIX).unwrap();
        let names: Vec<_> = list.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["refs/heads/feature/x", "refs/heads/main"]);
        assert_eq!(list[1].1, Reference::Direct(hash1));

        assert_eq!(refs.list("refs/").unwrap().len(), 3);
    }

    #[test]
    fn test_ref_invalid_name() {
        let temp_dir = TempDir::new().unwrap();
        let refs = RefManager::new(temp_dir.path());
        let hash = Hash::hash_bytes(b"test");

        assert!(refs.set("../etc/passwd", &hash).is_err());
        assert!(refs.set("refs//main", &hash).is_err());
        assert!(refs.set("refs\\heads", &hash).is_err());
        assert!(refs.set("", &hash).is_err());
        assert!(refs.set_symbolic(HEAD, "refs/../x").is_err());

        // names outside refs/ would alias store files
        assert!(refs.set("index", &hash).is_err());
        assert!(refs.set("config", &hash).is_err());
        assert!(refs.set("objects/ab", &hash).is_err());
        assert!(refs.set_symbolic(HEAD, "index").is_err());
        assert!(refs.set(HEAD, &hash).is_ok());
        assert!(!temp_dir.path().join("index").exists());
    }

    #[test]
    fn test_reference_parse() {
        let hash = Hash::hash_bytes(b"x");
        assert_eq!(
            Reference::parse(&format!("{}\n", hash)).unwrap(),
            Reference::Direct(hash)
        );
        assert_eq!(
            Reference::parse("ref: refs/heads/main\n").unwrap(),
            Reference::Symbolic("refs/heads/main".to_string())
        );
        assert!(Reference::parse("garbage").is_err());
        assert!(Reference::parse("ref: config\n").is_err());
    }

    #[test]
    fn test_memory_refs() {
        let refs = MemoryRefs::with_head("refs/heads/main");
        assert_eq!(refs.sets(), 0);

        let hash = Hash::hash_bytes(b"c");
        refs.set("refs/heads/main", &hash).unwrap();
        assert_eq!(refs.sets(), 1);
        assert_eq!(
            refs.resolve("refs/heads/main").unwrap(),
            Some(Reference::Direct(hash))
        );
        assert_eq!(refs.list(BRANCH_PREFIX).unwrap().len(), 1);
        assert!(refs.set("refs/bad//name", &hash).is_err());
        assert!(refs.set("index", &hash).is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Valid branch names are accepted and read back.
        #[test]
        fn prop_valid_branch_names_accepted(
            name in "[a-zA-Z0-9_-]{1,20}(/[a-zA-Z0-9_-]{1,20}){0,2}"
        ) {
            let temp_dir = TempDir::new().unwrap();
            let refs = RefManager::new(temp_dir.path());
            let full = format!("{}{}", BRANCH_PREFIX, name);
            let hash = Hash::hash_bytes(name.as_bytes());

            refs.set(&full, &hash)?;
            prop_assert_eq!(refs.resolve(&full)?, Some(Reference::Direct(hash)));
        }
    }
}
