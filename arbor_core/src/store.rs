//! Content-addressed object storage.
//!
//! [`ObjectStore`] is the handle every other component writes through. Two
//! implementations are provided: [`Store`] keeps objects on disk and
//! [`MemoryStore`] keeps them in a map, for tests and embedding.

use crate::commit::Commit;
use crate::config::{CONFIG_FILE, StoreConfig};
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::object::{CompressionType, HEADER_SIZE, ObjectHeader, ObjectType};
use crate::refs::RefManager;
use crate::tree::{self, TreeEntry};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Compression threshold: blobs >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// Branch HEAD points at in a fresh store.
pub const DEFAULT_BRANCH: &str = "refs/heads/main";

/// Content-addressed get/put of typed objects.
pub trait ObjectStore {
    /// Whether an object with this hash is stored.
    fn has(&self, hash: &Hash) -> Result<bool>;

    /// Store `payload` as an object of `kind` and return its hash.
    ///
    /// Storing an object that already exists is a no-op returning the same hash.
    fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<Hash>;

    /// Load an object's type and uncompressed payload.
    fn get(&self, hash: &Hash) -> Result<(ObjectType, Vec<u8>)>;

    /// Load and decode a tree object.
    fn read_tree(&self, hash: &Hash) -> Result<Vec<TreeEntry>> {
        let payload = self.get_typed(hash, ObjectType::Tree)?;
        tree::decode_tree(&payload)
    }

    /// Load and decode a commit object.
    fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        let payload = self.get_typed(hash, ObjectType::Commit)?;
        Commit::decode(&payload)
    }

    /// Load an object's payload, checking it has the expected type.
    fn get_typed(&self, hash: &Hash, expected: ObjectType) -> Result<Vec<u8>> {
        let (kind, payload) = self.get(hash)?;
        if kind != expected {
            return Err(Error::invalid_object_type(expected.as_str(), kind.as_str()));
        }
        Ok(payload)
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn has(&self, hash: &Hash) -> Result<bool> {
        (**self).has(hash)
    }

    fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<Hash> {
        (**self).put(kind, payload)
    }

    fn get(&self, hash: &Hash) -> Result<(ObjectType, Vec<u8>)> {
        (**self).get(hash)
    }
}

/// An on-disk content-addressed store.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
}

impl Store {
    /// Initialize a new store at the given path.
    ///
    /// Creates the directory structure:
    /// - `objects/blake3-256/` for storing objects
    /// - `refs/heads/` for branch references
    /// - `HEAD` pointing symbolically at `refs/heads/main`
    /// - `config` file with version and algorithm
    pub fn init<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("objects").join(algorithm.as_str()))?;
        fs::create_dir_all(root.join("refs").join("heads"))?;

        let config = StoreConfig::new(algorithm);
        config.save(&root.join(CONFIG_FILE))?;

        let store = Self { root, config };
        store.refs().init_head(DEFAULT_BRANCH)?;

        debug!(root = %store.root.display(), "initialized store");
        Ok(store)
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }
        let config = StoreConfig::load(&config_path)?;

        let objects_dir = root.join("objects").join(config.algorithm.as_str());
        if !objects_dir.exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        if !root.join("refs").exists() {
            return Err(Error::invalid_store(&root, "refs directory missing"));
        }

        Ok(Self { root, config })
    }

    /// Get the path to an object file given its hash.
    ///
    /// Returns: `objects/{algorithm}/{prefix}/{suffix}`
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        self.root
            .join("objects")
            .join(self.config.algorithm.as_str())
            .join(hash.prefix())
            .join(hash.suffix())
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the config file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path of the staging index file.
    pub fn index_path(&self) -> PathBuf {
        self.root.join("index")
    }

    /// Get the reference manager for this store.
    pub fn refs(&self) -> RefManager {
        RefManager::new(&self.root)
    }

    /// Read an object header from a file.
    fn read_object_header(&self, path: &Path) -> Result<ObjectHeader> {
        let mut file = fs::File::open(path)?;
        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        ObjectHeader::decode(&header_buf)
    }

    /// Read an object file, returning its header and stored payload.
    fn read_object(&self, path: &Path) -> Result<(ObjectHeader, Vec<u8>)> {
        let mut file = fs::File::open(path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = ObjectHeader::decode(&header_buf)?;

        let mut payload = Vec::new();
        file.read_to_end(&mut payload)?;

        if payload.len() as u64 != header.payload_len {
            return Err(Error::corrupted_object(
                path,
                format!(
                    "Payload length mismatch: expected {}, got {}",
                    header.payload_len,
                    payload.len()
                ),
            ));
        }

        Ok((header, payload))
    }

    /// Write an object atomically using tempfile.
    fn write_object_atomic(
        &self,
        hash: &Hash,
        header: &ObjectHeader,
        payload: &[u8],
    ) -> Result<()> {
        let obj_path = self.object_path(hash);
        let dir = obj_path
            .parent()
            .ok_or_else(|| Error::invalid_store(&self.root, "object path has no parent"))?;

        fs::create_dir_all(dir)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(&header.encode())?;
        temp_file.write_all(payload)?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(&obj_path)?;

        Ok(())
    }

    /// On-disk type of a stored object, without reading its payload.
    pub fn object_type(&self, hash: &Hash) -> Result<ObjectType> {
        let obj_path = self.object_path(hash);
        if !obj_path.exists() {
            return Err(Error::object_not_found(hash.to_hex()));
        }
        Ok(self.read_object_header(&obj_path)?.object_type)
    }
}

impl ObjectStore for Store {
    fn has(&self, hash: &Hash) -> Result<bool> {
        Ok(self.object_path(hash).is_file())
    }

    fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<Hash> {
        let hash = Hash::hash_object(kind, payload);

        // Deduplication
        if self.object_path(&hash).exists() {
            debug!(%hash, kind = kind.as_str(), "object already stored");
            return Ok(hash);
        }

        // Trees and commits are small metadata; only blobs are compressed.
        let (stored, compression) =
            if kind == ObjectType::Blob && payload.len() >= COMPRESSION_THRESHOLD {
                (compress_zstd(payload)?, CompressionType::Zstd)
            } else {
                (payload.to_vec(), CompressionType::None)
            };

        let header = ObjectHeader::new(
            kind,
            self.config.algorithm,
            compression,
            stored.len() as u64,
        );

        self.write_object_atomic(&hash, &header, &stored)
            .map_err(|e| Error::store_write(format!("{} {}", kind.as_str(), hash), e))?;

        debug!(%hash, kind = kind.as_str(), size = payload.len(), "stored object");
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<(ObjectType, Vec<u8>)> {
        let obj_path = self.object_path(hash);
        if !obj_path.exists() {
            return Err(Error::object_not_found(hash.to_hex()));
        }

        let (header, stored) = self.read_object(&obj_path)?;
        let payload = match header.compression {
            CompressionType::None => stored,
            CompressionType::Zstd => decompress_zstd(&stored)?,
        };

        // Corruption detection
        let computed = Hash::hash_object(header.object_type, &payload);
        if computed != *hash {
            return Err(Error::corrupted_object(
                &obj_path,
                format!(
                    "Hash mismatch: expected {}, got {}",
                    hash.to_hex(),
                    computed.to_hex()
                ),
            ));
        }

        Ok((header.object_type, payload))
    }
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::compression_error(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}

/// A `HashMap`-backed object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Hash, (ObjectType, Vec<u8>)>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    /// True when no object is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `put` calls that inserted a new object.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Count stored objects of one kind.
    pub fn count(&self, kind: ObjectType) -> usize {
        self.objects
            .read()
            .map(|objects| objects.values().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }
}

impl ObjectStore for MemoryStore {
    fn has(&self, hash: &Hash) -> Result<bool> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::invalid_store("<memory>", "object map lock poisoned"))?;
        Ok(objects.contains_key(hash))
    }

    fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<Hash> {
        let hash = Hash::hash_object(kind, payload);
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Error::store_write(hash.to_hex(), "object map lock poisoned"))?;
        if !objects.contains_key(&hash) {
            objects.insert(hash, (kind, payload.to_vec()));
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<(ObjectType, Vec<u8>)> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::invalid_store("<memory>", "object map lock poisoned"))?;
        objects
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::object_not_found(hash.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FileMode;
    use tempfile::TempDir;

    #[test]
    fn test_store_init() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");

        let store = Store::init(&store_path, Algorithm::Blake3).unwrap();
        assert_eq!(store.root(), store_path);
        assert_eq!(store.algorithm(), Algorithm::Blake3);

        assert!(store_path.join("objects/blake3-256").exists());
        assert!(store_path.join("refs/heads").exists());
        assert!(store_path.join("config").exists());

        let head = fs::read_to_string(store_path.join("HEAD")).unwrap();
        assert_eq!(head, "ref: refs/heads/main\n");
    }

    #[test]
    fn test_store_open() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");

        Store::init(&store_path, Algorithm::Blake3).unwrap();

        let store = Store::open(&store_path).unwrap();
        assert_eq!(store.algorithm(), Algorithm::Blake3);
    }

    #[test]
    fn test_store_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Store::open(temp_dir.path().join("nonexistent")).is_err());
    }

    #[test]
    fn test_store_open_invalid_no_config() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("store");
        fs::create_dir_all(&store_path).unwrap();

        assert!(matches!(
            Store::open(&store_path),
            Err(Error::InvalidStore { .. })
        ));
    }

    #[test]
    fn test_object_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let hash = Hash::hash_bytes(b"test");
        let path = store.object_path(&hash);

        assert!(path.ends_with(format!(
            "objects/blake3-256/{}/{}",
            hash.prefix(),
            hash.suffix()
        )));
    }

    #[test]
    fn test_put_get_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let hash = store.put(ObjectType::Blob, b"hello world").unwrap();
        assert_eq!(hash, Hash::hash_object(ObjectType::Blob, b"hello world"));
        assert!(store.has(&hash).unwrap());

        let (kind, payload) = store.get(&hash).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(payload, b"hello world");
        assert_eq!(store.object_type(&hash).unwrap(), ObjectType::Blob);
    }

    #[test]
    fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let hash1 = store.put(ObjectType::Blob, b"same content").unwrap();
        let modified = fs::metadata(store.object_path(&hash1))
            .unwrap()
            .modified()
            .unwrap();
        let hash2 = store.put(ObjectType::Blob, b"same content").unwrap();

        assert_eq!(hash1, hash2);
        let modified_again = fs::metadata(store.object_path(&hash2))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(modified, modified_again);
    }

    #[test]
    fn test_large_blob_compressed_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let data = vec![0xAB; 64 * 1024];
        let hash = store.put(ObjectType::Blob, &data).unwrap();

        let on_disk = fs::metadata(store.object_path(&hash)).unwrap().len();
        assert!((on_disk as usize) < data.len());

        let (_, payload) = store.get(&hash).unwrap();
        assert_eq!(payload, data);
    }

    #[test]
    fn test_get_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let hash = Hash::hash_bytes(b"nonexistent");
        assert!(!store.has(&hash).unwrap());
        assert!(matches!(
            store.get(&hash),
            Err(Error::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn test_corruption_detection() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let hash = store.put(ObjectType::Blob, b"test").unwrap();

        let obj_path = store.object_path(&hash);
        let mut file_data = fs::read(&obj_path).unwrap();
        file_data[HEADER_SIZE] ^= 0xFF;
        fs::write(&obj_path, file_data).unwrap();

        assert!(matches!(
            store.get(&hash),
            Err(Error::CorruptedObject { .. })
        ));
    }

    #[test]
    fn test_read_tree_type_check() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let blob = store.put(ObjectType::Blob, b"not a tree").unwrap();
        assert!(matches!(
            store.read_tree(&blob),
            Err(Error::InvalidObjectType { .. })
        ));

        let entries = vec![TreeEntry::new("a.txt", FileMode::Regular, blob).unwrap()];
        let tree = store
            .put(ObjectType::Tree, &tree::encode_tree(entries.clone()))
            .unwrap();
        assert_eq!(store.read_tree(&tree).unwrap(), entries);
    }

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        let hash = store.put(ObjectType::Blob, b"x").unwrap();
        store.put(ObjectType::Blob, b"x").unwrap();
        store.put(ObjectType::Tree, b"").unwrap();

        assert_eq!(store.writes(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.count(ObjectType::Blob), 1);
        assert!(store.has(&hash).unwrap());
        assert_eq!(store.get(&hash).unwrap(), (ObjectType::Blob, b"x".to_vec()));
    }

    #[test]
    fn test_memory_and_disk_agree_on_hashes() {
        let temp_dir = TempDir::new().unwrap();
        let disk = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();
        let memory = MemoryStore::new();

        for payload in [&b""[..], b"abc", &[7u8; 5000][..]] {
            assert_eq!(
                disk.put(ObjectType::Blob, payload).unwrap(),
                memory.put(ObjectType::Blob, payload).unwrap()
            );
        }
    }
}
