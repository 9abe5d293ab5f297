//! Object identity using BLAKE3.

use crate::error::{Error, Result};
use crate::object::ObjectType;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::Read;

/// Hash digest size in bytes (BLAKE3 produces 256-bit hashes).
pub const HASH_SIZE: usize = 32;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Returns the algorithm ID byte (for object headers).
    pub fn id(&self) -> u8 {
        match self {
            Algorithm::Blake3 => 1,
        }
    }

    /// Parse algorithm from ID byte.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(format!("ID {}", id))),
        }
    }
}

/// A 32-byte BLAKE3 digest identifying a stored object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a Hash from raw bytes.
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// Create a Hash from a hex string (64 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != HASH_SIZE * 2 {
            return Err(Error::invalid_hash(format!(
                "Expected {} hex characters, got {}",
                HASH_SIZE * 2,
                hex_str.len()
            )));
        }

        let mut hash = [0u8; HASH_SIZE];
        hex::decode_to_slice(hex_str, &mut hash)
            .map_err(|e| Error::invalid_hash(format!("Invalid hex: {}", e)))?;
        Ok(Hash(hash))
    }

    /// Convert to hex string (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form used in human-readable output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Get the first 2 hex characters (for directory sharding).
    pub fn prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Get the remaining 62 hex characters (for filename).
    pub fn suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Hash raw bytes using BLAKE3.
    pub fn hash_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Hash(*hash.as_bytes())
    }

    /// Identity of an object: BLAKE3 over `"<kind> <len>\0"` followed by the payload.
    ///
    /// Tagging with the kind keeps a blob and a tree with identical bytes apart.
    pub fn hash_object(kind: ObjectType, payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(object_prefix(kind, payload.len() as u64).as_bytes());
        hasher.update(payload);
        Hash(*hasher.finalize().as_bytes())
    }

    /// Hash an object whose payload comes from a reader of known length.
    pub fn hash_object_reader<R: Read>(kind: ObjectType, len: u64, reader: R) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(object_prefix(kind, len).as_bytes());
        let copied = std::io::copy(&mut reader.take(len), &mut hasher)?;
        if copied != len {
            return Err(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, read {}", len, copied),
                ),
            });
        }
        Ok(Hash(*hasher.finalize().as_bytes()))
    }
}

fn object_prefix(kind: ObjectType, len: u64) -> String {
    format!("{} {}\0", kind.as_str(), len)
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hello_world() {
        let hash = Hash::hash_bytes(b"hello world");

        // BLAKE3 of "hello world"
        assert_eq!(
            hash.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_hash_object_matches_manual_prefix() {
        let payload = b"hello world";
        let manual = Hash::hash_bytes(b"blob 11\0hello world");
        assert_eq!(Hash::hash_object(ObjectType::Blob, payload), manual);
    }

    #[test]
    fn test_hash_object_kind_separates() {
        let blob = Hash::hash_object(ObjectType::Blob, b"same");
        let tree = Hash::hash_object(ObjectType::Tree, b"same");
        assert_ne!(blob, tree);
    }

    #[test]
    fn test_hash_object_reader_matches_slice() {
        let data = b"streamed content".to_vec();
        let from_reader =
            Hash::hash_object_reader(ObjectType::Blob, data.len() as u64, &data[..]).unwrap();
        assert_eq!(from_reader, Hash::hash_object(ObjectType::Blob, &data));
    }

    #[test]
    fn test_hash_object_reader_short_read() {
        let data = b"short";
        assert!(Hash::hash_object_reader(ObjectType::Blob, 10, &data[..]).is_err());
    }

    #[test]
    fn test_hash_from_hex_invalid() {
        assert!(Hash::from_hex("abcd").is_err());
        assert!(Hash::from_hex("").is_err());
        assert!(Hash::from_hex(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_hash_prefix_suffix() {
        let hash = Hash::hash_bytes(b"test");
        assert_eq!(hash.prefix().len(), 2);
        assert_eq!(hash.suffix().len(), 62);
        assert_eq!(format!("{}{}", hash.prefix(), hash.suffix()), hash.to_hex());
        assert!(hash.to_hex().starts_with(&hash.short()));
    }

    #[test]
    fn test_hash_serializes_as_hex() {
        let hash = Hash::hash_bytes(b"json");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
    }

    #[test]
    fn test_algorithm_conversions() {
        let algo = Algorithm::Blake3;
        assert_eq!(Algorithm::parse(algo.as_str()).unwrap(), algo);
        assert_eq!(Algorithm::from_id(algo.id()).unwrap(), algo);
        assert!(Algorithm::parse("sha1").is_err());
        assert!(Algorithm::from_id(99).is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Object hashing is a pure function of kind and payload.
        #[test]
        fn prop_hash_object_deterministic(data: Vec<u8>) {
            let h1 = Hash::hash_object(ObjectType::Blob, &data);
            let h2 = Hash::hash_object(ObjectType::Blob, &data);
            prop_assert_eq!(h1, h2);
        }

        #[test]
        fn prop_hex_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
            let hash = Hash::from_bytes(bytes);
            prop_assert_eq!(Hash::from_hex(&hash.to_hex())?, hash);
        }

        #[test]
        fn prop_invalid_hex_length_fails(
            s in "[0-9a-f]{0,63}|[0-9a-f]{65,128}"
        ) {
            prop_assert!(Hash::from_hex(&s).is_err());
        }
    }
}
