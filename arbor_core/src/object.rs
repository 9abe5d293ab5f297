//! Binary object format and encoding.
//!
//! Objects are stored with a 16-byte header followed by the payload:
//!
//! ```text
//! 0x00  4   "ARBO" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   type: 1=blob, 2=tree, 3=commit
//! 0x06  1   algo: 1=blake3-256
//! 0x07  1   compression: 0=none, 1=zstd
//! 0x08  8   payload_len (u64 LE) - stored (possibly compressed) size
//! 0x10  ... payload
//! ```
//!
//! The object hash is always computed over the uncompressed payload, see
//! [`Hash::hash_object`](crate::Hash::hash_object).

use crate::error::{Error, Result};
use crate::hash::Algorithm;
use serde::Serialize;

/// Magic bytes at the start of every object file.
pub const MAGIC: &[u8; 4] = b"ARBO";

/// Current object format version.
pub const VERSION: u8 = 1;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// File content.
    Blob = 1,
    /// A directory listing.
    Tree = 2,
    /// A snapshot of a root tree plus authorship and parents.
    Commit = 3,
}

impl ObjectType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ObjectType::Blob),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Commit),
            _ => Err(Error::invalid_object_type(
                "blob, tree or commit",
                format!("type byte {}", value),
            )),
        }
    }

    /// Get the string name of this object type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }
}

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zstd),
            _ => Err(Error::compression_error(format!(
                "Invalid compression type: {}",
                value
            ))),
        }
    }
}

/// A 16-byte object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object format version.
    pub version: u8,
    /// Object type.
    pub object_type: ObjectType,
    /// Hash algorithm used.
    pub algorithm: Algorithm,
    /// Compression applied to the payload.
    pub compression: CompressionType,
    /// Length of the stored payload in bytes.
    pub payload_len: u64,
}

impl ObjectHeader {
    /// Create a new object header.
    pub fn new(
        object_type: ObjectType,
        algorithm: Algorithm,
        compression: CompressionType,
        payload_len: u64,
    ) -> Self {
        Self {
            version: VERSION,
            object_type,
            algorithm,
            compression,
            payload_len,
        }
    }

    /// Encode the header to a 16-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.object_type.to_u8();
        buf[6] = self.algorithm.id();
        buf[7] = self.compression.to_u8();
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decode a header from the first 16 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::invalid_hash(format!(
                "Header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(Error::invalid_hash(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[0..4]
            )));
        }

        let version = buf[4];
        if version != VERSION {
            return Err(Error::invalid_hash(format!(
                "Unsupported version: {} (expected {})",
                version, VERSION
            )));
        }

        let object_type = ObjectType::from_u8(buf[5])?;
        let algorithm = Algorithm::from_id(buf[6])?;
        let compression = CompressionType::from_u8(buf[7])?;

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);
        let payload_len = u64::from_le_bytes(len_bytes);

        Ok(Self {
            version,
            object_type,
            algorithm,
            compression,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_conversions() {
        for ty in [ObjectType::Blob, ObjectType::Tree, ObjectType::Commit] {
            assert_eq!(ObjectType::from_u8(ty.to_u8()).unwrap(), ty);
        }
        assert!(ObjectType::from_u8(0).is_err());
        assert!(ObjectType::from_u8(4).is_err());
    }

    #[test]
    fn test_header_encode_decode_commit() {
        let header = ObjectHeader::new(
            ObjectType::Commit,
            Algorithm::Blake3,
            CompressionType::None,
            0x1234_5678,
        );
        let encoded = header.encode();
        assert_eq!(&encoded[0..4], MAGIC);
        assert_eq!(ObjectHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn test_header_decode_invalid_magic() {
        let mut buf = ObjectHeader::new(
            ObjectType::Blob,
            Algorithm::Blake3,
            CompressionType::None,
            1,
        )
        .encode();
        buf[0..4].copy_from_slice(b"CAFS");
        assert!(ObjectHeader::decode(&buf).is_err());
    }

    #[test]
    fn test_header_decode_invalid_version() {
        let mut buf = ObjectHeader::new(
            ObjectType::Blob,
            Algorithm::Blake3,
            CompressionType::None,
            1,
        )
        .encode();
        buf[4] = 2;
        assert!(ObjectHeader::decode(&buf).is_err());
    }

    #[test]
    fn test_header_decode_invalid_compression() {
        let mut buf = ObjectHeader::new(
            ObjectType::Tree,
            Algorithm::Blake3,
            CompressionType::None,
            1,
        )
        .encode();
        buf[7] = 99;
        assert!(ObjectHeader::decode(&buf).is_err());
    }

    #[test]
    fn test_header_too_short() {
        assert!(ObjectHeader::decode(&[0u8; 10]).is_err());
    }
}
