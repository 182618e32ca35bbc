//! On-disk header for serialized indexes.
//!
//! ```text
//! [MAGIC 8B][VERSION u32][FLAGS u32][PAYLOAD_LEN u64][CHECKSUM u64]
//! ```
//! All integers little-endian. The checksum is xxh3-64 of the payload.

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{QuiverError, Result};

pub const MAGIC: [u8; 8] = *b"QUIVER\0\0";

pub const FORMAT_VERSION: u32 = 1;

/// No header flags are defined yet; any set bit means a newer writer.
pub const KNOWN_FLAGS: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub flags: u32,
    pub payload_len: u64,
    pub checksum: u64,
}

impl FileHeader {
    pub const SIZE: usize = 32;

    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags: 0,
            payload_len: payload.len() as u64,
            checksum: xxh3_64(payload),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&MAGIC);
        bytes[8..12].copy_from_slice(&self.version.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.flags.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Parse and check magic, version and flags. Payload checks are
    /// done by [`FileHeader::verify_payload`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(QuiverError::CorruptData(format!(
                "header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        if bytes[0..8] != MAGIC {
            return Err(QuiverError::CorruptData("invalid magic bytes".into()));
        }

        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if version > FORMAT_VERSION {
            return Err(QuiverError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        if version == 0 {
            return Err(QuiverError::CorruptData("format version 0".into()));
        }

        let flags = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if flags & !KNOWN_FLAGS != 0 {
            return Err(QuiverError::CorruptData(format!(
                "unknown header flags {flags:#x}"
            )));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[16..24]);
        let mut sum = [0u8; 8];
        sum.copy_from_slice(&bytes[24..32]);

        Ok(Self {
            version,
            flags,
            payload_len: u64::from_le_bytes(len),
            checksum: u64::from_le_bytes(sum),
        })
    }

    pub fn verify_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() as u64 != self.payload_len {
            return Err(QuiverError::CorruptData(format!(
                "payload is {} bytes, header says {}",
                payload.len(),
                self.payload_len
            )));
        }
        let actual = xxh3_64(payload);
        if actual != self.checksum {
            return Err(QuiverError::CorruptData(format!(
                "checksum mismatch: expected {:#x}, got {actual:#x}",
                self.checksum
            )));
        }
        Ok(())
    }
}
