//! File header shared by snapshots and segments.

use crate::dir::FileKind;
use crate::types::Lsn;
use uuid::Uuid;

/// Magic bytes opening every snapshot and segment.
pub const FILE_MAGIC: [u8; 4] = *b"TLOG";

/// Current file format version.
pub const FORMAT_VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + kind (1) + lsn (8) + instance (16) + crc32 (4).
pub const FILE_HEADER_SIZE: usize = 35;

/// The fixed-size header at the start of a snapshot or segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version the file was written with.
    pub version: u16,
    /// Snapshot or segment.
    pub kind: FileKind,
    /// Snapshot LSN, or the LSN of the first record of a segment.
    pub lsn: Lsn,
    /// Instance that wrote the file.
    pub instance: Uuid,
}

impl FileHeader {
    /// Creates a header for the current format version.
    #[must_use]
    pub fn new(kind: FileKind, lsn: Lsn, instance: Uuid) -> Self {
        Self {
            version: FORMAT_VERSION,
            kind,
            lsn,
            instance,
        }
    }

    /// Serializes the header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FILE_HEADER_SIZE);
        buf.extend_from_slice(&FILE_MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&self.lsn.as_u64().to_le_bytes());
        buf.extend_from_slice(self.instance.as_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses a header from the first [`FILE_HEADER_SIZE`] bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, String> {
        let data = data
            .get(..FILE_HEADER_SIZE)
            .ok_or_else(|| format!("file header needs {FILE_HEADER_SIZE} bytes"))?;

        if data[0..4] != FILE_MAGIC {
            return Err("invalid file magic".to_string());
        }

        let body_end = FILE_HEADER_SIZE - 4;
        let stored = u32::from_le_bytes([data[31], data[32], data[33], data[34]]);
        let computed = crc32fast::hash(&data[..body_end]);
        if stored != computed {
            return Err(format!(
                "header checksum mismatch: expected {stored:08x}, got {computed:08x}"
            ));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        let kind = FileKind::from_byte(data[6]).ok_or_else(|| format!("unknown file kind {}", data[6]))?;

        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&data[7..15]);
        let mut instance = [0u8; 16];
        instance.copy_from_slice(&data[15..31]);

        Ok(Self {
            version,
            kind,
            lsn: Lsn::new(u64::from_le_bytes(lsn)),
            instance: Uuid::from_bytes(instance),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let instance = Uuid::new_v4();
        let header = FileHeader::new(FileKind::Segment, Lsn::new(42), instance);
        let bytes = header.encode();

        assert_eq!(bytes.len(), FILE_HEADER_SIZE);
        assert_eq!(&bytes[..4], b"TLOG");
        assert_eq!(FileHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn damaged_header_is_rejected() {
        let mut bytes = FileHeader::new(FileKind::Snapshot, Lsn::ZERO, Uuid::nil()).encode();
        bytes[10] ^= 0xff;
        assert!(FileHeader::decode(&bytes).unwrap_err().contains("checksum"));
        assert!(FileHeader::decode(&bytes[..20]).is_err());
        assert!(FileHeader::decode(b"XLOGXLOGXLOGXLOGXLOGXLOGXLOGXLOGXLOG").is_err());
    }
}
