//! Log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::space::{validate_index_defs, IndexDef, KeyDef};
use crate::types::{Lsn, SpaceId};
use thiserror::Error;
use tuplog_codec::Tuple;

/// Magic bytes opening every record.
pub const RECORD_MAGIC: [u8; 4] = *b"TREC";

/// Marker written when a file is closed cleanly.
pub const EOF_MAGIC: [u8; 4] = *b"TEOF";

/// Record header size: magic (4) + type (1) + lsn (8) + length (4) + header crc (4).
pub const RECORD_HEADER_SIZE: usize = 21;

/// Bytes of the record header covered by its own checksum.
const HEADER_CRC_OFFSET: usize = RECORD_HEADER_SIZE - CRC_SIZE;

/// CRC size.
pub const CRC_SIZE: usize = 4;

/// Type of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Create a space.
    CreateSpace = 1,
    /// Insert a new tuple.
    Insert = 2,
    /// Insert or replace a tuple.
    Replace = 3,
    /// Delete a tuple by primary key.
    Delete = 4,
    /// Consume an LSN without changing state.
    Nop = 5,
}

impl RecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateSpace),
            2 => Some(Self::Insert),
            3 => Some(Self::Replace),
            4 => Some(Self::Delete),
            5 => Some(Self::Nop),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Lowercase name, used by dump output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateSpace => "create_space",
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Nop => "nop",
        }
    }
}

/// A state mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create a space.
    CreateSpace {
        /// ID of the new space.
        space_id: SpaceId,
        /// Name of the new space.
        name: String,
        /// Index definitions; the first is the primary index.
        indexes: Vec<IndexDef>,
    },
    /// Insert a tuple that must not exist yet.
    Insert {
        /// Target space.
        space_id: SpaceId,
        /// The tuple.
        tuple: Tuple,
    },
    /// Insert or replace a tuple by primary key.
    Replace {
        /// Target space.
        space_id: SpaceId,
        /// The tuple.
        tuple: Tuple,
    },
    /// Delete a tuple by primary key.
    Delete {
        /// Target space.
        space_id: SpaceId,
        /// Primary key.
        key: Tuple,
    },
    /// No change.
    Nop,
}

impl Op {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::CreateSpace { .. } => RecordType::CreateSpace,
            Self::Insert { .. } => RecordType::Insert,
            Self::Replace { .. } => RecordType::Replace,
            Self::Delete { .. } => RecordType::Delete,
            Self::Nop => RecordType::Nop,
        }
    }

    /// Returns the target space, if any.
    #[must_use]
    pub fn space_id(&self) -> Option<SpaceId> {
        match self {
            Self::CreateSpace { space_id, .. }
            | Self::Insert { space_id, .. }
            | Self::Replace { space_id, .. }
            | Self::Delete { space_id, .. } => Some(*space_id),
            Self::Nop => None,
        }
    }

    /// Serializes the op payload (without envelope).
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::CreateSpace {
                space_id,
                name,
                indexes,
            } => {
                buf.extend_from_slice(&space_id.as_u32().to_le_bytes());
                put_str(&mut buf, name)?;
                put_count(&mut buf, indexes.len(), "indexes")?;
                for def in indexes {
                    buf.extend_from_slice(&def.id.to_le_bytes());
                    buf.push(u8::from(def.unique));
                    put_str(&mut buf, &def.name)?;
                    put_count(&mut buf, def.key_def.parts.len(), "key parts")?;
                    for part in &def.key_def.parts {
                        buf.extend_from_slice(&part.to_le_bytes());
                    }
                }
            }
            Self::Insert { space_id, tuple } | Self::Replace { space_id, tuple } => {
                buf.extend_from_slice(&space_id.as_u32().to_le_bytes());
                buf.extend_from_slice(&tuple.encode());
            }
            Self::Delete { space_id, key } => {
                buf.extend_from_slice(&space_id.as_u32().to_le_bytes());
                buf.extend_from_slice(&key.encode());
            }
            Self::Nop => {}
        }

        Ok(buf)
    }

    /// Deserializes an op from its type and payload.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> Result<Self, String> {
        let mut cursor = Cursor::new(payload);

        let op = match record_type {
            RecordType::CreateSpace => {
                let space_id = SpaceId::new(cursor.u32()?);
                let name = cursor.string()?;
                let count = cursor.u8()?;
                let mut indexes = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let id = cursor.u32()?;
                    let unique = cursor.u8()? != 0;
                    let name = cursor.string()?;
                    let parts = cursor.u8()?;
                    let parts = (0..parts)
                        .map(|_| cursor.u32())
                        .collect::<Result<Vec<_>, _>>()?;
                    indexes.push(IndexDef {
                        id,
                        name,
                        key_def: KeyDef::new(parts),
                        unique,
                    });
                }
                validate_index_defs(&indexes)?;
                Self::CreateSpace {
                    space_id,
                    name,
                    indexes,
                }
            }
            RecordType::Insert => Self::Insert {
                space_id: SpaceId::new(cursor.u32()?),
                tuple: cursor.tuple()?,
            },
            RecordType::Replace => Self::Replace {
                space_id: SpaceId::new(cursor.u32()?),
                tuple: cursor.tuple()?,
            },
            RecordType::Delete => Self::Delete {
                space_id: SpaceId::new(cursor.u32()?),
                key: cursor.tuple()?,
            },
            RecordType::Nop => Self::Nop,
        };

        if !cursor.is_empty() {
            return Err(format!(
                "trailing bytes in {} record: {} left",
                record_type.name(),
                cursor.remaining()
            ));
        }
        Ok(op)
    }
}

/// A log record: an op and the LSN it was assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Log sequence number.
    pub lsn: Lsn,
    /// The mutation.
    pub op: Op,
}

impl LogRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(lsn: Lsn, op: Op) -> Self {
        Self { lsn, op }
    }
}

/// Result of decoding from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record and the number of bytes it occupied.
    Record(LogRecord, usize),
    /// More bytes are needed.
    Incomplete,
    /// The end-of-file marker.
    Eof,
}

/// Why the bytes at the front of a buffer are not a valid record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Neither a record nor an end-of-file marker.
    #[error("invalid record magic {0:02x?}")]
    BadMagic([u8; 4]),
    /// Unrecognized type byte.
    #[error("unknown record type {0}")]
    UnknownType(u8),
    /// The record header fails its own checksum, so its length cannot be
    /// trusted.
    #[error("header checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    HeaderChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },
    /// Stored and computed checksums differ.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },
    /// The payload does not decode.
    #[error("invalid payload: {0}")]
    BadPayload(String),
}

/// Encodes a record with its envelope.
///
/// ```text
/// | magic "TREC" (4) | type (1) | lsn (8) | length (4) | header crc32 (4) | payload (N) | crc32 (4) |
/// ```
///
/// The header checksum covers magic, type, LSN and length. The trailing
/// checksum covers everything before it.
pub fn encode(record: &LogRecord) -> CoreResult<Vec<u8>> {
    let payload = record.op.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_argument("log record payload too large"))?;

    let mut data = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&RECORD_MAGIC);
    data.push(record.op.record_type().as_byte());
    data.extend_from_slice(&record.lsn.as_u64().to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    let header_crc = crc32fast::hash(&data);
    data.extend_from_slice(&header_crc.to_le_bytes());
    data.extend_from_slice(&payload);

    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Returns the full length of the record starting at `data`, if its header
/// is complete.
///
/// The header checksum is not verified here; see [`checked_frame_len`].
#[must_use]
pub fn frame_len(data: &[u8]) -> Option<usize> {
    let header = data.get(..RECORD_HEADER_SIZE)?;
    let payload_len = u32::from_le_bytes([header[13], header[14], header[15], header[16]]);
    Some(RECORD_HEADER_SIZE + payload_len as usize + CRC_SIZE)
}

/// Like [`frame_len`], but only for a header with the record magic and a
/// matching header checksum.
pub fn checked_frame_len(data: &[u8]) -> Result<Option<usize>, RecordError> {
    let Some(header) = data.get(..RECORD_HEADER_SIZE) else {
        return Ok(None);
    };
    if header[..4] != RECORD_MAGIC {
        return Err(RecordError::BadMagic([header[0], header[1], header[2], header[3]]));
    }
    let expected = read_u32(&header[HEADER_CRC_OFFSET..]);
    let actual = crc32fast::hash(&header[..HEADER_CRC_OFFSET]);
    if expected != actual {
        return Err(RecordError::HeaderChecksumMismatch { expected, actual });
    }
    Ok(frame_len(header))
}

/// Offset of the first complete record header in `data`, skipping the
/// header at position 0.
///
/// A record whose declared frame runs past end of file is only torn if
/// nothing that was written after it survives.
#[must_use]
pub fn find_record_header(data: &[u8]) -> Option<usize> {
    (1..data.len())
        .filter(|&at| data[at..].starts_with(&RECORD_MAGIC))
        .find(|&at| matches!(checked_frame_len(&data[at..]), Ok(Some(_))))
}

/// Decodes the record or end-of-file marker at the front of `data`.
///
/// Checks happen in write order (magic, header checksum, length, checksum,
/// type, payload), so a record cut short by a crash is always
/// [`Decoded::Incomplete`] or a checksum mismatch, never a type or payload
/// error. A damaged length field fails the header checksum instead of
/// making the record look unfinished.
pub fn decode(data: &[u8]) -> Result<Decoded, RecordError> {
    let Some(magic) = data.get(..4) else {
        return Ok(Decoded::Incomplete);
    };
    if magic == EOF_MAGIC {
        return Ok(Decoded::Eof);
    }
    if magic != RECORD_MAGIC {
        return Err(RecordError::BadMagic([magic[0], magic[1], magic[2], magic[3]]));
    }

    let Some(total_len) = checked_frame_len(data)? else {
        return Ok(Decoded::Incomplete);
    };
    let Some(frame) = data.get(..total_len) else {
        return Ok(Decoded::Incomplete);
    };

    let body_end = total_len - CRC_SIZE;
    let expected = read_u32(&frame[body_end..]);
    let actual = crc32fast::hash(&frame[..body_end]);
    if expected != actual {
        return Err(RecordError::ChecksumMismatch { expected, actual });
    }

    let record_type = RecordType::from_byte(frame[4]).ok_or(RecordError::UnknownType(frame[4]))?;
    let mut lsn = [0u8; 8];
    lsn.copy_from_slice(&frame[5..13]);
    let op = Op::decode_payload(record_type, &frame[RECORD_HEADER_SIZE..body_end])
        .map_err(RecordError::BadPayload)?;

    Ok(Decoded::Record(
        LogRecord::new(Lsn::new(u64::from_le_bytes(lsn)), op),
        total_len,
    ))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> CoreResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| CoreError::invalid_argument(format!("name too long: {} bytes", s.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_count(buf: &mut Vec<u8>, count: usize, what: &str) -> CoreResult<()> {
    let count = u8::try_from(count)
        .map_err(|_| CoreError::invalid_argument(format!("too many {what}: {count}")))?;
    buf.push(count);
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| "unexpected end of payload".to_string())?;
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, String> {
        let len = self.u16()?;
        let bytes = self.take(usize::from(len))?;
        String::from_utf8(bytes.to_vec()).map_err(|_| "name is not UTF-8".to_string())
    }

    fn tuple(&mut self) -> Result<Tuple, String> {
        let (tuple, used) =
            Tuple::decode_prefix(&self.data[self.pos..]).map_err(|e| e.to_string())?;
        self.pos += used;
        Ok(tuple)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tuplog_codec::tuple;

    fn insert(lsn: u64, tuple: Tuple) -> LogRecord {
        LogRecord::new(
            Lsn::new(lsn),
            Op::Insert {
                space_id: SpaceId::new(512),
                tuple,
            },
        )
    }

    #[test]
    fn record_type_bytes() {
        for t in [
            RecordType::CreateSpace,
            RecordType::Insert,
            RecordType::Replace,
            RecordType::Delete,
            RecordType::Nop,
        ] {
            assert_eq!(RecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(RecordType::from_byte(0), None);
    }

    #[test]
    fn encoded_layout() {
        let record = insert(7, tuple![1]);
        let bytes = encode(&record).unwrap();

        assert_eq!(&bytes[..4], b"TREC");
        assert_eq!(bytes[4], RecordType::Insert.as_byte());
        assert_eq!(&bytes[5..13], &7u64.to_le_bytes());
        // space id (4) + [1] as a CBOR array (2)
        assert_eq!(&bytes[13..17], &6u32.to_le_bytes());
        assert_eq!(&bytes[17..21], &crc32fast::hash(&bytes[..17]).to_le_bytes());
        assert_eq!(bytes.len(), RECORD_HEADER_SIZE + 6 + CRC_SIZE);
        assert_eq!(frame_len(&bytes), Some(bytes.len()));
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let first = insert(1, tuple![1, "first tuple"]);
        let second = LogRecord::new(
            Lsn::new(2),
            Op::CreateSpace {
                space_id: SpaceId::new(513),
                name: "other".into(),
                indexes: vec![
                    IndexDef::primary(vec![0]),
                    IndexDef::secondary(1, "by_name", vec![1, 2], false),
                ],
            },
        );
        let mut bytes = encode(&first).unwrap();
        let first_len = bytes.len();
        bytes.extend(encode(&second).unwrap());
        bytes.extend_from_slice(&EOF_MAGIC);

        assert_eq!(decode(&bytes).unwrap(), Decoded::Record(first, first_len));
        let rest = &bytes[first_len..];
        let Decoded::Record(decoded, used) = decode(rest).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(decoded, second);
        assert_eq!(decode(&rest[used..]).unwrap(), Decoded::Eof);
    }

    #[test]
    fn short_input_is_incomplete() {
        let bytes = encode(&insert(3, tuple![3, "third tuple"])).unwrap();
        for cut in 0..bytes.len() {
            assert_eq!(decode(&bytes[..cut]).unwrap(), Decoded::Incomplete, "cut at {cut}");
        }
    }

    #[test]
    fn flipped_bit_is_checksum_mismatch() {
        let mut bytes = encode(&insert(3, tuple![3, "third tuple"])).unwrap();
        let last_payload_byte = bytes.len() - CRC_SIZE - 1;
        bytes[last_payload_byte] ^= 0x01;
        assert!(matches!(
            decode(&bytes),
            Err(RecordError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn flipped_length_is_header_checksum_mismatch() {
        let mut bytes = encode(&insert(3, tuple![3, "third tuple"])).unwrap();
        bytes[16] ^= 0x01;
        assert!(matches!(
            decode(&bytes),
            Err(RecordError::HeaderChecksumMismatch { .. })
        ));
        // Even with the rest of the frame missing.
        assert!(matches!(
            decode(&bytes[..RECORD_HEADER_SIZE]),
            Err(RecordError::HeaderChecksumMismatch { .. })
        ));
    }

    #[test]
    fn finds_the_next_record_header() {
        let first = encode(&insert(1, tuple![1, "TREC inside a payload"])).unwrap();
        let mut bytes = first.clone();
        bytes.extend(encode(&insert(2, tuple![2])).unwrap());

        assert_eq!(find_record_header(&bytes), Some(first.len()));
        assert_eq!(find_record_header(&first), None);
    }

    #[test]
    fn garbage_is_bad_magic() {
        assert!(matches!(
            decode(b"JUNKJUNKJUNKJUNKJUNK"),
            Err(RecordError::BadMagic(_))
        ));
    }

    #[test]
    fn unknown_type_with_valid_checksum() {
        let mut bytes = encode(&LogRecord::new(Lsn::new(1), Op::Nop)).unwrap();
        bytes[4] = 99;
        let header_crc = crc32fast::hash(&bytes[..HEADER_CRC_OFFSET]);
        bytes[HEADER_CRC_OFFSET..RECORD_HEADER_SIZE].copy_from_slice(&header_crc.to_le_bytes());
        let body_end = bytes.len() - CRC_SIZE;
        let crc = crc32fast::hash(&bytes[..body_end]);
        bytes[body_end..].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap_err(), RecordError::UnknownType(99));
    }

    #[test]
    fn create_space_without_index_is_rejected() {
        let op = Op::CreateSpace {
            space_id: SpaceId::new(600),
            name: "broken".into(),
            indexes: vec![],
        };
        let payload = op.encode_payload().unwrap();
        assert!(Op::decode_payload(RecordType::CreateSpace, &payload).is_err());
    }

    #[test]
    fn trailing_payload_bytes_are_rejected() {
        let mut payload = Op::Delete {
            space_id: SpaceId::new(512),
            key: tuple![1],
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(Op::decode_payload(RecordType::Delete, &payload)
            .unwrap_err()
            .contains("trailing"));
    }

    proptest! {
        #[test]
        fn any_prefix_of_a_record_is_incomplete(
            key in any::<i64>(),
            text in "[a-z ]{0,64}",
            lsn in 1u64..u64::MAX,
        ) {
            let bytes = encode(&insert(lsn, tuple![key, text.as_str()])).unwrap();
            for cut in 0..bytes.len() {
                prop_assert_eq!(decode(&bytes[..cut]).unwrap(), Decoded::Incomplete);
            }
        }

        #[test]
        fn any_flipped_bit_is_detected(
            key in any::<i64>(),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let record = insert(7, tuple![key, "tuple"]);
            let mut bytes = encode(&record).unwrap();
            let at = position.index(bytes.len());
            bytes[at] ^= 1 << bit;
            prop_assert_ne!(decode(&bytes), Ok(Decoded::Record(record, bytes.len())));
            if at >= 4 && at < RECORD_HEADER_SIZE {
                prop_assert!(
                    matches!(decode(&bytes), Err(RecordError::HeaderChecksumMismatch { .. })),
                    "flip at {} not caught by the header checksum",
                    at
                );
            }
        }
    }
}
