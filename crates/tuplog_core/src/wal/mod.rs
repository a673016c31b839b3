//! Write-ahead log: file format, streaming reader and segment writer.
//!
//! Every mutation is appended to the active log segment before it is
//! applied. Snapshots use the same file format with different rows.
//!
//! ## File Format
//!
//! ```text
//! file   := header record* [eof]
//! header := magic "TLOG" (4) | version (2) | kind (1) | lsn (8) | instance (16) | crc32 (4)
//! record := magic "TREC" (4) | type (1) | lsn (8) | length (4) | crc32 (4) | payload (N) | crc32 (4)
//! eof    := magic "TEOF" (4)
//! ```
//!
//! All integers are little-endian. Each CRC32 covers every byte before it
//! in its header or record, so the length of a record is checked before
//! any payload is read. Tuples inside payloads use the `tuplog_codec`
//! encoding.
//!
//! ## Recovery Policy
//!
//! The reader distinguishes between **tolerated** and **fatal** conditions:
//!
//! ### Tolerated Conditions (treat as clean end of file)
//!
//! - **Truncated record**: fewer bytes remain than a record with a valid
//!   header needs, and no later record or EOF marker follows
//! - **Checksum mismatch in the final record**: it ends exactly at end of
//!   file, which is what a write torn by a crash looks like
//! - **Missing EOF marker**: the segment was still open when the process
//!   stopped
//!
//! ### Fatal Conditions
//!
//! - Checksum mismatch, bad magic, unknown type or undecodable payload
//!   anywhere before the last record
//! - A record header failing its checksum, anywhere
//! - A record whose declared length runs over a later record or the EOF
//!   marker
//! - LSNs that do not increase within a segment
//! - Bytes after the EOF marker
//! - A header that is damaged or disagrees with the file name
//!
//! No heuristic repair is attempted for fatal conditions.

mod header;
mod reader;
mod record;
mod writer;

pub use header::{FileHeader, FILE_HEADER_SIZE, FILE_MAGIC, FORMAT_VERSION};
pub use reader::SegmentReader;
pub use record::{
    checked_frame_len, decode, encode, find_record_header, frame_len, Decoded, LogRecord, Op,
    RecordError, RecordType, CRC_SIZE, EOF_MAGIC, RECORD_HEADER_SIZE, RECORD_MAGIC,
};
pub use writer::{FileWriter, LogWriter, LsnAllocator};
