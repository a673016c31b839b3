//! Streaming segment and snapshot reader.
//!
//! Reads records one by one from a storage backend through a bounded
//! buffer, so recovery memory does not grow with file size.

use crate::dir::FileKind;
use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use crate::wal::header::{FileHeader, FILE_HEADER_SIZE};
use crate::wal::record::{self, Decoded, LogRecord, RecordError, EOF_MAGIC, RECORD_HEADER_SIZE};
use tracing::warn;
use tuplog_storage::StorageBackend;

/// Read buffer size for streaming iteration.
const READ_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// A streaming iterator over the records of one file.
///
/// Yields `(offset, record)` pairs.
///
/// # Error Handling
///
/// - A file shorter than its header, a record cut short, or a checksum
///   mismatch on the very last record are a torn tail: iteration ends
///   cleanly and [`truncated_tail`](Self::truncated_tail) becomes true.
///   A record is only cut short if its header is incomplete or passes its
///   checksum, and no later record or end-of-file marker follows it.
/// - Anything else that does not decode, LSNs that go backwards, and bytes
///   after the end-of-file marker are [`CoreError::CorruptSegment`].
pub struct SegmentReader {
    backend: Box<dyn StorageBackend>,
    file: String,
    kind: FileKind,
    header: Option<FileHeader>,
    size: u64,
    buffer: Vec<u8>,
    /// Position of the next unread byte within `buffer`.
    pos: usize,
    /// File offset of `buffer[0]`.
    buffer_offset: u64,
    last_lsn: Option<Lsn>,
    records: u64,
    truncated: bool,
    eof_marker: bool,
    finished: bool,
}

impl SegmentReader {
    /// Opens a reader and validates the file header.
    ///
    /// `expected_lsn` is the LSN encoded in the file name; the header must
    /// agree with it.
    pub fn open(
        backend: Box<dyn StorageBackend>,
        file: impl Into<String>,
        kind: FileKind,
        expected_lsn: Option<Lsn>,
    ) -> CoreResult<Self> {
        let file = file.into();
        let size = backend.size()?;

        let mut reader = Self {
            backend,
            file,
            kind,
            header: None,
            size,
            buffer: Vec::new(),
            pos: 0,
            buffer_offset: 0,
            last_lsn: None,
            records: 0,
            truncated: false,
            eof_marker: false,
            finished: false,
        };

        if size < FILE_HEADER_SIZE as u64 {
            if size > 0 {
                warn!(file = %reader.file, size, "file header is incomplete");
            }
            reader.truncated = size > 0;
            reader.finished = true;
            return Ok(reader);
        }

        let bytes = reader.backend.read_at(0, FILE_HEADER_SIZE)?;
        let header =
            FileHeader::decode(&bytes).map_err(|reason| CoreError::corrupt(&reader.file, 0, reason))?;
        if header.kind != kind {
            return Err(CoreError::corrupt(
                &reader.file,
                0,
                format!("expected a {} file", kind.extension()),
            ));
        }
        if let Some(lsn) = expected_lsn {
            if header.lsn != lsn {
                return Err(CoreError::corrupt(
                    &reader.file,
                    0,
                    format!("header lsn {} does not match file name lsn {lsn}", header.lsn),
                ));
            }
        }

        reader.header = Some(header);
        reader.buffer_offset = FILE_HEADER_SIZE as u64;
        Ok(reader)
    }

    /// Location of the file, as used in errors.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The file header, absent if the file was too short to hold one.
    #[must_use]
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Returns true if the file ended in an incomplete record.
    #[must_use]
    pub fn truncated_tail(&self) -> bool {
        self.truncated
    }

    /// Returns true if the end-of-file marker has been read.
    #[must_use]
    pub fn has_eof_marker(&self) -> bool {
        self.eof_marker
    }

    /// Number of records returned so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Total file size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    fn offset(&self) -> u64 {
        self.buffer_offset + self.pos as u64
    }

    /// Reads more bytes into the buffer. Returns false at end of file.
    fn fill(&mut self) -> CoreResult<bool> {
        let buffered_end = self.buffer_offset + self.buffer.len() as u64;
        let remaining = self.size.saturating_sub(buffered_end);
        if remaining == 0 {
            return Ok(false);
        }

        if self.pos > 0 {
            self.buffer.drain(..self.pos);
            self.buffer_offset += self.pos as u64;
            self.pos = 0;
        }

        // Grow geometrically so a large record needs few reads.
        let want = READ_BUFFER_SIZE
            .max(self.buffer.len())
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let data = self
            .backend
            .read_at(self.buffer_offset + self.buffer.len() as u64, want)?;
        self.buffer.extend_from_slice(&data);
        Ok(true)
    }

    fn torn_tail(&mut self, reason: &str) {
        warn!(
            file = %self.file,
            offset = self.offset(),
            "{reason}: discarding incomplete trailing record"
        );
        self.truncated = true;
        self.finished = true;
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, LogRecord)>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let offset = self.offset();
            let window = &self.buffer[self.pos..];

            match record::decode(window) {
                Ok(Decoded::Record(record, used)) => {
                    self.pos += used;
                    self.check_lsn(offset, record.lsn)?;
                    self.last_lsn = Some(record.lsn);
                    self.records += 1;
                    return Ok(Some((offset, record)));
                }
                Ok(Decoded::Eof) => {
                    self.pos += EOF_MAGIC.len();
                    self.eof_marker = true;
                    self.finished = true;
                    if self.offset() != self.size {
                        return Err(CoreError::corrupt(
                            &self.file,
                            self.offset(),
                            "data after end-of-file marker",
                        ));
                    }
                    return Ok(None);
                }
                Ok(Decoded::Incomplete) => {
                    if !self.fill()? {
                        return self.end_mid_record(offset);
                    }
                }
                Err(RecordError::ChecksumMismatch { .. })
                    if record::frame_len(window)
                        .is_some_and(|len| offset + len as u64 == self.size) =>
                {
                    self.torn_tail("checksum mismatch in last record");
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(CoreError::corrupt(&self.file, offset, e.to_string()));
                }
            }
        }
    }

    /// Classifies the bytes left at end of file when they do not hold a
    /// complete record.
    ///
    /// They are a torn tail only if nothing written after the record
    /// survived: no later record header and no end-of-file marker.
    fn end_mid_record(&mut self, offset: u64) -> CoreResult<Option<(u64, LogRecord)>> {
        let window = &self.buffer[self.pos..];
        if window.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        let problem = if let Some(at) = record::find_record_header(window) {
            Some(format!(
                "record overlaps the record at offset {}",
                offset + at as u64
            ))
        } else if window.len() >= RECORD_HEADER_SIZE && window.ends_with(&EOF_MAGIC) {
            Some("record overlaps the end-of-file marker".to_string())
        } else {
            None
        };

        match problem {
            Some(reason) => {
                self.finished = true;
                Err(CoreError::corrupt(&self.file, offset, reason))
            }
            None => {
                self.torn_tail("file ends mid-record");
                Ok(None)
            }
        }
    }

    fn check_lsn(&mut self, offset: u64, lsn: Lsn) -> CoreResult<()> {
        let Some(header) = self.header else {
            return Ok(());
        };
        let problem = match self.kind {
            FileKind::Snapshot if lsn != header.lsn => {
                Some(format!("snapshot row lsn {lsn} differs from snapshot lsn {}", header.lsn))
            }
            FileKind::Segment if lsn < header.lsn => {
                Some(format!("lsn {lsn} precedes segment start {}", header.lsn))
            }
            FileKind::Segment => match self.last_lsn {
                Some(prev) if lsn <= prev => Some(format!("lsn {lsn} does not follow {prev}")),
                _ => None,
            },
            FileKind::Snapshot => None,
        };
        match problem {
            Some(reason) => {
                self.finished = true;
                Err(CoreError::corrupt(&self.file, offset, reason))
            }
            None => Ok(()),
        }
    }
}

impl Iterator for SegmentReader {
    type Item = CoreResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("file", &self.file)
            .field("header", &self.header)
            .field("size", &self.size)
            .field("offset", &self.offset())
            .finish()
    }
}
