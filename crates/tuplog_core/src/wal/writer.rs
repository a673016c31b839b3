//! LSN allocation and segment writing.

use crate::config::Config;
use crate::dir::{format_file_name, DataDir, FileKind};
use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use crate::wal::header::FileHeader;
use crate::wal::reader::SegmentReader;
use crate::wal::record::{encode, LogRecord, Op, EOF_MAGIC};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tuplog_storage::{Directory, StorageBackend};
use uuid::Uuid;

/// Hands out strictly increasing LSNs.
#[derive(Debug, Clone, Copy)]
pub struct LsnAllocator {
    last: Lsn,
}

impl LsnAllocator {
    /// Creates an allocator that continues after `last`.
    #[must_use]
    pub const fn new(last: Lsn) -> Self {
        Self { last }
    }

    /// The last LSN handed out.
    #[must_use]
    pub const fn last(&self) -> Lsn {
        self.last
    }

    /// The LSN the next call to [`next`](Self::next) returns.
    #[must_use]
    pub const fn peek(&self) -> Lsn {
        self.last.next()
    }

    /// Allocates the next LSN.
    pub fn next(&mut self) -> Lsn {
        self.last = self.last.next();
        self.last
    }
}

/// An open snapshot or segment being appended to.
pub struct FileWriter {
    backend: Box<dyn StorageBackend>,
    name: String,
    sync_on_write: bool,
    rows: u64,
}

impl FileWriter {
    /// Creates `name` in `dir` and writes its header.
    pub fn create(
        dir: &dyn Directory,
        name: &str,
        header: &FileHeader,
        sync_on_write: bool,
    ) -> CoreResult<Self> {
        let mut backend = dir.create(name)?;
        backend.append(&header.encode())?;
        backend.sync()?;
        dir.sync()?;
        Ok(Self {
            backend,
            name: name.to_string(),
            sync_on_write,
            rows: 0,
        })
    }

    /// File name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records written so far.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Appends one record.
    ///
    /// The record is flushed before returning, and synced if the writer
    /// was created with `sync_on_write`.
    pub fn append(&mut self, record: &LogRecord) -> CoreResult<()> {
        let data = encode(record)?;
        self.backend.append(&data)?;
        if self.sync_on_write {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Writes the end-of-file marker and syncs.
    pub fn finish(mut self) -> CoreResult<()> {
        self.backend.append(&EOF_MAGIC)?;
        self.backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("name", &self.name)
            .field("rows", &self.rows)
            .finish()
    }
}

/// Appends records to rotating log segments.
///
/// A segment is created lazily on the first write after open or rotation
/// and named after that write's LSN, so a restarted writer never appends to
/// a segment written before the restart.
#[derive(Debug)]
pub struct LogWriter {
    dir: Arc<DataDir>,
    instance: Uuid,
    allocator: LsnAllocator,
    current: Option<FileWriter>,
    rows_per_segment: u64,
    sync_on_write: bool,
}

impl LogWriter {
    /// Creates a writer that continues after `last_lsn`.
    #[must_use]
    pub fn new(dir: Arc<DataDir>, instance: Uuid, last_lsn: Lsn, config: &Config) -> Self {
        Self {
            dir,
            instance,
            allocator: LsnAllocator::new(last_lsn),
            current: None,
            rows_per_segment: config.rows_per_segment.max(1),
            sync_on_write: config.sync_on_write,
        }
    }

    /// The last LSN written.
    #[must_use]
    pub fn lsn(&self) -> Lsn {
        self.allocator.last()
    }

    /// The LSN the next write will get.
    #[must_use]
    pub fn next_lsn(&self) -> Lsn {
        self.allocator.peek()
    }

    /// Name of the segment currently open for writing, if any.
    #[must_use]
    pub fn current_segment(&self) -> Option<&str> {
        self.current.as_ref().map(FileWriter::name)
    }

    /// Writes `op` under the next LSN and returns that LSN.
    ///
    /// The LSN is consumed only once the record is durable. If the write
    /// fails the open segment is abandoned and the next write starts a
    /// new one.
    pub fn write(&mut self, op: Op) -> CoreResult<Lsn> {
        let lsn = self.allocator.peek();
        let record = LogRecord::new(lsn, op);

        let result = self.segment_for(lsn).and_then(|segment| segment.append(&record));
        if let Err(e) = result {
            if let Some(segment) = self.current.take() {
                warn!(segment = %segment.name(), error = %e, "abandoning segment after failed write");
            }
            return Err(e);
        }
        self.allocator.next();

        if self
            .current
            .as_ref()
            .is_some_and(|segment| segment.rows() >= self.rows_per_segment)
        {
            self.rotate()?;
        }
        Ok(lsn)
    }

    /// Closes the current segment. The next write opens a new one.
    pub fn rotate(&mut self) -> CoreResult<()> {
        if let Some(segment) = self.current.take() {
            debug!(segment = %segment.name(), rows = segment.rows(), "closing segment");
            segment.finish()?;
        }
        Ok(())
    }

    /// Closes the current segment.
    pub fn close(&mut self) -> CoreResult<()> {
        self.rotate()
    }

    fn segment_for(&mut self, lsn: Lsn) -> CoreResult<&mut FileWriter> {
        let segment = match self.current.take() {
            Some(segment) => segment,
            None => self.open_segment(lsn)?,
        };
        Ok(self.current.insert(segment))
    }

    fn open_segment(&self, lsn: Lsn) -> CoreResult<FileWriter> {
        let name = format_file_name(lsn, FileKind::Segment);
        let directory = self.dir.directory();
        if directory.exists(&name)? {
            self.remove_torn_segment(lsn, &name)?;
        }
        let header = FileHeader::new(FileKind::Segment, lsn, self.instance);
        let segment = FileWriter::create(directory, &name, &header, self.sync_on_write)?;
        info!("created segment {}", self.dir.location(&name));
        Ok(segment)
    }

    /// Removes the segment a crash left at `lsn`.
    ///
    /// Fails with [`CoreError::CorruptSegment`] unless the segment holds no
    /// complete record.
    fn remove_torn_segment(&self, lsn: Lsn, name: &str) -> CoreResult<()> {
        let location = self.dir.location(name);
        {
            let backend = self.dir.open_file(lsn, FileKind::Segment)?;
            let mut reader =
                SegmentReader::open(backend, location.as_str(), FileKind::Segment, Some(lsn))?;
            if let Some(item) = reader.next() {
                let (offset, _) = item?;
                return Err(CoreError::corrupt(
                    &location,
                    offset,
                    "segment to be replaced holds complete records",
                ));
            }
        }
        warn!("removing segment {location} with no complete records");
        self.dir.directory().remove(name)?;
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close segment");
        }
    }
}
