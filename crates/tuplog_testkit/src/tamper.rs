//! Segment tampering helpers.
//!
//! Recreate on disk what crashes, bit rot and careless operators leave
//! behind: torn tails, flipped bytes, files moved in and out of a data
//! directory.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tuplog_core::wal::{SegmentReader, RECORD_HEADER_SIZE};
use tuplog_core::{parse_file_name, CoreError};
use tuplog_storage::FileBackend;

/// Suffix given to archived files. Enumeration ignores it.
pub const ARCHIVE_SUFFIX: &str = ".archived";

/// Cuts `bytes` bytes off the end of a file.
pub fn truncate_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

/// Flips every bit of the byte at `offset`.
pub fn corrupt_byte(path: &Path, offset: u64) -> io::Result<()> {
    let mut data = fs::read(path)?;
    let index = usize::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let byte = data
        .get_mut(index)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset past end of file"))?;
    *byte ^= 0xff;
    fs::write(path, data)
}

/// Exchanges the contents of two files.
pub fn swap_files(a: &Path, b: &Path) -> io::Result<()> {
    let tmp = a.with_extension("swap");
    fs::rename(a, &tmp)?;
    fs::rename(b, a)?;
    fs::rename(&tmp, b)
}

/// Moves a file out of enumeration's sight and returns its new path.
pub fn archive(path: &Path) -> io::Result<PathBuf> {
    let mut archived = path.as_os_str().to_owned();
    archived.push(ARCHIVE_SUFFIX);
    let archived = PathBuf::from(archived);
    fs::rename(path, &archived)?;
    Ok(archived)
}

/// Moves an archived file back to `path`, replacing whatever is there.
pub fn restore(archived: &Path, path: &Path) -> io::Result<()> {
    fs::rename(archived, path)
}

/// Byte offsets of every record in a snapshot or segment.
///
/// # Errors
///
/// Fails if the file name is not a snapshot or segment name, or if the
/// file does not read cleanly.
pub fn record_offsets(path: &Path) -> Result<Vec<u64>, CoreError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (lsn, kind) = parse_file_name(&name)?
        .ok_or_else(|| CoreError::InvalidFilename { name: name.clone() })?;
    let backend = FileBackend::open_existing(path)?;
    let reader = SegmentReader::open(Box::new(backend), name, kind, Some(lsn))?;
    reader
        .map(|item| item.map(|(offset, _)| offset))
        .collect()
}

/// Flips a byte inside the checksummed body of the record at `offset`.
pub fn corrupt_record(path: &Path, offset: u64) -> io::Result<()> {
    // Second payload byte; every payload is longer than that.
    corrupt_byte(path, offset + RECORD_HEADER_SIZE as u64 + 1)
}

/// Flips the low byte of the length field of the record at `offset`.
pub fn corrupt_record_length(path: &Path, offset: u64) -> io::Result<()> {
    // magic (4) + type (1) + lsn (8)
    corrupt_byte(path, offset + 13)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{create_test_space, insert_all, TestDir};
    use tuplog_codec::tuple;

    fn dir_with_segment() -> TestDir {
        let dir = TestDir::new();
        let engine = dir.open();
        let test = create_test_space(&engine, "test");
        insert_all(&engine, test, [tuple![1, "a"], tuple![2, "b"]]);
        dir
    }

    #[test]
    fn offsets_and_truncation() {
        let dir = dir_with_segment();
        let segment = dir.segment_path(1);
        assert_eq!(record_offsets(&segment).unwrap().len(), 3);

        // EOF marker plus a few bytes of the last record.
        truncate_tail(&segment, 7).unwrap();
        assert_eq!(record_offsets(&segment).unwrap().len(), 2);
    }

    #[test]
    fn corrupted_record_is_detected() {
        let dir = dir_with_segment();
        let segment = dir.segment_path(1);
        let offsets = record_offsets(&segment).unwrap();
        corrupt_record(&segment, offsets[1]).unwrap();
        assert!(matches!(
            record_offsets(&segment),
            Err(CoreError::CorruptSegment { .. })
        ));
    }

    #[test]
    fn corrupted_length_is_detected() {
        let dir = dir_with_segment();
        let segment = dir.segment_path(1);
        let offsets = record_offsets(&segment).unwrap();
        corrupt_record_length(&segment, offsets[0]).unwrap();
        assert!(matches!(
            record_offsets(&segment),
            Err(CoreError::CorruptSegment { .. })
        ));
    }

    #[test]
    fn archive_and_restore() {
        let dir = dir_with_segment();
        let segment = dir.segment_path(1);
        let archived = archive(&segment).unwrap();
        assert!(!segment.exists());
        assert!(archived.to_string_lossy().ends_with(".xlog.archived"));

        restore(&archived, &segment).unwrap();
        assert!(segment.exists());
    }

    #[test]
    fn swap() {
        let temp = TestDir::new();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();
        swap_files(&a, &b).unwrap();
        assert_eq!(fs::read(&a).unwrap(), b"second");
        assert_eq!(fs::read(&b).unwrap(), b"first");
    }
}
