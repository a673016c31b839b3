//! Data directory management.
//!
//! Snapshots and log segments share one flat directory and are told apart
//! by extension. Both are named after an LSN, zero padded to 20 digits so
//! that lexical and numeric order agree:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                                # Advisory lock for single-writer
//! ├─ 00000000000000000000.snap           # Snapshot at LSN 0
//! ├─ 00000000000000000001.xlog           # Segment starting at LSN 1
//! ├─ 00000000000000000731.snap           # Snapshot at LSN 731
//! ├─ 00000000000000000732.xlog           # Segment starting at LSN 732
//! └─ 00000000000000000900.snap.inprogress # Interrupted snapshot, removed on open
//! ```
//!
//! A segment is named after the LSN of its first record; a snapshot after
//! the LSN it captures. Enumeration never assumes the LSNs are contiguous.

use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tuplog_storage::{Directory, FileDirectory, StorageBackend};

/// Name of the advisory lock file.
const LOCK_FILE: &str = "LOCK";

/// Suffix of files that are still being written.
pub const INPROGRESS_SUFFIX: &str = ".inprogress";

/// Number of digits in an LSN-derived file name.
const NAME_DIGITS: usize = 20;

/// Kind of a recovery file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileKind {
    /// Full state at an LSN.
    Snapshot,
    /// Log records starting at an LSN.
    Segment,
}

impl FileKind {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Snapshot => "snap",
            Self::Segment => "xlog",
        }
    }

    /// Byte used for this kind in file headers.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Snapshot => 1,
            Self::Segment => 2,
        }
    }

    /// Converts a header byte to a kind.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Snapshot),
            2 => Some(Self::Segment),
            _ => None,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "snap" => Some(Self::Snapshot),
            "xlog" => Some(Self::Segment),
            _ => None,
        }
    }
}

/// Builds the file name for an LSN and kind.
#[must_use]
pub fn format_file_name(lsn: Lsn, kind: FileKind) -> String {
    format!("{:020}.{}", lsn.as_u64(), kind.extension())
}

/// Parses a file name produced by [`format_file_name`].
///
/// Returns `Ok(None)` for files that are not snapshots or segments (the
/// lock file, in-progress files, anything with another extension).
///
/// # Errors
///
/// Returns [`CoreError::InvalidFilename`] if the extension is known but
/// the stem is not a 20-digit number.
pub fn parse_file_name(name: &str) -> CoreResult<Option<(Lsn, FileKind)>> {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return Ok(None);
    };
    let Some(kind) = FileKind::from_extension(ext) else {
        return Ok(None);
    };

    let invalid = || CoreError::InvalidFilename {
        name: name.to_string(),
    };
    if stem.len() != NAME_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let lsn = stem.parse::<u64>().map_err(|_| invalid())?;
    Ok(Some((Lsn::new(lsn), kind)))
}

/// Snapshots and segments found in a data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    /// Snapshot LSNs, ascending.
    pub snapshots: Vec<Lsn>,
    /// Segment start LSNs, ascending.
    pub segments: Vec<Lsn>,
    /// Names with a known extension but an invalid stem.
    pub invalid: Vec<String>,
}

impl DirListing {
    /// Returns true if there is neither a snapshot nor a segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.segments.is_empty()
    }
}

/// The directory holding snapshots and segments.
///
/// When opened from a path, `DataDir` holds an exclusive lock on the
/// directory until dropped.
pub struct DataDir {
    directory: Arc<dyn Directory>,
    description: String,
    _lock_file: Option<File>,
}

impl DataDir {
    /// Opens or creates a data directory on disk and locks it.
    ///
    /// Interrupted snapshot writes left behind by a crash are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DataDirLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        let directory = FileDirectory::open(path, create_if_missing)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DataDirLocked);
        }

        let dir = Self {
            directory: Arc::new(directory),
            description: path.display().to_string(),
            _lock_file: Some(lock_file),
        };
        dir.remove_inprogress()?;
        Ok(dir)
    }

    /// Opens a data directory on disk for inspection only.
    ///
    /// No lock is taken and nothing is removed, so this is safe to use on
    /// a directory an engine currently owns.
    pub fn open_read_only(path: &Path) -> CoreResult<Self> {
        let directory = FileDirectory::open(path, false)?;
        Ok(Self {
            directory: Arc::new(directory),
            description: path.display().to_string(),
            _lock_file: None,
        })
    }

    /// Wraps an arbitrary directory, typically an in-memory one.
    pub fn with_directory(directory: Arc<dyn Directory>) -> CoreResult<Self> {
        let dir = Self {
            directory,
            description: "<memory>".to_string(),
            _lock_file: None,
        };
        dir.remove_inprogress()?;
        Ok(dir)
    }

    /// Returns the underlying directory.
    #[must_use]
    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    /// Returns a printable description of the directory.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns a printable location for a file in this directory.
    #[must_use]
    pub fn location(&self, name: &str) -> String {
        self.directory.location(name)
    }

    /// Opens an existing snapshot or segment.
    pub fn open_file(&self, lsn: Lsn, kind: FileKind) -> CoreResult<Box<dyn StorageBackend>> {
        Ok(self.directory.open(&format_file_name(lsn, kind))?)
    }

    /// Returns true if the snapshot or segment exists.
    pub fn contains(&self, lsn: Lsn, kind: FileKind) -> CoreResult<bool> {
        Ok(self.directory.exists(&format_file_name(lsn, kind))?)
    }

    /// Lists snapshots and segments, sorted by LSN.
    ///
    /// Files with an invalid name are reported in
    /// [`DirListing::invalid`] and otherwise ignored.
    pub fn scan(&self) -> CoreResult<DirListing> {
        let mut listing = DirListing::default();

        for name in self.directory.list()? {
            match parse_file_name(&name) {
                Ok(Some((lsn, FileKind::Snapshot))) => listing.snapshots.push(lsn),
                Ok(Some((lsn, FileKind::Segment))) => listing.segments.push(lsn),
                Ok(None) => {}
                Err(_) => {
                    warn!(file = %self.location(&name), "ignoring file with invalid name");
                    listing.invalid.push(name);
                }
            }
        }

        listing.snapshots.sort_unstable();
        listing.segments.sort_unstable();
        listing.invalid.sort_unstable();
        Ok(listing)
    }

    fn remove_inprogress(&self) -> CoreResult<()> {
        let mut removed = false;
        for name in self.directory.list()? {
            if name.ends_with(INPROGRESS_SUFFIX) {
                info!("removing {}", self.location(&name));
                self.directory.remove(&name)?;
                removed = true;
            }
        }
        if removed {
            self.directory.sync()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataDir")
            .field("location", &self.description)
            .field("locked", &self._lock_file.is_some())
            .finish()
    }
}
