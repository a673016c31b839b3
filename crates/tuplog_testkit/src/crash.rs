//! Crash simulation for recovery tests.
//!
//! A [`CrashableDirectory`] wraps an in-memory directory and fails every
//! write once a byte budget is used up. The write that crosses the budget
//! is applied partially, the way a process killed mid-`write` leaves a
//! file. Reopening an engine over [`CrashableDirectory::inner`] then plays
//! the restart.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tuplog_testkit::crash::CrashableDirectory;
//!
//! let dir = CrashableDirectory::new();
//! let engine = Engine::open_in(dir.shared(), config)?;
//! dir.crash_after(10);
//! assert!(engine.insert(space, tuple![1, "x"]).is_err());
//! drop(engine);
//! let engine = Engine::open_in(Arc::new(dir.inner()), config)?;
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tuplog_storage::{Directory, InMemoryDirectory, StorageBackend, StorageError, StorageResult};

/// Crash state shared by a directory and the backends it hands out.
#[derive(Debug)]
struct CrashState {
    remaining: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashState {
    fn new() -> Self {
        Self {
            remaining: AtomicUsize::new(usize::MAX),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated crash during {what}")))
    }
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            state: Arc::new(CrashState::new()),
        }
    }

    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        self.state.remaining.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.state.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.has_crashed() {
            return Err(self.state.crash("write"));
        }

        let remaining = self.state.remaining.load(Ordering::SeqCst);
        if remaining == usize::MAX {
            return self.inner.append(data);
        }
        if data.len() > remaining {
            // Write partial data up to the crash point
            if remaining > 0 {
                self.inner.append(&data[..remaining])?;
            }
            self.state.remaining.store(0, Ordering::SeqCst);
            return Err(self.state.crash("partial write"));
        }

        self.state.remaining.store(remaining - data.len(), Ordering::SeqCst);
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(self.state.crash("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.has_crashed() || self.state.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.state.crash("sync"));
        }
        self.inner.sync()
    }
}

/// An in-memory directory whose files crash together.
#[derive(Clone)]
pub struct CrashableDirectory {
    inner: InMemoryDirectory,
    state: Arc<CrashState>,
}

impl CrashableDirectory {
    /// Creates an empty directory that does not crash until told to.
    pub fn new() -> Self {
        Self {
            inner: InMemoryDirectory::new(),
            state: Arc::new(CrashState::new()),
        }
    }

    /// The directory as an engine takes it.
    pub fn shared(&self) -> Arc<dyn Directory> {
        Arc::new(self.clone())
    }

    /// The files as they are, without crash behaviour.
    pub fn inner(&self) -> InMemoryDirectory {
        self.inner.clone()
    }

    /// Crashes once `bytes` more bytes have been written to any file.
    pub fn crash_after(&self, bytes: usize) {
        self.state.remaining.store(bytes, Ordering::SeqCst);
    }

    /// Returns whether a crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    fn wrap(&self, inner: Box<dyn StorageBackend>) -> Box<dyn StorageBackend> {
        Box::new(CrashableBackend {
            inner,
            state: Arc::clone(&self.state),
        })
    }

    fn check(&self, what: &str) -> StorageResult<()> {
        if self.has_crashed() {
            Err(self.state.crash(what))
        } else {
            Ok(())
        }
    }
}

impl Default for CrashableDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for CrashableDirectory {
    fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list()
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.exists(name)
    }

    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(self.wrap(self.inner.open(name)?))
    }

    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        self.check("create")?;
        Ok(self.wrap(self.inner.create(name)?))
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.check("rename")?;
        self.inner.rename(from, to)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.check("remove")?;
        self.inner.remove(name)
    }

    fn sync(&self) -> StorageResult<()> {
        self.check("directory sync")?;
        self.inner.sync()
    }
}
