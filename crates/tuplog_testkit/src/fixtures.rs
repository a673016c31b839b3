//! Test fixtures and engine helpers.
//!
//! Provides temporary data directories on disk and in memory, and a few
//! shortcuts for opening engines in the configurations tests need.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tuplog_codec::Tuple;
use tuplog_core::{format_file_name, Config, CoreResult, Engine, FileKind, IndexDef, Lsn, SpaceId};
use tuplog_storage::InMemoryDirectory;

/// Configuration with the default strict conflict policy and no fsync.
#[must_use]
pub fn strict_config() -> Config {
    Config::default().sync_on_write(false)
}

/// Configuration with the permissive ("force recovery") policy and no fsync.
#[must_use]
pub fn permissive_config() -> Config {
    strict_config().strict_on_conflict(false)
}

/// A data directory in a temporary folder, removed on drop.
pub struct TestDir {
    temp_dir: TempDir,
}

impl TestDir {
    /// Creates an empty temporary data directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the data directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the segment starting at `lsn`.
    pub fn segment_path(&self, lsn: u64) -> PathBuf {
        self.path().join(format_file_name(Lsn::new(lsn), FileKind::Segment))
    }

    /// Path of the snapshot at `lsn`.
    pub fn snapshot_path(&self, lsn: u64) -> PathBuf {
        self.path().join(format_file_name(Lsn::new(lsn), FileKind::Snapshot))
    }

    /// Opens an engine, returning the recovery error if any.
    pub fn try_open(&self, config: Config) -> CoreResult<Engine> {
        Engine::open(self.path(), config)
    }

    /// Opens an engine with the strict policy.
    pub fn open(&self) -> Engine {
        self.try_open(strict_config()).expect("Failed to open engine")
    }

    /// Opens an engine with the permissive policy.
    pub fn open_permissive(&self) -> Engine {
        self.try_open(permissive_config())
            .expect("Failed to open engine with force recovery")
    }

    /// Names of all files in the directory, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .expect("Failed to read data directory")
            .map(|entry| {
                entry
                    .expect("Failed to read directory entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A data directory held in memory.
///
/// Every engine opened from the same `MemoryDir` sees the same files, so
/// restarts can be simulated by dropping one engine and opening another.
#[derive(Clone, Default)]
pub struct MemoryDir {
    /// The shared directory.
    pub directory: InMemoryDirectory,
}

impl MemoryDir {
    /// Creates an empty in-memory data directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an engine, returning the recovery error if any.
    pub fn try_open(&self, config: Config) -> CoreResult<Engine> {
        Engine::open_in(Arc::new(self.directory.clone()), config)
    }

    /// Opens an engine with the strict policy.
    pub fn open(&self) -> Engine {
        self.try_open(strict_config()).expect("Failed to open engine")
    }

    /// Opens an engine with the permissive policy.
    pub fn open_permissive(&self) -> Engine {
        self.try_open(permissive_config())
            .expect("Failed to open engine with force recovery")
    }
}

/// Runs a test with an engine over a fresh in-memory directory.
///
/// # Example
///
/// ```rust,ignore
/// use tuplog_testkit::with_temp_engine;
///
/// with_temp_engine(|engine| {
///     let test = create_test_space(engine, "test");
///     engine.insert(test, tuple![1, "first tuple"]).unwrap();
/// });
/// ```
pub fn with_temp_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let dir = MemoryDir::new();
    let engine = dir.open();
    f(&engine)
}

/// Creates a space with a unique primary index on field 0.
pub fn create_test_space(engine: &Engine, name: &str) -> SpaceId {
    engine
        .create_space(name, vec![IndexDef::primary(vec![0])])
        .expect("Failed to create space")
}

/// Looks up a space that must exist.
pub fn space(engine: &Engine, name: &str) -> SpaceId {
    engine
        .space_id(name)
        .unwrap_or_else(|| panic!("space '{name}' does not exist"))
}

/// Inserts tuples that must not conflict.
pub fn insert_all(engine: &Engine, space_id: SpaceId, tuples: impl IntoIterator<Item = Tuple>) {
    for tuple in tuples {
        engine.insert(space_id, tuple).expect("Failed to insert tuple");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuplog_codec::tuple;

    #[test]
    fn test_dir_restart() {
        let dir = TestDir::new();
        {
            let engine = dir.open();
            let test = create_test_space(&engine, "test");
            insert_all(&engine, test, [tuple![1], tuple![2]]);
        }
        let engine = dir.open();
        assert_eq!(engine.len(space(&engine, "test")).unwrap(), 2);
        assert!(dir.segment_path(1).exists());
        assert!(dir.snapshot_path(0).exists());
    }

    #[test]
    fn memory_dir_restart() {
        let dir = MemoryDir::new();
        {
            let engine = dir.open();
            create_test_space(&engine, "test");
        }
        let engine = dir.open_permissive();
        assert!(engine.space_id("test").is_some());
        assert!(!engine.config().strict_on_conflict);
    }

    #[test]
    fn temp_engine() {
        let len = with_temp_engine(|engine| {
            let test = create_test_space(engine, "test");
            insert_all(engine, test, [tuple![1, "a"]]);
            engine.len(test).unwrap()
        });
        assert_eq!(len, 1);
    }
}
