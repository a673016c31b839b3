//! Engine facade: recovery at open, then live operations.

use crate::config::Config;
use crate::dir::DataDir;
use crate::error::{CoreError, CoreResult};
use crate::recovery::{RecoveryReport, ReplayEngine};
use crate::snapshot::{SnapshotLoader, SnapshotWriter};
use crate::space::{validate_index_defs, ApplyError, EngineState, IndexDef};
use crate::types::{Lsn, SpaceId};
use crate::wal::{LogWriter, Op};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use tuplog_codec::Tuple;
use tuplog_storage::Directory;
use uuid::Uuid;

/// Summary of one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceStats {
    /// Space ID.
    pub id: SpaceId,
    /// Space name.
    pub name: String,
    /// Number of tuples.
    pub tuples: usize,
}

/// An open engine.
///
/// Opening an engine runs recovery to completion: the newest usable
/// snapshot is loaded and every later log record replayed. Either recovery
/// succeeds and the engine is returned, or it fails and nothing is.
///
/// # Example
///
/// ```rust,ignore
/// use tuplog_core::{Config, Engine, IndexDef};
/// use tuplog_codec::tuple;
///
/// let engine = Engine::open(Path::new("data"), Config::default())?;
/// let test = engine.create_space("test", vec![IndexDef::primary(vec![0])])?;
/// engine.insert(test, tuple![1, "first tuple"])?;
/// engine.snapshot()?;
/// ```
///
/// # Concurrency
///
/// Writes are serialized by the log writer lock and take the state lock
/// after it. Reads only take the state lock.
pub struct Engine {
    dir: Arc<DataDir>,
    config: Config,
    instance: Uuid,
    state: RwLock<EngineState>,
    writer: Mutex<LogWriter>,
    report: RecoveryReport,
    closed: AtomicBool,
}

impl Engine {
    /// Opens the engine stored in `path`, creating it if allowed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DataDirLocked`] if another engine has the directory
    /// - [`CoreError::NoSnapshot`], [`CoreError::CorruptSegment`],
    ///   [`CoreError::InstanceMismatch`] or [`CoreError::RecoveryAborted`]
    ///   if recovery fails
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DataDir::open(path, config.create_if_missing)?;
        Self::recover(dir, config)
    }

    /// Opens the engine stored in an arbitrary directory.
    pub fn open_in(directory: Arc<dyn Directory>, config: Config) -> CoreResult<Self> {
        let dir = DataDir::with_directory(directory)?;
        Self::recover(dir, config)
    }

    /// Writes the initial empty snapshot of a new data directory and
    /// returns the instance ID it was given.
    pub fn bootstrap(dir: &DataDir) -> CoreResult<Uuid> {
        let instance = Uuid::new_v4();
        info!(%instance, "initializing empty data directory {}", dir.description());
        SnapshotWriter::write(dir, &EngineState::new(), Lsn::ZERO, instance)?;
        Ok(instance)
    }

    fn recover(dir: DataDir, config: Config) -> CoreResult<Self> {
        let mut listing = dir.scan()?;
        if listing.is_empty() && config.create_if_missing {
            Self::bootstrap(&dir)?;
            listing = dir.scan()?;
        }

        info!("recovery start");
        let ctx = SnapshotLoader::new(&config).load_latest(&dir, &listing.snapshots)?;
        let instance = ctx.instance;
        let (state, report) = ReplayEngine::new(&config).replay(&dir, ctx, &listing.segments)?;
        info!(
            lsn = report.last_lsn.as_u64(),
            applied = report.records_applied,
            skipped = report.records_skipped.len(),
            gaps = report.gaps.len(),
            "recovery done"
        );

        let dir = Arc::new(dir);
        let writer = LogWriter::new(Arc::clone(&dir), instance, report.last_lsn, &config);
        Ok(Self {
            dir,
            config,
            instance,
            state: RwLock::new(state),
            writer: Mutex::new(writer),
            report,
            closed: AtomicBool::new(false),
        })
    }

    /// Creates a space and returns its ID.
    ///
    /// The first index is the primary index and must be unique.
    pub fn create_space(&self, name: &str, indexes: Vec<IndexDef>) -> CoreResult<SpaceId> {
        if name.is_empty() {
            return Err(CoreError::invalid_argument("space name must not be empty"));
        }
        validate_index_defs(&indexes).map_err(CoreError::invalid_argument)?;

        let mut writer = self.writer.lock();
        let space_id = self.state.read().next_space_id();
        self.execute(
            &mut writer,
            Op::CreateSpace {
                space_id,
                name: name.to_string(),
                indexes,
            },
        )?;
        Ok(space_id)
    }

    /// Resolves a space name.
    #[must_use]
    pub fn space_id(&self, name: &str) -> Option<SpaceId> {
        self.state.read().space_id(name)
    }

    /// Inserts a tuple whose keys must not exist yet.
    pub fn insert(&self, space_id: SpaceId, tuple: Tuple) -> CoreResult<Lsn> {
        let mut writer = self.writer.lock();
        self.execute(&mut writer, Op::Insert { space_id, tuple })
    }

    /// Inserts a tuple or replaces the one with the same primary key.
    pub fn replace(&self, space_id: SpaceId, tuple: Tuple) -> CoreResult<Lsn> {
        let mut writer = self.writer.lock();
        self.execute(&mut writer, Op::Replace { space_id, tuple })
    }

    /// Deletes the tuple with primary key `key`.
    pub fn delete(&self, space_id: SpaceId, key: Tuple) -> CoreResult<Lsn> {
        let mut writer = self.writer.lock();
        self.execute(&mut writer, Op::Delete { space_id, key })
    }

    /// Looks up a tuple by primary key.
    pub fn get(&self, space_id: SpaceId, key: &Tuple) -> CoreResult<Option<Tuple>> {
        self.ensure_open()?;
        let state = self.state.read();
        let space = state
            .space(space_id)
            .ok_or_else(|| CoreError::space_not_found(space_id.to_string()))?;
        Ok(space.get(key).cloned())
    }

    /// Number of tuples in a space.
    pub fn len(&self, space_id: SpaceId) -> CoreResult<usize> {
        self.ensure_open()?;
        self.state
            .read()
            .space(space_id)
            .map(|space| space.len())
            .ok_or_else(|| CoreError::space_not_found(space_id.to_string()))
    }

    /// All tuples of a space in primary key order.
    pub fn tuples(&self, space_id: SpaceId) -> CoreResult<Vec<Tuple>> {
        self.ensure_open()?;
        self.state
            .read()
            .space(space_id)
            .map(|space| space.tuples().cloned().collect())
            .ok_or_else(|| CoreError::space_not_found(space_id.to_string()))
    }

    /// Summaries of all spaces, in ID order.
    #[must_use]
    pub fn spaces(&self) -> Vec<SpaceStats> {
        self.state
            .read()
            .spaces()
            .map(|space| SpaceStats {
                id: space.id(),
                name: space.name().to_string(),
                tuples: space.len(),
            })
            .collect()
    }

    /// The LSN of the last durable write.
    #[must_use]
    pub fn lsn(&self) -> Lsn {
        self.writer.lock().lsn()
    }

    /// Saves the current state as a snapshot and returns its LSN.
    ///
    /// The current segment is closed so that later writes start a new one.
    pub fn snapshot(&self) -> CoreResult<Lsn> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        let lsn = writer.lsn();
        {
            let state = self.state.read();
            SnapshotWriter::write(&self.dir, &state, lsn, self.instance)?;
        }
        writer.rotate()?;
        Ok(lsn)
    }

    /// What recovery did when this engine was opened.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.report
    }

    /// ID of the instance that owns the data directory.
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Closes the current segment. Further operations fail with
    /// [`CoreError::EngineClosed`].
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.writer.lock().close()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::EngineClosed)
        }
    }

    /// Validates, logs and applies one operation.
    ///
    /// Nothing is written for an operation that would not apply.
    fn execute(&self, writer: &mut LogWriter, op: Op) -> CoreResult<Lsn> {
        self.ensure_open()?;
        let next = writer.next_lsn();
        self.state
            .read()
            .check(&op)
            .map_err(|e| conflict(e, next))?;

        let lsn = writer.write(op.clone())?;
        self.state.write().apply(&op).map_err(|e| conflict(e, lsn))?;
        debug!(lsn = lsn.as_u64(), op = op.record_type().name(), "applied");
        Ok(lsn)
    }
}

fn conflict(error: ApplyError, lsn: Lsn) -> CoreError {
    CoreError::ApplyConflict {
        kind: error.kind,
        lsn,
        message: error.message,
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.dir.description())
            .field("instance", &self.instance)
            .field("is_open", &self.is_open())
            .field("lsn", &self.lsn())
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::ConflictKind;
    use tuplog_codec::tuple;
    use tuplog_storage::InMemoryDirectory;

    fn primary() -> Vec<IndexDef> {
        vec![IndexDef::primary(vec![0])]
    }

    fn open(mem: &InMemoryDirectory) -> Engine {
        Engine::open_in(Arc::new(mem.clone()), Config::default()).unwrap()
    }

    #[test]
    fn new_directory_is_bootstrapped() {
        let mem = InMemoryDirectory::new();
        let engine = open(&mem);
        assert_eq!(engine.lsn(), Lsn::ZERO);
        assert_eq!(engine.recovery_report().snapshot.as_deref(), Some("00000000000000000000.snap"));
        assert!(engine.spaces().is_empty());
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let mem = InMemoryDirectory::new();
        let err = Engine::open_in(Arc::new(mem), Config::default().create_if_missing(false))
            .unwrap_err();
        assert!(matches!(err, CoreError::NoSnapshot { .. }));
    }

    #[test]
    fn segments_without_snapshot_fail() {
        let mem = InMemoryDirectory::new();
        drop(open(&mem));
        {
            let engine = open(&mem);
            engine.create_space("test", primary()).unwrap();
        }
        mem.remove("00000000000000000000.snap").unwrap();

        let err = Engine::open_in(Arc::new(mem), Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::NoSnapshot { .. }));
    }

    #[test]
    fn operations_survive_restart() {
        let mem = InMemoryDirectory::new();
        {
            let engine = open(&mem);
            let test = engine.create_space("test", primary()).unwrap();
            engine.insert(test, tuple![1, "a"]).unwrap();
            engine.insert(test, tuple![2, "b"]).unwrap();
            engine.replace(test, tuple![1, "c"]).unwrap();
            engine.delete(test, tuple![2]).unwrap();
            assert_eq!(engine.lsn(), Lsn::new(5));
        }

        let engine = open(&mem);
        let test = engine.space_id("test").unwrap();
        assert_eq!(engine.get(test, &tuple![1]).unwrap(), Some(tuple![1, "c"]));
        assert_eq!(engine.get(test, &tuple![2]).unwrap(), None);
        assert_eq!(engine.len(test).unwrap(), 1);
        assert_eq!(engine.lsn(), Lsn::new(5));
        assert_eq!(engine.recovery_report().records_applied, 5);
    }

    #[test]
    fn live_conflicts_are_returned_and_not_logged() {
        let mem = InMemoryDirectory::new();
        let engine = open(&mem);
        let test = engine.create_space("test", primary()).unwrap();
        engine.insert(test, tuple![1, "first tuple"]).unwrap();

        let err = engine.insert(test, tuple![1, "again"]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ApplyConflict { kind: ConflictKind::DuplicateKey, lsn, .. } if lsn == Lsn::new(3)
        ));
        assert_eq!(engine.lsn(), Lsn::new(2));

        // The next write takes the LSN the rejected one would have had.
        assert_eq!(engine.insert(test, tuple![2]).unwrap(), Lsn::new(3));
    }

    #[test]
    fn invalid_arguments() {
        let engine = open(&InMemoryDirectory::new());
        assert!(matches!(
            engine.create_space("", primary()),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            engine.create_space("test", vec![]),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            engine.get(SpaceId::new(9000), &tuple![1]),
            Err(CoreError::SpaceNotFound { .. })
        ));
    }

    #[test]
    fn snapshot_starts_a_new_segment() {
        let mem = InMemoryDirectory::new();
        let engine = open(&mem);
        let test = engine.create_space("test", primary()).unwrap();
        assert_eq!(engine.snapshot().unwrap(), Lsn::new(1));
        engine.insert(test, tuple![1]).unwrap();
        drop(engine);

        let mut names = mem.list().unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "00000000000000000000.snap",
                "00000000000000000001.snap",
                "00000000000000000001.xlog",
                "00000000000000000002.xlog",
            ]
        );

        let engine = open(&mem);
        assert_eq!(engine.recovery_report().base_lsn, Lsn::new(1));
        assert_eq!(engine.recovery_report().records_applied, 1);
        assert_eq!(engine.len(test).unwrap(), 1);
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let engine = open(&InMemoryDirectory::new());
        let test = engine.create_space("test", primary()).unwrap();
        engine.close().unwrap();
        assert!(!engine.is_open());
        assert!(matches!(engine.insert(test, tuple![1]), Err(CoreError::EngineClosed)));
        assert!(matches!(engine.snapshot(), Err(CoreError::EngineClosed)));
    }

    #[test]
    fn data_dir_is_locked_while_open() {
        let temp = tempfile::tempdir().unwrap();
        let engine = Engine::open(temp.path(), Config::default()).unwrap();
        let err = Engine::open(temp.path(), Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::DataDirLocked));
        drop(engine);
        assert!(Engine::open(temp.path(), Config::default()).is_ok());
    }
}
