//! Snapshot loading and writing.
//!
//! A snapshot is a file in the log format whose rows all carry the
//! snapshot LSN: one `CreateSpace` row per space, then one `Insert` row per
//! tuple. It is written under an `.inprogress` name and renamed into place
//! only once complete, and a snapshot without its end-of-file marker is
//! never loaded.

use crate::config::Config;
use crate::dir::{format_file_name, DataDir, FileKind, INPROGRESS_SUFFIX};
use crate::error::{CoreError, CoreResult};
use crate::recovery::{ConflictPolicy, RecoveryContext};
use crate::space::EngineState;
use crate::types::Lsn;
use crate::wal::{FileHeader, FileWriter, LogRecord, Op, SegmentReader};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Loads the newest usable snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    policy: ConflictPolicy,
    progress_interval: u64,
}

impl SnapshotLoader {
    /// Creates a loader from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            policy: ConflictPolicy::from_config(config),
            progress_interval: config.progress_interval,
        }
    }

    /// Loads the newest of `snapshots` (LSNs, ascending) that is intact.
    ///
    /// A damaged snapshot is logged and the next older one tried. Any other
    /// failure is returned as is.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NoSnapshot`] if no snapshot is usable
    /// - [`CoreError::RecoveryAborted`] if a snapshot holds a conflict the
    ///   policy refuses to skip
    /// - storage and I/O errors while reading a snapshot
    pub fn load_latest(&self, dir: &DataDir, snapshots: &[Lsn]) -> CoreResult<RecoveryContext> {
        for &lsn in snapshots.iter().rev() {
            match self.load(dir, lsn) {
                Ok(ctx) => return Ok(ctx),
                Err(e @ CoreError::CorruptSegment { .. }) => {
                    error!(
                        file = %dir.location(&format_file_name(lsn, FileKind::Snapshot)),
                        error = %e,
                        "snapshot is unusable, trying an older one"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::NoSnapshot {
            dir: dir.description().to_string(),
        })
    }

    /// Loads one snapshot.
    pub fn load(&self, dir: &DataDir, lsn: Lsn) -> CoreResult<RecoveryContext> {
        let name = format_file_name(lsn, FileKind::Snapshot);
        let file = dir.location(&name);
        info!("recovering from `{file}`");

        let mut reader = SegmentReader::open(
            dir.open_file(lsn, FileKind::Snapshot)?,
            file.clone(),
            FileKind::Snapshot,
            Some(lsn),
        )?;
        let Some(header) = reader.header().copied() else {
            return Err(CoreError::corrupt(file, 0, "snapshot header is incomplete"));
        };

        let mut ctx = RecoveryContext::new(EngineState::new(), lsn, header.instance);
        ctx.snapshot = Some(name);

        for item in reader.by_ref() {
            let (offset, record) = item?;
            if !matches!(record.op, Op::CreateSpace { .. } | Op::Insert { .. }) {
                return Err(CoreError::corrupt(
                    &file,
                    offset,
                    format!("unexpected {} row in snapshot", record.op.record_type().name()),
                ));
            }
            match ctx.state.apply(&record.op) {
                Ok(()) => ctx.snapshot_rows += 1,
                Err(error) => {
                    let diagnostic = self.policy.handle(error, lsn)?;
                    ctx.record_conflict(diagnostic);
                }
            }
            ctx.count_row(self.progress_interval);
        }

        if reader.truncated_tail() || !reader.has_eof_marker() {
            return Err(CoreError::corrupt(
                file,
                reader.size(),
                "snapshot has no end-of-file marker",
            ));
        }
        debug!(rows = ctx.snapshot_rows, "snapshot loaded");
        Ok(ctx)
    }
}

/// Writes snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotWriter;

impl SnapshotWriter {
    /// Writes `state` as the snapshot at `lsn`.
    ///
    /// Returns false without writing anything if that snapshot already
    /// exists.
    pub fn write(dir: &DataDir, state: &EngineState, lsn: Lsn, instance: Uuid) -> CoreResult<bool> {
        let name = format_file_name(lsn, FileKind::Snapshot);
        let directory = dir.directory();
        if directory.exists(&name)? {
            debug!(snapshot = %name, "snapshot already exists");
            return Ok(false);
        }

        let tmp = format!("{name}{INPROGRESS_SUFFIX}");
        if directory.exists(&tmp)? {
            directory.remove(&tmp)?;
        }

        let header = FileHeader::new(FileKind::Snapshot, lsn, instance);
        let mut writer = FileWriter::create(directory, &tmp, &header, false)?;
        for space in state.spaces() {
            writer.append(&LogRecord::new(
                lsn,
                Op::CreateSpace {
                    space_id: space.id(),
                    name: space.name().to_string(),
                    indexes: space.index_defs(),
                },
            ))?;
        }
        for space in state.spaces() {
            for tuple in space.tuples() {
                writer.append(&LogRecord::new(
                    lsn,
                    Op::Insert {
                        space_id: space.id(),
                        tuple: tuple.clone(),
                    },
                ))?;
            }
        }
        let rows = writer.rows();
        writer.finish()?;

        directory.rename(&tmp, &name)?;
        directory.sync()?;
        info!(rows, "saved snapshot {}", dir.location(&name));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::ConflictKind;
    use crate::space::IndexDef;
    use crate::types::SpaceId;
    use std::sync::Arc;
    use tuplog_codec::tuple;
    use tuplog_storage::{
        Directory, InMemoryDirectory, StorageBackend, StorageError, StorageResult,
    };

    const SPACE: SpaceId = SpaceId(512);

    /// An in-memory directory in which one store cannot be opened.
    struct Unreadable {
        inner: InMemoryDirectory,
        name: String,
    }

    impl Directory for Unreadable {
        fn list(&self) -> StorageResult<Vec<String>> {
            self.inner.list()
        }

        fn exists(&self, name: &str) -> StorageResult<bool> {
            self.inner.exists(name)
        }

        fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
            if name == self.name {
                return Err(StorageError::Io(std::io::ErrorKind::PermissionDenied.into()));
            }
            self.inner.open(name)
        }

        fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
            self.inner.create(name)
        }

        fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
            self.inner.rename(from, to)
        }

        fn remove(&self, name: &str) -> StorageResult<()> {
            self.inner.remove(name)
        }

        fn sync(&self) -> StorageResult<()> {
            self.inner.sync()
        }
    }

    fn data_dir() -> (InMemoryDirectory, DataDir) {
        let mem = InMemoryDirectory::new();
        let dir = DataDir::with_directory(Arc::new(mem.clone())).unwrap();
        (mem, dir)
    }

    fn sample_state() -> EngineState {
        let mut state = EngineState::new();
        state
            .create_space(
                SPACE,
                "test",
                vec![
                    IndexDef::primary(vec![0]),
                    IndexDef::secondary(1, "name", vec![1], true),
                ],
            )
            .unwrap();
        for (id, name) in [(1, "first tuple"), (2, "second tuple")] {
            state
                .apply(&Op::Insert { space_id: SPACE, tuple: tuple![id, name] })
                .unwrap();
        }
        state
    }

    fn loader(strict: bool) -> SnapshotLoader {
        SnapshotLoader::new(&Config::default().strict_on_conflict(strict))
    }

    #[test]
    fn write_then_load() {
        let (_mem, dir) = data_dir();
        let state = sample_state();
        let instance = Uuid::new_v4();
        assert!(SnapshotWriter::write(&dir, &state, Lsn::new(7), instance).unwrap());

        let ctx = loader(true).load_latest(&dir, &dir.scan().unwrap().snapshots).unwrap();
        assert_eq!(ctx.state, state);
        assert_eq!(ctx.base_lsn, Lsn::new(7));
        assert_eq!(ctx.last_lsn, Lsn::new(7));
        assert_eq!(ctx.instance, instance);
        assert_eq!(ctx.snapshot_rows, 3);
        assert_eq!(ctx.snapshot.as_deref(), Some("00000000000000000007.snap"));
    }

    #[test]
    fn existing_snapshot_is_not_rewritten() {
        let (_mem, dir) = data_dir();
        assert!(SnapshotWriter::write(&dir, &sample_state(), Lsn::new(1), Uuid::nil()).unwrap());
        assert!(!SnapshotWriter::write(&dir, &EngineState::new(), Lsn::new(1), Uuid::nil()).unwrap());

        let ctx = loader(true).load(&dir, Lsn::new(1)).unwrap();
        assert_eq!(ctx.state.tuple_count(), 2);
    }

    #[test]
    fn no_inprogress_file_is_left_behind() {
        let (mem, dir) = data_dir();
        SnapshotWriter::write(&dir, &sample_state(), Lsn::new(3), Uuid::nil()).unwrap();
        assert_eq!(mem.list().unwrap(), vec!["00000000000000000003.snap".to_string()]);
    }

    #[test]
    fn damaged_newest_snapshot_falls_back() {
        let (mem, dir) = data_dir();
        SnapshotWriter::write(&dir, &EngineState::new(), Lsn::ZERO, Uuid::nil()).unwrap();
        SnapshotWriter::write(&dir, &sample_state(), Lsn::new(5), Uuid::nil()).unwrap();

        // Without its end-of-file marker the snapshot is not trusted.
        let backend = mem.backend("00000000000000000005.snap").unwrap();
        let data = backend.data();
        backend.set_data(data[..data.len() - 4].to_vec());

        let ctx = loader(true).load_latest(&dir, &dir.scan().unwrap().snapshots).unwrap();
        assert_eq!(ctx.base_lsn, Lsn::ZERO);
        assert_eq!(ctx.state, EngineState::new());
    }

    #[test]
    fn unreadable_snapshot_is_an_error_not_a_fallback() {
        let (mem, dir) = data_dir();
        SnapshotWriter::write(&dir, &EngineState::new(), Lsn::ZERO, Uuid::nil()).unwrap();
        SnapshotWriter::write(&dir, &sample_state(), Lsn::new(5), Uuid::nil()).unwrap();

        let unreadable = Unreadable {
            inner: mem,
            name: format_file_name(Lsn::new(5), FileKind::Snapshot),
        };
        let dir = DataDir::with_directory(Arc::new(unreadable)).unwrap();
        let err = loader(false)
            .load_latest(&dir, &dir.scan().unwrap().snapshots)
            .unwrap_err();
        match err {
            CoreError::Storage(StorageError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected the storage error, got {other:?}"),
        }
    }

    #[test]
    fn no_usable_snapshot() {
        let (mem, dir) = data_dir();
        let err = loader(true).load_latest(&dir, &[]).unwrap_err();
        assert!(matches!(err, CoreError::NoSnapshot { .. }));

        mem.put("00000000000000000002.snap", b"TLOG".to_vec());
        let err = loader(true).load_latest(&dir, &[Lsn::new(2)]).unwrap_err();
        assert!(matches!(err, CoreError::NoSnapshot { .. }));
    }

    #[test]
    fn duplicate_rows_follow_policy() {
        let (mem, dir) = data_dir();
        let lsn = Lsn::new(4);
        let header = FileHeader::new(FileKind::Snapshot, lsn, Uuid::nil());
        let mut writer = FileWriter::create(&mem, "00000000000000000004.snap", &header, false).unwrap();
        let rows = [
            Op::CreateSpace {
                space_id: SPACE,
                name: "test".into(),
                indexes: vec![IndexDef::primary(vec![0])],
            },
            Op::Insert { space_id: SPACE, tuple: tuple![1, "a"] },
            Op::Insert { space_id: SPACE, tuple: tuple![1, "b"] },
        ];
        for op in rows {
            writer.append(&LogRecord::new(lsn, op)).unwrap();
        }
        writer.finish().unwrap();

        let err = loader(true).load_latest(&dir, &[lsn]).unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::DuplicateKey));

        let ctx = loader(false).load_latest(&dir, &[lsn]).unwrap();
        assert_eq!(ctx.state.get_tuple(SPACE, &tuple![1]), Some(&tuple![1, "a"]));
        assert_eq!(ctx.diagnostics.len(), 1);
    }

    #[test]
    fn log_rows_are_not_allowed_in_snapshots() {
        let (mem, dir) = data_dir();
        let lsn = Lsn::new(1);
        let header = FileHeader::new(FileKind::Snapshot, lsn, Uuid::nil());
        let mut writer = FileWriter::create(&mem, "00000000000000000001.snap", &header, false).unwrap();
        writer.append(&LogRecord::new(lsn, Op::Nop)).unwrap();
        writer.finish().unwrap();

        let err = loader(false).load(&dir, lsn).unwrap_err();
        assert!(matches!(err, CoreError::CorruptSegment { .. }));
    }
}
