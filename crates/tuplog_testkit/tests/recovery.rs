//! End-to-end recovery tests over real data directories.

use proptest::prelude::*;
use std::fs;
use tuplog_codec::tuple;
use tuplog_core::{ConflictKind, CoreError, Lsn};
use tuplog_testkit::crash::CrashableDirectory;
use tuplog_testkit::prelude::*;

#[test]
fn duplicate_keys_are_skipped_under_force_recovery() {
    let dir = TestDir::new();
    duplicate_key_scenario(&dir);

    let (engine, logs) = capture_logs(|| dir.try_open(permissive_config()));
    let engine = engine.unwrap();
    let test = space(&engine, SCENARIO_SPACE);

    assert_eq!(count_lines(&logs, "Duplicate key"), 2);
    assert_eq!(engine.get(test, &tuple![1]).unwrap(), Some(tuple![1, "first tuple"]));
    assert_eq!(engine.get(test, &tuple![2]).unwrap(), Some(tuple![2, "second tuple"]));
    assert_eq!(engine.len(test).unwrap(), 2);

    let report = engine.recovery_report();
    assert_eq!(report.skipped(ConflictKind::DuplicateKey), 2);
    let lsns: Vec<_> = report.records_skipped.iter().map(|d| d.lsn).collect();
    assert_eq!(lsns, vec![Lsn::new(4), Lsn::new(5)]);
    assert_eq!(report.last_lsn, Lsn::new(5));

    // Skipped LSNs stay consumed.
    assert_eq!(engine.insert(test, tuple![9]).unwrap(), Lsn::new(6));
}

#[test]
fn duplicate_keys_abort_strict_recovery() {
    let dir = TestDir::new();
    duplicate_key_scenario(&dir);

    match dir.try_open(strict_config()) {
        Err(CoreError::RecoveryAborted { lsn, kind, .. }) => {
            assert_eq!(lsn, Lsn::new(4));
            assert_eq!(kind, ConflictKind::DuplicateKey);
        }
        other => panic!("expected recovery to abort, got {other:?}"),
    }
}

#[test]
fn strict_failure_leaves_directory_recoverable() {
    let dir = TestDir::new();
    duplicate_key_scenario(&dir);
    let before = dir.file_names();

    assert!(dir.try_open(strict_config()).is_err());
    assert_eq!(dir.file_names(), before);
    assert!(dir.try_open(permissive_config()).is_ok());
}

#[test]
fn missing_segment_is_a_gap() {
    let dir = TestDir::new();
    missing_segment_scenario(&dir);

    match dir.try_open(strict_config()) {
        Err(CoreError::RecoveryAborted { lsn, kind, .. }) => {
            assert_eq!(lsn, Lsn::new(5));
            assert_eq!(kind, ConflictKind::LsnGap);
        }
        other => panic!("expected recovery to abort, got {other:?}"),
    }

    let (engine, logs) = capture_logs(|| dir.try_open(permissive_config()));
    let engine = engine.unwrap();
    let test = space(&engine, SCENARIO_SPACE);
    assert_eq!(count_lines(&logs, "applying row: Missing log records between LSN 3 and 4"), 1);
    assert_eq!(count_lines(&logs, "skipping row"), 0);

    let report = engine.recovery_report();
    assert_eq!(report.skipped(ConflictKind::LsnGap), 0);
    assert!(report.records_skipped.is_empty());
    let gaps: Vec<_> = report.gaps.iter().map(|d| d.lsn).collect();
    assert_eq!(gaps, vec![Lsn::new(5)]);

    let keys: Vec<_> = engine.tuples(test).unwrap();
    assert_eq!(keys, vec![tuple![1], tuple![4], tuple![5]]);
    assert_eq!(engine.lsn(), Lsn::new(6));
}

#[test]
fn torn_tail_recovers_preceding_records() {
    let dir = TestDir::new();
    {
        let engine = dir.open();
        let test = create_test_space(&engine, "test");
        insert_all(&engine, test, [tuple![1, "a"], tuple![2, "b"]]);
    }
    truncate_tail(&dir.segment_path(1), 7).unwrap();

    let engine = dir.open();
    let test = space(&engine, "test");
    assert_eq!(engine.len(test).unwrap(), 1);
    assert_eq!(engine.lsn(), Lsn::new(2));
    assert_eq!(engine.recovery_report().truncated_segments.len(), 1);
    assert!(!engine.recovery_report().is_clean());
}

#[test]
fn corruption_is_fatal_even_when_forced() {
    let dir = TestDir::new();
    {
        let engine = dir.open();
        let test = create_test_space(&engine, "test");
        insert_all(&engine, test, [tuple![1, "a"], tuple![2, "b"]]);
    }
    let segment = dir.segment_path(1);
    let offsets = record_offsets(&segment).unwrap();
    corrupt_record(&segment, offsets[1]).unwrap();

    assert!(matches!(
        dir.try_open(permissive_config()),
        Err(CoreError::CorruptSegment { .. })
    ));
}

#[test]
fn damaged_record_length_is_not_a_torn_tail() {
    let dir = TestDir::new();
    {
        let engine = dir.open();
        create_test_space(&engine, "test");
    }
    {
        let engine = dir.open();
        let test = space(&engine, "test");
        insert_all(&engine, test, [tuple![1], tuple![2], tuple![3]]);
    }
    let segment = dir.segment_path(2);
    let offsets = record_offsets(&segment).unwrap();
    corrupt_record_length(&segment, offsets[0]).unwrap();
    let before = dir.file_names();
    let damaged = fs::read(&segment).unwrap();

    for config in [strict_config(), permissive_config()] {
        match dir.try_open(config) {
            Err(CoreError::CorruptSegment { offset, .. }) => assert_eq!(offset, offsets[0]),
            other => panic!("expected corruption, got {other:?}"),
        }
    }
    assert_eq!(dir.file_names(), before);
    assert_eq!(fs::read(&segment).unwrap(), damaged);
}

#[test]
fn damaged_snapshot_falls_back_to_older_one() {
    let dir = TestDir::new();
    {
        let engine = dir.open();
        let test = create_test_space(&engine, "test");
        insert_all(&engine, test, [tuple![1]]);
        assert_eq!(engine.snapshot().unwrap(), Lsn::new(2));
        insert_all(&engine, test, [tuple![2]]);
    }
    let snapshot = dir.snapshot_path(2);
    let offsets = record_offsets(&snapshot).unwrap();
    corrupt_record(&snapshot, offsets[0]).unwrap();

    let engine = dir.open();
    let test = space(&engine, "test");
    assert_eq!(engine.recovery_report().base_lsn, Lsn::ZERO);
    assert_eq!(engine.tuples(test).unwrap(), vec![tuple![1], tuple![2]]);
}

#[test]
fn no_snapshot_is_an_error() {
    let dir = TestDir::new();
    {
        let engine = dir.open();
        create_test_space(&engine, "test");
    }
    fs::remove_file(dir.snapshot_path(0)).unwrap();

    assert!(matches!(
        dir.try_open(strict_config()),
        Err(CoreError::NoSnapshot { .. })
    ));
}

#[test]
fn segment_from_another_instance_is_rejected() {
    let ours = TestDir::new();
    {
        let engine = ours.open();
        create_test_space(&engine, "test");
    }
    let theirs = TestDir::new();
    {
        let engine = theirs.open();
        create_test_space(&engine, "test");
    }
    {
        let engine = theirs.open();
        let test = space(&engine, "test");
        insert_all(&engine, test, [tuple![1]]);
    }
    fs::copy(theirs.segment_path(2), ours.segment_path(2)).unwrap();

    assert!(matches!(
        ours.try_open(permissive_config()),
        Err(CoreError::InstanceMismatch { .. })
    ));
}

#[test]
fn swapped_segments_are_corrupt() {
    let dir = TestDir::new();
    {
        let engine = dir.open();
        create_test_space(&engine, "test");
    }
    {
        let engine = dir.open();
        let test = space(&engine, "test");
        insert_all(&engine, test, [tuple![1]]);
    }
    swap_files(&dir.segment_path(1), &dir.segment_path(2)).unwrap();

    assert!(matches!(
        dir.try_open(permissive_config()),
        Err(CoreError::CorruptSegment { .. })
    ));
}

#[test]
fn crash_during_snapshot_keeps_previous_state() {
    let dir = CrashableDirectory::new();
    {
        let engine = tuplog_core::Engine::open_in(dir.shared(), strict_config()).unwrap();
        let test = create_test_space(&engine, "test");
        insert_all(&engine, test, [tuple![1], tuple![2]]);
        dir.crash_after(40);
        assert!(engine.snapshot().is_err());
    }

    let engine = MemoryDir { directory: dir.inner() }.open();
    let test = space(&engine, "test");
    assert_eq!(engine.recovery_report().base_lsn, Lsn::ZERO);
    assert_eq!(engine.len(test).unwrap(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn replay_is_deterministic(ops in ops_strategy(64), rows in 1u64..5) {
        let small = MemoryDir::new();
        let large = MemoryDir::new();
        let mut live = Vec::new();

        for (dir, rows_per_segment) in [(&small, rows), (&large, 1_000)] {
            let engine = dir.try_open(strict_config().rows_per_segment(rows_per_segment)).unwrap();
            let test = create_test_space(&engine, "test");
            for op in &ops {
                let _ = op.apply(&engine, test);
            }
            live.push((engine.lsn(), engine.tuples(test).unwrap()));
        }
        prop_assert_eq!(&live[0], &live[1]);

        for dir in [&small, &large] {
            let engine = dir.open();
            let test = space(&engine, "test");
            prop_assert!(engine.recovery_report().is_clean());
            prop_assert_eq!(&(engine.lsn(), engine.tuples(test).unwrap()), &live[0]);
        }
    }
}
