//! Data directories in the states operators find after a bad day.
//!
//! Each builder drives real engines through restarts and then tampers
//! with the files, leaving the directory ready for the final open.

use crate::fixtures::{create_test_space, insert_all, space, strict_config, TestDir};
use crate::tamper::{archive, restore};
use std::fs;
use tuplog_codec::tuple;

/// Name of the space every scenario creates.
pub const SCENARIO_SPACE: &str = "test";

/// Two histories of the same LSNs, restored side by side.
///
/// 1. Space created at LSN 1, snapshot taken at LSN 1.
/// 2. `[1, "first tuple"]` and `[2, "second tuple"]` written at LSNs 2 and 3, and
///    their segment moved aside.
/// 3. After a restart `[3, "third tuple"]` and `[4, "fourth tuple"]` reuse LSNs 2
///    and 3.
/// 4. After another restart `[1, "third tuple"]` and `[2, "fourth tuple"]` are written
///    at LSNs 4 and 5.
/// 5. The segment from step 2 is put back over the one from step 3.
///
/// Replaying this directory inserts keys 1 and 2 twice: once from the
/// restored segment and once from the segment at LSN 4.
pub fn duplicate_key_scenario(dir: &TestDir) {
    {
        let engine = dir.open();
        create_test_space(&engine, SCENARIO_SPACE);
        engine.snapshot().expect("Failed to take snapshot");
    }
    {
        let engine = dir.open();
        let test = space(&engine, SCENARIO_SPACE);
        insert_all(&engine, test, [tuple![1, "first tuple"], tuple![2, "second tuple"]]);
    }
    let archived = archive(&dir.segment_path(2)).expect("Failed to archive segment");
    {
        let engine = dir.open();
        let test = space(&engine, SCENARIO_SPACE);
        insert_all(&engine, test, [tuple![3, "third tuple"], tuple![4, "fourth tuple"]]);
    }
    {
        let engine = dir.open();
        let test = space(&engine, SCENARIO_SPACE);
        insert_all(&engine, test, [tuple![1, "third tuple"], tuple![2, "fourth tuple"]]);
    }
    restore(&archived, &dir.segment_path(2)).expect("Failed to restore segment");
}

/// A directory whose middle segment has been deleted.
///
/// Keys 1 to 5 are written at LSNs 2 to 6 with two records per segment,
/// then the segment holding LSNs 3 and 4 (keys 2 and 3) is removed.
pub fn missing_segment_scenario(dir: &TestDir) {
    {
        let engine = dir
            .try_open(strict_config().rows_per_segment(2))
            .expect("Failed to open engine");
        let test = create_test_space(&engine, SCENARIO_SPACE);
        insert_all(&engine, test, (1..=5).map(|key: i64| tuple![key]));
    }
    fs::remove_file(dir.segment_path(3)).expect("Failed to remove segment");
}
