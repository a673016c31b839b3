//! Verify command implementation.

use super::inspect::{describe, FileInfo};
use std::path::Path;
use tuplog_core::{Config, DataDir, FileKind, ReplayEngine, SnapshotLoader};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of files checked.
    pub files_checked: usize,
    /// Number of records read.
    pub records_checked: u64,
    /// Files ending in an incomplete record.
    pub truncated: Vec<String>,
    /// Errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn add(&mut self, info: &FileInfo) {
        self.files_checked += 1;
        self.records_checked += info.records;
        if info.truncated {
            self.truncated.push(info.name.clone());
        }
        if let Some(error) = &info.error {
            self.errors.push(error.clone());
        }
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
///
/// Nothing in the data directory is locked, created or removed.
pub fn run(path: &Path, force_recovery: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying data directory at {}", path.display());
    println!();

    let dir = DataDir::open_read_only(path).map_err(|e| e.to_string())?;
    let listing = dir.scan()?;
    let mut result = VerifyResult::default();

    println!("Checking files...");
    for &lsn in &listing.snapshots {
        result.add(&describe(&dir, lsn, FileKind::Snapshot)?);
    }
    for &lsn in &listing.segments {
        result.add(&describe(&dir, lsn, FileKind::Segment)?);
    }
    println!(
        "  {} files, {} records, {} truncated, {} errors",
        result.files_checked,
        result.records_checked,
        result.truncated.len(),
        result.errors.len()
    );
    for name in &result.truncated {
        println!("    WARNING: {name} ends in an incomplete record");
    }
    for error in &result.errors {
        println!("    ERROR: {error}");
    }

    println!("Dry-running recovery...");
    let config = Config::default().strict_on_conflict(!force_recovery);
    let recovered = SnapshotLoader::new(&config)
        .load_latest(&dir, &listing.snapshots)
        .and_then(|ctx| ReplayEngine::new(&config).replay(&dir, ctx, &listing.segments));
    match recovered {
        Ok((state, report)) => {
            println!(
                "  recovered to lsn {} ({} spaces, {} tuples, {} skipped, {} gaps)",
                report.last_lsn,
                state.spaces().count(),
                state.tuple_count(),
                report.records_skipped.len(),
                report.gaps.len()
            );
        }
        Err(e) => {
            println!("    ERROR: {e}");
            result.errors.push(e.to_string());
        }
    }

    println!();
    if result.is_ok() {
        println!("✓ Data directory verification passed");
        Ok(())
    } else {
        println!("✗ Data directory verification failed");
        Err("Verification failed".into())
    }
}
