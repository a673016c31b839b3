//! Recover command implementation.

use crate::Format;
use serde::Serialize;
use std::path::Path;
use tuplog_core::{Config, ConflictDiagnostic, Engine, RecoveryReport, SpaceStats};

/// Recovery outcome.
#[derive(Debug, Serialize)]
pub struct RecoverResult {
    /// Data directory path.
    pub path: String,
    /// Whether duplicate keys were skipped and gaps tolerated.
    pub force_recovery: bool,
    /// Snapshot recovery started from.
    pub snapshot: Option<String>,
    /// Rows loaded from the snapshot.
    pub snapshot_rows: u64,
    /// Snapshot LSN.
    pub base_lsn: u64,
    /// Last LSN recovered.
    pub last_lsn: u64,
    /// Segments read.
    pub segments_replayed: usize,
    /// Log records applied.
    pub records_applied: u64,
    /// Records that were skipped.
    pub skipped: Vec<ConflictRecord>,
    /// Missing LSN ranges recovery continued past.
    pub gaps: Vec<ConflictRecord>,
    /// Segments that ended in an incomplete record.
    pub truncated_segments: Vec<String>,
    /// Recovered spaces.
    pub spaces: Vec<SpaceInfo>,
}

/// A conflict recovery got past.
#[derive(Debug, Serialize)]
pub struct ConflictRecord {
    /// LSN of the record.
    pub lsn: u64,
    /// Conflict classification.
    pub conflict: String,
    /// Target space.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space: Option<u32>,
    /// Conflicting key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Logged message.
    pub message: String,
}

/// A recovered space.
#[derive(Debug, Serialize)]
pub struct SpaceInfo {
    /// Space ID.
    pub id: u32,
    /// Space name.
    pub name: String,
    /// Number of tuples.
    pub tuples: usize,
}

impl RecoverResult {
    fn new(path: &Path, force_recovery: bool, report: &RecoveryReport, spaces: Vec<SpaceStats>) -> Self {
        Self {
            path: path.display().to_string(),
            force_recovery,
            snapshot: report.snapshot.clone(),
            snapshot_rows: report.snapshot_rows,
            base_lsn: report.base_lsn.as_u64(),
            last_lsn: report.last_lsn.as_u64(),
            segments_replayed: report.segments_replayed,
            records_applied: report.records_applied,
            skipped: report.records_skipped.iter().map(ConflictRecord::from).collect(),
            gaps: report.gaps.iter().map(ConflictRecord::from).collect(),
            truncated_segments: report.truncated_segments.clone(),
            spaces: spaces
                .into_iter()
                .map(|s| SpaceInfo {
                    id: s.id.as_u32(),
                    name: s.name,
                    tuples: s.tuples,
                })
                .collect(),
        }
    }
}

impl From<&ConflictDiagnostic> for ConflictRecord {
    fn from(d: &ConflictDiagnostic) -> Self {
        Self {
            lsn: d.lsn.as_u64(),
            conflict: d.kind.as_str().to_string(),
            space: d.space_id.map(|id| id.as_u32()),
            key: d.key.as_ref().map(ToString::to_string),
            message: d.message.clone(),
        }
    }
}

/// Runs the recover command.
///
/// Any recovery failure is returned as an error, which makes the process
/// exit with a non-zero status.
pub fn run(path: &Path, force_recovery: bool, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default()
        .create_if_missing(false)
        .strict_on_conflict(!force_recovery);
    let engine = Engine::open(path, config).map_err(|e| e.to_string())?;

    let result = RecoverResult::new(path, force_recovery, engine.recovery_report(), engine.spaces());
    engine.close().map_err(|e| e.to_string())?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &RecoverResult) {
    println!("tuplog Recovery");
    println!("===============");
    println!();
    println!("Path: {}", result.path);
    println!(
        "Policy: {}",
        if result.force_recovery { "force recovery" } else { "strict" }
    );
    println!();
    println!("Snapshot:");
    println!("  File:  {}", result.snapshot.as_deref().unwrap_or("-"));
    println!("  LSN:   {}", result.base_lsn);
    println!("  Rows:  {}", result.snapshot_rows);
    println!();
    println!("Log:");
    println!("  Segments replayed: {}", result.segments_replayed);
    println!("  Records applied:   {}", result.records_applied);
    println!("  Records skipped:   {}", result.skipped.len());
    println!("  LSN gaps:          {}", result.gaps.len());
    println!("  Last LSN:          {}", result.last_lsn);

    if !result.skipped.is_empty() {
        println!();
        println!("Skipped:");
        for record in &result.skipped {
            println!("  [lsn {}] {}", record.lsn, record.message);
        }
    }

    if !result.gaps.is_empty() {
        println!();
        println!("Gaps:");
        for gap in &result.gaps {
            println!("  [lsn {}] {}", gap.lsn, gap.message);
        }
    }

    if !result.truncated_segments.is_empty() {
        println!();
        println!("Truncated segments:");
        for segment in &result.truncated_segments {
            println!("  {segment}");
        }
    }

    println!();
    println!("Spaces:");
    for space in &result.spaces {
        println!("  [{}] {}: {} tuples", space.id, space.name, space.tuples);
    }
}
