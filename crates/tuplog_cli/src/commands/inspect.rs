//! Inspect command implementation.

use crate::Format;
use serde::Serialize;
use std::path::Path;
use tuplog_core::wal::SegmentReader;
use tuplog_core::{format_file_name, DataDir, FileKind, Lsn};

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Snapshots, oldest first.
    pub snapshots: Vec<FileInfo>,
    /// Segments, oldest first.
    pub segments: Vec<FileInfo>,
    /// Files with a known extension but an invalid name.
    pub invalid: Vec<String>,
    /// Total size of snapshots and segments in bytes.
    pub total_size: u64,
}

/// Summary of one snapshot or segment.
#[derive(Debug, Serialize)]
pub struct FileInfo {
    /// File name.
    pub name: String,
    /// LSN from the file name.
    pub lsn: u64,
    /// Size in bytes.
    pub size: u64,
    /// Instance from the header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Records read before the end or the first error.
    pub records: u64,
    /// LSN of the last record read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_lsn: Option<u64>,
    /// Whether the file ends with the end-of-file marker.
    pub closed: bool,
    /// Whether the file ends in an incomplete record.
    pub truncated: bool,
    /// Error that stopped reading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let dir = DataDir::open_read_only(path).map_err(|e| e.to_string())?;
    let listing = dir.scan()?;
    if listing.is_empty() {
        return Err(format!("No data directory found at {}", path.display()).into());
    }

    let snapshots = listing
        .snapshots
        .iter()
        .map(|&lsn| describe(&dir, lsn, FileKind::Snapshot))
        .collect::<Result<Vec<_>, _>>()?;
    let segments = listing
        .segments
        .iter()
        .map(|&lsn| describe(&dir, lsn, FileKind::Segment))
        .collect::<Result<Vec<_>, _>>()?;
    let total_size = snapshots.iter().chain(&segments).map(|f| f.size).sum();

    let result = InspectResult {
        path: path.display().to_string(),
        snapshots,
        segments,
        invalid: listing.invalid,
        total_size,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Reads a whole file, recording the first error instead of failing.
pub fn describe(dir: &DataDir, lsn: Lsn, kind: FileKind) -> Result<FileInfo, Box<dyn std::error::Error>> {
    let name = format_file_name(lsn, kind);
    let backend = dir.open_file(lsn, kind)?;
    let size = backend.size()?;

    let mut info = FileInfo {
        name: name.clone(),
        lsn: lsn.as_u64(),
        size,
        instance: None,
        records: 0,
        last_lsn: None,
        closed: false,
        truncated: false,
        error: None,
    };

    let mut reader = match SegmentReader::open(backend, name, kind, Some(lsn)) {
        Ok(reader) => reader,
        Err(e) => {
            info.error = Some(e.to_string());
            return Ok(info);
        }
    };
    info.instance = reader.header().map(|h| h.instance.to_string());

    for item in reader.by_ref() {
        match item {
            Ok((_, record)) => info.last_lsn = Some(record.lsn.as_u64()),
            Err(e) => {
                info.error = Some(e.to_string());
                break;
            }
        }
    }
    info.records = reader.records_read();
    info.closed = reader.has_eof_marker();
    info.truncated = reader.truncated_tail();
    Ok(info)
}

fn print_text_output(result: &InspectResult) {
    println!("tuplog Data Directory Inspection");
    println!("================================");
    println!();
    println!("Path: {}", result.path);
    println!("Total size: {}", format_size(result.total_size));

    for (title, files) in [("Snapshots", &result.snapshots), ("Segments", &result.segments)] {
        println!();
        println!("{title}:");
        for file in files {
            let state = match (&file.error, file.truncated, file.closed) {
                (Some(_), _, _) => "CORRUPT",
                (None, true, _) => "truncated",
                (None, false, true) => "closed",
                (None, false, false) => "open",
            };
            print!(
                "  {} {:>10} {:>8} records  {:9}",
                file.name,
                format_size(file.size),
                file.records,
                state
            );
            if let Some(last) = file.last_lsn {
                print!(" last lsn {last}");
            }
            println!();
            if let Some(error) = &file.error {
                println!("    ERROR: {error}");
            }
        }
    }

    if !result.invalid.is_empty() {
        println!();
        println!("Ignored files with invalid names:");
        for name in &result.invalid {
            println!("  {name}");
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
