//! Dump command implementation.

use crate::Format;
use serde::Serialize;
use std::path::Path;
use tuplog_codec::Tuple;
use tuplog_core::wal::{LogRecord, Op, SegmentReader};
use tuplog_core::{parse_file_name, DataDir};

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the file.
    pub offset: u64,
    /// Record LSN.
    pub lsn: u64,
    /// Record type.
    pub record_type: String,
    /// Target space (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_id: Option<u32>,
    /// Space name (create_space only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tuple or key (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuple: Option<Tuple>,
}

impl RecordInfo {
    fn new(offset: u64, record: LogRecord) -> Self {
        let record_type = record.op.record_type().name().to_string();
        let space_id = record.op.space_id().map(|id| id.as_u32());
        let (name, tuple) = match record.op {
            Op::CreateSpace { name, .. } => (Some(name), None),
            Op::Insert { tuple, .. } | Op::Replace { tuple, .. } => (None, Some(tuple)),
            Op::Delete { key, .. } => (None, Some(key)),
            Op::Nop => (None, None),
        };
        Self {
            offset,
            lsn: record.lsn.as_u64(),
            record_type,
            space_id,
            name,
            tuple,
        }
    }
}

/// Runs the dump command.
///
/// Records up to the first error are printed before the error is returned.
pub fn run(
    path: &Path,
    file: &str,
    limit: Option<usize>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some((lsn, kind)) = parse_file_name(file)? else {
        return Err(format!("{file} is not a snapshot or segment").into());
    };

    let dir = DataDir::open_read_only(path).map_err(|e| e.to_string())?;
    let mut reader = SegmentReader::open(dir.open_file(lsn, kind)?, file, kind, Some(lsn))
        .map_err(|e| e.to_string())?;

    let mut records = Vec::new();
    let mut failure = None;
    for item in reader.by_ref().take(limit.unwrap_or(usize::MAX)) {
        match item {
            Ok((offset, record)) => records.push(RecordInfo::new(offset, record)),
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        }
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => print_text_output(file, &records, reader.truncated_tail()),
    }

    match failure {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn print_text_output(file: &str, records: &[RecordInfo], truncated: bool) {
    println!("{file} ({} records)", records.len());
    println!("================");
    println!();

    for record in records {
        print!("[{:08}] lsn={} {:12}", record.offset, record.lsn, record.record_type);
        if let Some(space) = record.space_id {
            print!(" space={space}");
        }
        if let Some(name) = &record.name {
            print!(" name='{name}'");
        }
        if let Some(tuple) = &record.tuple {
            print!(" {tuple}");
        }
        println!();
    }

    if truncated {
        println!();
        println!("(file ends in an incomplete record)");
    }
}
