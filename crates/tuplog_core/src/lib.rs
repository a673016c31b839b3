//! # tuplog core
//!
//! Write-ahead logging and crash recovery for an in-memory tuple store.
//!
//! This crate provides:
//! - Segment and snapshot naming, enumeration and directory locking
//! - The log record format and a streaming segment reader
//! - LSN allocation and the rotating log writer
//! - Snapshot loading and writing
//! - Replay with a configurable conflict policy
//! - The [`Engine`] facade tying recovery and live writes together
//!
//! ## Recovery in short
//!
//! ```text
//! newest valid .snap ──► RecoveryContext ──► replay .xlog segments ──► Engine
//!                                               │
//!                                   conflict? ──┴─► ConflictPolicy: Abort | Skip | Continue
//! ```
//!
//! The policy defaults to strict: any conflict fails startup. With
//! `Config::strict_on_conflict(false)`, duplicate keys are logged with
//! `warn!` and skipped, so the tuple applied first wins. LSN gaps are
//! logged and replay continues with the record after the gap.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
pub mod recovery;
mod snapshot;
pub mod space;
mod types;
pub mod wal;

pub use config::Config;
pub use dir::{format_file_name, parse_file_name, DataDir, DirListing, FileKind, INPROGRESS_SUFFIX};
pub use engine::{Engine, SpaceStats};
pub use error::{CoreError, CoreResult};
pub use recovery::{
    ConflictDiagnostic, ConflictKind, ConflictPolicy, RecoveryContext, RecoveryReport,
    ReplayEngine, Resolution,
};
pub use snapshot::{SnapshotLoader, SnapshotWriter};
pub use space::{ApplyError, EngineState, IndexDef, KeyDef};
pub use types::{Lsn, SpaceId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
