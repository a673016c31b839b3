//! Recovery: rebuilding state from a snapshot and the log.
//!
//! Recovery runs in two steps. The [`SnapshotLoader`](crate::SnapshotLoader)
//! turns the newest usable snapshot into a [`RecoveryContext`]; the
//! [`ReplayEngine`] then applies every later log record to it. Records
//! that do not apply are classified as a [`ConflictKind`] and handed to
//! the [`ConflictPolicy`], which either aborts recovery or logs the
//! conflict and skips the record.
//!
//! Corruption is not a conflict. A damaged segment stops recovery no
//! matter which policy is configured.

mod context;
mod policy;
mod replay;

pub use context::{RecoveryContext, RecoveryReport};
pub use policy::{ConflictDiagnostic, ConflictKind, ConflictPolicy, Resolution};
pub use replay::ReplayEngine;
