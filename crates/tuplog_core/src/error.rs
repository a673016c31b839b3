//! Error types for tuplog core.

use crate::recovery::ConflictKind;
use crate::types::Lsn;
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in tuplog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tuplog_storage::StorageError),

    /// Tuple codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tuplog_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data directory has no usable snapshot.
    #[error("can't find snapshot in {dir}")]
    NoSnapshot {
        /// Location of the data directory.
        dir: String,
    },

    /// A segment or snapshot is damaged somewhere other than its tail.
    #[error("corrupt file {file} at offset {offset}: {reason}")]
    CorruptSegment {
        /// Location of the damaged file.
        file: String,
        /// Byte offset of the damaged record.
        offset: u64,
        /// What was wrong.
        reason: String,
    },

    /// A file has a known extension but an unparsable name.
    #[error("invalid file name: {name}")]
    InvalidFilename {
        /// The offending file name.
        name: String,
    },

    /// A segment was written by a different instance.
    #[error("file {file} belongs to instance {found}, expected {expected}")]
    InstanceMismatch {
        /// Location of the file.
        file: String,
        /// Instance recorded in the snapshot.
        expected: Uuid,
        /// Instance recorded in the file header.
        found: Uuid,
    },

    /// An operation conflicts with the current state.
    #[error("{message}")]
    ApplyConflict {
        /// Classification of the conflict.
        kind: ConflictKind,
        /// LSN of the record, or the LSN a live operation would have taken.
        lsn: Lsn,
        /// Human-readable description.
        message: String,
    },

    /// Recovery stopped on a conflict the policy refused to skip.
    #[error("recovery aborted at lsn {lsn}: {message}")]
    RecoveryAborted {
        /// LSN of the conflicting record.
        lsn: Lsn,
        /// Classification of the conflict.
        kind: ConflictKind,
        /// Human-readable description.
        message: String,
    },

    /// Another process holds the data directory lock.
    #[error("data directory locked: another process has exclusive access")]
    DataDirLocked,

    /// Space not found.
    #[error("space not found: {name}")]
    SpaceNotFound {
        /// Name or id of the space.
        name: String,
    },

    /// An argument was rejected before anything was written.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The engine has been closed.
    #[error("engine is closed")]
    EngineClosed,
}

impl CoreError {
    /// Creates a corrupt segment error.
    pub fn corrupt(file: impl Into<String>, offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptSegment {
            file: file.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a space not found error.
    pub fn space_not_found(name: impl Into<String>) -> Self {
        Self::SpaceNotFound { name: name.into() }
    }

    /// Returns true for errors that prevent an engine from starting.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoSnapshot { .. }
                | Self::CorruptSegment { .. }
                | Self::InstanceMismatch { .. }
                | Self::RecoveryAborted { .. }
                | Self::DataDirLocked
                | Self::Storage(_)
                | Self::Io(_)
        )
    }

    /// Returns the conflict classification, if this error carries one.
    #[must_use]
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Self::ApplyConflict { kind, .. } | Self::RecoveryAborted { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
