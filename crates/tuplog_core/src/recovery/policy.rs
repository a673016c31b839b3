//! Conflict classification and the abort-or-skip decision.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::space::ApplyError;
use crate::types::{Lsn, SpaceId};
use std::fmt;
use tracing::warn;
use tuplog_codec::Tuple;

/// Why a record could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// A unique index already holds the record's key.
    DuplicateKey,
    /// The record's LSN skips over LSNs that were never replayed.
    LsnGap,
    /// A delete names a key that does not exist.
    MissingKey,
    /// The record targets a space that does not exist.
    UnknownSpace,
    /// The record creates a space whose ID or name is taken.
    SpaceExists,
    /// The tuple lacks a field some index needs.
    InvalidTuple,
}

impl ConflictKind {
    /// Stable classification string, used as the `conflict` log field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateKey => "Duplicate key exists in unique index",
            Self::LsnGap => "Missing log records",
            Self::MissingKey => "Key not found",
            Self::UnknownSpace => "Space does not exist",
            Self::SpaceExists => "Space already exists",
            Self::InvalidTuple => "Tuple does not match space format",
        }
    }

    /// Returns true for conflicts the permissive policy lets recovery get
    /// past.
    #[must_use]
    pub const fn is_tolerable(self) -> bool {
        matches!(self, Self::DuplicateKey | Self::LsnGap)
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What recovery does about a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Stop recovery with an error.
    Abort,
    /// Log a diagnostic, discard the record and continue.
    Skip,
    /// Log a diagnostic and apply the record anyway.
    Continue,
}

impl Resolution {
    /// What recovery does with the record, used as the log line prefix.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Abort => "aborting recovery",
            Self::Skip => "skipping row",
            Self::Continue => "applying row",
        }
    }
}

/// A conflict that recovery got past.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDiagnostic {
    /// Classification.
    pub kind: ConflictKind,
    /// Whether the record was skipped or applied.
    pub resolution: Resolution,
    /// LSN of the record.
    pub lsn: Lsn,
    /// Space the record targeted.
    pub space_id: Option<SpaceId>,
    /// Conflicting key.
    pub key: Option<Tuple>,
    /// The logged message.
    pub message: String,
}

/// Decides what recovery does about each conflict.
///
/// | Conflict | strict | permissive |
/// |----------|--------|------------|
/// | `DuplicateKey` | Abort | Skip |
/// | `LsnGap` | Abort | Continue |
/// | everything else | Abort | Abort |
///
/// Corruption never reaches the policy: it is always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    strict: bool,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConflictPolicy {
    /// Creates a policy. `strict` aborts on every conflict.
    #[must_use]
    pub const fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Creates the policy configured by `config.strict_on_conflict`.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.strict_on_conflict)
    }

    /// Returns true if every conflict aborts.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Decides what to do about a conflict of `kind`.
    #[must_use]
    pub const fn resolve(&self, kind: ConflictKind) -> Resolution {
        match kind {
            _ if self.strict || !kind.is_tolerable() => Resolution::Abort,
            ConflictKind::LsnGap => Resolution::Continue,
            _ => Resolution::Skip,
        }
    }

    /// Applies the decision for `error`, raised by the record at `lsn`.
    ///
    /// Otherwise exactly one `warn!` line, prefixed with the
    /// [`Resolution::action`], is emitted and the diagnostic is returned
    /// for the recovery report.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecoveryAborted`] on [`Resolution::Abort`].
    pub fn handle(&self, error: ApplyError, lsn: Lsn) -> CoreResult<ConflictDiagnostic> {
        match self.resolve(error.kind) {
            Resolution::Abort => Err(CoreError::RecoveryAborted {
                lsn,
                kind: error.kind,
                message: error.message,
            }),
            resolution @ (Resolution::Skip | Resolution::Continue) => {
                let space = error.space_id.map(|id| id.as_u32());
                let key = error.key.as_ref().map(ToString::to_string);
                warn!(
                    lsn = lsn.as_u64(),
                    space,
                    key = key.as_deref(),
                    conflict = error.kind.as_str(),
                    "{}: {}",
                    resolution.action(),
                    error.message
                );
                Ok(ConflictDiagnostic {
                    kind: error.kind,
                    resolution,
                    lsn,
                    space_id: error.space_id,
                    key: error.key,
                    message: error.message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuplog_codec::tuple;

    const ALL: [ConflictKind; 6] = [
        ConflictKind::DuplicateKey,
        ConflictKind::LsnGap,
        ConflictKind::MissingKey,
        ConflictKind::UnknownSpace,
        ConflictKind::SpaceExists,
        ConflictKind::InvalidTuple,
    ];

    #[test]
    fn strict_aborts_everything() {
        let policy = ConflictPolicy::new(true);
        for kind in ALL {
            assert_eq!(policy.resolve(kind), Resolution::Abort, "{kind:?}");
        }
    }

    #[test]
    fn permissive_tolerates_only_duplicates_and_gaps() {
        let policy = ConflictPolicy::from_config(&Config::default().strict_on_conflict(false));
        assert!(!policy.is_strict());
        assert_eq!(policy.resolve(ConflictKind::DuplicateKey), Resolution::Skip);
        assert_eq!(policy.resolve(ConflictKind::LsnGap), Resolution::Continue);
        for kind in &ALL[2..] {
            assert_eq!(policy.resolve(*kind), Resolution::Abort, "{kind:?}");
        }
    }

    #[test]
    fn default_is_strict() {
        assert!(ConflictPolicy::default().is_strict());
        assert!(ConflictPolicy::from_config(&Config::default()).is_strict());
    }

    #[test]
    fn abort_becomes_recovery_error() {
        let error = ApplyError::new(ConflictKind::DuplicateKey, "dup").with_space(SpaceId::new(512));
        let err = ConflictPolicy::new(true).handle(error, Lsn::new(7)).unwrap_err();
        match err {
            CoreError::RecoveryAborted { lsn, kind, message } => {
                assert_eq!(lsn, Lsn::new(7));
                assert_eq!(kind, ConflictKind::DuplicateKey);
                assert_eq!(message, "dup");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn skip_returns_diagnostic() {
        let error = ApplyError::new(ConflictKind::DuplicateKey, "dup")
            .with_space(SpaceId::new(512))
            .with_key(tuple![1]);
        let diag = ConflictPolicy::new(false).handle(error, Lsn::new(3)).unwrap();
        assert_eq!(diag.resolution, Resolution::Skip);
        assert_eq!(diag.lsn, Lsn::new(3));
        assert_eq!(diag.space_id, Some(SpaceId::new(512)));
        assert_eq!(diag.key, Some(tuple![1]));
        assert_eq!(diag.message, "dup");
    }

    #[test]
    fn gap_is_applied_not_skipped() {
        let error = ApplyError::new(ConflictKind::LsnGap, "Missing log records between LSN 2 and 4");
        let diag = ConflictPolicy::new(false).handle(error, Lsn::new(5)).unwrap();
        assert_eq!(diag.resolution, Resolution::Continue);
        assert_eq!(diag.kind.to_string(), "Missing log records");
        assert_eq!(Resolution::Continue.action(), "applying row");
    }

    #[test]
    fn classification_strings() {
        assert_eq!(
            ConflictKind::DuplicateKey.to_string(),
            "Duplicate key exists in unique index"
        );
        assert_eq!(ConflictKind::LsnGap.as_str(), "Missing log records");
    }
}
