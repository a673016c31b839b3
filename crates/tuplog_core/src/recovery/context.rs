//! State threaded through snapshot loading and replay.

use super::policy::{ConflictDiagnostic, ConflictKind, Resolution};
use crate::space::EngineState;
use crate::types::Lsn;
use tracing::info;
use uuid::Uuid;

/// Everything recovery has built so far.
///
/// The snapshot loader creates the context; replay consumes it.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    /// State rebuilt so far.
    pub state: EngineState,
    /// LSN of the snapshot recovery started from.
    pub base_lsn: Lsn,
    /// LSN of the last record applied or skipped.
    pub last_lsn: Lsn,
    /// Instance that owns the data directory.
    pub instance: Uuid,
    /// File name of the snapshot recovery started from.
    pub snapshot: Option<String>,
    /// Rows loaded from the snapshot.
    pub snapshot_rows: u64,
    /// Log records applied after the snapshot.
    pub records_applied: u64,
    /// Records skipped so far.
    pub diagnostics: Vec<ConflictDiagnostic>,
    /// LSN gaps recovery continued past.
    pub gaps: Vec<ConflictDiagnostic>,
    rows: u64,
}

impl RecoveryContext {
    /// Creates a context for state taken at `base_lsn`.
    #[must_use]
    pub fn new(state: EngineState, base_lsn: Lsn, instance: Uuid) -> Self {
        Self {
            state,
            base_lsn,
            last_lsn: base_lsn,
            instance,
            snapshot: None,
            snapshot_rows: 0,
            records_applied: 0,
            diagnostics: Vec::new(),
            gaps: Vec::new(),
            rows: 0,
        }
    }

    /// Files a conflict the policy let recovery get past.
    pub(crate) fn record_conflict(&mut self, diagnostic: ConflictDiagnostic) {
        match diagnostic.resolution {
            Resolution::Continue => self.gaps.push(diagnostic),
            Resolution::Skip | Resolution::Abort => self.diagnostics.push(diagnostic),
        }
    }

    /// Counts one processed row, logging progress every `interval` rows.
    pub(crate) fn count_row(&mut self, interval: u64) {
        self.rows += 1;
        if interval > 0 && self.rows % interval == 0 {
            #[allow(clippy::cast_precision_loss)]
            let millions = self.rows as f64 / 1_000_000.0;
            info!("{millions:.1}M rows processed");
        }
    }
}

/// Outcome of a successful recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// LSN of the snapshot recovery started from.
    pub base_lsn: Lsn,
    /// LSN of the last record applied or skipped; the next write gets
    /// the following LSN.
    pub last_lsn: Lsn,
    /// File name of the snapshot.
    pub snapshot: Option<String>,
    /// Rows loaded from the snapshot.
    pub snapshot_rows: u64,
    /// Segments read.
    pub segments_replayed: usize,
    /// Log records applied.
    pub records_applied: u64,
    /// Records the policy discarded, in LSN order.
    pub records_skipped: Vec<ConflictDiagnostic>,
    /// LSN gaps the policy let recovery continue past, in LSN order. The
    /// record after each gap was applied.
    pub gaps: Vec<ConflictDiagnostic>,
    /// Segments that ended in an incomplete record.
    pub truncated_segments: Vec<String>,
}

impl RecoveryReport {
    /// Builds the report for a finished context.
    #[must_use]
    pub fn from_context(ctx: &RecoveryContext) -> Self {
        Self {
            base_lsn: ctx.base_lsn,
            last_lsn: ctx.last_lsn,
            snapshot: ctx.snapshot.clone(),
            snapshot_rows: ctx.snapshot_rows,
            segments_replayed: 0,
            records_applied: ctx.records_applied,
            records_skipped: ctx.diagnostics.clone(),
            gaps: ctx.gaps.clone(),
            truncated_segments: Vec::new(),
        }
    }

    /// Number of skipped conflicts of one kind.
    #[must_use]
    pub fn skipped(&self, kind: ConflictKind) -> usize {
        self.records_skipped.iter().filter(|d| d.kind == kind).count()
    }

    /// Returns true if nothing was skipped, no LSN was missing and no
    /// segment was torn.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.records_skipped.is_empty()
            && self.gaps.is_empty()
            && self.truncated_segments.is_empty()
    }
}
