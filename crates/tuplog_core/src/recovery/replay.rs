//! Replays log segments on top of a snapshot.

use super::context::{RecoveryContext, RecoveryReport};
use super::policy::{ConflictKind, ConflictPolicy};
use crate::config::Config;
use crate::dir::{format_file_name, DataDir, FileKind};
use crate::error::{CoreError, CoreResult};
use crate::space::{ApplyError, EngineState};
use crate::types::Lsn;
use crate::wal::{LogRecord, SegmentReader};
use tracing::{debug, info};

/// Applies log records to a [`RecoveryContext`].
///
/// # Rules
///
/// - Records at or below the snapshot LSN are already in the snapshot and
///   are skipped silently.
/// - A record at or below the last applied LSN means the log repeats
///   itself: [`CoreError::CorruptSegment`], whatever the policy.
/// - A record more than one past the last applied LSN is an
///   [`ConflictKind::LsnGap`]; unless the policy aborts, the gap is reported
///   in [`RecoveryReport::gaps`] and the record is then applied.
/// - A record that does not apply goes to the [`ConflictPolicy`]. A
///   skipped record still consumes its LSN.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    policy: ConflictPolicy,
    progress_interval: u64,
}

impl ReplayEngine {
    /// Creates a replay engine from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            policy: ConflictPolicy::from_config(config),
            progress_interval: config.progress_interval,
        }
    }

    /// The conflict policy in use.
    #[must_use]
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Replays `segments` (start LSNs, ascending) from `dir` on top of `ctx`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CorruptSegment`] for damage other than a torn tail
    /// - [`CoreError::InstanceMismatch`] for a segment of another instance
    /// - [`CoreError::RecoveryAborted`] when the policy aborts
    pub fn replay(
        &self,
        dir: &DataDir,
        mut ctx: RecoveryContext,
        segments: &[Lsn],
    ) -> CoreResult<(EngineState, RecoveryReport)> {
        let mut replayed = 0;
        let mut truncated = Vec::new();

        for (i, &start) in segments.iter().enumerate() {
            let name = format_file_name(start, FileKind::Segment);
            if segments
                .get(i + 1)
                .is_some_and(|next| next.as_u64() <= ctx.base_lsn.as_u64().saturating_add(1))
            {
                debug!(segment = %name, "segment is covered by the snapshot");
                continue;
            }

            let file = dir.location(&name);
            info!("recovering from `{file}`");
            let mut reader = SegmentReader::open(
                dir.open_file(start, FileKind::Segment)?,
                file.clone(),
                FileKind::Segment,
                Some(start),
            )?;
            if let Some(header) = reader.header() {
                if header.instance != ctx.instance {
                    return Err(CoreError::InstanceMismatch {
                        file,
                        expected: ctx.instance,
                        found: header.instance,
                    });
                }
            }

            self.apply_all(&mut ctx, &file, reader.by_ref())?;
            if reader.truncated_tail() {
                truncated.push(file);
            }
            replayed += 1;
        }

        let mut report = RecoveryReport::from_context(&ctx);
        report.segments_replayed = replayed;
        report.truncated_segments = truncated;
        Ok((ctx.state, report))
    }

    /// Applies a stream of records read from `file`.
    ///
    /// This is the per-record step of [`replay`](Self::replay). Feeding it
    /// one concatenated stream or one stream per segment gives the same
    /// result.
    pub fn apply_all<I>(&self, ctx: &mut RecoveryContext, file: &str, records: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = CoreResult<(u64, LogRecord)>>,
    {
        for item in records {
            let (offset, record) = item?;
            self.apply_record(ctx, file, offset, &record)?;
        }
        Ok(())
    }

    fn apply_record(
        &self,
        ctx: &mut RecoveryContext,
        file: &str,
        offset: u64,
        record: &LogRecord,
    ) -> CoreResult<()> {
        let lsn = record.lsn;
        if lsn <= ctx.base_lsn {
            return Ok(());
        }
        if lsn <= ctx.last_lsn {
            return Err(CoreError::corrupt(
                file,
                offset,
                format!("lsn {lsn} was already replayed (last applied {})", ctx.last_lsn),
            ));
        }

        let expected = ctx.last_lsn.next();
        if lsn > expected {
            let gap = ApplyError::new(
                ConflictKind::LsnGap,
                format!(
                    "Missing log records between LSN {expected} and {}",
                    lsn.as_u64() - 1
                ),
            );
            let diagnostic = self.policy.handle(gap, lsn)?;
            ctx.record_conflict(diagnostic);
        }

        match ctx.state.apply(&record.op) {
            Ok(()) => ctx.records_applied += 1,
            Err(error) => {
                let diagnostic = self.policy.handle(error, lsn)?;
                ctx.record_conflict(diagnostic);
            }
        }
        ctx.last_lsn = lsn;
        ctx.count_row(self.progress_interval);
        Ok(())
    }
}
