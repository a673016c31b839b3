//! Engine configuration.

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create and bootstrap the data directory if it is missing.
    pub create_if_missing: bool,

    /// Whether a recovery conflict aborts startup.
    ///
    /// When false, duplicate rows are logged and skipped and LSN gaps are
    /// logged and replayed past (the "force recovery" mode). Corruption is
    /// fatal either way.
    pub strict_on_conflict: bool,

    /// Number of records written to a segment before rotating.
    pub rows_per_segment: u64,

    /// Whether to fsync the segment after every record.
    pub sync_on_write: bool,

    /// How many replayed rows between progress log lines (0 = never).
    pub progress_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            strict_on_conflict: true,
            rows_per_segment: 500_000,
            sync_on_write: true,
            progress_interval: 100_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether recovery conflicts abort startup.
    #[must_use]
    pub const fn strict_on_conflict(mut self, value: bool) -> Self {
        self.strict_on_conflict = value;
        self
    }

    /// Sets the segment rotation threshold.
    #[must_use]
    pub const fn rows_per_segment(mut self, rows: u64) -> Self {
        self.rows_per_segment = rows;
        self
    }

    /// Sets whether to sync after every record.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the progress logging interval.
    #[must_use]
    pub const fn progress_interval(mut self, rows: u64) -> Self {
        self.progress_interval = rows;
        self
    }
}
