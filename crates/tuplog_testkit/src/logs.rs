//! Log capture for assertions on recovery diagnostics.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// A shared in-memory sink for formatted log lines.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with every event at debug level or above captured.
///
/// The subscriber is installed for the current thread only, so tests
/// running in parallel do not see each other's lines.
pub fn capture_logs<F, R>(f: F) -> (R, String)
where
    F: FnOnce() -> R,
{
    let buffer = LogBuffer::new();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

/// Number of lines in `logs` containing `needle`.
pub fn count_lines(logs: &str, needle: &str) -> usize {
    logs.lines().filter(|line| line.contains(needle)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn captures_formatted_events() {
        let ((), logs) = capture_logs(|| {
            info!("recovery start");
            warn!(lsn = 4u64, "skipping row: Duplicate key exists in unique index");
        });
        assert_eq!(count_lines(&logs, "recovery start"), 1);
        assert_eq!(count_lines(&logs, "Duplicate key"), 1);
        assert!(logs.contains("WARN"));
        assert!(logs.contains("lsn=4"));
    }

    #[test]
    fn nothing_leaks_outside_the_closure() {
        let (value, logs) = capture_logs(|| 7);
        info!("not captured");
        assert_eq!(value, 7);
        assert!(logs.is_empty());
    }
}
