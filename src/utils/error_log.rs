use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::error;

/// Append-only sink for durable failure records.
///
/// Each call opens the log file in append mode, writes one timestamped
/// entry (and the cause chain, if present) and closes the file before
/// returning. A failure of the sink itself is reported once through the
/// primary log and otherwise swallowed; it is never retried and never
/// propagated to the caller.
#[derive(Clone, Debug)]
pub struct ErrorLog {
    path: Arc<PathBuf>,
}

impl ErrorLog {
    /// Creates a sink that appends to the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    /// Appends one timestamped entry, with the full `source()` chain of
    /// `cause` when one is given.
    pub fn record(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>) {
        if let Err(io_err) = self.append(message, cause) {
            error!(
                "Could not write to {}: {}",
                self.path.display(),
                io_err
            );
        }
    }

    fn append(
        &self,
        message: &str,
        cause: Option<&(dyn std::error::Error + 'static)>,
    ) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] {}", timestamp, message)?;

        if let Some(mut err) = cause {
            writeln!(file, "Caused by:")?;
            loop {
                writeln!(file, "\t{}", err)?;
                match err.source() {
                    Some(next) => err = next,
                    None => break,
                }
            }
        }
        writeln!(file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_timestamped_entry() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log"));

        log.record("bind failed on port 8193", None);

        let contents = std::fs::read_to_string(dir.path().join("errors.log")).unwrap();
        assert!(contents.contains("] bind failed on port 8193"));
        assert!(contents.starts_with('['));
    }

    #[test]
    fn records_cause_chain() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log"));

        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away");
        log.record("error accepting client", Some(&cause));

        let contents = std::fs::read_to_string(dir.path().join("errors.log")).unwrap();
        assert!(contents.contains("error accepting client"));
        assert!(contents.contains("Caused by:"));
        assert!(contents.contains("peer went away"));
    }

    #[test]
    fn appends_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log"));

        log.record("first", None);
        log.record("second", None);

        let contents = std::fs::read_to_string(dir.path().join("errors.log")).unwrap();
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
    }

    #[test]
    fn sink_failure_is_swallowed() {
        // Directory path cannot be opened as a file; record must not panic.
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path());
        log.record("never stored", None);
    }
}
