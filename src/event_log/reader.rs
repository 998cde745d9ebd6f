//! Tolerant reader for the change log

use std::path::{Path, PathBuf};

use tracing::warn;

use super::LogResult;
use crate::types::LogRecord;

/// Outcome of reading a log file
#[derive(Debug, Default)]
pub struct ReadReport {
    /// Records in file order
    pub records: Vec<LogRecord>,
    /// Lines that were not complete, parseable records
    pub skipped: usize,
}

/// Reads records back from a JSON Lines change log
///
/// Each newline-terminated line is parsed on its own. Lines that fail to
/// parse, and a trailing fragment with no newline, are counted as skipped.
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read every record; a missing file reads as empty
    pub async fn read(&self) -> LogResult<ReadReport> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReadReport::default()),
            Err(e) => return Err(e.into()),
        };

        Ok(Self::parse(&bytes))
    }

    /// Parse log content already in memory
    pub fn parse(bytes: &[u8]) -> ReadReport {
        let mut report = ReadReport::default();
        let mut segments = bytes.split(|b| *b == b'\n').enumerate().peekable();

        while let Some((line_num, segment)) = segments.next() {
            // The last segment has no terminating newline
            let terminated = segments.peek().is_some();
            if segment.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if !terminated {
                warn!(line = line_num + 1, "ignoring unterminated trailing record");
                report.skipped += 1;
                continue;
            }

            let parsed = std::str::from_utf8(segment)
                .map_err(|e| e.to_string())
                .and_then(|line| LogRecord::from_json_line(line).map_err(|e| e.to_string()));

            match parsed {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "skipping malformed log record");
                    report.skipped += 1;
                }
            }
        }

        report
    }
}
