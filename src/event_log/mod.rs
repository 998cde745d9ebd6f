//! Durable change log
//!
//! This module owns the append-only record of observed changes:
//! - `EventLogger`: timestamps a change event and appends it under a lock
//! - `LogSink`: where records go (`FileSink` in production, `MemorySink` in tests)
//! - `LogReader`: tolerant reader that parses each line independently
//!
//! # Append path
//!
//! ```text
//! ChangeEvent ──► lock ──► resolve zone ──► LogRecord ──► JSON line ──► sink (write + fsync) ──► unlock
//! ```
//!
//! Every record is one newline-terminated JSON object. A line that does not
//! parse (e.g. a fragment left by a failed write) is skipped by readers and
//! never merges with the next record.

mod logger;
mod reader;
mod sink;

use thiserror::Error;

pub use logger::EventLogger;
pub use reader::{LogReader, ReadReport};
pub use sink::{FileSink, LogSink, MemorySink};

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur while appending or reading the log
#[derive(Debug, Error)]
pub enum LogError {
    /// The configured time zone identifier does not resolve
    #[error("unknown time zone '{0}'")]
    TimeZone(String),

    /// The log resource could not be opened or written
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}
