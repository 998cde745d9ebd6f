//! Log sinks
//!
//! A sink receives one fully serialized record line per call and must either
//! persist the whole line or report an error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Destination for serialized log records
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one record line; `line` has no trailing newline
    async fn append_line(&self, line: &str) -> std::io::Result<()>;
}

/// Append-only JSON Lines file
///
/// The file is opened for each append (created if absent) and synced to
/// disk before the call returns.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file is non-empty and its last byte is not a newline
    async fn has_unterminated_tail(file: &mut tokio::fs::File) -> std::io::Result<bool> {
        let len = file.metadata().await?.len();
        if len == 0 {
            return Ok(false);
        }

        file.seek(std::io::SeekFrom::Start(len - 1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        Ok(last[0] != b'\n')
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // A previous append that failed partway leaves a fragment without a
        // newline; terminate it so it stays a separate (unparseable) line.
        let mut buf = String::with_capacity(line.len() + 2);
        if Self::has_unterminated_tail(&mut file).await? {
            buf.push('\n');
        }
        buf.push_str(line);
        buf.push('\n');

        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;

        Ok(())
    }
}

/// In-memory sink for tests
///
/// Stores each appended line and can be told to fail the next appends to
/// simulate an unwritable log resource.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    failures_left: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail with an I/O error
    pub fn fail_next(&self, count: usize) {
        *self.failures_left.lock() = count;
    }

    /// Snapshot of all lines appended so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        {
            let mut failures = self.failures_left.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated write failure",
                ));
            }
        }

        self.lines.lock().push(line.to_string());
        Ok(())
    }
}
