//! Event Logger - single-writer append of change events

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{LogError, LogResult, LogSink};
use crate::types::{ChangeEvent, LogRecord};

/// Appends one timestamped record per change event
///
/// The sink sits behind an async mutex: only one append runs at a time and
/// the lock is held for exactly one record.
pub struct EventLogger {
    sink: Mutex<Arc<dyn LogSink>>,
    time_zone: String,
}

impl EventLogger {
    /// Create a logger writing to `sink`, stamping records in `time_zone`
    ///
    /// `time_zone` is an IANA identifier such as `Asia/Ho_Chi_Minh` or `UTC`.
    pub fn new(sink: Arc<dyn LogSink>, time_zone: impl Into<String>) -> Self {
        Self {
            sink: Mutex::new(sink),
            time_zone: time_zone.into(),
        }
    }

    /// Configured time zone identifier
    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    /// Resolve an IANA zone identifier
    pub fn resolve_zone(name: &str) -> LogResult<Tz> {
        name.parse::<Tz>()
            .map_err(|_| LogError::TimeZone(name.to_string()))
    }

    /// Append a record for `event`
    ///
    /// On failure nothing is retried; the caller decides whether to carry on.
    pub async fn append(&self, event: &ChangeEvent) -> LogResult<LogRecord> {
        let sink = self.sink.lock().await;

        // Resolved per append so a bad zone never yields a wrong timestamp
        let zone = match Self::resolve_zone(&self.time_zone) {
            Ok(zone) => zone,
            Err(e) => {
                error!(time_zone = %self.time_zone, key = %event.key, "cannot timestamp change event: {}", e);
                return Err(e);
            }
        };

        let observed_at = Utc::now().with_timezone(&zone).fixed_offset();
        let record = LogRecord::from_event(event, observed_at);
        let line = record.to_json_line()?;

        sink.append_line(&line).await?;

        debug!(key = %record.key, revision = record.revision, kind = %record.kind, "change recorded");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{FileSink, LogReader, MemorySink};
    use crate::types::ChangeKind;
    use tempfile::TempDir;

    fn memory_logger(zone: &str) -> (EventLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let logger = EventLogger::new(sink.clone(), zone);
        (logger, sink)
    }

    #[tokio::test]
    async fn test_append_writes_one_record() {
        let (logger, sink) = memory_logger("UTC");

        let record = logger
            .append(&ChangeEvent::put("key1", "value1", 5))
            .await
            .unwrap();

        assert_eq!(record.key, "key1");
        assert_eq!(record.value, "value1");
        assert_eq!(record.revision, 5);
        assert_eq!(record.kind, ChangeKind::Put);

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(LogRecord::from_json_line(&lines[0]).unwrap(), record);
    }

    #[tokio::test]
    async fn test_timestamp_uses_configured_zone() {
        let (logger, _sink) = memory_logger("Asia/Ho_Chi_Minh");

        let record = logger.append(&ChangeEvent::put("k", "v", 2)).await.unwrap();

        assert_eq!(record.observed_at.offset().local_minus_utc(), 7 * 3600);
    }

    #[tokio::test]
    async fn test_unknown_zone_fails_without_writing() {
        let (logger, sink) = memory_logger("Mars/Olympus_Mons");

        let err = logger
            .append(&ChangeEvent::put("k", "v", 2))
            .await
            .unwrap_err();

        assert!(matches!(err, LogError::TimeZone(ref zone) if zone == "Mars/Olympus_Mons"));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_failed_append_does_not_block_next() {
        let (logger, sink) = memory_logger("UTC");
        sink.fail_next(1);

        let err = logger.append(&ChangeEvent::put("k1", "v", 2)).await.unwrap_err();
        assert!(matches!(err, LogError::Io(_)));

        logger.append(&ChangeEvent::put("k2", "v", 3)).await.unwrap();

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(LogRecord::from_json_line(&lines[0]).unwrap().key, "k2");
    }

    #[tokio::test]
    async fn test_concurrent_appends_produce_one_record_each() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("changes.jsonl");
        let logger = Arc::new(EventLogger::new(Arc::new(FileSink::new(&path)), "UTC"));

        let mut handles = Vec::new();
        for task in 0..8 {
            let logger = logger.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let key = format!("key-{}-{}", task, i);
                    let value = "x".repeat(512 + i);
                    logger
                        .append(&ChangeEvent::put(key, value, (task * 100 + i) as i64))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let report = LogReader::new(&path).read().await.unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.records.len(), 200);

        let mut keys: Vec<String> = report.records.into_iter().map(|r| r.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 200);
    }
}
