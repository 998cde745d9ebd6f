//! Durable log records
//!
//! Each record is written as one self-contained JSON line. Readers must
//! ignore fields they do not know about.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::change::{ChangeEvent, ChangeKind};

/// One persisted observation of a change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub key: String,
    pub value: String,

    /// When the change was observed, with the configured zone's offset
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<FixedOffset>,

    #[serde(rename = "type")]
    pub kind: ChangeKind,

    pub revision: i64,
}

impl LogRecord {
    /// Build a record for an event observed at `observed_at`
    pub fn from_event(event: &ChangeEvent, observed_at: DateTime<FixedOffset>) -> Self {
        Self {
            key: event.key.clone(),
            value: event.value.clone(),
            observed_at,
            kind: event.kind,
            revision: event.revision,
        }
    }

    /// Serialize record to a single JSON line (without the trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize record from a JSON line
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
