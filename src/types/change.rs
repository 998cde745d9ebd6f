//! Change notifications delivered by the store's watch feed

use serde::{Deserialize, Serialize};

/// Kind of mutation a change event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Put,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Put => write!(f, "PUT"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single observed mutation of a key
///
/// Immutable once emitted by the feed. `value` is empty for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub key: String,
    pub value: String,
    pub kind: ChangeKind,
    /// Store revision of the mutation (etcd `mod_revision`)
    pub revision: i64,
}

impl ChangeEvent {
    pub fn put(key: impl Into<String>, value: impl Into<String>, revision: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: ChangeKind::Put,
            revision,
        }
    }

    pub fn delete(key: impl Into<String>, revision: i64) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            kind: ChangeKind::Delete,
            revision,
        }
    }
}

/// One notification read off the watch feed
///
/// Events inside a batch are in revision order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchBatch {
    /// Store revision at the time the batch was produced
    pub revision: i64,
    pub events: Vec<ChangeEvent>,
}

impl WatchBatch {
    pub fn new(revision: i64, events: Vec<ChangeEvent>) -> Self {
        Self { revision, events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
