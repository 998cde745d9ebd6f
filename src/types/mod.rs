//! Data types for the Changefeed Gateway
//!
//! This module contains the core data structures shared by the store client,
//! the change watcher, the event logger and the HTTP gateway.

mod change;
mod kv;
mod record;

pub use change::{ChangeEvent, ChangeKind, WatchBatch};
pub use kv::{KeyList, KeyValue};
pub use record::LogRecord;
