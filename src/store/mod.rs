//! Store client boundary
//!
//! The gateway and the change watcher talk to the key-value store only
//! through [`KvStore`]. Two backends are provided:
//!
//! - [`EtcdStore`]: etcd v3 over its JSON gateway (`/v3/kv/*`, `/v3/watch`)
//! - [`MemoryStore`]: in-process store with a revision counter and a
//!   broadcast change feed, used for tests and local runs
//!
//! # Watch semantics
//!
//! ```text
//! put/delete ──► revision += 1 ──► WatchBatch ──► WatchStream (per prefix)
//! ```
//!
//! A watch starts at the store's current revision. The stream ends when the
//! subscription is lost; callers treat that as fatal and re-subscribe from
//! the then-current revision.

mod etcd;
mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::types::{KeyValue, WatchBatch};

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Ordered feed of change batches for one watched prefix
pub type WatchStream = BoxStream<'static, StoreResult<WatchBatch>>;

/// Errors reported by the store client
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, timeout or protocol failure talking to the store
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("store returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// The store reported a gRPC error inside a streamed response
    #[error("store returned gRPC code {code}: {message}")]
    Grpc { code: i64, message: String },

    /// The store answered with a body we could not decode
    #[error("failed to decode store response: {0}")]
    Decode(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The watch could not keep up and notifications were lost
    #[error("watch feed lagged, {0} notifications lost")]
    WatchLagged(u64),

    /// The store cancelled the watch
    #[error("watch canceled by store: {0}")]
    WatchCanceled(String),

    #[error("no store endpoints configured")]
    NoEndpoints,
}

/// Read, write and watch access to a linearizable key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a single key
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>>;

    /// List all keys starting with `prefix`, in the store's key order
    ///
    /// An empty prefix lists the whole keyspace.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<KeyValue>>;

    /// Write a key, returning the revision of the mutation
    async fn put(&self, key: &str, value: &str) -> StoreResult<i64>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Subscribe to changes of keys starting with `prefix`
    async fn watch(&self, prefix: &str) -> StoreResult<WatchStream>;
}

/// Compute the `[key, range_end)` byte range covering every key with `prefix`
///
/// Mirrors etcd's prefix convention: the range end is the prefix with its
/// last byte incremented, dropping trailing `0xff` bytes. When there is no
/// upper bound (empty prefix or all `0xff`), the range end is `\0`, which etcd
/// reads as "to the end of the keyspace"; an empty prefix also starts at `\0`.
pub fn prefix_range(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    let start = if prefix.is_empty() {
        vec![0]
    } else {
        prefix.as_bytes().to_vec()
    };

    let mut end = prefix.as_bytes().to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return (start, end);
        }
    }

    (start, vec![0])
}
