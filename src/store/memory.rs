//! In-process store with a revision-ordered change feed
//!
//! Every mutation bumps a global revision and is published on a broadcast
//! channel while the state lock is still held, so the feed order always
//! matches revision order, even for concurrent writers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::{KvStore, StoreError, StoreResult, WatchStream};
use crate::types::{ChangeEvent, KeyValue, WatchBatch};

/// Default feed buffer; slower watchers get `WatchLagged`
const DEFAULT_FEED_CAPACITY: usize = 1024;

struct Inner {
    data: BTreeMap<String, String>,
    revision: i64,
    feed: broadcast::Sender<WatchBatch>,
}

/// Linearizable in-memory key-value store
pub struct MemoryStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create an empty store whose feed buffers `capacity` batches
    pub fn with_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity);
        Self {
            inner: Mutex::new(Inner {
                data: BTreeMap::new(),
                // etcd starts an empty cluster at revision 1
                revision: 1,
                feed,
            }),
            capacity,
        }
    }

    /// Current store revision
    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }

    /// Number of open watch streams on the current feed
    pub fn watcher_count(&self) -> usize {
        self.inner.lock().feed.receiver_count()
    }

    /// End every open watch stream, as if the connection was lost
    ///
    /// New watches opened afterwards work normally.
    pub fn close_watches(&self) {
        let (feed, _) = broadcast::channel(self.capacity);
        // dropping the old sender closes all receivers
        drop(std::mem::replace(&mut self.inner.lock().feed, feed));
    }

    fn publish(inner: &mut Inner, event: ChangeEvent) {
        let batch = WatchBatch::new(inner.revision, vec![event]);
        // No receivers just means nobody is watching
        let _ = inner.feed.send(batch);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>> {
        let inner = self.inner.lock();
        Ok(inner
            .data
            .get(key)
            .map(|value| KeyValue::new(key, value.clone())))
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<KeyValue>> {
        let inner = self.inner.lock();
        Ok(inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<i64> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("key is not provided".to_string()));
        }

        let mut inner = self.inner.lock();
        inner.revision += 1;
        let revision = inner.revision;
        inner.data.insert(key.to_string(), value.to_string());
        Self::publish(&mut inner, ChangeEvent::put(key, value, revision));

        Ok(revision)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.data.remove(key).is_none() {
            return Ok(false);
        }

        inner.revision += 1;
        let revision = inner.revision;
        Self::publish(&mut inner, ChangeEvent::delete(key, revision));

        Ok(true)
    }

    async fn watch(&self, prefix: &str) -> StoreResult<WatchStream> {
        let rx = self.inner.lock().feed.subscribe();
        let prefix = prefix.to_string();

        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let result = match item {
                Ok(batch) => {
                    let events = batch
                        .events
                        .into_iter()
                        .filter(|event| event.key.starts_with(&prefix))
                        .collect();
                    let batch = WatchBatch::new(batch.revision, events);
                    (!batch.is_empty()).then_some(Ok(batch))
                }
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    Some(Err(StoreError::WatchLagged(missed)))
                }
            };
            futures::future::ready(result)
        });

        Ok(stream.boxed())
    }
}
