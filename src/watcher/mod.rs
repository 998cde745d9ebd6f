//! Change Watcher
//!
//! Owns the single watch subscription for the configured prefix and hands
//! every event to the [`EventLogger`] in the order the feed delivered it.
//!
//! ```text
//! store.watch(prefix) ──► batch ──► event 1 ──► logger.append ──► event 2 ──► ...
//! ```
//!
//! Each append is awaited before the next event is taken, so there is no
//! queue between the feed and the log that could reorder events. An append
//! failure is logged and skipped; losing the feed ends the watcher.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::event_log::EventLogger;
use crate::store::{KvStore, StoreError};
use crate::types::ChangeEvent;

/// Result type for watcher runs
pub type WatchResult<T> = Result<T, WatchError>;

/// Conditions that end the capture pipeline
#[derive(Debug, Error)]
pub enum WatchError {
    /// The feed closed (connection lost or store shut down)
    #[error("watch subscription for prefix '{prefix}' terminated")]
    SubscriptionTerminated { prefix: String },

    /// The subscription could not be opened or reported an error
    #[error("watch feed failed: {0}")]
    Feed(#[from] StoreError),
}

/// Counters for one watcher run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Notification batches read off the feed
    pub batches: u64,
    /// Change events read off the feed
    pub events: u64,
    /// Events durably appended
    pub appended: u64,
    /// Events whose append failed
    pub failed: u64,
    /// Highest revision seen so far
    pub last_revision: i64,
}

/// Bridges the store's watch feed into the event log
pub struct ChangeWatcher {
    store: Arc<dyn KvStore>,
    logger: Arc<EventLogger>,
    prefix: String,
}

impl ChangeWatcher {
    pub fn new(store: Arc<dyn KvStore>, logger: Arc<EventLogger>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            logger,
            prefix: prefix.into(),
        }
    }

    /// Watched key prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Subscribe and process changes until the feed ends or `shutdown` fires
    ///
    /// Returns the run's counters on shutdown. A batch already taken from the
    /// feed is always dispatched in full before shutdown is observed.
    pub async fn run(&self, shutdown: CancellationToken) -> WatchResult<WatchStats> {
        let mut feed = self.store.watch(&self.prefix).await?;
        let mut stats = WatchStats::default();

        info!(prefix = %self.prefix, "watching for changes");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(
                        prefix = %self.prefix,
                        events = stats.events,
                        appended = stats.appended,
                        failed = stats.failed,
                        "change watcher stopped"
                    );
                    return Ok(stats);
                }
                next = feed.next() => next,
            };

            let batch = match next {
                Some(Ok(batch)) => batch,
                Some(Err(e)) => {
                    error!(prefix = %self.prefix, error = %e, "watch feed failed");
                    return Err(WatchError::Feed(e));
                }
                None => {
                    error!(prefix = %self.prefix, "watch subscription terminated");
                    return Err(WatchError::SubscriptionTerminated {
                        prefix: self.prefix.clone(),
                    });
                }
            };

            stats.batches += 1;
            for event in batch.events {
                self.dispatch(event, &mut stats).await;
            }
        }
    }

    /// Append a single event, recording the outcome
    async fn dispatch(&self, event: ChangeEvent, stats: &mut WatchStats) {
        stats.events += 1;

        if event.revision < stats.last_revision {
            warn!(
                key = %event.key,
                revision = event.revision,
                last_revision = stats.last_revision,
                "change event arrived out of revision order"
            );
        } else {
            stats.last_revision = event.revision;
        }

        match self.logger.append(&event).await {
            Ok(_) => stats.appended += 1,
            Err(e) => {
                stats.failed += 1;
                error!(
                    key = %event.key,
                    revision = event.revision,
                    error = %e,
                    "failed to record change event"
                );
            }
        }
    }
}
