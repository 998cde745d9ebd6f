//! Changefeed Gateway
//!
//! An HTTP gateway over etcd that captures every change under a watched key
//! prefix into an append-only JSON Lines log.
//!
//! # Features
//!
//! - **Change capture**: one watch subscription, events logged in revision order
//! - **Single writer**: appends serialized by a lock, one record per event
//! - **Zone-aware timestamps**: records carry an explicit UTC offset
//! - **Thin gateway**: get, list and put straight through to the store
//!
//! # Modules
//!
//! - `types`: Core data structures (KeyValue, ChangeEvent, LogRecord)
//! - `store`: Store client trait with etcd and in-memory backends
//! - `event_log`: Event logger, log sinks and a tolerant reader
//! - `watcher`: Change watcher bridging the feed into the log
//! - `api`: Axum HTTP gateway
//! - `context`: Shared handles built at startup
//! - `config`: Environment configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use changefeed_gateway::{AppContext, EventLogger, MemorySink, MemoryStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let store = Arc::new(MemoryStore::new());
//! let logger = Arc::new(EventLogger::new(Arc::new(MemorySink::new()), "UTC"));
//! let ctx = AppContext::new(store, logger, "key");
//!
//! let stats = ctx.watcher().run(CancellationToken::new()).await;
//! # }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod event_log;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export commonly used items at crate root
pub use config::{ConfigError, GatewayConfig, StoreBackend};
pub use context::AppContext;
pub use event_log::{EventLogger, FileSink, LogError, LogReader, LogSink, MemorySink};
pub use store::{EtcdStore, KvStore, MemoryStore, StoreError};
pub use types::{ChangeEvent, ChangeKind, KeyValue, LogRecord, WatchBatch};
pub use watcher::{ChangeWatcher, WatchError, WatchStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
