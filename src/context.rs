//! Shared application context
//!
//! Built once at startup and handed explicitly to the gateway, the change
//! watcher and the event logger. Tests build one around a `MemoryStore`
//! and a `MemorySink`.

use std::sync::Arc;

use tracing::debug;

use crate::config::{GatewayConfig, StoreBackend};
use crate::event_log::{EventLogger, FileSink};
use crate::store::{EtcdStore, KvStore, MemoryStore, StoreResult};
use crate::watcher::ChangeWatcher;

/// Handles shared by every component of the gateway
pub struct AppContext {
    /// Store client used by both the gateway and the watcher
    pub store: Arc<dyn KvStore>,
    /// Single writer for the change log
    pub logger: Arc<EventLogger>,
    /// Key prefix the watcher captures
    pub watch_prefix: String,
}

impl AppContext {
    pub fn new(store: Arc<dyn KvStore>, logger: Arc<EventLogger>, watch_prefix: impl Into<String>) -> Self {
        Self {
            store,
            logger,
            watch_prefix: watch_prefix.into(),
        }
    }

    /// Build the store client and file-backed logger described by `config`
    pub fn from_config(config: &GatewayConfig) -> StoreResult<Self> {
        let store: Arc<dyn KvStore> = match config.store_backend {
            StoreBackend::Etcd => {
                let etcd = EtcdStore::new(config.endpoints.clone(), config.request_timeout)?;
                debug!(endpoints = ?etcd.endpoints(), "etcd client ready");
                Arc::new(etcd)
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let sink = FileSink::new(&config.log_path);
        debug!(path = %sink.path().display(), "change log sink ready");
        let logger = Arc::new(EventLogger::new(Arc::new(sink), config.time_zone.clone()));

        Ok(Self::new(store, logger, config.watch_prefix.clone()))
    }

    /// Watcher over this context's store and logger
    pub fn watcher(&self) -> ChangeWatcher {
        ChangeWatcher::new(self.store.clone(), self.logger.clone(), self.watch_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_config_memory_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = GatewayConfig {
            store_backend: StoreBackend::Memory,
            endpoints: Vec::new(),
            watch_prefix: "key-".to_string(),
            log_path: temp_dir.path().join("changes.jsonl"),
            time_zone: "Europe/Berlin".to_string(),
            ..GatewayConfig::default()
        };

        let ctx = AppContext::from_config(&config).unwrap();
        assert_eq!(ctx.watcher().prefix(), "key-");
        assert_eq!(ctx.logger.time_zone(), "Europe/Berlin");

        ctx.store.put("key-1", "v").await.unwrap();
        assert_eq!(ctx.store.list("key-").await.unwrap().len(), 1);
    }

    #[test]
    fn test_from_config_etcd_without_endpoints_fails() {
        let config = GatewayConfig {
            endpoints: Vec::new(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            AppContext::from_config(&config),
            Err(crate::store::StoreError::NoEndpoints)
        ));
    }
}
