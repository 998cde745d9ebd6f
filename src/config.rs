//! Startup configuration
//!
//! All settings come from environment variables and are read once; there is
//! no hot reload. An invalid configuration stops the process before it
//! serves anything.
//!
//! Environment:
//! - CHANGEFEED_STORE: `etcd` (default) or `memory`
//! - CHANGEFEED_ENDPOINTS: comma-separated etcd client URLs
//! - CHANGEFEED_WATCH_PREFIX: key prefix to capture (default `key`)
//! - CHANGEFEED_LOG_PATH: change log file (default `output.jsonl`)
//! - CHANGEFEED_TIMEZONE: IANA zone for record timestamps (default `UTC`)
//! - CHANGEFEED_HTTP_ADDR: listen address (default `0.0.0.0:8080`)
//! - CHANGEFEED_REQUEST_TIMEOUT_SECS: timeout for unary store calls (default 5)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::event_log::EventLogger;

const DEFAULT_ENDPOINTS: &str = "http://etcd1:2379,http://etcd2:2379,http://etcd3:2379";
const DEFAULT_WATCH_PREFIX: &str = "key";
const DEFAULT_LOG_PATH: &str = "output.jsonl";
const DEFAULT_TIME_ZONE: &str = "UTC";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Errors in the startup configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no store endpoints configured")]
    NoEndpoints,

    #[error("invalid store endpoint '{0}': expected an http:// or https:// URL")]
    InvalidEndpoint(String),

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("invalid listen address '{0}'")]
    InvalidAddr(String),

    #[error("unknown store backend '{0}' (expected 'etcd' or 'memory')")]
    UnknownBackend(String),

    #[error("invalid value '{value}' for {name}")]
    InvalidNumber { name: String, value: String },
}

/// Which store the gateway talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Etcd,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "etcd" => Ok(StoreBackend::Etcd),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub store_backend: StoreBackend,
    pub endpoints: Vec<String>,
    pub watch_prefix: String,
    pub log_path: PathBuf,
    pub time_zone: String,
    pub http_addr: SocketAddr,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to fetch each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let store_backend = get("CHANGEFEED_STORE", "etcd").parse()?;

        let endpoints = get("CHANGEFEED_ENDPOINTS", DEFAULT_ENDPOINTS)
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        let http_addr_raw = get("CHANGEFEED_HTTP_ADDR", DEFAULT_HTTP_ADDR);
        let http_addr = http_addr_raw
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(http_addr_raw.clone()))?;

        let timeout_raw = get(
            "CHANGEFEED_REQUEST_TIMEOUT_SECS",
            &DEFAULT_REQUEST_TIMEOUT_SECS.to_string(),
        );
        let timeout_secs: u64 = timeout_raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber {
                name: "CHANGEFEED_REQUEST_TIMEOUT_SECS".to_string(),
                value: timeout_raw.clone(),
            })?;

        let config = Self {
            store_backend,
            endpoints,
            watch_prefix: get("CHANGEFEED_WATCH_PREFIX", DEFAULT_WATCH_PREFIX),
            log_path: PathBuf::from(get("CHANGEFEED_LOG_PATH", DEFAULT_LOG_PATH)),
            time_zone: get("CHANGEFEED_TIMEZONE", DEFAULT_TIME_ZONE),
            http_addr,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that endpoints and the time zone resolve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_backend == StoreBackend::Etcd {
            if self.endpoints.is_empty() {
                return Err(ConfigError::NoEndpoints);
            }
            for endpoint in &self.endpoints {
                let valid = reqwest::Url::parse(endpoint)
                    .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
                    .unwrap_or(false);
                if !valid {
                    return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
                }
            }
        }

        EventLogger::resolve_zone(&self.time_zone)
            .map_err(|_| ConfigError::UnknownTimeZone(self.time_zone.clone()))?;

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Etcd,
            endpoints: DEFAULT_ENDPOINTS.split(',').map(str::to_string).collect(),
            watch_prefix: DEFAULT_WATCH_PREFIX.to_string(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}
