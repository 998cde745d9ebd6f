//! HTTP gateway
//!
//! Thin pass-through from HTTP to the store client:
//! - `GET /:key` - Get one key
//! - `GET /` - List all keys
//! - `POST /` - Put a key
//! - `GET /health` - Liveness check
//!
//! Handlers never touch the change log; the watcher observes their writes
//! through the store's feed.

pub mod error;
pub mod handlers;
pub mod http;

pub use error::ApiError;
pub use http::create_router;
