//! etcd v3 client over the JSON gateway
//!
//! etcd exposes its gRPC API as JSON at `/v3/...` on the client port. Keys
//! and values travel base64-encoded and int64 fields are encoded as JSON
//! strings. Watch responses arrive as newline-delimited JSON objects on a
//! single long-lived streaming response.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use super::{prefix_range, KvStore, StoreError, StoreResult, WatchStream};
use crate::types::{ChangeEvent, KeyValue, WatchBatch};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    #[serde(default, deserialize_with = "de_i64")]
    revision: i64,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<WireKv>,
}

#[derive(Debug, Deserialize)]
struct WireKv {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default, deserialize_with = "de_i64")]
    mod_revision: i64,
}

#[derive(Debug, Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    #[serde(default)]
    header: ResponseHeader,
}

#[derive(Debug, Serialize)]
struct DeleteRangeRequest {
    key: String,
}

#[derive(Debug, Deserialize)]
struct DeleteRangeResponse {
    #[serde(default, deserialize_with = "de_i64")]
    deleted: i64,
}

#[derive(Debug, Serialize)]
struct WatchRequest {
    create_request: WatchCreateRequest,
}

#[derive(Debug, Serialize)]
struct WatchCreateRequest {
    key: String,
    range_end: String,
}

/// One line of the watch stream
#[derive(Debug, Deserialize)]
struct WatchEnvelope {
    result: Option<WatchResponse>,
    error: Option<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct WatchResponse {
    #[serde(default)]
    header: ResponseHeader,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    cancel_reason: String,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    /// Omitted for PUT (proto3 default enum value)
    #[serde(default, rename = "type")]
    kind: Option<String>,
    kv: Option<WireKv>,
}

/// Error body returned by the gateway
#[derive(Debug, Default, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

impl GatewayError {
    fn describe(&self) -> String {
        if !self.message.is_empty() {
            self.message.clone()
        } else {
            self.error.clone()
        }
    }
}

/// int64 fields come as strings from the gateway but accept numbers too
fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Text(String),
        Number(i64),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode(text: &str) -> StoreResult<String> {
    let bytes = STANDARD
        .decode(text)
        .map_err(|e| StoreError::Decode(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Decode(format!("non UTF-8 data: {}", e)))
}

impl WireKv {
    fn into_key_value(self) -> StoreResult<KeyValue> {
        Ok(KeyValue::new(decode(&self.key)?, decode(&self.value)?))
    }
}

impl WireEvent {
    fn into_change_event(self) -> StoreResult<ChangeEvent> {
        let kv = self
            .kv
            .ok_or_else(|| StoreError::Decode("watch event without kv".to_string()))?;
        let key = decode(&kv.key)?;

        match self.kind.as_deref() {
            Some("DELETE") => Ok(ChangeEvent::delete(key, kv.mod_revision)),
            None | Some("PUT") => Ok(ChangeEvent::put(key, decode(&kv.value)?, kv.mod_revision)),
            Some(other) => Err(StoreError::Decode(format!("unknown event type '{}'", other))),
        }
    }
}

/// Decode one newline-delimited watch message
///
/// Returns `None` for messages that carry no events (watch created,
/// progress notifications, blank keep-alive lines).
fn decode_watch_line(line: &[u8]) -> StoreResult<Option<WatchBatch>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let envelope: WatchEnvelope =
        serde_json::from_str(text).map_err(|e| StoreError::Decode(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Err(StoreError::Grpc {
            code: error.code,
            message: error.describe(),
        });
    }

    let Some(response) = envelope.result else {
        return Ok(None);
    };

    if response.canceled {
        return Err(StoreError::WatchCanceled(response.cancel_reason));
    }

    if response.events.is_empty() {
        return Ok(None);
    }

    let events = response
        .events
        .into_iter()
        .map(WireEvent::into_change_event)
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(Some(WatchBatch::new(response.header.revision, events)))
}

/// Split a chunked watch body into messages and decode each one
fn watch_batches<S, B>(mut chunks: S) -> impl Stream<Item = StoreResult<WatchBatch>>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            pending.extend_from_slice(chunk.as_ref());

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if let Some(batch) = decode_watch_line(&line)? {
                    yield batch;
                }
            }
        }

        // Body ended; a final message may lack its delimiter
        if let Some(batch) = decode_watch_line(&pending)? {
            yield batch;
        }
    }
}

// ============================================================================
// EtcdStore
// ============================================================================

/// etcd client speaking the v3 JSON gateway
///
/// Unary calls try each endpoint in order until one accepts the
/// connection. The watch opens one streaming request on the first reachable
/// endpoint and stays there for its lifetime.
pub struct EtcdStore {
    /// Client for unary calls, bounded by the request timeout
    client: Client,
    /// Client for watches; no overall timeout since the body never ends
    watch_client: Client,
    endpoints: Vec<String>,
}

impl EtcdStore {
    /// Create a client for the given endpoints (e.g. `http://etcd1:2379`)
    pub fn new(endpoints: Vec<String>, request_timeout: Duration) -> StoreResult<Self> {
        if endpoints.is_empty() {
            return Err(StoreError::NoEndpoints);
        }

        let client = Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .build()?;
        let watch_client = Client::builder().connect_timeout(request_timeout).build()?;

        let endpoints = endpoints
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .collect();

        Ok(Self {
            client,
            watch_client,
            endpoints,
        })
    }

    /// Configured endpoints, in failover order
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// POST `body` to `path` on the first endpoint that accepts the connection
    async fn send<Req: Serialize>(
        &self,
        client: &Client,
        path: &str,
        body: &Req,
    ) -> StoreResult<Response> {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let url = format!("{}{}", endpoint, path);
            match client.post(&url).json(body).send().await {
                Ok(response) => return Self::check_status(response).await,
                // Only connection failures are safe to retry elsewhere
                Err(e) if e.is_connect() => {
                    warn!(endpoint = %endpoint, error = %e, "etcd endpoint unreachable, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error.map(StoreError::from).unwrap_or(StoreError::NoEndpoints))
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> StoreResult<Resp> {
        let response = self.send(&self.client, path, body).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn check_status(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GatewayError>(&body)
            .map(|e| e.describe())
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);

        Err(StoreError::Status {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>> {
        let request = RangeRequest {
            key: encode(key.as_bytes()),
            range_end: None,
        };
        let response: RangeResponse = self.call("/v3/kv/range", &request).await?;

        response
            .kvs
            .into_iter()
            .next()
            .map(WireKv::into_key_value)
            .transpose()
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<KeyValue>> {
        let (start, end) = prefix_range(prefix);
        let request = RangeRequest {
            key: encode(&start),
            range_end: Some(encode(&end)),
        };
        let response: RangeResponse = self.call("/v3/kv/range", &request).await?;

        response
            .kvs
            .into_iter()
            .map(WireKv::into_key_value)
            .collect()
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<i64> {
        let request = PutRequest {
            key: encode(key.as_bytes()),
            value: encode(value.as_bytes()),
        };
        let response: PutResponse = self.call("/v3/kv/put", &request).await?;
        debug!(key = %key, revision = response.header.revision, "etcd put");
        Ok(response.header.revision)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let request = DeleteRangeRequest {
            key: encode(key.as_bytes()),
        };
        let response: DeleteRangeResponse = self.call("/v3/kv/deleterange", &request).await?;
        Ok(response.deleted > 0)
    }

    async fn watch(&self, prefix: &str) -> StoreResult<WatchStream> {
        let (start, end) = prefix_range(prefix);
        let request = WatchRequest {
            create_request: WatchCreateRequest {
                key: encode(&start),
                range_end: encode(&end),
            },
        };

        let response = self.send(&self.watch_client, "/v3/watch", &request).await?;
        debug!(prefix = %prefix, "etcd watch opened");

        Ok(watch_batches(Box::pin(response.bytes_stream())).boxed())
    }
}
