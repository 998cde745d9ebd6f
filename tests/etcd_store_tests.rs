//! Integration tests for the etcd JSON gateway client
//!
//! A wiremock server stands in for etcd's `/v3` HTTP API.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use changefeed_gateway::{
    ChangeEvent, ChangeKind, ChangeWatcher, EtcdStore, EventLogger, KeyValue, KvStore, MemorySink,
    LogRecord, StoreError, WatchError,
};

// base64 of the strings used below
const KEY_A: &str = "YQ=="; // "a"
const VALUE_1: &str = "MQ=="; // "1"
const KEY1: &str = "a2V5MQ=="; // "key1"
const KEY2: &str = "a2V5Mg=="; // "key2"
const V1: &str = "djE="; // "v1"
const PREFIX_KEY: &str = "a2V5"; // "key"
const PREFIX_END: &str = "a2V6"; // "kez"
const NUL: &str = "AA=="; // "\0"

fn store_for(server: &MockServer) -> EtcdStore {
    EtcdStore::new(vec![server.uri()], Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_get_existing_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/range"))
        .and(body_partial_json(json!({ "key": KEY_A })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "revision": "5" },
            "kvs": [{ "key": KEY_A, "value": VALUE_1, "mod_revision": "4" }],
            "count": "1"
        })))
        .mount(&server)
        .await;

    let kv = store_for(&server).get("a").await.unwrap();
    assert_eq!(kv, Some(KeyValue::new("a", "1")));
}

#[tokio::test]
async fn test_get_missing_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "revision": "5" }
        })))
        .mount(&server)
        .await;

    assert!(store_for(&server).get("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_whole_keyspace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/range"))
        .and(body_partial_json(json!({ "key": NUL, "range_end": NUL })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "revision": "9" },
            "kvs": [
                { "key": KEY_A, "value": VALUE_1 },
                { "key": KEY1, "value": V1 }
            ],
            "count": "2"
        })))
        .mount(&server)
        .await;

    let listed = store_for(&server).list("").await.unwrap();
    assert_eq!(
        listed,
        vec![KeyValue::new("a", "1"), KeyValue::new("key1", "v1")]
    );
}

#[tokio::test]
async fn test_put_returns_revision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/put"))
        .and(body_partial_json(json!({ "key": KEY_A, "value": VALUE_1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "cluster_id": "1", "member_id": "2", "revision": "7", "raft_term": "3" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let revision = store_for(&server).put("a", "1").await.unwrap();
    assert_eq!(revision, 7);
}

#[tokio::test]
async fn test_delete_reports_deleted_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/deleterange"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "revision": "8" },
            "deleted": "1"
        })))
        .mount(&server)
        .await;

    assert!(store_for(&server).delete("a").await.unwrap());
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/put"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "etcdserver: key is not provided",
            "code": 3,
            "message": "etcdserver: key is not provided"
        })))
        .mount(&server)
        .await;

    let err = store_for(&server).put("", "x").await.unwrap_err();
    match err {
        StoreError::Status { code, message } => {
            assert_eq!(code, 400);
            assert_eq!(message, "etcdserver: key is not provided");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fails_over_to_next_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/kv/range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kvs": [{ "key": KEY_A, "value": VALUE_1 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Nothing listens on port 1
    let store = EtcdStore::new(
        vec!["http://127.0.0.1:1".to_string(), server.uri()],
        Duration::from_secs(2),
    )
    .unwrap();

    let kv = store.get("a").await.unwrap();
    assert_eq!(kv, Some(KeyValue::new("a", "1")));
}

#[tokio::test]
async fn test_all_endpoints_down_is_transport_error() {
    let store = EtcdStore::new(
        vec!["http://127.0.0.1:1".to_string()],
        Duration::from_secs(2),
    )
    .unwrap();

    let err = store.get("a").await.unwrap_err();
    assert!(matches!(err, StoreError::Transport(_)));
}

fn watch_body() -> String {
    [
        json!({ "result": { "header": { "revision": "3" }, "created": true } }),
        json!({ "result": {
            "header": { "revision": "4" },
            "events": [{ "kv": { "key": KEY1, "value": V1, "mod_revision": "4" } }]
        } }),
        json!({ "result": {
            "header": { "revision": "6" },
            "events": [
                { "kv": { "key": KEY2, "value": V1, "mod_revision": "5" } },
                { "type": "DELETE", "kv": { "key": KEY1, "mod_revision": "6" } }
            ]
        } }),
    ]
    .iter()
    .map(|v| format!("{}\n", v))
    .collect()
}

async fn mount_watch(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3/watch"))
        .and(body_partial_json(json!({
            "create_request": { "key": PREFIX_KEY, "range_end": PREFIX_END }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(watch_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_watch_decodes_batches() {
    let server = MockServer::start().await;
    mount_watch(&server).await;

    let mut feed = store_for(&server).watch("key").await.unwrap();

    let first = feed.next().await.unwrap().unwrap();
    assert_eq!(first.revision, 4);
    assert_eq!(first.events, vec![ChangeEvent::put("key1", "v1", 4)]);

    let second = feed.next().await.unwrap().unwrap();
    assert_eq!(second.events.len(), 2);
    assert_eq!(second.events[1], ChangeEvent::delete("key1", 6));

    // The mock body ends, like a dropped connection
    assert!(feed.next().await.is_none());
}

#[tokio::test]
async fn test_watcher_over_etcd_logs_events_then_terminates() {
    let server = MockServer::start().await;
    mount_watch(&server).await;

    let sink = Arc::new(MemorySink::new());
    let logger = Arc::new(EventLogger::new(sink.clone(), "UTC"));
    let watcher = ChangeWatcher::new(Arc::new(store_for(&server)), logger, "key");

    let err = watcher.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, WatchError::SubscriptionTerminated { .. }));

    let records: Vec<LogRecord> = sink
        .lines()
        .iter()
        .map(|line| LogRecord::from_json_line(line).unwrap())
        .collect();
    let summary: Vec<(&str, ChangeKind, i64)> = records
        .iter()
        .map(|r| (r.key.as_str(), r.kind, r.revision))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("key1", ChangeKind::Put, 4),
            ("key2", ChangeKind::Put, 5),
            ("key1", ChangeKind::Delete, 6),
        ]
    );
}

#[tokio::test]
async fn test_watch_open_failure_is_feed_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/watch"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let logger = Arc::new(EventLogger::new(sink.clone(), "UTC"));
    let watcher = ChangeWatcher::new(Arc::new(store_for(&server)), logger, "key");

    let err = watcher.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        WatchError::Feed(StoreError::Status { code: 503, .. })
    ));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_watch_stream_error_keeps_grpc_code() {
    let server = MockServer::start().await;
    let body = format!(
        "{}\n",
        json!({ "error": { "grpc_code": 14, "http_code": 503, "message": "etcdserver: no leader", "code": 14 } })
    );
    Mock::given(method("POST"))
        .and(path("/v3/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut feed = store_for(&server).watch("key").await.unwrap();
    let err = feed.next().await.unwrap().unwrap_err();
    assert!(matches!(err, StoreError::Grpc { code: 14, .. }));
}
