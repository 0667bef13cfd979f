//! End-to-end properties of the aggregation engine, driven against stub
//! daemons listening on ephemeral ports.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use syncfleet::config::{HostFilter, Instance, InstanceRegistry};
use syncfleet::syncthing::aggregator::Aggregator;
use syncfleet::syncthing::client::DaemonClient;
use syncfleet::syncthing::control;
use syncfleet::syncthing::model::FolderState;

/// Configurable stub daemon. Endpoints listed in `fail` answer 500; the
/// status endpoint can be delayed to simulate a stalled daemon.
#[derive(Clone, Default)]
struct Stub {
    status_delay: Option<Duration>,
    fail: Arc<HashSet<String>>,
    status_hits: Arc<AtomicUsize>,
    folder_puts: Arc<Mutex<Vec<Value>>>,
    pause_posts: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl Stub {
    fn with_failures(keys: &[&str]) -> Self {
        Self {
            fail: Arc::new(keys.iter().map(|k| k.to_string()).collect()),
            ..Default::default()
        }
    }

    fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    fn fails(&self, key: &str) -> bool {
        self.fail.contains(key)
    }
}

fn config_json() -> Value {
    json!({
        "folders": [
            {"id": "docs", "label": "Docs", "devices": [
                {"deviceID": "AAA"}, {"deviceID": "BBB"}, {"deviceID": "CCC"}
            ]},
            {"id": "music", "label": "Music", "paused": true, "devices": [
                {"deviceID": "AAA"}, {"deviceID": "BBB"}
            ]}
        ],
        "devices": [
            {"deviceID": "AAA", "name": "alpha"},
            {"deviceID": "BBB", "name": "bravo"},
            {"deviceID": "CCC"}
        ]
    })
}

async fn status(State(stub): State<Stub>) -> Response {
    stub.status_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = stub.status_delay {
        tokio::time::sleep(delay).await;
    }
    if stub.fails("status") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({"myID": "AAA", "uptime": 3600})).into_response()
}

async fn connections(State(stub): State<Stub>) -> Response {
    if stub.fails("connections") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({
        "total": {"bytesSent": 7200, "bytesReceived": 3600},
        "connections": {
            "BBB": {
                "connected": true,
                "inBytesPerSecond": 100,
                "outBytesPerSecond": 50,
                "address": "192.0.2.9:22000",
                "connectedAt": "2026-01-01T00:00:00Z"
            },
            "CCC": {"connected": false}
        }
    }))
    .into_response()
}

async fn device_stats(State(stub): State<Stub>) -> Response {
    if stub.fails("device-stats") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({
        "BBB": {"lastSeen": "2026-01-05T00:00:00Z", "lastConnectionDurationS": 42.5}
    }))
    .into_response()
}

async fn full_config(State(stub): State<Stub>) -> Response {
    if stub.fails("config") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(config_json()).into_response()
}

async fn folders_config(State(stub): State<Stub>) -> Response {
    if stub.fails("config-folders") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(config_json()["folders"].clone()).into_response()
}

async fn devices_config(State(stub): State<Stub>) -> Response {
    if stub.fails("config-devices") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(config_json()["devices"].clone()).into_response()
}

async fn system_errors(State(stub): State<Stub>) -> Response {
    if stub.fails("system-error") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({"errors": [
        {"when": "2026-01-01T00:00:00Z", "message": "listener failed"}
    ]}))
    .into_response()
}

async fn events(State(stub): State<Stub>) -> Response {
    if stub.fails("events") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!([
        {"id": 1, "type": "ItemFinished", "time": "2026-01-03T00:00:00Z",
         "data": {"folder": "docs", "item": "notes.txt", "action": "update"}}
    ]))
    .into_response()
}

async fn db_status(State(stub): State<Stub>) -> Response {
    if stub.fails("db-status") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({
        "state": "idle",
        "needBytes": 10,
        "needItems": 2,
        "stateChanged": "2026-01-02T00:00:00Z"
    }))
    .into_response()
}

async fn completion(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let device = params.get("device").cloned().unwrap_or_default();
    if stub.fails(&format!("completion:{device}")) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({"completion": 50.0, "globalItems": 10, "needItems": 5})).into_response()
}

async fn folder_stats(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if stub.fails("folder-stats") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let folder = params.get("folder").cloned().unwrap_or_default();
    let mut map = serde_json::Map::new();
    map.insert(
        folder,
        json!({
            "lastFile": {"filename": "song.mp3", "at": "2026-01-02T03:04:05Z"},
            "lastScan": "2026-01-02T00:00:00Z"
        }),
    );
    Json(Value::Object(map)).into_response()
}

async fn get_folder_config(Path(id): Path<String>) -> Response {
    Json(json!({"id": id, "label": "Docs", "paused": false})).into_response()
}

async fn put_folder_config(
    State(stub): State<Stub>,
    Path(_id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    stub.folder_puts.lock().await.push(body);
    StatusCode::OK
}

async fn system_pause(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    stub.pause_posts.lock().await.push(params);
    StatusCode::OK
}

fn daemon_router(stub: Stub) -> Router {
    Router::new()
        .route("/rest/system/status", get(status))
        .route("/rest/system/connections", get(connections))
        .route("/rest/stats/device", get(device_stats))
        .route("/rest/config", get(full_config))
        .route("/rest/config/folders", get(folders_config))
        .route("/rest/config/devices", get(devices_config))
        .route("/rest/system/error", get(system_errors))
        .route("/rest/events", get(events))
        .route("/rest/db/status", get(db_status))
        .route("/rest/db/completion", get(completion))
        .route("/rest/stats/folder", get(folder_stats))
        .route(
            "/rest/config/folders/{id}",
            get(get_folder_config).put(put_folder_config),
        )
        .route("/rest/system/pause", post(system_pause))
        .with_state(stub)
}

async fn spawn_daemon(stub: Stub) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = daemon_router(stub);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn instance(name: &str, addr: SocketAddr) -> Instance {
    Instance {
        name: name.to_string(),
        base_url: format!("http://{addr}"),
        api_key: "test-key".to_string(),
    }
}

fn aggregator(instances: Vec<Instance>, deadline: Duration) -> Aggregator {
    Aggregator::new(InstanceRegistry::new(instances), reqwest::Client::new(), deadline)
}

#[tokio::test]
async fn healthy_node_is_fully_populated() {
    let addr = spawn_daemon(Stub::default()).await;
    let agg = aggregator(vec![instance("one", addr)], Duration::from_secs(5));

    let batch = agg.query(HostFilter::All).await;
    assert!(batch.error.is_none());
    assert_eq!(batch.nodes.len(), 1);

    let node = &batch.nodes[0];
    assert!(node.ok);
    assert!(node.error.is_none());
    // Daemon-reported identity overrides the registry name.
    assert_eq!(node.name, "alpha");

    let stats = node.stats.as_ref().unwrap();
    assert_eq!(stats.uptime_seconds, 3600);
    assert_eq!(stats.bytes_sent, 7200);
    assert_eq!(stats.avg_send_bps, 2.0);
    assert_eq!(stats.avg_recv_bps, 1.0);
    assert_eq!(stats.fastest_peer_device_id.as_deref(), Some("BBB"));
    assert_eq!(stats.fastest_peer_total_bps, 150);

    assert_eq!(node.devices.len(), 2);
    let bravo = &node.devices[0];
    assert_eq!(bravo.device_id, "BBB");
    assert_eq!(bravo.name, "bravo");
    assert!(bravo.online);
    assert_eq!(bravo.in_bps, 100);
    assert!(bravo.uptime_seconds.unwrap() > 0);
    assert_eq!(bravo.device_stats.as_ref().unwrap().last_seen, "2026-01-05T00:00:00Z");
    let unnamed = &node.devices[1];
    assert_eq!(unnamed.device_id, "CCC");
    assert_eq!(unnamed.name, "CCC");
    assert!(!unnamed.online);
    assert!(unnamed.device_stats.is_none());

    assert_eq!(node.shares.count, 2);
    assert_eq!(node.shares.peers, vec!["CCC", "bravo"]);
    assert_eq!(node.paused_folders, vec!["Music"]);
    assert_eq!(node.out_of_sync_items, 4);
    assert_eq!(node.errors.len(), 1);
    assert_eq!(node.per_device_folders["bravo"], vec!["Docs", "Music"]);

    assert_eq!(node.folders.len(), 2);
    let docs = node.folders.iter().find(|f| f.id == "docs").unwrap();
    assert_eq!(docs.state, FolderState::Idle);
    assert_eq!(docs.need_items, Some(2));
    assert_eq!(docs.completion_pct, Some(50.0));
    assert_eq!(docs.folder_stats.as_ref().unwrap().filename, "song.mp3");
    // Latest change comes from the event stream for docs...
    assert_eq!(docs.latest_change.as_ref().unwrap().file, "notes.txt");

    // ...and from the state-changed fallback for the folder with no events.
    let music = node.folders.iter().find(|f| f.id == "music").unwrap();
    assert_eq!(music.latest_change.as_ref().unwrap().file, "State changed");

    // Peer list covers every member including self, sorted by display name.
    let ids: Vec<&str> = docs.peers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["AAA", "BBB", "CCC"]);
    let local = &docs.peers[0];
    assert!(local.online);
    assert_eq!(local.items.global_items, Some(10));
    assert_eq!(local.items.synced_items, Some(5));
    assert_eq!(local.items.completion_pct, Some(50.0));
}

#[tokio::test]
async fn results_keep_registry_order_regardless_of_completion_order() {
    let slow = spawn_daemon(Stub::default().with_status_delay(Duration::from_millis(300))).await;
    let mid = spawn_daemon(Stub::default().with_status_delay(Duration::from_millis(100))).await;
    let fast = spawn_daemon(Stub::default()).await;

    let agg = aggregator(
        vec![instance("slow", slow), instance("mid", mid), instance("fast", fast)],
        Duration::from_secs(5),
    );

    let batch = agg.query(HostFilter::All).await;
    assert!(batch.error.is_none());
    let urls: Vec<String> = batch.nodes.iter().map(|n| n.base_url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            format!("http://{slow}"),
            format!("http://{mid}"),
            format!("http://{fast}")
        ]
    );
    assert!(batch.nodes.iter().all(|n| n.ok));
}

#[tokio::test]
async fn baseline_failure_degrades_the_whole_node() {
    let addr = spawn_daemon(Stub::with_failures(&["connections"])).await;
    let agg = aggregator(vec![instance("one", addr)], Duration::from_secs(5));

    let batch = agg.query(HostFilter::All).await;
    let node = &batch.nodes[0];
    assert!(!node.ok);
    assert!(node.error.is_some());
    assert_eq!(node.name, "one");
    assert!(node.stats.is_none());
    assert!(node.devices.is_empty());
    assert!(node.folders.is_empty());
    assert_eq!(node.shares.count, 0);
}

#[tokio::test]
async fn optional_failures_leave_the_node_ok() {
    let addr = spawn_daemon(Stub::with_failures(&[
        "device-stats",
        "events",
        "folder-stats",
        "system-error",
    ]))
    .await;
    let agg = aggregator(vec![instance("one", addr)], Duration::from_secs(5));

    let batch = agg.query(HostFilter::All).await;
    let node = &batch.nodes[0];
    assert!(node.ok);
    assert!(node.errors.is_empty());
    assert!(node.devices.iter().all(|d| d.device_stats.is_none()));
    assert_eq!(node.folders.len(), 2);
    for folder in &node.folders {
        assert!(folder.folder_stats.is_none());
        // Events were unavailable, so the state-changed fallback applies.
        assert_eq!(folder.latest_change.as_ref().unwrap().file, "State changed");
    }
}

#[tokio::test]
async fn failed_peer_completion_keeps_membership_visible() {
    let addr = spawn_daemon(Stub::with_failures(&["completion:BBB"])).await;
    let agg = aggregator(vec![instance("one", addr)], Duration::from_secs(5));

    let batch = agg.query(HostFilter::All).await;
    let node = &batch.nodes[0];
    assert!(node.ok);

    let docs = node.folders.iter().find(|f| f.id == "docs").unwrap();
    assert_eq!(docs.peers.len(), 3);
    let failed = docs.peers.iter().find(|p| p.id == "BBB").unwrap();
    assert_eq!(failed.name, "bravo");
    assert!(failed.items.global_items.is_none());
    assert!(failed.items.need_items.is_none());
    assert!(failed.items.synced_items.is_none());
    assert!(failed.items.completion_pct.is_none());
    for peer in docs.peers.iter().filter(|p| p.id != "BBB") {
        assert!(peer.items.global_items.is_some());
    }
}

#[tokio::test]
async fn config_failure_yields_empty_shares_but_ok_node() {
    let addr = spawn_daemon(Stub::with_failures(&[
        "config",
        "config-folders",
        "config-devices",
    ]))
    .await;
    let agg = aggregator(vec![instance("one", addr)], Duration::from_secs(5));

    let batch = agg.query(HostFilter::All).await;
    let node = &batch.nodes[0];
    assert!(node.ok);
    assert_eq!(node.name, "one");
    assert_eq!(node.shares.count, 0);
    assert!(node.shares.peers.is_empty());
    assert!(node.folders.is_empty());
    assert!(node.paused_folders.is_empty());
    assert!(node.per_device_folders.is_empty());
    assert_eq!(node.out_of_sync_items, 0);
    // Connection-table rows survive without config, names fall back to ids.
    assert_eq!(node.devices.len(), 2);
    assert_eq!(node.devices[0].name, "BBB");
}

#[tokio::test]
async fn deadline_returns_partial_results() {
    let stalled = spawn_daemon(Stub::default().with_status_delay(Duration::from_secs(30))).await;
    let healthy = spawn_daemon(Stub::default()).await;

    let agg = aggregator(
        vec![instance("stalled", stalled), instance("healthy", healthy)],
        Duration::from_millis(500),
    );

    let batch = agg.query(HostFilter::All).await;
    assert!(batch.error.as_deref().unwrap().contains("deadline"));
    assert_eq!(batch.nodes.len(), 2);
    assert!(!batch.nodes[0].ok);
    assert!(batch.nodes[0].error.as_deref().unwrap().contains("deadline"));
    assert!(batch.nodes[1].ok);
}

#[tokio::test]
async fn filtered_out_registry_returns_empty_without_network_calls() {
    // Remote-class address that would hang if it were ever contacted.
    let remote = Instance {
        name: "far".to_string(),
        base_url: "http://8.8.8.8:9".to_string(),
        api_key: "k".to_string(),
    };
    let agg = aggregator(vec![remote], Duration::from_secs(5));

    let batch = agg.query(HostFilter::Loopback).await;
    assert!(batch.nodes.is_empty());
    assert!(batch.error.is_none());
}

#[tokio::test]
async fn overlapping_queries_share_one_batch() {
    let stub = Stub::default().with_status_delay(Duration::from_millis(100));
    let hits = stub.status_hits.clone();
    let addr = spawn_daemon(stub).await;
    let agg = aggregator(vec![instance("one", addr)], Duration::from_secs(5));

    let (first, second) = tokio::join!(agg.query(HostFilter::All), agg.query(HostFilter::All));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(first.nodes.len(), 1);
    assert_eq!(second.nodes.len(), 1);
}

#[tokio::test]
async fn pause_resume_writes_through_to_the_daemon() {
    let stub = Stub::default();
    let folder_puts = stub.folder_puts.clone();
    let pause_posts = stub.pause_posts.clone();
    let addr = spawn_daemon(stub).await;

    let inst = instance("one", addr);
    let client = DaemonClient::new(reqwest::Client::new(), &inst, CancellationToken::new());

    control::set_folder_paused(&client, "docs", true).await.unwrap();
    let puts = folder_puts.lock().await;
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0]["paused"], json!(true));
    // The rest of the folder configuration is written back untouched.
    assert_eq!(puts[0]["label"], json!("Docs"));
    drop(puts);

    control::set_device_paused(&client, "BBB", false).await.unwrap();
    let posts = pause_posts.lock().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["device"], "BBB");
    assert_eq!(posts[0]["pause"], "false");
}
