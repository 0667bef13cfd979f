//! Per-instance collection: turns one configured instance into one node
//! record, absorbing every sub-fetch failure at the narrowest scope that has
//! a sensible default. Only the two baseline calls escalate to the whole
//! node.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::config::Instance;
use crate::syncthing::api::{
    Completion, CompletionQuery, ConnectionsResponse, DaemonConfig, DbStatus, DeviceConfig,
    DeviceStats, Event, EventsQuery, FolderConfig, FolderQuery, FolderStats, RecentError,
    SystemErrors, SystemStatus,
};
use crate::syncthing::client::DaemonClient;
use crate::syncthing::metrics;
use crate::syncthing::model::{
    CompletionItems, DeviceRow, DeviceStatsRow, FolderChange, FolderRow, FolderState,
    FolderStatsRow, Node, PeerCompletion, ShareSummary, TransferStats,
};
use crate::types::DaemonError;

const RECENT_ERRORS_LIMIT: usize = 5;
const EVENTS_WINDOW_SECS: i64 = 2 * 60 * 60;
const EVENTS_LIMIT: u32 = 50;
/// Local wait for the events query, deliberately far below the batch
/// deadline so one slow event log cannot stall the whole refresh.
const EVENTS_WAIT: Duration = Duration::from_millis(100);
const FOLDER_CONCURRENCY: usize = 4;
const PEER_CONCURRENCY: usize = 8;

/// Builds exactly one node from one instance. Never fails.
pub async fn collect_node(client: &DaemonClient, instance: &Instance) -> Node {
    let (status, connections) = tokio::join!(
        client.get_json::<SystemStatus>("/rest/system/status"),
        client.get_json::<ConnectionsResponse>("/rest/system/connections"),
    );
    let (status, connections) = match (status, connections) {
        (Ok(status), Ok(connections)) => (status, connections),
        (Err(err), _) | (_, Err(err)) => {
            warn!(instance = %instance.name, error = %err, "Baseline fetch failed");
            return Node::unreachable(instance, err.to_string());
        }
    };

    let (device_stats, config, recent_errors, events) = tokio::join!(
        fetch_device_stats(client, instance),
        fetch_config(client, instance),
        fetch_recent_errors(client, instance),
        fetch_recent_events(client, instance),
    );

    let now = Utc::now();
    let my_id = status.my_id.as_deref();
    let name_by_id = config.as_ref().map(device_name_map).unwrap_or_default();
    let online: HashSet<String> = connections
        .connections
        .iter()
        .filter(|(_, conn)| conn.connected)
        .map(|(id, _)| id.clone())
        .collect();

    let fastest = metrics::fastest_peer(&connections.connections);
    let stats = TransferStats {
        uptime_seconds: status.uptime,
        bytes_sent: connections.total.bytes_sent,
        bytes_received: connections.total.bytes_received,
        avg_send_bps: metrics::throughput(connections.total.bytes_sent, status.uptime),
        avg_recv_bps: metrics::throughput(connections.total.bytes_received, status.uptime),
        fastest_peer_device_id: fastest.map(|(id, _)| id.to_string()),
        fastest_peer_total_bps: fastest.map(|(_, bps)| bps).unwrap_or(0),
    };

    let mut node = Node {
        name: instance.name.clone(),
        ok: true,
        error: None,
        base_url: instance.base_url.clone(),
        stats: Some(stats),
        devices: device_rows(&connections, device_stats.as_ref(), &name_by_id, my_id, now),
        errors: recent_errors,
        ..Default::default()
    };

    let Some(config) = config else {
        return node;
    };

    // Prefer the daemon's own idea of who it is over the registry name.
    if let Some(local) = local_display_name(&status, &name_by_id) {
        node.name = local;
    }

    let changes = latest_changes(events.as_deref().unwrap_or(&[]));
    let ctx = FolderContext {
        my_id,
        name_by_id: &name_by_id,
        online: &online,
        changes: &changes,
    };

    let folder_futures: Vec<_> = config
        .folders
        .iter()
        .filter(|f| !f.id.is_empty())
        .map(|folder| collect_folder(client, instance, folder, &ctx))
        .collect();
    node.folders = stream::iter(folder_futures)
        .buffered(FOLDER_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

    node.out_of_sync_items = node.folders.iter().map(|f| f.need_items.unwrap_or(0)).sum();

    let (shares, paused_folders, per_device_folders) = derive_shares(&config, my_id, &name_by_id);
    node.shares = shares;
    node.paused_folders = paused_folders;
    node.per_device_folders = per_device_folders;

    node
}

/// Shared lookup context for the per-folder fetches.
struct FolderContext<'a> {
    my_id: Option<&'a str>,
    name_by_id: &'a HashMap<String, String>,
    online: &'a HashSet<String>,
    changes: &'a HashMap<String, FolderChange>,
}

async fn collect_folder(
    client: &DaemonClient,
    instance: &Instance,
    folder: &FolderConfig,
    ctx: &FolderContext<'_>,
) -> FolderRow {
    let status_query = FolderQuery { folder: &folder.id };
    let (db_status, local_completion, folder_stats) = tokio::join!(
        client.get_json_with_query::<DbStatus, _>("/rest/db/status", &status_query),
        fetch_local_completion(client, folder, ctx.my_id),
        fetch_folder_stats(client, instance, folder),
    );

    let (db_status, local_completion) = match (db_status, local_completion) {
        (Ok(db_status), Ok(local_completion)) => (db_status, local_completion),
        (Err(err), _) | (_, Err(err)) => {
            warn!(
                instance = %instance.name,
                folder = %folder.id,
                error = %err,
                "Folder status unavailable"
            );
            return degraded_folder_row(folder, ctx);
        }
    };

    let peers = collect_peer_completions(client, instance, folder, ctx).await;

    let latest_change = ctx.changes.get(&folder.id).cloned().or_else(|| {
        db_status.state_changed.clone().map(|time| FolderChange {
            file: "State changed".to_string(),
            time,
            action: "state change".to_string(),
        })
    });

    FolderRow {
        id: folder.id.clone(),
        label: folder.display_label(),
        description: folder.description.clone(),
        state: FolderState::from_raw(db_status.state.as_deref()),
        need_bytes: db_status.need_bytes,
        need_items: db_status.need_items,
        completion_pct: local_completion.and_then(|c| c.completion),
        peers,
        latest_change,
        state_changed: db_status.state_changed,
        folder_stats,
        paused: db_status.paused,
    }
}

/// Folder row when its database status or local completion failed: state
/// degrades to unknown, membership stays visible through config-derived peer
/// stubs.
fn degraded_folder_row(folder: &FolderConfig, ctx: &FolderContext<'_>) -> FolderRow {
    let mut peers: Vec<PeerCompletion> = folder
        .member_ids()
        .into_iter()
        .filter(|id| ctx.my_id != Some(*id))
        .map(|id| peer_entry(id, CompletionItems::default(), ctx))
        .collect();
    peers.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    FolderRow {
        id: folder.id.clone(),
        label: folder.display_label(),
        description: folder.description.clone(),
        state: FolderState::Unknown,
        need_bytes: None,
        need_items: None,
        completion_pct: None,
        peers,
        latest_change: None,
        state_changed: None,
        folder_stats: None,
        paused: false,
    }
}

async fn collect_peer_completions(
    client: &DaemonClient,
    instance: &Instance,
    folder: &FolderConfig,
    ctx: &FolderContext<'_>,
) -> Vec<PeerCompletion> {
    let peer_futures: Vec<_> = folder
        .member_ids()
        .into_iter()
        .map(|peer_id| async move {
            let items = match fetch_peer_completion(client, folder, peer_id).await {
                Ok(completion) => {
                    let global = completion.global_items.unwrap_or(0);
                    let need = completion.need_items.unwrap_or(0);
                    let synced = metrics::synced_items(global, need);
                    CompletionItems {
                        global_items: Some(global),
                        need_items: Some(need),
                        synced_items: Some(synced),
                        completion_pct: Some(metrics::completion_pct(
                            completion.completion,
                            global,
                            synced,
                        )),
                    }
                }
                Err(err) => {
                    warn!(
                        instance = %instance.name,
                        folder = %folder.id,
                        device = %peer_id,
                        error = %err,
                        "Peer completion unavailable"
                    );
                    CompletionItems::default()
                }
            };
            peer_entry(peer_id, items, ctx)
        })
        .collect();
    let mut peers: Vec<PeerCompletion> = stream::iter(peer_futures)
        .buffered(PEER_CONCURRENCY)
        .collect()
        .await;

    peers.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    peers
}

async fn fetch_peer_completion(
    client: &DaemonClient,
    folder: &FolderConfig,
    device: &str,
) -> Result<Completion, DaemonError> {
    let query = CompletionQuery {
        folder: &folder.id,
        device,
    };
    client.get_json_with_query("/rest/db/completion", &query).await
}

async fn fetch_local_completion(
    client: &DaemonClient,
    folder: &FolderConfig,
    my_id: Option<&str>,
) -> Result<Option<Completion>, DaemonError> {
    let Some(device) = my_id else {
        return Ok(None);
    };
    let query = CompletionQuery {
        folder: &folder.id,
        device,
    };
    client.get_json_with_query("/rest/db/completion", &query).await.map(Some)
}

async fn fetch_folder_stats(
    client: &DaemonClient,
    instance: &Instance,
    folder: &FolderConfig,
) -> Option<FolderStatsRow> {
    let query = FolderQuery { folder: &folder.id };
    let stats: BTreeMap<String, FolderStats> =
        match client.get_json_with_query("/rest/stats/folder", &query).await {
            Ok(stats) => stats,
            Err(err) => {
                debug!(
                    instance = %instance.name,
                    folder = %folder.id,
                    error = %err,
                    "Folder stats unavailable"
                );
                return None;
            }
        };

    let entry = stats.get(&folder.id)?;
    let last_file = entry.last_file.as_ref()?;
    if last_file.filename.is_empty() || last_file.at.is_empty() {
        return None;
    }
    Some(FolderStatsRow {
        filename: last_file.filename.clone(),
        at: last_file.at.clone(),
        deleted: last_file.deleted,
        last_scan: entry.last_scan.clone(),
    })
}

async fn fetch_device_stats(
    client: &DaemonClient,
    instance: &Instance,
) -> Option<BTreeMap<String, DeviceStats>> {
    match client.get_json("/rest/stats/device").await {
        Ok(stats) => Some(stats),
        Err(err) => {
            warn!(instance = %instance.name, error = %err, "Device stats unavailable");
            None
        }
    }
}

/// Unified config first, then the folder- and device-scoped endpoints older
/// daemons expose. None when all of them fail.
async fn fetch_config(client: &DaemonClient, instance: &Instance) -> Option<DaemonConfig> {
    match client.get_json("/rest/config").await {
        Ok(config) => return Some(config),
        Err(err) => {
            debug!(
                instance = %instance.name,
                error = %err,
                "Unified config unavailable, trying scoped endpoints"
            );
        }
    }

    let (folders, devices) = tokio::join!(
        client.get_json::<Vec<FolderConfig>>("/rest/config/folders"),
        client.get_json::<Vec<DeviceConfig>>("/rest/config/devices"),
    );
    match (folders, devices) {
        (Ok(folders), Ok(devices)) => Some(DaemonConfig { folders, devices }),
        (Err(err), _) | (_, Err(err)) => {
            warn!(instance = %instance.name, error = %err, "Configuration unavailable");
            None
        }
    }
}

async fn fetch_recent_errors(client: &DaemonClient, instance: &Instance) -> Vec<RecentError> {
    match client.get_json::<SystemErrors>("/rest/system/error").await {
        Ok(errors) => {
            let mut items = errors.into_vec();
            items.truncate(RECENT_ERRORS_LIMIT);
            items
        }
        Err(err) => {
            debug!(instance = %instance.name, error = %err, "Recent errors unavailable");
            Vec::new()
        }
    }
}

async fn fetch_recent_events(client: &DaemonClient, instance: &Instance) -> Option<Vec<Event>> {
    let query = EventsQuery {
        since: Utc::now().timestamp() - EVENTS_WINDOW_SECS,
        limit: EVENTS_LIMIT,
    };
    let fetch = client.get_json_with_query::<Vec<Event>, _>("/rest/events", &query);
    match tokio::time::timeout(EVENTS_WAIT, fetch).await {
        Ok(Ok(events)) => Some(events),
        Ok(Err(err)) => {
            debug!(instance = %instance.name, error = %err, "Events unavailable");
            None
        }
        Err(_) => {
            debug!(instance = %instance.name, "Events query exceeded its local wait");
            None
        }
    }
}

fn peer_entry(peer_id: &str, items: CompletionItems, ctx: &FolderContext<'_>) -> PeerCompletion {
    let online = ctx.my_id == Some(peer_id) || ctx.online.contains(peer_id);
    PeerCompletion {
        id: peer_id.to_string(),
        name: resolve_device_name(peer_id, ctx.my_id, ctx.name_by_id),
        online,
        items,
    }
}

fn device_name_map(config: &DaemonConfig) -> HashMap<String, String> {
    config
        .devices
        .iter()
        .filter(|d| !d.device_id.is_empty())
        .map(|d| {
            let name = d
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| d.device_id.clone());
            (d.device_id.clone(), name)
        })
        .collect()
}

fn local_display_name(status: &SystemStatus, name_by_id: &HashMap<String, String>) -> Option<String> {
    status
        .my_id
        .as_ref()
        .and_then(|id| name_by_id.get(id))
        .cloned()
        .or_else(|| status.my_name.clone())
}

/// Display name for a device id: configured name, "Local" for the unmapped
/// local identity, raw id otherwise.
fn resolve_device_name(id: &str, my_id: Option<&str>, name_by_id: &HashMap<String, String>) -> String {
    if let Some(name) = name_by_id.get(id) {
        return name.clone();
    }
    if my_id == Some(id) {
        "Local".to_string()
    } else {
        id.to_string()
    }
}

fn device_rows(
    connections: &ConnectionsResponse,
    device_stats: Option<&BTreeMap<String, DeviceStats>>,
    name_by_id: &HashMap<String, String>,
    my_id: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> Vec<DeviceRow> {
    connections
        .connections
        .iter()
        .map(|(device_id, conn)| {
            let stats_row = device_stats
                .and_then(|stats| stats.get(device_id))
                .and_then(|stats| {
                    stats.last_seen.clone().map(|last_seen| DeviceStatsRow {
                        last_seen,
                        last_connection_duration_s: stats.last_connection_duration_s,
                        last_connection_started_at: stats.last_connection_started_at.clone(),
                    })
                });
            DeviceRow {
                device_id: device_id.clone(),
                name: resolve_device_name(device_id, my_id, name_by_id),
                online: conn.connected,
                in_bps: conn.in_bps,
                out_bps: conn.out_bps,
                address: conn.address.clone(),
                paused: conn.paused,
                uptime_seconds: metrics::connection_uptime(conn.connected_at.as_deref(), now),
                device_stats: stats_row,
            }
        })
        .collect()
}

/// Latest ItemFinished change per folder from the recent event window.
fn latest_changes(events: &[Event]) -> HashMap<String, FolderChange> {
    let mut changes: HashMap<String, FolderChange> = HashMap::new();
    for event in events {
        if event.event_type != "ItemFinished" {
            continue;
        }
        let Some(folder_id) = event.folder_id() else {
            continue;
        };
        let newer = changes
            .get(folder_id)
            .map(|existing| event.time > existing.time)
            .unwrap_or(true);
        if newer {
            changes.insert(
                folder_id.to_string(),
                FolderChange {
                    file: event.item().unwrap_or("unknown").to_string(),
                    time: event.time.clone(),
                    action: event.action().unwrap_or("unknown").to_string(),
                },
            );
        }
    }
    changes
}

/// Share summary, paused-folder list and per-device folder membership from
/// the daemon configuration.
fn derive_shares(
    config: &DaemonConfig,
    my_id: Option<&str>,
    name_by_id: &HashMap<String, String>,
) -> (ShareSummary, Vec<String>, BTreeMap<String, Vec<String>>) {
    let mut peer_names = BTreeSet::new();
    let mut per_device: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut paused = Vec::new();

    for folder in &config.folders {
        let label = folder.display_label();
        if folder.paused && !label.is_empty() {
            paused.push(label.clone());
        }
        for member in folder.member_ids() {
            if Some(member) == my_id {
                continue;
            }
            let name = name_by_id
                .get(member)
                .cloned()
                .unwrap_or_else(|| member.to_string());
            peer_names.insert(name.clone());
            per_device.entry(name).or_default().push(label.clone());
        }
    }

    paused.sort();
    for folders in per_device.values_mut() {
        folders.sort();
    }

    let shares = ShareSummary {
        count: config.folders.len(),
        peers: peer_names.into_iter().collect(),
    };
    (shares, paused, per_device)
}
